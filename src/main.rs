use colored::Colorize;
use readbuddy::{
    AppResult,
    app::App,
    cli::{Cli, Commands},
    config::Config,
    console::ConsoleManager,
    init_logging,
    session::{SessionMode, SessionSnapshot, SessionState},
    ui::cli as view,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    // Load configuration
    let config = Config::load_or_default(&cli.config_file);

    // Initialize logging
    let level = cli.effective_log_level(&config.log.level);
    let _log_guard = init_logging(&level, config.log.file_path.as_deref())?;

    tracing::info!("ReadBuddy starting...");
    tracing::debug!("CLI arguments: {:?}", cli);

    if let Commands::Config { action } = cli.command() {
        Config::handle_command(&cli.config_file, &action)?;
        return Ok(());
    }

    if let Err(e) = config.validate() {
        eprintln!("{} {}", "Invalid configuration:".red(), e);
        std::process::exit(2);
    }

    let mut app = App::new(config);

    match cli.command() {
        Commands::Interactive => {
            let mut console = ConsoleManager::new(app);
            console.run().await?;
        }
        Commands::Read { request, json } => {
            let handle = app.start_session(&request, SessionMode::QuietReading, None)?;
            let snapshot = app.follow(&handle, false).await;
            finish(&snapshot, json, false)?;
        }
        Commands::Chat {
            question,
            timeout_secs,
            json,
        } => {
            let timeout = timeout_secs.map(Duration::from_secs);
            let handle = app.start_session(&question, SessionMode::InteractiveChat, timeout)?;
            let snapshot = app.follow(&handle, !json).await;
            finish(&snapshot, json, !json)?;
        }
        Commands::Snap { image } => {
            let handle = app.snap(&image).await?;
            let snapshot = app.follow(&handle, false).await;
            finish(&snapshot, false, false)?;
        }
        Commands::Ask { question } => {
            let response = app.ask(&question).await?;
            view::display_chat_response(&response)?;
        }
        Commands::IndexUrl { url } => {
            let message = app.index_url(&url).await?;
            view::display_info(&message)?;
        }
        Commands::IndexDoc { file } => {
            let message = app.index_document(&file).await?;
            view::display_info(&message)?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Print a finished session and exit non-zero unless it completed
fn finish(snapshot: &SessionSnapshot, json: bool, streamed: bool) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        view::display_outcome(snapshot, streamed)?;
    }

    if snapshot.state != SessionState::Completed {
        tracing::debug!("Session ended as {}", snapshot.state);
        std::process::exit(1);
    }
    Ok(())
}
