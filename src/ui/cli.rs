//! Simple CLI output implementation
//!
//! Renders session progress and results as plain coloured text.

use std::io::Write;

use colored::Colorize;

use super::{document_title, format_source};
use crate::AppResult;
use crate::metrics::SessionStats;
use crate::remote::types::ChatResponse;
use crate::session::{
    Document, ReadingPayload, SessionMode, SessionSnapshot, SessionState, SessionUpdate,
};

/// Display the console welcome banner
pub fn display_welcome(mode: SessionMode) -> AppResult<()> {
    println!("{}", "📖 Welcome to ReadBuddy!".bold());
    println!("   Current mode: {}", mode.label().cyan());
    println!("   Type a question to start, or /help for commands.");
    println!();
    Ok(())
}

/// Render one incremental update as it arrives
pub fn render_update(update: &SessionUpdate) -> AppResult<()> {
    match update {
        SessionUpdate::AnswerDelta(fragment) => {
            print!("{}", fragment);
            std::io::stdout().flush()?;
        }
        SessionUpdate::DocumentsReplaced(documents) => {
            tracing::debug!("Received {} reference documents", documents.len());
        }
        SessionUpdate::PayloadReplaced(payload) => {
            tracing::debug!("Received reading payload ({} chars)", payload.text.len());
        }
        SessionUpdate::StateChanged(SessionState::Connecting) => {
            println!("{}", "⏳ Connecting...".dimmed());
        }
        SessionUpdate::StateChanged(_) => {}
    }
    Ok(())
}

/// Display a quiet reading result
pub fn display_payload(payload: &ReadingPayload) -> AppResult<()> {
    println!("{}", payload.text);
    if let Some(image_url) = &payload.image_url {
        println!("   {} {}", "Image:".dimmed(), image_url);
    }
    Ok(())
}

/// Display reference documents under an answer
pub fn display_documents(documents: &[Document]) -> AppResult<()> {
    if documents.is_empty() {
        return Ok(());
    }

    println!();
    println!("{}", "📚 Sources:".bold());
    for (i, document) in documents.iter().enumerate() {
        println!("   {}. {}", i + 1, document_title(document, 72));
        println!("      Source: {}", format_source(document).blue());
    }
    Ok(())
}

/// Display the end state of a session.
///
/// Streamed answers were already printed fragment by fragment, so only the
/// documents and the outcome line are shown for chats.
pub fn display_outcome(snapshot: &SessionSnapshot, streamed: bool) -> AppResult<()> {
    match snapshot.mode {
        SessionMode::QuietReading => {
            if let Some(payload) = snapshot.accumulator.payload() {
                display_payload(payload)?;
            }
        }
        SessionMode::InteractiveChat => {
            if !streamed {
                if let Some(answer) = snapshot.accumulator.answer() {
                    print!("{}", answer);
                }
            }
            println!();
            display_documents(snapshot.accumulator.documents())?;
        }
    }

    match snapshot.state {
        SessionState::Completed => {
            if snapshot.events_received == 0 {
                println!("{}", "ℹ️  The service closed without sending a result.".yellow());
            }
        }
        SessionState::Cancelled => println!("{}", "⏹  Cancelled.".yellow()),
        SessionState::TimedOut => println!(
            "{}",
            "⌛ No answer in time. Try again?".yellow()
        ),
        SessionState::Failed => {
            let reason = snapshot
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            println!("{} {}", "❌ Failed:".red(), reason);
        }
        state => println!("   {}", state.to_string().dimmed()),
    }

    Ok(())
}

/// Display a non-streaming chat reply
pub fn display_chat_response(response: &ChatResponse) -> AppResult<()> {
    println!("{}", response.answer);
    let documents: Vec<Document> = response
        .documents
        .iter()
        .cloned()
        .map(Document::from)
        .collect();
    display_documents(&documents)
}

/// Display session statistics
pub fn display_stats(mode: SessionMode, active: Option<SessionState>, stats: &SessionStats) -> AppResult<()> {
    println!("🔍 ReadBuddy Status:");
    println!("   Mode: {}", mode.label());
    match active {
        Some(state) => println!("   Active session: {}", state),
        None => println!("   Active session: none"),
    }
    println!("   Sessions started: {}", stats.sessions_started);
    println!(
        "   Completed: {} | Failed: {} | Timed out: {} | Cancelled: {}",
        stats.completed, stats.failed, stats.timed_out, stats.cancelled
    );
    println!("   Events processed: {}", stats.events_processed);
    println!(
        "   First event latency p50/p95/p99: {}/{}/{} ms",
        stats.first_event_p50_ms, stats.first_event_p95_ms, stats.first_event_p99_ms
    );
    Ok(())
}

/// Display an informational line
pub fn display_info(message: &str) -> AppResult<()> {
    println!("{} {}", "✅".green(), message);
    Ok(())
}

/// Display an error line
pub fn display_error(message: &str) -> AppResult<()> {
    println!("{} {}", "❌".red(), message.red());
    Ok(())
}
