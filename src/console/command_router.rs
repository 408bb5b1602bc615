//! Command Router for interactive command processing

use std::path::PathBuf;

use anyhow::Result;

use crate::session::SessionMode;

/// Interactive commands for the console
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Submit text in the current mode
    Submit { text: String },
    /// Quietly read text or a URL
    Read { text: String },
    /// Ask a question with a streamed answer
    Chat { text: String },
    /// Switch the default mode
    Mode { mode: SessionMode },
    /// Upload a photo and read it
    Snap { image: PathBuf },
    /// Index a web page
    IndexUrl { url: String },
    /// Index a document file
    IndexDoc { file: PathBuf },
    /// Cancel the in-flight session
    Cancel,
    /// Show session statistics
    Status,
    /// Show help
    Help,
    /// Quit the console
    Quit,
}

const HELP_LINES: [&str; 11] = [
    "ReadBuddy console commands:",
    "  <text>               - Submit in the current mode",
    "  /read <text|url>     - Quietly read text or a page",
    "  /chat <question>     - Ask with a streamed answer",
    "  /mode read|chat      - Switch the current mode",
    "  /snap <image>        - Upload a photo and read it",
    "  /index-url <url>     - Add a web page to the library",
    "  /index-doc <file>    - Add a PDF or text file to the library",
    "  /cancel              - Stop the current answer",
    "  /status              - Show session statistics",
    "  /quit                - Exit",
];

/// Stateless parser for console input
pub struct CommandRouter;

impl CommandRouter {
    /// Parse one line of input. Blank lines yield `None`.
    pub fn parse(input: &str) -> Result<Option<ConsoleCommand>> {
        let input = input.trim();

        if input.is_empty() {
            return Ok(None);
        }

        if !input.starts_with('/') {
            return Ok(Some(ConsoleCommand::Submit {
                text: input.to_string(),
            }));
        }

        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        match command {
            "/read" => Ok(Some(ConsoleCommand::Read {
                text: Self::required(rest, "Usage: /read <text|url>")?,
            })),
            "/chat" => Ok(Some(ConsoleCommand::Chat {
                text: Self::required(rest, "Usage: /chat <question>")?,
            })),
            "/mode" => match rest {
                "read" => Ok(Some(ConsoleCommand::Mode {
                    mode: SessionMode::QuietReading,
                })),
                "chat" => Ok(Some(ConsoleCommand::Mode {
                    mode: SessionMode::InteractiveChat,
                })),
                _ => Err(anyhow::anyhow!("Usage: /mode read|chat")),
            },
            "/snap" => Ok(Some(ConsoleCommand::Snap {
                image: PathBuf::from(Self::required(rest, "Usage: /snap <image>")?),
            })),
            "/index-url" => Ok(Some(ConsoleCommand::IndexUrl {
                url: Self::required(rest, "Usage: /index-url <url>")?,
            })),
            "/index-doc" => Ok(Some(ConsoleCommand::IndexDoc {
                file: PathBuf::from(Self::required(rest, "Usage: /index-doc <file>")?),
            })),
            "/cancel" | "/stop" => Ok(Some(ConsoleCommand::Cancel)),
            "/status" => Ok(Some(ConsoleCommand::Status)),
            "/help" | "/?" => Ok(Some(ConsoleCommand::Help)),
            "/quit" | "/exit" | "/q" => Ok(Some(ConsoleCommand::Quit)),
            _ => Err(anyhow::anyhow!(
                "Unknown command: {}. Type /help for available commands.",
                command
            )),
        }
    }

    /// Console help text
    pub fn help_messages() -> &'static [&'static str] {
        &HELP_LINES
    }

    fn required(rest: &str, usage: &str) -> Result<String> {
        if rest.is_empty() {
            Err(anyhow::anyhow!("{}", usage))
        } else {
            Ok(rest.to_string())
        }
    }
}
