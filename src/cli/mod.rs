//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for ReadBuddy.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "readbuddy")]
#[command(about = "ReadBuddy reading assistant")]
#[command(long_about = "Read photos and pages, or chat with your indexed documents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(long, default_value = "readbuddy.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error); defaults to the config file value
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the interactive console
    #[command(hide = true)]
    Interactive,

    /// Quietly read a text or URL and print the result
    Read {
        /// Text or URL to read
        request: String,

        /// Print the final session snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload a photo and read it
    Snap {
        /// Image file to upload
        image: PathBuf,
    },

    /// Ask a question and stream the answer
    Chat {
        /// Question to ask
        question: String,

        /// Give up after this many seconds (unbounded by default)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Print the final session snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a question without streaming
    Ask {
        /// Question to ask
        question: String,
    },

    /// Index a web page
    IndexUrl {
        /// Page URL
        url: String,
    },

    /// Index a PDF or text document
    IndexDoc {
        /// Document file
        file: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Interactive
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration to the config file
    Reset,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the actual command, using default if none provided
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }

    /// Check if we're running in interactive mode
    pub fn is_interactive_mode(&self) -> bool {
        matches!(self.command(), Commands::Interactive)
    }

    /// Adjust log level based on verbose flag
    pub fn effective_log_level(&self, configured: &str) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.to_string())
        }
    }
}
