//! Interactive console
//!
//! Line-oriented loop that turns typed commands into sessions and renders
//! their streamed output.

pub mod command_router;
pub mod console_manager;

pub use command_router::{CommandRouter, ConsoleCommand};
pub use console_manager::ConsoleManager;
