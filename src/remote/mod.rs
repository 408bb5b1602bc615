//! Backend integration module
//!
//! Handles the streaming duplex channels, the REST endpoints, and wire-format parsing.

pub mod channel;
pub mod mock;
pub mod rest;
pub mod types;
pub mod websocket;

// Re-export commonly used types
pub use channel::{ChannelLink, Connector};
pub use mock::{MockConnector, MockPeer};
pub use rest::RestClient;
pub use types::*;
pub use websocket::WebSocketConnector;
