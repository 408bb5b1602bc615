//! Streaming session management module
//!
//! This module provides the session controller that opens a duplex channel,
//! sends one request, accumulates the streamed events per mode, and guarantees
//! every session ends in exactly one terminal state.

pub mod controller;
pub mod machine;
pub mod types;

pub use controller::{ControllerConfig, SessionController, SessionHandle};
pub use machine::{Action, SessionMachine};
pub use types::{
    Accumulator, ChatAccumulator, Document, ReadingAccumulator, ReadingPayload, SessionError,
    SessionId, SessionMode, SessionSnapshot, SessionState, SessionUpdate,
};
