//! Live transcription sessions
//!
//! This module provides the `TranscriptionSession` coordinator that owns:
//! - the transcoder process and its output reader
//! - the relay queue between transcoder and recognizer
//! - the recognition bridge and result fan-out to the client
//! - the session state machine and ordered teardown

mod config;
mod handle;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use handle::SessionHandle;
pub use session::{EndReason, InboundEvent, OutboundMessage, SessionReport, TranscriptionSession};
pub use state::{SessionState, StateMachine};
pub use stats::{SessionMonitor, SessionStats};
