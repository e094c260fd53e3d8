pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod recognition;
pub mod session;
pub mod vendor;

pub use audio::{AudioFile, Chunk, RelayItem, TranscoderConfig, TranscoderProcess};
pub use config::Config;
pub use error::{RelayError, Result};
pub use http::{create_router, AppState};
pub use recognition::{RecognitionResult, RecognitionStrategy};
pub use session::{SessionConfig, SessionReport, SessionState, SessionStats, TranscriptionSession};
