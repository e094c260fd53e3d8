//! HTTP API
//!
//! - POST /api/v1/ocr, /answer, /process_ocr_question, /multimodal, /chat
//! - POST /api/v1/transcribe/upload - one-shot transcription of a file
//! - GET /api/v1/transcribe/stream - WebSocket live transcription
//! - GET /api/v1/sessions[/:id], POST /api/v1/sessions/:id/stop
//! - GET /health - Health check

mod error;
mod handlers;
mod routes;
mod state;
mod ws;

pub use error::ApiError;
pub use handlers::{
    AnswerResponse, ChatResponse, OcrQuestionResponse, OcrResponse, TranscriptionResponse,
};
pub use routes::create_router;
pub use state::AppState;
pub use ws::parse_text_frame;
