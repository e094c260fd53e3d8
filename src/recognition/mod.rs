//! Speech recognition collaborators and the streaming bridge
//!
//! Two vendor shapes are supported:
//! - `StreamingRecognizer`: a blocking request iterator in, a blocking
//!   response iterator out (interim + final results)
//! - `OneShotRecognizer`: one complete audio buffer in, one transcript out
//!
//! `RecognitionBridge` drives either shape from the async relay queue.

pub mod bridge;
pub mod mock;
pub mod windowed;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audio::Chunk;
use crate::error::Result;

pub use bridge::{BridgeHandle, BridgeOutcome, RecognitionBridge};
pub use mock::{MockOneShotRecognizer, MockStreamingRecognizer};
pub use windowed::WindowedStreamingRecognizer;

/// One transcript record sent to the client.
///
/// Serialized as `{"transcript": ..., "confidence": ..., "is_final": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub transcript: String,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,
    /// Whether this is a final result or an interim one
    pub is_final: bool,
}

impl RecognitionResult {
    pub fn new(transcript: impl Into<String>, confidence: f32, is_final: bool) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            transcript: transcript.into(),
            confidence,
            is_final,
        }
    }
}

/// Recognition settings passed to the vendor with every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Audio encoding (e.g. "LINEAR16")
    pub encoding: String,
    pub sample_rate_hertz: u32,
    /// BCP-47 language code
    pub language_code: String,
    pub model: String,
    /// Ask streaming recognizers for interim results
    pub interim_results: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            encoding: "LINEAR16".to_string(),
            sample_rate_hertz: 48000,
            language_code: "en-US".to_string(),
            model: "latest_short".to_string(),
            interim_results: true,
        }
    }
}

/// One-shot recognition output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcription {
    pub transcript: String,
    pub confidence: f32,
}

/// A request handed to a streaming recognizer; wraps one audio chunk.
#[derive(Debug, Clone)]
pub struct StreamingRequest {
    pub audio: Chunk,
}

#[derive(Debug, Clone, Default)]
pub struct SpeechAlternative {
    pub transcript: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct SpeechResult {
    /// Alternatives, best first
    pub alternatives: Vec<SpeechAlternative>,
    pub is_final: bool,
}

/// One response from a streaming recognizer.
#[derive(Debug, Clone, Default)]
pub struct StreamingResponse {
    pub results: Vec<SpeechResult>,
}

impl StreamingResponse {
    pub fn single(transcript: impl Into<String>, confidence: f32, is_final: bool) -> Self {
        Self {
            results: vec![SpeechResult {
                alternatives: vec![SpeechAlternative {
                    transcript: transcript.into(),
                    confidence,
                }],
                is_final,
            }],
        }
    }

    /// Best alternative of every result; results without alternatives are skipped.
    pub fn into_results(self) -> impl Iterator<Item = RecognitionResult> {
        self.results.into_iter().filter_map(|result| {
            let is_final = result.is_final;
            result
                .alternatives
                .into_iter()
                .next()
                .map(|alt| RecognitionResult::new(alt.transcript, alt.confidence, is_final))
        })
    }
}

pub type RequestIter = Box<dyn Iterator<Item = StreamingRequest> + Send>;
pub type ResponseIter = Box<dyn Iterator<Item = Result<StreamingResponse>> + Send>;

/// Vendor client with a blocking streaming protocol.
///
/// Both iterators block. Implementations are only ever driven from a
/// blocking worker thread, never from async code.
pub trait StreamingRecognizer: Send + Sync {
    fn streaming_recognize(
        &self,
        config: &RecognitionConfig,
        requests: RequestIter,
    ) -> Result<ResponseIter>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Vendor client that only supports complete-buffer recognition.
#[async_trait]
pub trait OneShotRecognizer: Send + Sync {
    async fn recognize(&self, config: &RecognitionConfig, audio: &[u8]) -> Result<Transcription>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Which recognition collaborator a session pipeline uses.
#[derive(Clone)]
pub enum RecognitionStrategy {
    Streaming(Arc<dyn StreamingRecognizer>),
    /// Degraded mode: one final result per chunk, no interim results
    OneShot(Arc<dyn OneShotRecognizer>),
}

impl RecognitionStrategy {
    pub fn name(&self) -> &str {
        match self {
            RecognitionStrategy::Streaming(r) => r.name(),
            RecognitionStrategy::OneShot(r) => r.name(),
        }
    }
}

impl std::fmt::Debug for RecognitionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionStrategy::Streaming(r) => write!(f, "Streaming({})", r.name()),
            RecognitionStrategy::OneShot(r) => write!(f, "OneShot({})", r.name()),
        }
    }
}
