use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    OneShotRecognizer, RecognitionConfig, RequestIter, ResponseIter, SpeechAlternative,
    SpeechResult, StreamingRecognizer, StreamingResponse, Transcription,
};
use crate::error::{RelayError, Result};

/// Mock one-shot recognizer for testing
#[derive(Debug, Clone)]
pub struct MockOneShotRecognizer {
    response: String,
    confidence: f32,
    should_fail: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    bytes_seen: Arc<AtomicUsize>,
}

impl MockOneShotRecognizer {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            confidence: 0.9,
            should_fail: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            bytes_seen: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to fail every call
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bytes_seen(&self) -> usize {
        self.bytes_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OneShotRecognizer for MockOneShotRecognizer {
    async fn recognize(&self, _config: &RecognitionConfig, audio: &[u8]) -> Result<Transcription> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bytes_seen.fetch_add(audio.len(), Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail {
            return Err(RelayError::Vendor("mock recognition failure".to_string()));
        }

        Ok(Transcription {
            transcript: self.response.clone(),
            confidence: self.confidence,
        })
    }

    fn name(&self) -> &str {
        "mock-oneshot"
    }
}

/// Mock streaming recognizer for testing.
///
/// Answers every request with a final result `"chunk {n}"`, optionally
/// preceded by an interim result. All request audio is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockStreamingRecognizer {
    fail_after: Option<usize>,
    interim: bool,
    requests_seen: Arc<AtomicUsize>,
    audio_seen: Arc<Mutex<Vec<u8>>>,
}

impl MockStreamingRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield an error instead of the response to request number `n` (0-based)
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Emit an interim result before each final one
    pub fn with_interim(mut self) -> Self {
        self.interim = true;
        self
    }

    pub fn requests_seen(&self) -> usize {
        self.requests_seen.load(Ordering::SeqCst)
    }

    pub fn bytes_seen(&self) -> usize {
        self.audio_seen.lock().len()
    }

    /// Concatenated audio of every request, in arrival order
    pub fn audio_seen(&self) -> Vec<u8> {
        self.audio_seen.lock().clone()
    }
}

struct MockResponses {
    requests: RequestIter,
    index: usize,
    fail_after: Option<usize>,
    interim: bool,
    failed: bool,
    requests_seen: Arc<AtomicUsize>,
    audio_seen: Arc<Mutex<Vec<u8>>>,
}

impl Iterator for MockResponses {
    type Item = Result<StreamingResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let request = self.requests.next()?;
        self.requests_seen.fetch_add(1, Ordering::SeqCst);
        self.audio_seen
            .lock()
            .extend_from_slice(request.audio.as_bytes());

        if self.fail_after == Some(self.index) {
            self.failed = true;
            return Some(Err(RelayError::Vendor(
                "mock streaming failure".to_string(),
            )));
        }

        let transcript = format!("chunk {}", self.index);
        self.index += 1;

        let mut response = StreamingResponse::single(transcript.clone(), 0.9, true);
        if self.interim {
            response.results.insert(
                0,
                SpeechResult {
                    alternatives: vec![SpeechAlternative {
                        transcript,
                        confidence: 0.5,
                    }],
                    is_final: false,
                },
            );
        }
        Some(Ok(response))
    }
}

impl StreamingRecognizer for MockStreamingRecognizer {
    fn streaming_recognize(
        &self,
        _config: &RecognitionConfig,
        requests: RequestIter,
    ) -> Result<ResponseIter> {
        Ok(Box::new(MockResponses {
            requests,
            index: 0,
            fail_after: self.fail_after,
            interim: self.interim,
            failed: false,
            requests_seen: Arc::clone(&self.requests_seen),
            audio_seen: Arc::clone(&self.audio_seen),
        }))
    }

    fn name(&self) -> &str {
        "mock-streaming"
    }
}
