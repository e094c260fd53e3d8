// Windowed streaming on top of a one-shot recognizer
//
// The REST speech API has no streaming call, so this adapter accumulates
// request audio into a window and re-recognizes it:
// - every `interim_bytes` of new audio -> interim response for the window
// - window reaches `window_bytes` or requests end -> final response, reset
//
// The iterators block. Each recognition call is driven to completion on the
// runtime `Handle` from the blocking worker thread.

use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use super::{
    OneShotRecognizer, RecognitionConfig, RequestIter, ResponseIter, StreamingRecognizer,
    StreamingResponse,
};
use crate::error::Result;

pub struct WindowedStreamingRecognizer {
    inner: Arc<dyn OneShotRecognizer>,
    runtime: Handle,
    interim_bytes: usize,
    window_bytes: usize,
    name: String,
}

impl WindowedStreamingRecognizer {
    /// `interim_bytes = 0` disables interim responses.
    pub fn new(
        inner: Arc<dyn OneShotRecognizer>,
        runtime: Handle,
        interim_bytes: usize,
        window_bytes: usize,
    ) -> Self {
        let name = format!("windowed-{}", inner.name());
        Self {
            inner,
            runtime,
            interim_bytes,
            window_bytes: window_bytes.max(1),
            name,
        }
    }
}

impl StreamingRecognizer for WindowedStreamingRecognizer {
    fn streaming_recognize(
        &self,
        config: &RecognitionConfig,
        requests: RequestIter,
    ) -> Result<ResponseIter> {
        let interim_bytes = if config.interim_results {
            self.interim_bytes
        } else {
            0
        };

        Ok(Box::new(WindowedResponses {
            inner: Arc::clone(&self.inner),
            runtime: self.runtime.clone(),
            config: config.clone(),
            requests,
            window: Vec::new(),
            since_interim: 0,
            interim_bytes,
            window_bytes: self.window_bytes,
            done: false,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct WindowedResponses {
    inner: Arc<dyn OneShotRecognizer>,
    runtime: Handle,
    config: RecognitionConfig,
    requests: RequestIter,
    window: Vec<u8>,
    since_interim: usize,
    interim_bytes: usize,
    window_bytes: usize,
    done: bool,
}

impl WindowedResponses {
    fn recognize_window(&mut self, is_final: bool) -> Result<StreamingResponse> {
        self.since_interim = 0;
        let audio = if is_final {
            std::mem::take(&mut self.window)
        } else {
            self.window.clone()
        };

        debug!(bytes = audio.len(), is_final, "Recognizing audio window");

        let inner = Arc::clone(&self.inner);
        let config = &self.config;
        let transcription = self
            .runtime
            .block_on(async move { inner.recognize(config, &audio).await });

        match transcription {
            Ok(t) => Ok(StreamingResponse::single(t.transcript, t.confidence, is_final)),
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }
}

impl Iterator for WindowedResponses {
    type Item = Result<StreamingResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.requests.next() {
                Some(request) => {
                    self.window.extend_from_slice(request.audio.as_bytes());
                    self.since_interim += request.audio.len();

                    if self.window.len() >= self.window_bytes {
                        return Some(self.recognize_window(true));
                    }
                    if self.interim_bytes > 0 && self.since_interim >= self.interim_bytes {
                        return Some(self.recognize_window(false));
                    }
                }
                None => {
                    self.done = true;
                    if self.window.is_empty() {
                        return None;
                    }
                    return Some(self.recognize_window(true));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Chunk;
    use crate::recognition::{MockOneShotRecognizer, StreamingRequest};

    fn requests(sizes: &[usize]) -> RequestIter {
        let chunks: Vec<_> = sizes
            .iter()
            .map(|&n| StreamingRequest {
                audio: Chunk::from(vec![0u8; n]),
            })
            .collect();
        Box::new(chunks.into_iter())
    }

    fn run(
        recognizer: WindowedStreamingRecognizer,
        config: RecognitionConfig,
        sizes: Vec<usize>,
    ) -> Vec<bool> {
        let responses = recognizer
            .streaming_recognize(&config, requests(&sizes))
            .unwrap();
        responses
            .map(|r| r.unwrap())
            .flat_map(|r| r.into_results())
            .map(|r| r.is_final)
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interims_then_final_on_window_fill() {
        let mock = Arc::new(MockOneShotRecognizer::new("words"));
        let recognizer =
            WindowedStreamingRecognizer::new(mock.clone(), Handle::current(), 100, 300);

        let flags = tokio::task::spawn_blocking(move || {
            run(recognizer, RecognitionConfig::default(), vec![100, 100, 100, 50])
        })
        .await
        .unwrap();

        // 100 -> interim, 200 -> interim, 300 -> final, trailing 50 -> final
        assert_eq!(flags, vec![false, false, true, true]);
        assert_eq!(mock.calls(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interims_disabled_by_config() {
        let mock = Arc::new(MockOneShotRecognizer::new("words"));
        let recognizer = WindowedStreamingRecognizer::new(mock, Handle::current(), 100, 1000);
        let config = RecognitionConfig {
            interim_results: false,
            ..Default::default()
        };

        let flags = tokio::task::spawn_blocking(move || run(recognizer, config, vec![100; 5]))
            .await
            .unwrap();

        assert_eq!(flags, vec![true]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_audio_yields_nothing() {
        let mock = Arc::new(MockOneShotRecognizer::new("words"));
        let recognizer = WindowedStreamingRecognizer::new(mock.clone(), Handle::current(), 100, 300);

        let flags =
            tokio::task::spawn_blocking(move || run(recognizer, RecognitionConfig::default(), vec![]))
                .await
                .unwrap();

        assert!(flags.is_empty());
        assert_eq!(mock.calls(), 0);
    }
}
