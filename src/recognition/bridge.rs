// Streaming recognition bridge
//
// Streaming mode runs two tasks:
// - feeder (async): relay queue -> bounded hand-off channel of requests
// - worker (spawn_blocking): pulls requests with `blocking_recv`, drives
//   the vendor's blocking iterators, pushes results with `blocking_send`
//
// One-shot mode runs a single async task that recognizes each chunk on its
// own and emits one final result per chunk.
//
// Errors from the vendor end the output; they are returned from the worker
// task and never cross into the session coordinator as a panic.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{
    OneShotRecognizer, RecognitionConfig, RecognitionResult, RecognitionStrategy, RequestIter,
    StreamingRecognizer, StreamingRequest,
};
use crate::audio::{RelayConsumer, RelayItem};
use crate::error::Result;

/// Capacity of the async -> blocking request hand-off
const HANDOFF_CAPACITY: usize = 64;

/// Blocking iterator over the request hand-off channel.
struct HandoffRequests {
    rx: mpsc::Receiver<StreamingRequest>,
}

impl Iterator for HandoffRequests {
    type Item = StreamingRequest;

    fn next(&mut self) -> Option<StreamingRequest> {
        self.rx.blocking_recv()
    }
}

/// Final accounting for a bridge once all of its tasks have stopped
#[derive(Debug, Clone, Default)]
pub struct BridgeOutcome {
    /// Requests handed to the streaming worker (0 in one-shot mode)
    pub requests: usize,
    /// Results delivered to the sink
    pub results: usize,
    /// Vendor error that ended the output, if any
    pub error: Option<String>,
    /// Panics or other task failures
    pub task_failures: Vec<String>,
}

/// Tasks owned by a running bridge
pub struct BridgeHandle {
    feeder: Option<JoinHandle<usize>>,
    worker: Option<JoinHandle<Result<usize>>>,
    worker_outcome: Option<std::result::Result<usize, String>>,
    worker_panicked: bool,
}

impl BridgeHandle {
    /// Wait for the task producing results.
    ///
    /// Call once the result channel has closed; the worker has returned by then.
    pub async fn wait_output(&mut self) -> std::result::Result<usize, String> {
        if let Some(worker) = self.worker.take() {
            let outcome = match worker.await {
                Ok(Ok(delivered)) => Ok(delivered),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => {
                    self.worker_panicked = e.is_panic();
                    Err(format!("recognition worker failed: {}", e))
                }
            };
            self.worker_outcome = Some(outcome);
        }
        self.worker_outcome.clone().unwrap_or(Ok(0))
    }

    /// Wait for every task. Failures are collected, not propagated.
    pub async fn join(mut self) -> BridgeOutcome {
        let mut outcome = BridgeOutcome::default();

        match self.wait_output().await {
            Ok(delivered) => outcome.results = delivered,
            Err(e) if self.worker_panicked => outcome.task_failures.push(e),
            Err(e) => outcome.error = Some(e),
        }

        if let Some(feeder) = self.feeder.take() {
            match feeder.await {
                Ok(forwarded) => outcome.requests = forwarded,
                Err(e) => outcome
                    .task_failures
                    .push(format!("recognition feeder failed: {}", e)),
            }
        }

        outcome
    }
}

pub struct RecognitionBridge;

impl RecognitionBridge {
    /// Start the bridge for the given strategy.
    ///
    /// Results are pushed to `sink` as they arrive; the sink is dropped when
    /// the output ends (end marker reached, vendor error, or sink closed).
    pub fn spawn(
        strategy: RecognitionStrategy,
        config: RecognitionConfig,
        source: RelayConsumer,
        sink: mpsc::Sender<RecognitionResult>,
    ) -> BridgeHandle {
        info!("Starting recognition bridge: {:?}", strategy);
        match strategy {
            RecognitionStrategy::Streaming(recognizer) => {
                Self::spawn_streaming(recognizer, config, source, sink)
            }
            RecognitionStrategy::OneShot(recognizer) => {
                Self::spawn_one_shot(recognizer, config, source, sink)
            }
        }
    }

    fn spawn_streaming(
        recognizer: Arc<dyn StreamingRecognizer>,
        config: RecognitionConfig,
        mut source: RelayConsumer,
        sink: mpsc::Sender<RecognitionResult>,
    ) -> BridgeHandle {
        let (request_tx, request_rx) = mpsc::channel::<StreamingRequest>(HANDOFF_CAPACITY);

        let feeder = tokio::spawn(async move {
            let mut forwarded = 0usize;
            loop {
                match source.get().await {
                    RelayItem::Chunk(audio) => {
                        if request_tx.send(StreamingRequest { audio }).await.is_err() {
                            debug!("Recognition worker gone, feeder stopping");
                            break;
                        }
                        forwarded += 1;
                    }
                    RelayItem::End => {
                        debug!("Feeder observed end marker after {} requests", forwarded);
                        break;
                    }
                }
            }
            // Dropping request_tx ends the worker's request iterator.
            forwarded
        });

        let worker = tokio::task::spawn_blocking(move || {
            let requests: RequestIter = Box::new(HandoffRequests { rx: request_rx });
            let responses = match recognizer.streaming_recognize(&config, requests) {
                Ok(responses) => responses,
                Err(e) => {
                    error!("{} streaming recognition failed to start: {}", recognizer.name(), e);
                    return Err(e);
                }
            };

            let mut delivered = 0usize;
            for response in responses {
                let response = match response {
                    Ok(response) => response,
                    Err(e) => {
                        error!("{} streaming recognition failed: {}", recognizer.name(), e);
                        return Err(e);
                    }
                };

                for result in response.into_results() {
                    if sink.blocking_send(result).is_err() {
                        debug!("Result sink closed, recognition worker stopping");
                        return Ok(delivered);
                    }
                    delivered += 1;
                }
            }

            info!("Streaming recognition finished ({} results)", delivered);
            Ok(delivered)
        });

        BridgeHandle {
            feeder: Some(feeder),
            worker: Some(worker),
            worker_outcome: None,
            worker_panicked: false,
        }
    }

    fn spawn_one_shot(
        recognizer: Arc<dyn OneShotRecognizer>,
        config: RecognitionConfig,
        mut source: RelayConsumer,
        sink: mpsc::Sender<RecognitionResult>,
    ) -> BridgeHandle {
        let worker = tokio::spawn(async move {
            let mut delivered = 0usize;
            loop {
                let chunk = match source.get().await {
                    RelayItem::Chunk(chunk) => chunk,
                    RelayItem::End => break,
                };

                let transcription = match recognizer.recognize(&config, chunk.as_bytes()).await {
                    Ok(transcription) => transcription,
                    Err(e) => {
                        error!("{} recognition failed: {}", recognizer.name(), e);
                        return Err(e);
                    }
                };

                let result =
                    RecognitionResult::new(transcription.transcript, transcription.confidence, true);
                if sink.send(result).await.is_err() {
                    debug!("Result sink closed, one-shot recognition stopping");
                    return Ok(delivered);
                }
                delivered += 1;
            }

            info!("One-shot recognition finished ({} results)", delivered);
            Ok(delivered)
        });

        BridgeHandle {
            feeder: None,
            worker: Some(worker),
            worker_outcome: None,
            worker_panicked: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{relay, Chunk};
    use crate::recognition::{MockOneShotRecognizer, MockStreamingRecognizer};

    async fn collect(mut rx: mpsc::Receiver<RecognitionResult>) -> Vec<RecognitionResult> {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }

    #[tokio::test]
    async fn test_streaming_bridge_delivers_results_in_order() {
        let recognizer = Arc::new(MockStreamingRecognizer::new());
        let (producer, consumer) = relay::channel();
        let (tx, rx) = mpsc::channel(8);

        let handle = RecognitionBridge::spawn(
            RecognitionStrategy::Streaming(recognizer.clone()),
            RecognitionConfig::default(),
            consumer,
            tx,
        );

        for i in 0..3u8 {
            producer.put(Chunk::from(vec![i; 16])).unwrap();
        }
        producer.finish();

        let results = collect(rx).await;
        let outcome = handle.join().await;

        let transcripts: Vec<_> = results.iter().map(|r| r.transcript.as_str()).collect();
        assert_eq!(transcripts, vec!["chunk 0", "chunk 1", "chunk 2"]);
        assert_eq!(outcome.requests, 3);
        assert_eq!(outcome.results, 3);
        assert!(outcome.error.is_none());
        assert_eq!(recognizer.requests_seen(), 3);
    }

    #[tokio::test]
    async fn test_streaming_error_ends_output() {
        let recognizer = Arc::new(MockStreamingRecognizer::new().fail_after(1));
        let (producer, consumer) = relay::channel();
        let (tx, rx) = mpsc::channel(8);

        let handle = RecognitionBridge::spawn(
            RecognitionStrategy::Streaming(recognizer),
            RecognitionConfig::default(),
            consumer,
            tx,
        );

        for i in 0..4u8 {
            producer.put(Chunk::from(vec![i; 16])).unwrap();
        }

        let results = collect(rx).await;
        producer.finish();
        let outcome = handle.join().await;

        assert_eq!(results.len(), 1);
        assert!(outcome.error.is_some());
        assert!(outcome.task_failures.is_empty());
    }

    #[tokio::test]
    async fn test_one_shot_bridge_emits_one_final_per_chunk() {
        let recognizer = Arc::new(MockOneShotRecognizer::new("hello"));
        let (producer, consumer) = relay::channel();
        let (tx, rx) = mpsc::channel(8);

        let handle = RecognitionBridge::spawn(
            RecognitionStrategy::OneShot(recognizer.clone()),
            RecognitionConfig::default(),
            consumer,
            tx,
        );

        for i in 0..5u8 {
            producer.put(Chunk::from(vec![i; 32])).unwrap();
        }
        producer.finish();

        let results = collect(rx).await;
        let outcome = handle.join().await;

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.is_final));
        assert_eq!(outcome.results, 5);
        assert_eq!(outcome.requests, 0);
        assert_eq!(recognizer.calls(), 5);
    }
}
