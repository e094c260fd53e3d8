use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config::SessionConfig;
use super::handle::SessionHandle;
use super::state::{SessionState, StateMachine};
use super::stats::{SessionMonitor, SessionStats};
use crate::audio::{
    relay, Chunk, RelayProducer, TerminationOutcome, TranscoderOutput, TranscoderProcess,
};
use crate::error::{RelayError, Result};
use crate::recognition::{BridgeHandle, RecognitionBridge, RecognitionResult, RecognitionStrategy};

/// What the transport delivers to a session
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// One binary frame (compressed media, or PCM on the direct path)
    Chunk(Bytes),
    /// Explicit end of stream from the client
    End,
    /// Malformed frame; answered with an error message, streaming continues
    Invalid(String),
    /// Socket failure; handled like a disconnect
    TransportError(String),
}

/// What a session sends back to the client, one JSON message each
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Result(RecognitionResult),
    Error { error: String },
}

impl OutboundMessage {
    pub fn error(message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            error: message.into(),
        }
    }
}

/// Why streaming stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    ClientEnd,
    Disconnected,
    Stopped,
    Failed,
}

/// Final account of a session, returned once it is `Closed`
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub final_state: SessionState,
    pub history: Vec<SessionState>,
    pub errored: bool,
    pub end_reason: EndReason,
    /// First unrecoverable error, if any
    pub error: Option<String>,
    pub stats: SessionStats,
    /// Background task panics and other join failures
    pub task_failures: Vec<String>,
    pub termination: Option<TerminationOutcome>,
    /// Chunks written to the transcoder input
    pub transcoder_chunks_written: usize,
    /// Times the transcoder input was closed (0 on the direct path)
    pub transcoder_input_closes: usize,
    pub transcoder_forced_kills: usize,
}

/// Result sender that remembers when the client has gone away
struct Outbound {
    tx: mpsc::Sender<OutboundMessage>,
    open: bool,
    monitor: Arc<SessionMonitor>,
}

impl Outbound {
    async fn send_result(&mut self, result: RecognitionResult) -> bool {
        if !self.open {
            return false;
        }
        if self.tx.send(OutboundMessage::Result(result)).await.is_err() {
            debug!("Outbound channel closed, dropping results");
            self.open = false;
            return false;
        }
        self.monitor.record_result();
        true
    }

    async fn send_error(&mut self, message: &str) {
        if self.open && self.tx.send(OutboundMessage::error(message)).await.is_err() {
            self.open = false;
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Teardown {
    termination: Option<TerminationOutcome>,
    errors: Vec<String>,
    task_failures: Vec<String>,
}

/// Transcoder -> relay queue -> recognition bridge, for one session
struct Pipeline {
    config: SessionConfig,
    producer: RelayProducer,
    transcoder: Option<TranscoderProcess>,
    reader: Option<JoinHandle<Result<usize>>>,
    bridge: Option<BridgeHandle>,
    results: mpsc::Receiver<RecognitionResult>,
    results_open: bool,
    teardown: Option<Teardown>,
}

fn spawn_reader(mut output: TranscoderOutput, producer: RelayProducer) -> JoinHandle<Result<usize>> {
    tokio::spawn(
        async move {
            let mut chunks = 0usize;
            while let Some(data) = output.read().await? {
                match producer.put(Chunk::from(data)) {
                    Ok(()) => chunks += 1,
                    // Counted by the relay
                    Err(RelayError::QueueClosed) => {}
                    Err(e) => return Err(e),
                }
            }
            debug!("Transcoder output reached EOF after {} chunks", chunks);
            Ok(chunks)
        }
        .in_current_span(),
    )
}

impl Pipeline {
    fn build(
        config: &SessionConfig,
        strategy: RecognitionStrategy,
        monitor: &SessionMonitor,
    ) -> Result<Self> {
        let (producer, consumer) = relay::channel();
        monitor.attach_relay(producer.counters());

        let (transcoder, reader) = if config.transcode {
            let (process, output) = TranscoderProcess::start(&config.transcoder)?;
            let reader = spawn_reader(output, producer.clone());
            (Some(process), Some(reader))
        } else {
            (None, None)
        };

        let (result_tx, results) = mpsc::channel(config.result_buffer.max(1));
        let bridge = RecognitionBridge::spawn(
            strategy,
            config.effective_recognition(),
            consumer,
            result_tx,
        );

        Ok(Self {
            config: config.clone(),
            producer,
            transcoder,
            reader,
            bridge: Some(bridge),
            results,
            results_open: true,
            teardown: None,
        })
    }

    /// Hand one inbound chunk to the pipeline without waiting on the
    /// transcoder, so stop and disconnect stay observable.
    fn accept(&mut self, data: Bytes) -> Result<()> {
        match self.transcoder.as_mut() {
            Some(process) => process.try_write(data),
            None => match self.producer.put(Chunk::from(data)) {
                Err(RelayError::QueueClosed) => Ok(()),
                other => other,
            },
        }
    }

    /// Error that ended the bridge output, if it ended with one.
    async fn output_error(&mut self) -> Option<String> {
        match self.bridge.as_mut() {
            Some(bridge) => bridge.wait_output().await.err(),
            None => None,
        }
    }

    fn record_reader(joined: std::result::Result<Result<usize>, tokio::task::JoinError>, summary: &mut Teardown) {
        match joined {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => summary
                .errors
                .push(format!("transcoder output failed: {}", e)),
            Err(e) => summary
                .task_failures
                .push(format!("transcoder reader failed: {}", e)),
        }
    }

    /// Ordered shutdown: end marker, transcoder termination, then every
    /// background task. Runs once; later calls return the first summary.
    ///
    /// The output flush and the termination request share one grace period.
    async fn teardown(&mut self, outbound: &mut Outbound) -> Teardown {
        if let Some(done) = &self.teardown {
            debug!("Teardown already ran");
            return done.clone();
        }

        let mut summary = Teardown::default();
        let grace = self.config.transcoder.grace_period();
        let deadline = Instant::now() + grace;

        // Transcoded audio still in flight must reach the queue before the marker.
        if let Some(process) = self.transcoder.as_mut() {
            process.close();
            if let Some(mut reader) = self.reader.take() {
                let flush = self.config.transcoder.flush_timeout().min(grace);
                match timeout(flush, &mut reader).await {
                    Ok(joined) => Self::record_reader(joined, &mut summary),
                    Err(_) => {
                        debug!("Transcoder output still open after flush timeout");
                        self.reader = Some(reader);
                    }
                }
            }
        }

        // 1. End marker
        self.producer.finish();

        // 2. Transcoder termination
        if let Some(process) = self.transcoder.as_mut() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match process.terminate(remaining).await {
                Ok(outcome) => summary.termination = Some(outcome),
                Err(e) => {
                    error!("Failed to terminate transcoder: {}", e);
                    summary.errors.push(e.to_string());
                }
            }
        }

        // 3. Background tasks; results produced meanwhile are still delivered
        while self.results_open {
            match self.results.recv().await {
                Some(result) => {
                    outbound.send_result(result).await;
                }
                None => self.results_open = false,
            }
        }

        if let Some(mut reader) = self.reader.take() {
            let abort = reader.abort_handle();
            match timeout(grace, &mut reader).await {
                Ok(joined) => Self::record_reader(joined, &mut summary),
                Err(_) => {
                    abort.abort();
                    summary
                        .task_failures
                        .push("transcoder reader did not stop after termination".to_string());
                }
            }
        }

        if let Some(bridge) = self.bridge.take() {
            let outcome = bridge.join().await;
            debug!(
                "Bridge finished: {} requests, {} results",
                outcome.requests, outcome.results
            );
            summary.errors.extend(outcome.error);
            summary.task_failures.extend(outcome.task_failures);
        }

        self.teardown = Some(summary.clone());
        summary
    }
}

/// Coordinator for one live transcription session
pub struct TranscriptionSession {
    config: SessionConfig,
    strategy: RecognitionStrategy,
    monitor: Arc<SessionMonitor>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl TranscriptionSession {
    pub fn new(config: SessionConfig, strategy: RecognitionStrategy) -> Self {
        let monitor = Arc::new(SessionMonitor::new(config.session_id.clone()));
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            strategy,
            monitor,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.session_id
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(Arc::clone(&self.monitor), Arc::clone(&self.shutdown))
    }

    /// Drive the session until it is `Closed`.
    ///
    /// The session ends when `inbound` ends or fails, sends `End`, or a stop
    /// is requested through a `SessionHandle`. `outbound` is dropped on
    /// return, which closes the client connection.
    pub async fn run<S>(self, inbound: S, outbound: mpsc::Sender<OutboundMessage>) -> SessionReport
    where
        S: Stream<Item = InboundEvent> + Unpin + Send,
    {
        let span = info_span!("session", session_id = %self.config.session_id);
        self.run_inner(inbound, outbound).instrument(span).await
    }

    fn advance(&self, machine: &mut StateMachine, next: SessionState) {
        if machine.advance(next) {
            self.monitor.set_state(machine.current());
        }
    }

    async fn run_inner<S>(
        self,
        mut inbound: S,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> SessionReport
    where
        S: Stream<Item = InboundEvent> + Unpin + Send,
    {
        info!(
            "Session accepted (transcode={}, recognizer={})",
            self.config.transcode,
            self.strategy.name()
        );

        let mut machine = StateMachine::default();
        let mut outbound = Outbound {
            tx: outbound,
            open: true,
            monitor: Arc::clone(&self.monitor),
        };

        let mut pipeline = match Pipeline::build(&self.config, self.strategy.clone(), &self.monitor) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("Failed to build session pipeline: {}", e);
                let message = e.to_string();
                outbound.send_error(&message).await;
                self.advance(&mut machine, SessionState::Errored);
                self.advance(&mut machine, SessionState::Closed);
                return self.report(
                    &machine,
                    EndReason::Failed,
                    Some(message),
                    Teardown::default(),
                    None,
                );
            }
        };

        self.advance(&mut machine, SessionState::Streaming);
        info!("Session streaming");

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut shutdown_live = true;
        let mut failure: Option<String> = None;

        let reason = if *shutdown_rx.borrow_and_update() {
            EndReason::Stopped
        } else {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed(), if shutdown_live => match changed {
                        Ok(()) if *shutdown_rx.borrow() => break EndReason::Stopped,
                        Ok(()) => {}
                        Err(_) => shutdown_live = false,
                    },
                    result = pipeline.results.recv(), if pipeline.results_open => match result {
                        Some(result) => {
                            if !outbound.send_result(result).await {
                                break EndReason::Disconnected;
                            }
                        }
                        None => {
                            pipeline.results_open = false;
                            if let Some(e) = pipeline.output_error().await {
                                failure = Some(e);
                                break EndReason::Failed;
                            }
                        }
                    },
                    event = inbound.next() => match event {
                        Some(InboundEvent::Chunk(data)) => {
                            self.monitor.record_chunk(data.len());
                            if let Err(e) = pipeline.accept(data) {
                                error!("Failed to forward inbound chunk: {}", e);
                                failure = Some(e.to_string());
                                break EndReason::Failed;
                            }
                        }
                        Some(InboundEvent::End) => break EndReason::ClientEnd,
                        Some(InboundEvent::Invalid(message)) => {
                            warn!("Rejected inbound frame: {}", message);
                            outbound.send_error(&message).await;
                        }
                        Some(InboundEvent::TransportError(e)) => {
                            warn!("{}", RelayError::Transport(e));
                            break EndReason::Disconnected;
                        }
                        None => break EndReason::Disconnected,
                    },
                }
            }
        };

        info!("Session streaming ended: {:?}", reason);

        match &failure {
            Some(message) => {
                self.advance(&mut machine, SessionState::Errored);
                outbound.send_error(message).await;
            }
            None => self.advance(&mut machine, SessionState::Draining),
        }

        let teardown = pipeline.teardown(&mut outbound).await;

        for failure in &teardown.task_failures {
            error!("Background task failure: {}", failure);
        }

        if failure.is_none() {
            if let Some(first) = teardown.errors.first() {
                error!("Session failed during drain: {}", first);
                outbound.send_error(first).await;
                failure = Some(first.clone());
            } else if let Some(first) = teardown.task_failures.first() {
                failure = Some(first.clone());
            }
        }
        if failure.is_some() {
            self.advance(&mut machine, SessionState::Errored);
        }

        self.advance(&mut machine, SessionState::Closed);

        let report = self.report(&machine, reason, failure, teardown, Some(&pipeline));
        info!(
            "Session closed (errored={}, chunks={}, results={})",
            report.errored, report.stats.chunks_received, report.stats.results_sent
        );
        report
    }

    fn report(
        &self,
        machine: &StateMachine,
        end_reason: EndReason,
        error: Option<String>,
        teardown: Teardown,
        pipeline: Option<&Pipeline>,
    ) -> SessionReport {
        let transcoder = pipeline.and_then(|p| p.transcoder.as_ref());
        SessionReport {
            session_id: self.config.session_id.clone(),
            final_state: machine.current(),
            history: machine.history().to_vec(),
            errored: machine.has_errored(),
            end_reason,
            error,
            stats: self.monitor.snapshot(),
            task_failures: teardown.task_failures,
            termination: teardown.termination,
            transcoder_chunks_written: transcoder.map(|t| t.chunks_written()).unwrap_or(0),
            transcoder_input_closes: transcoder.map(|t| t.input_closes()).unwrap_or(0),
            transcoder_forced_kills: transcoder.map(|t| t.forced_kills()).unwrap_or(0),
        }
    }
}
