// Transcoder process adapter
//
// Wraps an external transcoding process (ffmpeg by default) that reads
// compressed media on stdin and writes mono s16le PCM on stdout. The
// adapter owns the child for the lifetime of one session:
// - stdin is owned by a writer task fed through a bounded queue, so callers
//   never wait on the pipe itself (`write` / `try_write` / `close`)
// - stdout is handed out once as a `TranscoderOutput`
// - stderr is drained by a background task so the child never blocks on it
// - `terminate` escalates from a termination request to a forced kill

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};

/// Configuration for the external transcoder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Program to launch (default: "ffmpeg")
    pub program: String,

    /// Full argument list override. When unset, ffmpeg arguments are
    /// derived from `sample_rate` and `channels`.
    pub args: Option<Vec<String>>,

    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count
    pub channels: u16,

    /// Bytes requested per read from the transcoder's stdout
    pub read_chunk_size: usize,

    /// Chunks that may wait for the transcoder's stdin before writes are
    /// refused
    pub input_backlog: usize,

    /// How long to wait for exit after a termination request before killing
    pub grace_period_ms: u64,

    /// How long to wait for output EOF after input is closed
    pub flush_timeout_ms: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            args: None,
            sample_rate: 48000,
            channels: 1,
            read_chunk_size: 4096,
            input_backlog: 64,
            grace_period_ms: 5000,
            flush_timeout_ms: 1000,
        }
    }
}

impl TranscoderConfig {
    pub fn command_args(&self) -> Vec<String> {
        if let Some(args) = &self.args {
            return args.clone();
        }

        vec![
            "-loglevel".to_string(),
            "warning".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "pipe:1".to_string(),
        ]
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

/// How the transcoder process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationOutcome {
    pub status: ExitStatus,
    /// True when the grace period ran out and the process was killed
    pub forced: bool,
}

/// Handle to a running transcoder process
pub struct TranscoderProcess {
    child: Child,
    input: Option<mpsc::Sender<Bytes>>,
    writer_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    outcome: Option<TerminationOutcome>,
    input_closes: usize,
    forced_kills: usize,
    chunks_written: Arc<AtomicUsize>,
}

/// Byte source reading transcoded output
pub struct TranscoderOutput {
    stdout: ChildStdout,
    chunk_size: usize,
}

impl TranscoderOutput {
    /// Read the next piece of output. `None` means EOF.
    pub async fn read(&mut self) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = self.stdout.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }
}

/// Copy queued chunks into stdin until the queue closes or the pipe breaks.
/// Dropping stdin on return is what signals EOF to the process.
fn spawn_writer(
    mut stdin: ChildStdin,
    mut queue: mpsc::Receiver<Bytes>,
    chunks_written: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(data) = queue.recv().await {
            let written = match stdin.write_all(&data).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => {
                    chunks_written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("Transcoder input broken: {}", e);
                    return;
                }
                Err(e) => {
                    warn!("Transcoder input write failed: {}", e);
                    return;
                }
            }
        }
        debug!("Transcoder input writer finished");
    })
}

impl TranscoderProcess {
    /// Launch the transcoder with piped stdin/stdout/stderr.
    pub fn start(config: &TranscoderConfig) -> Result<(Self, TranscoderOutput)> {
        let args = config.command_args();
        info!("Starting transcoder: {} {}", config.program, args.join(" "));

        let mut child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RelayError::Process(format!("failed to start {}: {}", config.program, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RelayError::Process("transcoder stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RelayError::Process("transcoder stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RelayError::Process("transcoder stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => warn!("Transcoder stderr: {}", line.trim()),
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Transcoder stderr read failed: {}", e);
                        break;
                    }
                }
            }
            debug!("Transcoder stderr drained");
        });

        let chunks_written = Arc::new(AtomicUsize::new(0));
        let (input, queue) = mpsc::channel(config.input_backlog.max(1));
        let writer_task = spawn_writer(stdin, queue, Arc::clone(&chunks_written));

        info!("Transcoder started (pid={:?})", child.id());

        Ok((
            Self {
                child,
                input: Some(input),
                writer_task: Some(writer_task),
                stderr_task: Some(stderr_task),
                outcome: None,
                input_closes: 0,
                forced_kills: 0,
                chunks_written,
            },
            TranscoderOutput {
                stdout,
                chunk_size: config.read_chunk_size.max(1),
            },
        ))
    }

    fn input(&mut self) -> Result<&mpsc::Sender<Bytes>> {
        if let Some(status) = self.child.try_wait()? {
            return Err(RelayError::ProcessUnavailable(format!(
                "transcoder exited with {}",
                status
            )));
        }

        self.input.as_ref().ok_or_else(|| {
            RelayError::ProcessUnavailable("transcoder input already closed".to_string())
        })
    }

    /// Feed bytes to the transcoder's input, waiting for queue space.
    ///
    /// Fails with `ProcessUnavailable` once the process has exited, the
    /// input has been closed, or the pipe has broken.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let input = self.input()?;
        input
            .send(Bytes::copy_from_slice(data))
            .await
            .map_err(|_| RelayError::ProcessUnavailable("transcoder input broken".to_string()))
    }

    /// Queue bytes for the transcoder's input without waiting.
    ///
    /// A full queue means the process has stopped reading; that is a
    /// `Process` error rather than something to wait out.
    pub fn try_write(&mut self, data: Bytes) -> Result<()> {
        let input = self.input()?;
        match input.try_send(data) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RelayError::Process(format!(
                "transcoder stopped reading input ({} chunks queued)",
                input.max_capacity()
            ))),
            Err(TrySendError::Closed(_)) => Err(RelayError::ProcessUnavailable(
                "transcoder input broken".to_string(),
            )),
        }
    }

    /// Close the input sink so the process can flush and exit.
    ///
    /// Chunks already queued are still written before EOF. Does not wait for
    /// the exit. Returns `true` if this call closed it.
    pub fn close(&mut self) -> bool {
        match self.input.take() {
            Some(input) => {
                drop(input);
                self.input_closes += 1;
                debug!("Transcoder input closed");
                true
            }
            None => false,
        }
    }

    /// Stop the process: close input, request termination, and kill it if it
    /// is still running after `grace`.
    ///
    /// Repeated calls return the first outcome without signalling again.
    pub async fn terminate(&mut self, grace: Duration) -> Result<TerminationOutcome> {
        if let Some(outcome) = self.outcome {
            debug!("Transcoder already terminated");
            return Ok(outcome);
        }

        self.close();

        let outcome = match self.child.try_wait()? {
            Some(status) => TerminationOutcome {
                status,
                forced: false,
            },
            None => {
                self.request_termination();
                match tokio::time::timeout(grace, self.child.wait()).await {
                    Ok(status) => TerminationOutcome {
                        status: status?,
                        forced: false,
                    },
                    Err(_) => {
                        warn!(
                            "Transcoder did not exit within {:?}, killing it",
                            grace
                        );
                        self.child.start_kill()?;
                        self.forced_kills += 1;
                        TerminationOutcome {
                            status: self.child.wait().await?,
                            forced: true,
                        }
                    }
                }
            }
        };

        self.outcome = Some(outcome);
        info!(
            "Transcoder terminated with {} (forced={})",
            outcome.status, outcome.forced
        );

        for (name, task) in [
            ("input writer", self.writer_task.take()),
            ("stderr drain", self.stderr_task.take()),
        ] {
            let Some(task) = task else { continue };
            let abort = task.abort_handle();
            match tokio::time::timeout(grace, task).await {
                Ok(Err(e)) if e.is_panic() => error!("Transcoder {} panicked: {}", name, e),
                Ok(_) => {}
                Err(_) => {
                    warn!("Transcoder {} still running after exit, aborting it", name);
                    abort.abort();
                }
            }
        }

        Ok(outcome)
    }

    #[cfg(unix)]
    fn request_termination(&self) {
        if let Some(pid) = self.child.id() {
            debug!("Sending SIGTERM to transcoder (pid={})", pid);
            // SAFETY: plain signal delivery to our own child's pid.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    #[cfg(not(unix))]
    fn request_termination(&self) {
        // Closing stdin is the only termination request available here.
    }

    pub fn is_input_closed(&self) -> bool {
        self.input.is_none()
    }

    /// How many times the input sink has been closed (0 or 1)
    pub fn input_closes(&self) -> usize {
        self.input_closes
    }

    pub fn forced_kills(&self) -> usize {
        self.forced_kills
    }

    /// Chunks the writer task has delivered to stdin
    pub fn chunks_written(&self) -> usize {
        self.chunks_written.load(Ordering::Relaxed)
    }
}

/// Run a whole buffer through a fresh transcoder and collect the output.
///
/// Input and output are pumped concurrently so a full stdout pipe cannot
/// stall the writer.
pub async fn transcode_all(config: &TranscoderConfig, input: &[u8]) -> Result<Vec<u8>> {
    let (mut process, mut output) = TranscoderProcess::start(config)?;

    let writer = async {
        let result = process.write(input).await;
        process.close();
        result
    };

    let reader = async {
        let mut pcm = Vec::new();
        while let Some(piece) = output.read().await? {
            pcm.extend_from_slice(&piece);
        }
        Ok::<_, RelayError>(pcm)
    };

    let (written, read) = tokio::join!(writer, reader);
    let outcome = process.terminate(config.grace_period()).await?;

    written?;
    let pcm = read?;

    if pcm.is_empty() {
        return Err(RelayError::Process(format!(
            "transcoder produced no audio (exit {})",
            outcome.status
        )));
    }

    Ok(pcm)
}
