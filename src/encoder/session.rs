//! One run of the external encoder process.
//!
//! The session owns the child process and three helper tasks:
//! - `pump_input` copies frames from the frame buffer into stdin
//! - `monitor_stderr` turns status lines into progress updates
//! - the waiter reaps the process and resolves the completion signal once
//!
//! Dropping a session that has not finished kills the process.
//!
//! A piped encoder that exits non-zero counts as completed only when its
//! input was closed on request and the pump never had anything to write
//! (ffmpeg refuses to finalize an empty image sequence). Every other
//! non-zero exit is a failure.

use super::command::{EncoderCommand, EncoderInput};
use super::progress::{self, Timemark};
use crate::error::{Result, StreamerError};
use crate::messages::{FrameBytes, TranscoderEvent, TranscoderState};
use std::collections::VecDeque;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, Command};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Span;

const STDERR_TAIL_LINES: usize = 20;

/// Read end of a recorder's frame buffer
pub type FrameReader = mpsc::Receiver<FrameBytes>;

/// Where a session publishes what it observes. Owned by the transcoder, so
/// duration and state stay readable after the session is gone.
#[derive(Clone)]
pub struct SessionReporter {
    pub events: broadcast::Sender<TranscoderEvent>,
    pub duration: Arc<watch::Sender<Timemark>>,
    pub state: Arc<watch::Sender<TranscoderState>>,
}

impl SessionReporter {
    fn emit(&self, event: TranscoderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn finish(&self, outcome: &SessionOutcome, span: &Span) {
        self.state.send_replace(TranscoderState::Ended);
        match outcome {
            SessionOutcome::Completed => {
                tracing::debug!(parent: span, "Transcoding ended");
                self.emit(TranscoderEvent::End);
            }
            SessionOutcome::Failed { status, stderr } => {
                tracing::error!(parent: span, "Encoder exited with {}: {}", status, stderr);
                self.emit(TranscoderEvent::Error {
                    message: format!("encoder exited with {status}: {stderr}"),
                });
            }
        }
    }
}

/// How the process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Failed { status: String, stderr: String },
}

impl SessionOutcome {
    pub fn into_result(self) -> Result<()> {
        match self {
            SessionOutcome::Completed => Ok(()),
            SessionOutcome::Failed { status, stderr } => {
                Err(StreamerError::EncoderExited { status, stderr })
            }
        }
    }
}

/// What happened on the input side, read by the waiter to classify the exit
#[derive(Default)]
struct InputProgress {
    /// Frames or keystrokes the pump tried to write
    writes_attempted: AtomicU64,
    close_requested: AtomicBool,
}

impl InputProgress {
    fn attempt_write(&self) {
        self.writes_attempted.fetch_add(1, Ordering::SeqCst);
    }

    fn nothing_attempted(&self) -> bool {
        self.writes_attempted.load(Ordering::SeqCst) == 0
    }

    fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }
}

enum InputControl {
    Keystroke(&'static [u8]),
    Close,
}

enum PumpStep {
    Control(Option<InputControl>),
    Frame(Option<FrameBytes>),
}

pub struct EncoderSession {
    control: mpsc::UnboundedSender<InputControl>,
    pump: Option<JoinHandle<io::Result<()>>>,
    waiter: Option<JoinHandle<()>>,
    completion: Option<oneshot::Receiver<SessionOutcome>>,
    outcome: Option<SessionOutcome>,
    input: Arc<InputProgress>,
    span: Span,
}

impl EncoderSession {
    /// Launch the encoder described by `command`.
    ///
    /// `input` is drained into stdin when given. Stdin is piped either way so
    /// keystroke commands can reach the process.
    pub fn spawn(
        command: &EncoderCommand,
        input: Option<FrameReader>,
        reporter: SessionReporter,
        parent: &Span,
    ) -> Result<Self> {
        let args = command.build()?;
        let command_line = command.command_line()?;
        let expects_input = command.input_source().is_some_and(EncoderInput::is_pipe);

        let mut child = Command::new(command.binary())
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StreamerError::Spawn {
                binary: command.binary().to_string_lossy().to_string(),
                source,
            })?;

        let pid = child.id();
        let span = tracing::debug_span!(parent: parent, "encoder", pid = pid.unwrap_or_default());

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("encoder stdin was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("encoder stderr was not captured"))?;

        tracing::debug!(parent: &span, "Started encoder with command: {}", command_line);
        reporter.emit(TranscoderEvent::Start { command_line });

        let progress = Arc::new(InputProgress::default());
        let (control, control_rx) = mpsc::unbounded_channel();
        let (pumped_tx, pumped_rx) = oneshot::channel::<()>();
        let pump = tokio::spawn({
            let pump = pump_input(stdin, input, control_rx, progress.clone(), span.clone());
            async move {
                let result = pump.await;
                let _ = pumped_tx.send(());
                result
            }
        });
        let monitor = tokio::spawn(monitor_stderr(stderr, reporter.clone(), span.clone()));

        let (done_tx, done_rx) = oneshot::channel();
        let waiter = tokio::spawn({
            let progress = progress.clone();
            let span = span.clone();
            async move {
                let status = child.wait().await;
                // Sampled at exit: a process that died before input was
                // closed never counts as an empty run
                let closed_by_request = progress.close_requested();
                let stderr_tail = monitor.await.unwrap_or_default().join("\n");
                let empty_run = expects_input
                    && closed_by_request
                    && pumped_rx.await.is_ok()
                    && progress.nothing_attempted();

                let outcome = match status {
                    Ok(status) if status.success() => SessionOutcome::Completed,
                    Ok(status) if empty_run => {
                        tracing::warn!(
                            parent: &span,
                            "Encoder exited with {} without receiving any frames",
                            status
                        );
                        SessionOutcome::Completed
                    }
                    Ok(status) => SessionOutcome::Failed {
                        status: status.to_string(),
                        stderr: stderr_tail,
                    },
                    Err(e) => SessionOutcome::Failed {
                        status: format!("unknown status ({e})"),
                        stderr: stderr_tail,
                    },
                };

                reporter.finish(&outcome, &span);
                let _ = done_tx.send(outcome);
            }
        });

        Ok(Self {
            control,
            pump: Some(pump),
            waiter: Some(waiter),
            completion: Some(done_rx),
            outcome: None,
            input: progress,
            span,
        })
    }

    /// Queue raw bytes for stdin, ahead of any pending frames
    pub fn send_keystroke(&self, keys: &'static [u8]) -> Result<()> {
        self.control
            .send(InputControl::Keystroke(keys))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "encoder input is closed").into())
    }

    /// Signal end-of-input: flush pending frames, then close stdin.
    pub async fn close_input(&mut self) {
        let Some(pump) = self.pump.take() else {
            return;
        };

        self.input.close_requested.store(true, Ordering::SeqCst);
        let _ = self.control.send(InputControl::Close);
        match pump.await {
            Ok(Ok(())) => tracing::debug!(parent: &self.span, "Encoder input closed"),
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(parent: &self.span, "Encoder stopped reading input: {}", e)
            }
            Ok(Err(e)) => tracing::warn!(parent: &self.span, "Failed to write encoder input: {}", e),
            Err(e) => tracing::warn!(parent: &self.span, "Input pump task failed: {}", e),
        }
    }

    /// Wait for the process to exit. Never returns while a piped encoder
    /// still has its input open; see [`EncoderSession::finish`].
    pub async fn wait(&mut self) -> Result<SessionOutcome> {
        if let Some(outcome) = &self.outcome {
            return Ok(outcome.clone());
        }

        let completion = self
            .completion
            .as_mut()
            .ok_or(StreamerError::CompletionLost)?;
        let outcome = completion
            .await
            .map_err(|_| StreamerError::CompletionLost)?;

        self.completion = None;
        self.waiter = None;
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Close input, then wait for exit.
    pub async fn finish(mut self) -> Result<SessionOutcome> {
        self.close_input().await;
        self.wait().await
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(waiter) = self.waiter.take() {
            if !waiter.is_finished() {
                tracing::warn!(parent: &self.span, "Encoder session dropped while running, killing process");
            }
            waiter.abort();
        }
    }
}

async fn next_frame(input: &mut Option<FrameReader>) -> Option<FrameBytes> {
    match input {
        Some(reader) => reader.recv().await,
        None => std::future::pending().await,
    }
}

async fn pump_input(
    mut stdin: ChildStdin,
    mut input: Option<FrameReader>,
    mut control: mpsc::UnboundedReceiver<InputControl>,
    progress: Arc<InputProgress>,
    span: Span,
) -> io::Result<()> {
    loop {
        let step = tokio::select! {
            biased;
            ctrl = control.recv() => PumpStep::Control(ctrl),
            frame = next_frame(&mut input) => PumpStep::Frame(frame),
        };

        match step {
            PumpStep::Control(Some(InputControl::Keystroke(keys))) => {
                progress.attempt_write();
                stdin.write_all(keys).await?;
                stdin.flush().await?;
            }
            PumpStep::Control(Some(InputControl::Close) | None) => break,
            PumpStep::Frame(Some(frame)) => {
                progress.attempt_write();
                stdin.write_all(&frame).await?;
            }
            PumpStep::Frame(None) => {
                tracing::debug!(parent: &span, "Frame buffer closed by its writer");
                input = None;
            }
        }
    }

    // Frames already buffered still belong to the output
    if let Some(mut reader) = input {
        reader.close();
        while let Some(frame) = reader.recv().await {
            progress.attempt_write();
            stdin.write_all(&frame).await?;
        }
    }

    stdin.shutdown().await?;
    Ok(())
}

async fn monitor_stderr(stderr: ChildStderr, reporter: SessionReporter, span: Span) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    // Status lines end in '\r', everything else in '\n'
    let mut segments = BufReader::new(stderr).split(b'\r');

    loop {
        let segment = match segments.next_segment().await {
            Ok(Some(segment)) => segment,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(parent: &span, "Stopped reading encoder stderr: {}", e);
                break;
            }
        };

        for line in String::from_utf8_lossy(&segment).lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(mark) = progress::parse_progress(line) {
                let timemark = mark.to_string();
                if reporter
                    .duration
                    .send_if_modified(|current| progress::advance(current, mark))
                {
                    tracing::trace!(parent: &span, "Transcoding progress: {}", timemark);
                    reporter.emit(TranscoderEvent::Progress { timemark });
                }
                continue;
            }

            tracing::debug!(parent: &span, "ffmpeg: {}", line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    }

    tail.into_iter().collect()
}
