//! Recorders own the capture side of the pipeline and the transcoder it feeds.
//!
//! * `resampler`: last-frame-wins mailbox and the fixed-rate writer task.
//! * `screencast`: frames pushed by the automation protocol, piped to the encoder.
//! * `grab`: the encoder captures the display itself; the recorder only
//!   manages lifecycle.

mod grab;
mod resampler;
mod screencast;

pub use grab::GrabRecorder;
pub(crate) use resampler::{CapturedFrame, ResamplerHandle, spawn_resampler};
pub use screencast::ScreencastRecorder;

use crate::config::StreamerOptions;
use crate::encoder::FrameReader;
use crate::error::{Result, StreamerError};
use crate::messages::{FrameBytes, RecorderEvent, RecorderState, TranscoderEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::Span;

/// Write end of a recorder's frame buffer
pub type FrameWriter = mpsc::Sender<FrameBytes>;

/// Frames buffered between the resampler and the encoder's stdin
pub const FRAME_BUFFER_CAPACITY: usize = 64;

const EVENT_CAPACITY: usize = 256;

pub fn frame_buffer() -> (FrameWriter, FrameReader) {
    mpsc::channel(FRAME_BUFFER_CAPACITY)
}

/// Capture source plus the transcoder it feeds
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Start capturing and encoding. No-op when already started.
    async fn start(&mut self) -> Result<()>;

    /// Stop capturing and wait for the encoder to finalize its output.
    /// No-op unless started.
    async fn stop(&mut self) -> Result<()>;

    fn state(&self) -> RecorderState;

    fn started(&self) -> bool {
        self.state() == RecorderState::Started
    }

    /// Encoded time so far, `HH:MM:SS.cc`
    fn duration(&self) -> String;

    fn subscribe(&self) -> broadcast::Receiver<RecorderEvent>;

    fn transcoder_events(&self) -> broadcast::Receiver<TranscoderEvent>;

    /// Read-only view of every chunk written to the encoder input. A reader
    /// that falls behind loses chunks; the encoder path is unaffected.
    fn create_readable_output(&self) -> broadcast::Receiver<FrameBytes>;
}

/// Lifecycle bookkeeping shared by both recorder variants
pub struct RecorderCore {
    options: Arc<StreamerOptions>,
    state: watch::Sender<RecorderState>,
    events: broadcast::Sender<RecorderEvent>,
    tap: broadcast::Sender<FrameBytes>,
    span: Span,
}

impl RecorderCore {
    pub fn new(options: Arc<StreamerOptions>, kind: &'static str, parent: &Span) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (tap, _) = broadcast::channel(FRAME_BUFFER_CAPACITY);

        Self {
            options,
            state: watch::Sender::new(RecorderState::Idle),
            events,
            tap,
            span: tracing::debug_span!(parent: parent, "recorder", kind),
        }
    }

    pub fn options(&self) -> &Arc<StreamerOptions> {
        &self.options
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn state(&self) -> RecorderState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RecorderState> {
        self.state.subscribe()
    }

    pub fn set_state(&self, state: RecorderState) {
        tracing::debug!(parent: &self.span, "Recorder state: {:?}", state);
        self.state.send_replace(state);
    }

    /// Whether `start()` should proceed. `Ok(false)` when already started.
    pub fn begin_start(&self) -> Result<bool> {
        match self.state() {
            RecorderState::Idle => Ok(true),
            RecorderState::Started => Ok(false),
            RecorderState::Stopped => Err(StreamerError::Spent {
                component: "recorder",
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    pub fn create_readable_output(&self) -> broadcast::Receiver<FrameBytes> {
        tracing::debug!(parent: &self.span, "Creating readable output");
        self.tap.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<RecorderEvent> {
        self.events.clone()
    }

    pub(crate) fn tap_sender(&self) -> broadcast::Sender<FrameBytes> {
        self.tap.clone()
    }
}
