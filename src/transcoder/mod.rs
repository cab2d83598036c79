//! Transcoder: drives one encoder session for a recorder.
//!
//! [`Transcoder`] holds the lifecycle bookkeeping shared by both capture
//! variants. What differs between them (input source, format, extra options,
//! how to stop) comes from a [`TranscoderProfile`].

mod grab;
mod screencast;

pub use grab::{GrabProfile, QUIT_GRACE, QUIT_KEY};
pub use screencast::ScreencastProfile;

use crate::config::{Output, StreamerOptions};
use crate::encoder::{EncoderCommand, EncoderInput, EncoderSession, FrameReader, SessionReporter, Timemark};
use crate::error::{Result, StreamerError};
use crate::messages::{TranscoderEvent, TranscoderState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::Span;

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";

const EVENT_CAPACITY: usize = 256;

/// Variant-specific half of a transcoder
pub trait TranscoderProfile: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn input(&self) -> EncoderInput;

    fn input_format(&self) -> &'static str;

    fn input_fps(&self, options: &StreamerOptions) -> u32 {
        options.fps
    }

    fn extra_output_options(&self) -> Vec<String>;

    /// Sizing, codec and input tuning for this variant
    fn prepare(&self, command: &mut EncoderCommand, options: &StreamerOptions);

    /// Keystroke asking the encoder to finish by itself, and how long to give
    /// it before input is closed regardless
    fn graceful_quit(&self) -> Option<(&'static [u8], Duration)> {
        None
    }
}

pub struct Transcoder<P> {
    options: Arc<StreamerOptions>,
    profile: P,
    session: Option<EncoderSession>,
    reporter: SessionReporter,
    span: Span,
}

impl<P: TranscoderProfile> Transcoder<P> {
    pub fn new(options: Arc<StreamerOptions>, profile: P, parent: &Span) -> Self {
        let span = tracing::debug_span!(parent: parent, "transcoder", profile = profile.name());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let reporter = SessionReporter {
            events,
            duration: Arc::new(watch::Sender::new(Timemark::default())),
            state: Arc::new(watch::Sender::new(TranscoderState::NotStarted)),
        };

        Self {
            options,
            profile,
            session: None,
            reporter,
            span,
        }
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    pub fn state(&self) -> TranscoderState {
        *self.reporter.state.borrow()
    }

    pub fn started(&self) -> bool {
        self.state() == TranscoderState::Running
    }

    /// Encoded time so far, `HH:MM:SS.cc`
    pub fn duration(&self) -> String {
        self.reporter.duration.borrow().to_string()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TranscoderEvent> {
        self.reporter.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<TranscoderState> {
        self.reporter.state.subscribe()
    }

    /// Launch the encoder. `input` feeds stdin for piped variants.
    ///
    /// No-op while running. A transcoder cannot be restarted once ended.
    pub async fn start(&mut self, input: Option<FrameReader>) -> Result<()> {
        match self.state() {
            TranscoderState::Running => return Ok(()),
            TranscoderState::Ended => {
                return Err(StreamerError::Spent {
                    component: "transcoder",
                });
            }
            TranscoderState::NotStarted => {}
        }

        tracing::debug!(parent: &self.span, "Starting transcoding");
        let command = self.build_command()?;

        self.reporter.state.send_replace(TranscoderState::Running);
        match EncoderSession::spawn(&command, input, self.reporter.clone(), &self.span) {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                tracing::error!(parent: &self.span, "Failed to launch encoder: {}", e);
                self.reporter.state.send_replace(TranscoderState::Ended);
                let _ = self.reporter.events.send(TranscoderEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Close the encoder input, then wait for the process to finish.
    ///
    /// No-op when nothing was started or the session was already torn down.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        tracing::debug!(parent: &self.span, "Stopping transcoding");
        if let Some((keys, grace)) = self.profile.graceful_quit() {
            tracing::debug!(parent: &self.span, "Asking encoder to quit");
            if let Err(e) = session.send_keystroke(keys) {
                tracing::warn!(parent: &self.span, "Failed to send quit to encoder: {}", e);
            }
            // The process may ignore the request; teardown proceeds after the grace period
            tokio::time::sleep(grace).await;
        }

        session.finish().await?.into_result()
    }

    pub(crate) fn build_command(&self) -> Result<EncoderCommand> {
        let options = &self.options;

        let mut command = EncoderCommand::new(options.encoder_binary());
        if let Some(path) = &options.ffmpeg_path {
            tracing::debug!(parent: &self.span, "Using ffmpeg from {}", path.display());
        }

        command
            .input(self.profile.input())
            .input_format(self.profile.input_format())
            .input_fps(self.profile.input_fps(options));
        self.profile.prepare(&mut command, options);
        command
            .output_options(self.profile.extra_output_options())
            .output_options(["-threads".to_string(), options.threads.to_string()]);

        match &options.output {
            Output::Custom(modifier) => {
                tracing::debug!(parent: &self.span, "Using custom output function");
                modifier(&mut command)?;
            }
            Output::File(output) => {
                command.output_format(output.format.as_str()).output(&output.path);
            }
        }

        // A modifier may leave the command without a destination
        command.build()?;
        Ok(command)
    }
}
