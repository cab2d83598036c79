use super::{Recorder, RecorderCore};
use crate::config::StreamerOptions;
use crate::error::Result;
use crate::messages::{FrameBytes, RecorderEvent, RecorderState, TranscoderEvent};
use crate::transcoder::{GrabProfile, Transcoder};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::Span;

/// Continuous capture: the encoder grabs the X display itself.
///
/// Nothing flows through the recorder's frame buffer, so readable outputs
/// and frame events stay silent for this variant.
pub struct GrabRecorder {
    core: RecorderCore,
    transcoder: Transcoder<GrabProfile>,
}

impl GrabRecorder {
    pub fn new(options: Arc<StreamerOptions>, screen_id: u32, parent: &Span) -> Self {
        Self::with_profile(options, GrabProfile::new(screen_id), parent)
    }

    pub fn with_profile(options: Arc<StreamerOptions>, profile: GrabProfile, parent: &Span) -> Self {
        let core = RecorderCore::new(options.clone(), "grab", parent);
        let transcoder = Transcoder::new(options, profile, core.span());
        Self { core, transcoder }
    }

    pub fn transcoder(&self) -> &Transcoder<GrabProfile> {
        &self.transcoder
    }
}

#[async_trait]
impl Recorder for GrabRecorder {
    async fn start(&mut self) -> Result<()> {
        if !self.core.begin_start()? {
            return Ok(());
        }

        tracing::debug!(
            parent: self.core.span(),
            "Starting grab recorder on screen {}",
            self.transcoder.profile().screen_id()
        );
        self.transcoder.start(None).await?;
        self.core.set_state(RecorderState::Started);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.core.state() != RecorderState::Started {
            return Ok(());
        }

        tracing::debug!(parent: self.core.span(), "Stopping grab recorder");
        let result = self.transcoder.stop().await;
        self.core.set_state(RecorderState::Stopped);
        result
    }

    fn state(&self) -> RecorderState {
        self.core.state()
    }

    fn duration(&self) -> String {
        self.transcoder.duration()
    }

    fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.core.subscribe()
    }

    fn transcoder_events(&self) -> broadcast::Receiver<TranscoderEvent> {
        self.transcoder.subscribe()
    }

    fn create_readable_output(&self) -> broadcast::Receiver<FrameBytes> {
        self.core.create_readable_output()
    }
}
