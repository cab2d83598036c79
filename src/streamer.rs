use crate::config::{RecorderKind, StreamerOptions};
use crate::error::Result;
use crate::messages::{FrameBytes, RecorderEvent, StreamerEvent, TranscoderEvent};
use crate::page::PageController;
use crate::recorder::{GrabRecorder, Recorder, ScreencastRecorder};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::Span;

const EVENT_CAPACITY: usize = 16;

/// Records a driven page into a video file.
///
/// Owns exactly one recorder, picked from [`StreamerOptions::recorder`] at
/// construction. A streamer records once: after `stop()` a new one is needed.
pub struct Streamer {
    page: Arc<dyn PageController>,
    options: Arc<StreamerOptions>,
    recorder: Box<dyn Recorder>,
    events: broadcast::Sender<StreamerEvent>,
    span: Span,
}

impl Streamer {
    pub fn new(page: Arc<dyn PageController>, options: StreamerOptions) -> Result<Self> {
        Self::with_span(page, options, tracing::info_span!("streamer"))
    }

    /// Like [`Streamer::new`], logging under the given span
    pub fn with_span(
        page: Arc<dyn PageController>,
        options: StreamerOptions,
        span: Span,
    ) -> Result<Self> {
        options.validate()?;
        let options = Arc::new(options);

        let recorder: Box<dyn Recorder> = match options.recorder {
            RecorderKind::Screencast => Box::new(ScreencastRecorder::new(
                page.clone(),
                options.clone(),
                &span,
            )),
            RecorderKind::Grab => {
                let screen_id = options.resolved_screen_id();
                tracing::debug!(parent: &span, "Grabbing display :{}", screen_id);
                Box::new(GrabRecorder::new(options.clone(), screen_id, &span))
            }
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            page,
            options,
            recorder,
            events,
            span,
        })
    }

    pub fn options(&self) -> &StreamerOptions {
        &self.options
    }

    pub fn started(&self) -> bool {
        self.recorder.started()
    }

    /// Encoded time so far, `HH:MM:SS.cc`
    pub fn duration(&self) -> String {
        self.recorder.duration()
    }

    /// Size the page to the output frame, then start recording.
    /// No-op when already started.
    pub async fn start(&mut self) -> Result<()> {
        if self.recorder.started() {
            return Ok(());
        }

        tracing::info!(parent: &self.span, "Starting {:?} recording", self.options.recorder);
        self.page.set_viewport(self.options.frame_size.into()).await?;
        self.recorder.start().await?;

        let _ = self.events.send(StreamerEvent::Start);
        Ok(())
    }

    /// Stop recording. Returns once the output file is finalized.
    /// No-op unless started.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.recorder.started() {
            return Ok(());
        }

        tracing::info!(parent: &self.span, "Stopping recording at {}", self.duration());
        self.recorder.stop().await?;

        let _ = self.events.send(StreamerEvent::Stop);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamerEvent> {
        self.events.subscribe()
    }

    pub fn recorder_events(&self) -> broadcast::Receiver<RecorderEvent> {
        self.recorder.subscribe()
    }

    pub fn transcoder_events(&self) -> broadcast::Receiver<TranscoderEvent> {
        self.recorder.transcoder_events()
    }

    pub fn create_readable_output(&self) -> broadcast::Receiver<FrameBytes> {
        self.recorder.create_readable_output()
    }
}
