//! Screencast capture: the page pushes JPEG frames over its protocol session,
//! the recorder resamples them to a constant rate and pipes them to the
//! encoder.

use super::{
    CapturedFrame, FrameWriter, Recorder, RecorderCore, ResamplerHandle, frame_buffer,
    spawn_resampler,
};
use crate::config::StreamerOptions;
use crate::error::Result;
use crate::messages::{FrameBytes, RecorderEvent, RecorderState, TranscoderEvent};
use crate::page::{PageController, ScreencastFeed, ScreencastFrame, ScreencastParams};
use crate::transcoder::{ScreencastProfile, Transcoder};
use async_trait::async_trait;
use base64::prelude::*;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::Span;

/// Live capture state, present between start and stop
struct Capture {
    feed: Arc<dyn ScreencastFeed>,
    resampler: Option<ResamplerHandle>,
    admission: JoinHandle<()>,
}

pub struct ScreencastRecorder {
    core: RecorderCore,
    page: Arc<dyn PageController>,
    transcoder: Transcoder<ScreencastProfile>,
    capture: Option<Capture>,
}

impl ScreencastRecorder {
    pub fn new(page: Arc<dyn PageController>, options: Arc<StreamerOptions>, parent: &Span) -> Self {
        let core = RecorderCore::new(options.clone(), "screencast", parent);
        let transcoder = Transcoder::new(options, ScreencastProfile, core.span());

        Self {
            core,
            page,
            transcoder,
            capture: None,
        }
    }

    pub fn transcoder(&self) -> &Transcoder<ScreencastProfile> {
        &self.transcoder
    }

    async fn open_capture(&self, writer: FrameWriter) -> Result<Capture> {
        let feed = self.page.create_screencast_feed().await?;
        let frames = match feed.frames().await {
            Ok(frames) => frames,
            Err(e) => {
                if let Err(e) = feed.detach().await {
                    tracing::warn!(parent: self.core.span(), "Failed to detach screencast session: {}", e);
                }
                return Err(e);
            }
        };

        let (mailbox, latest) = watch::channel(None);
        let resampler = spawn_resampler(
            self.core.options().frame_interval(),
            latest,
            writer,
            self.core.tap_sender(),
            self.core.event_sender(),
            self.core.span().clone(),
        );
        let admission = tokio::spawn(admit_frames(
            frames,
            feed.clone(),
            mailbox,
            self.core.watch_state(),
            self.core.span().clone(),
        ));

        Ok(Capture {
            feed,
            resampler: Some(resampler),
            admission,
        })
    }

    /// Stop writing frames, finalize the encoder, then release the page
    /// session. Leaves the recorder stopped whatever fails.
    async fn teardown(&mut self) -> Result<()> {
        let mut capture = self.capture.take();

        if let Some(capture) = capture.as_mut() {
            if let Some(resampler) = capture.resampler.take() {
                resampler.cancel().await;
            }
            capture.admission.abort();
            let _ = (&mut capture.admission).await;
        }

        let result = self.transcoder.stop().await;

        if let Some(capture) = capture {
            if let Err(e) = capture.feed.stop_screencast().await {
                tracing::warn!(parent: self.core.span(), "Failed to stop screencast: {}", e);
            }
            if let Err(e) = capture.feed.detach().await {
                tracing::warn!(parent: self.core.span(), "Failed to detach screencast session: {}", e);
            }
        }

        self.core.set_state(RecorderState::Stopped);
        result
    }
}

#[async_trait]
impl Recorder for ScreencastRecorder {
    async fn start(&mut self) -> Result<()> {
        if !self.core.begin_start()? {
            return Ok(());
        }

        tracing::debug!(parent: self.core.span(), "Starting screencast recorder");
        let (writer, reader) = frame_buffer();
        // The encoder launches while the recorder is still Idle; it only
        // reports Started once capture is wired. Any failure from here on
        // tears down to Stopped.
        self.transcoder.start(Some(reader)).await?;

        let capture = match self.open_capture(writer).await {
            Ok(capture) => capture,
            Err(e) => {
                tracing::error!(parent: self.core.span(), "Failed to open screencast session: {}", e);
                if let Err(e) = self.teardown().await {
                    tracing::warn!(parent: self.core.span(), "Encoder did not shut down cleanly: {}", e);
                }
                return Err(e);
            }
        };
        let feed = capture.feed.clone();
        self.capture = Some(capture);

        // Frames are admitted only once started, so the state flips before
        // the first frame can arrive
        self.core.set_state(RecorderState::Started);

        let params = ScreencastParams::for_frame_size(self.core.options().frame_size);
        if let Err(e) = feed.start_screencast(&params).await {
            tracing::error!(parent: self.core.span(), "Failed to start screencast: {}", e);
            if let Err(e) = self.teardown().await {
                tracing::warn!(parent: self.core.span(), "Encoder did not shut down cleanly: {}", e);
            }
            return Err(e);
        }

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.core.state() != RecorderState::Started {
            return Ok(());
        }

        tracing::debug!(parent: self.core.span(), "Stopping screencast recorder");
        self.teardown().await
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

/// Accept frames from the feed into the mailbox.
///
/// Frames are discarded unacknowledged while the recorder is not started or
/// when they carry no usable timestamp. Accepted frames are acknowledged
/// right away so the feed can send the next one.
pub(crate) async fn admit_frames(
    mut frames: BoxStream<'static, ScreencastFrame>,
    feed: Arc<dyn ScreencastFeed>,
    mailbox: watch::Sender<Option<CapturedFrame>>,
    state: watch::Receiver<RecorderState>,
    span: Span,
) {
    let mut sequence = 0u64;

    while let Some(frame) = frames.next().await {
        let started = *state.borrow() == RecorderState::Started;
        let timestamp = match frame.timestamp() {
            Some(timestamp) if started => timestamp,
            _ => {
                tracing::trace!(parent: &span, "Ignoring frame {}", frame.session_id);
                continue;
            }
        };

        if let Err(e) = feed.ack(frame.session_id).await {
            tracing::warn!(parent: &span, "Failed to acknowledge frame {}: {}", frame.session_id, e);
        }

        match BASE64_STANDARD.decode(frame.data.as_bytes()) {
            Ok(payload) => {
                mailbox.send_replace(Some(CapturedFrame {
                    payload: payload.into(),
                    timestamp,
                    sequence,
                }));
                sequence += 1;
            }
            Err(e) => {
                tracing::warn!(parent: &span, "Dropping undecodable frame {}: {}", frame.session_id, e);
            }
        }
    }

    tracing::debug!(parent: &span, "Screencast feed ended");
}
