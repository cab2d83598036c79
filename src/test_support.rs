//! Fakes shared by the unit tests: a scripted encoder binary and an
//! in-memory page with an ack-gated screencast feed.

use crate::error::{Result, StreamerError};
use crate::page::{
    PageController, ScreencastFeed, ScreencastFrame, ScreencastFrameMetadata, ScreencastParams,
    Viewport,
};
use async_trait::async_trait;
use base64::prelude::*;
use futures::StreamExt;
use futures::channel::mpsc as feed_channel;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch};

/// Copies stdin into the last argument after reporting 1.5s of progress
pub const COPY_STDIN_TO_OUTPUT: &str = r#"for last; do :; done
printf 'frame=    1 fps=0.0 q=0.0 size=       0kB time=00:00:01.50 bitrate=N/A speed=N/A\r' >&2
exec cat > "$last"
"#;

/// Write an executable shell script standing in for ffmpeg
#[cfg(unix)]
pub fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn drain_events<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn screencast_frame(session_id: i64, payload: &[u8], timestamp: Option<f64>) -> ScreencastFrame {
    ScreencastFrame {
        data: BASE64_STANDARD.encode(payload),
        session_id,
        metadata: ScreencastFrameMetadata { timestamp },
    }
}

/// What the feed saw, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    Delivered(i64),
    Acked(i64),
}

struct Queued {
    frame: ScreencastFrame,
    awaits_ack: bool,
}

/// In-memory screencast feed. Like the real protocol it holds back the next
/// frame until the previous acknowledgeable one is acked.
pub struct FakeFeed {
    frames: Mutex<Option<feed_channel::UnboundedReceiver<Queued>>>,
    acks: watch::Sender<Vec<i64>>,
    ack_tx: mpsc::UnboundedSender<i64>,
    log: Arc<Mutex<Vec<FeedEvent>>>,
    started_with: Mutex<Option<ScreencastParams>>,
    pub fail_start: AtomicBool,
    pub stopped: AtomicUsize,
    pub detached: AtomicUsize,
}

impl FakeFeed {
    pub fn acked(&self) -> Vec<i64> {
        self.acks.borrow().clone()
    }

    pub fn log(&self) -> Vec<FeedEvent> {
        self.log.lock().unwrap().clone()
    }

    pub fn started_with(&self) -> Option<ScreencastParams> {
        self.started_with.lock().unwrap().clone()
    }
}

/// Test side of a [`FakeFeed`]
pub struct FeedController {
    frames: Option<feed_channel::UnboundedSender<Queued>>,
    pub acks: mpsc::UnboundedReceiver<i64>,
}

impl FeedController {
    /// Queue a frame the recorder should accept; nothing after it is
    /// delivered until it is acked
    pub fn send(&self, frame: ScreencastFrame) {
        self.queue(frame, true);
    }

    /// Queue a frame the recorder should drop without an ack
    pub fn send_discardable(&self, frame: ScreencastFrame) {
        self.queue(frame, false);
    }

    fn queue(&self, frame: ScreencastFrame, awaits_ack: bool) {
        if let Some(frames) = &self.frames {
            frames.unbounded_send(Queued { frame, awaits_ack }).unwrap();
        }
    }

    /// End the frame stream once buffered frames are consumed
    pub fn close(&mut self) {
        self.frames = None;
    }
}

pub fn fake_feed() -> (Arc<FakeFeed>, FeedController) {
    let (frames_tx, frames_rx) = feed_channel::unbounded();
    let (ack_tx, ack_rx) = mpsc::unbounded_channel();
    let (acks, _) = watch::channel(Vec::new());

    let feed = FakeFeed {
        frames: Mutex::new(Some(frames_rx)),
        acks,
        ack_tx,
        log: Arc::default(),
        started_with: Mutex::new(None),
        fail_start: AtomicBool::new(false),
        stopped: AtomicUsize::new(0),
        detached: AtomicUsize::new(0),
    };
    let controller = FeedController {
        frames: Some(frames_tx),
        acks: ack_rx,
    };
    (Arc::new(feed), controller)
}

#[async_trait]
impl ScreencastFeed for FakeFeed {
    async fn frames(&self) -> Result<BoxStream<'static, ScreencastFrame>> {
        let queue = self
            .frames
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| StreamerError::capture("frames already subscribed"))?;
        let log = self.log.clone();

        let stream = futures::stream::unfold(
            (queue, self.acks.subscribe(), None::<i64>),
            move |(mut queue, mut acks, pending)| {
                let log = log.clone();
                async move {
                    if let Some(id) = pending {
                        let acked = acks.wait_for(|acked| acked.contains(&id)).await.is_ok();
                        if !acked {
                            return None;
                        }
                    }

                    let queued = queue.next().await?;
                    let id = queued.frame.session_id;
                    log.lock().unwrap().push(FeedEvent::Delivered(id));
                    let pending = queued.awaits_ack.then_some(id);
                    Some((queued.frame, (queue, acks, pending)))
                }
            },
        );
        Ok(stream.boxed())
    }

    async fn start_screencast(&self, params: &ScreencastParams) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(StreamerError::capture("target closed"));
        }
        *self.started_with.lock().unwrap() = Some(params.clone());
        Ok(())
    }

    async fn ack(&self, session_id: i64) -> Result<()> {
        self.log.lock().unwrap().push(FeedEvent::Acked(session_id));
        self.acks.send_modify(|acked| acked.push(session_id));
        let _ = self.ack_tx.send(session_id);
        Ok(())
    }

    async fn stop_screencast(&self) -> Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn detach(&self) -> Result<()> {
        self.detached.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePage {
    feed: Option<Arc<FakeFeed>>,
    pub viewports: Mutex<Vec<Viewport>>,
    pub feeds_created: AtomicUsize,
}

impl FakePage {
    pub fn with_feed(feed: Arc<FakeFeed>) -> Self {
        Self {
            feed: Some(feed),
            ..Self::default()
        }
    }

    pub fn viewports(&self) -> Vec<Viewport> {
        self.viewports.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageController for FakePage {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.viewports.lock().unwrap().push(viewport);
        Ok(())
    }

    async fn create_screencast_feed(&self) -> Result<Arc<dyn ScreencastFeed>> {
        self.feeds_created.fetch_add(1, Ordering::SeqCst);
        match &self.feed {
            Some(feed) => Ok(feed.clone() as Arc<dyn ScreencastFeed>),
            None => Err(StreamerError::page("no protocol session")),
        }
    }
}
