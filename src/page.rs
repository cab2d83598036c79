//! Boundary with the page-automation controller.
//!
//! The controller itself (navigation, protocol transport) lives outside this
//! crate. It is reached through [`PageController`] and, for screencast
//! capture, a per-session [`ScreencastFeed`]. The types here carry the
//! protocol's own field names so a protocol client can pass them through
//! `serde_json` unchanged.

use crate::config::FrameSize;
use crate::error::{Result, StreamerError};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl From<FrameSize> for Viewport {
    fn from(size: FrameSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
        }
    }
}

/// Parameters of `Page.startScreencast`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreencastParams {
    pub format: String,
    pub quality: u8,
    pub every_nth_frame: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl ScreencastParams {
    pub const START_METHOD: &'static str = "Page.startScreencast";
    pub const STOP_METHOD: &'static str = "Page.stopScreencast";
    pub const FRAME_EVENT: &'static str = "Page.screencastFrame";
    pub const ACK_METHOD: &'static str = "Page.screencastFrameAck";

    /// Full-quality JPEG frames, every frame, bounded by the output size
    pub fn for_frame_size(size: FrameSize) -> Self {
        Self {
            format: "jpeg".to_string(),
            quality: 100,
            every_nth_frame: 1,
            max_width: size.width,
            max_height: size.height,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreencastFrameMetadata {
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Payload of a `Page.screencastFrame` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreencastFrame {
    /// Base64-encoded image
    pub data: String,
    pub session_id: i64,
    #[serde(default)]
    pub metadata: ScreencastFrameMetadata,
}

impl ScreencastFrame {
    /// Capture time, if the renderer reported a usable one
    pub fn timestamp(&self) -> Option<f64> {
        self.metadata
            .timestamp
            .filter(|ts| ts.is_finite() && *ts != 0.0)
    }
}

/// One protocol session's screencast channel.
///
/// The feed delivers the next frame only after the previous one was
/// acknowledged, so at most one frame is in flight.
#[async_trait]
pub trait ScreencastFeed: Send + Sync {
    /// Subscribe to frame events. Dropping the stream unsubscribes.
    async fn frames(&self) -> Result<BoxStream<'static, ScreencastFrame>>;

    async fn start_screencast(&self, params: &ScreencastParams) -> Result<()>;

    async fn ack(&self, session_id: i64) -> Result<()>;

    async fn stop_screencast(&self) -> Result<()>;

    /// Release the protocol session
    async fn detach(&self) -> Result<()>;
}

/// The page being driven by the automation controller
#[async_trait]
pub trait PageController: Send + Sync {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;

    /// Open a fresh protocol session on the page's target
    async fn create_screencast_feed(&self) -> Result<Arc<dyn ScreencastFeed>>;
}

/// A page whose window geometry is fixed by its launch arguments and that has
/// no protocol session attached. Only usable with continuous grab.
#[derive(Debug, Clone, Default)]
pub struct DetachedPage;

#[async_trait]
impl PageController for DetachedPage {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        tracing::debug!(
            "Viewport {}x{} is set by the launch window, nothing to configure",
            viewport.width,
            viewport.height
        );
        Ok(())
    }

    async fn create_screencast_feed(&self) -> Result<Arc<dyn ScreencastFeed>> {
        Err(StreamerError::config(
            "screencast capture needs a page attached to an automation session",
        ))
    }
}
