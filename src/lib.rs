//! Records a browser page driven by an automation controller into a video
//! file by feeding an external ffmpeg process.
//!
//! Two capture modes are supported:
//! - screencast: the page pushes JPEG frames over its protocol session; they
//!   are resampled to a fixed rate and piped to the encoder
//! - grab: the encoder reads the X display the browser window is shown on
//!
//! [`Streamer`] is the entry point.

pub mod config;
pub mod encoder;
pub mod error;
pub mod launch;
pub mod messages;
pub mod page;
pub mod recorder;
pub mod streamer;
pub mod transcoder;

#[cfg(test)]
mod test_support;

pub use config::{Config, FrameSize, Output, OutputFormat, RecorderKind, StreamerOptions};
pub use error::{Result, StreamerError};
pub use messages::{RecorderEvent, StreamerEvent, TranscoderEvent};
pub use page::{DetachedPage, PageController, ScreencastFeed};
pub use streamer::Streamer;
