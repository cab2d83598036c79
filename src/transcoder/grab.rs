use super::{DEFAULT_VIDEO_CODEC, TranscoderProfile};
use crate::config::StreamerOptions;
use crate::encoder::{EncoderCommand, EncoderInput};
use std::time::Duration;

/// ffmpeg's interactive quit command
pub const QUIT_KEY: &[u8] = b"q";

/// How long a grabbing encoder gets to finalize after `q` before its input is closed
pub const QUIT_GRACE: Duration = Duration::from_secs(1);

/// Encoder reads the X display directly
#[derive(Debug, Clone, Copy)]
pub struct GrabProfile {
    screen_id: u32,
    quit_grace: Duration,
}

impl GrabProfile {
    pub fn new(screen_id: u32) -> Self {
        Self {
            screen_id,
            quit_grace: QUIT_GRACE,
        }
    }

    pub fn with_quit_grace(mut self, grace: Duration) -> Self {
        self.quit_grace = grace;
        self
    }

    pub fn screen_id(&self) -> u32 {
        self.screen_id
    }
}

impl TranscoderProfile for GrabProfile {
    fn name(&self) -> &'static str {
        "grab"
    }

    fn input(&self) -> EncoderInput {
        EncoderInput::Source(format!(":{}", self.screen_id))
    }

    fn input_format(&self) -> &'static str {
        "x11grab"
    }

    fn extra_output_options(&self) -> Vec<String> {
        ["-preset", "ultrafast", "-pix_fmt", "yuv420p"]
            .map(String::from)
            .to_vec()
    }

    fn prepare(&self, command: &mut EncoderCommand, options: &StreamerOptions) {
        let size = options.frame_size.to_string();
        command.input_options(["-video_size", size.as_str(), "-draw_mouse", "0"]);
        command
            .size(size)
            .video_codec(DEFAULT_VIDEO_CODEC)
            .output_fps(self.input_fps(options));
    }

    fn graceful_quit(&self) -> Option<(&'static [u8], Duration)> {
        Some((QUIT_KEY, self.quit_grace))
    }
}
