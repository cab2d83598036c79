use super::{DEFAULT_VIDEO_CODEC, TranscoderProfile};
use crate::config::StreamerOptions;
use crate::encoder::{EncoderCommand, EncoderInput};

/// Encodes a piped sequence of still images
#[derive(Debug, Clone, Copy, Default)]
pub struct ScreencastProfile;

impl TranscoderProfile for ScreencastProfile {
    fn name(&self) -> &'static str {
        "screencast"
    }

    fn input(&self) -> EncoderInput {
        EncoderInput::Pipe
    }

    fn input_format(&self) -> &'static str {
        "image2pipe"
    }

    fn extra_output_options(&self) -> Vec<String> {
        ["-minrate", "1000", "-maxrate", "1000", "-pix_fmt", "yuv420p"]
            .map(String::from)
            .to_vec()
    }

    fn prepare(&self, command: &mut EncoderCommand, options: &StreamerOptions) {
        command
            .size(options.frame_size.to_string())
            .input_options(["-probesize", "200M"])
            .video_codec(DEFAULT_VIDEO_CODEC)
            .output_fps(options.fps);
    }
}
