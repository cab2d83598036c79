use crate::error::{Result, StreamerError};
use std::path::{Path, PathBuf};

/// Where the encoder reads frames from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderInput {
    /// Frames are written to the process' stdin
    Pipe,
    /// A source the encoder opens itself, e.g. a display `:99`
    Source(String),
}

impl EncoderInput {
    pub fn as_arg(&self) -> &str {
        match self {
            EncoderInput::Pipe => "pipe:0",
            EncoderInput::Source(source) => source,
        }
    }

    pub fn is_pipe(&self) -> bool {
        matches!(self, EncoderInput::Pipe)
    }
}

/// Builder for an ffmpeg invocation.
///
/// Setters take `&mut self` so an output modifier can keep chaining on the
/// command it was handed.
#[derive(Debug, Clone)]
pub struct EncoderCommand {
    binary: PathBuf,
    input: Option<EncoderInput>,
    input_format: Option<String>,
    input_options: Vec<String>,
    input_fps: Option<u32>,
    video_codec: Option<String>,
    output_fps: Option<u32>,
    size: Option<String>,
    output_options: Vec<String>,
    output_format: Option<String>,
    output: Option<PathBuf>,
}

impl EncoderCommand {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            input: None,
            input_format: None,
            input_options: Vec::new(),
            input_fps: None,
            video_codec: None,
            output_fps: None,
            size: None,
            output_options: Vec::new(),
            output_format: None,
            output: None,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn input(&mut self, input: EncoderInput) -> &mut Self {
        self.input = Some(input);
        self
    }

    pub fn input_format(&mut self, format: impl Into<String>) -> &mut Self {
        self.input_format = Some(format.into());
        self
    }

    pub fn input_options<I, S>(&mut self, options: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_options.extend(options.into_iter().map(Into::into));
        self
    }

    pub fn input_fps(&mut self, fps: u32) -> &mut Self {
        self.input_fps = Some(fps);
        self
    }

    pub fn video_codec(&mut self, codec: impl Into<String>) -> &mut Self {
        self.video_codec = Some(codec.into());
        self
    }

    pub fn output_fps(&mut self, fps: u32) -> &mut Self {
        self.output_fps = Some(fps);
        self
    }

    /// Output frame size, `WIDTHxHEIGHT`
    pub fn size(&mut self, size: impl Into<String>) -> &mut Self {
        self.size = Some(size.into());
        self
    }

    pub fn output_options<I, S>(&mut self, options: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_options.extend(options.into_iter().map(Into::into));
        self
    }

    pub fn output_format(&mut self, format: impl Into<String>) -> &mut Self {
        self.output_format = Some(format.into());
        self
    }

    pub fn output(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.output = Some(path.into());
        self
    }

    pub fn input_source(&self) -> Option<&EncoderInput> {
        self.input.as_ref()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Assemble the argument list. Both an input and an output are required.
    pub fn build(&self) -> Result<Vec<String>> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| StreamerError::config("encoder command has no input"))?;
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| StreamerError::config("encoder command has no output"))?;

        let mut args = Vec::new();

        if let Some(format) = &self.input_format {
            args.push("-f".to_string());
            args.push(format.clone());
        }
        args.extend(self.input_options.iter().cloned());
        if let Some(fps) = self.input_fps {
            args.push("-framerate".to_string());
            args.push(fps.to_string());
        }
        args.push("-i".to_string());
        args.push(input.as_arg().to_string());

        args.push("-y".to_string());
        if let Some(codec) = &self.video_codec {
            args.push("-c:v".to_string());
            args.push(codec.clone());
        }
        if let Some(fps) = self.output_fps {
            args.push("-r".to_string());
            args.push(fps.to_string());
        }
        if let Some(size) = &self.size {
            args.push("-s".to_string());
            args.push(size.clone());
        }
        args.extend(self.output_options.iter().cloned());
        if let Some(format) = &self.output_format {
            args.push("-f".to_string());
            args.push(format.clone());
        }
        args.push(output.to_string_lossy().to_string());

        Ok(args)
    }

    /// Printable command line, for diagnostics
    pub fn command_line(&self) -> Result<String> {
        let mut parts = vec![self.binary.to_string_lossy().to_string()];
        parts.extend(self.build()?);
        Ok(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piped_stills_command() {
        let mut command = EncoderCommand::new("ffmpeg");
        command
            .input(EncoderInput::Pipe)
            .input_format("image2pipe")
            .input_options(["-probesize", "200M"])
            .input_fps(10)
            .video_codec("libx264")
            .output_fps(10)
            .size("100x100")
            .output_options(["-pix_fmt", "yuv420p"])
            .output_format("mp4")
            .output("out.mp4");

        let args = command.build().unwrap();

        assert_eq!(
            args,
            vec![
                "-f",
                "image2pipe",
                "-probesize",
                "200M",
                "-framerate",
                "10",
                "-i",
                "pipe:0",
                "-y",
                "-c:v",
                "libx264",
                "-r",
                "10",
                "-s",
                "100x100",
                "-pix_fmt",
                "yuv420p",
                "-f",
                "mp4",
                "out.mp4"
            ]
        );
    }

    #[test]
    fn test_display_source() {
        let mut command = EncoderCommand::new("/opt/ffmpeg/bin/ffmpeg");
        command
            .input(EncoderInput::Source(":99".to_string()))
            .input_format("x11grab")
            .output("grab.flv");

        let args = command.build().unwrap();
        assert_eq!(&args[..4], &["-f", "x11grab", "-i", ":99"]);
        assert_eq!(args.last().unwrap(), "grab.flv");
        assert!(
            command
                .command_line()
                .unwrap()
                .starts_with("/opt/ffmpeg/bin/ffmpeg -f x11grab")
        );
    }

    #[test]
    fn test_missing_endpoints() {
        let mut command = EncoderCommand::new("ffmpeg");
        assert!(command.build().is_err());

        command.input(EncoderInput::Pipe);
        assert!(matches!(command.build(), Err(StreamerError::Config { .. })));

        command.output("out.mp4");
        assert!(command.build().is_ok());
    }
}
