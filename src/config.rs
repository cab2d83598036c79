use crate::encoder::EncoderCommand;
use crate::error::{Result, StreamerError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Display number used for continuous grab when neither the options nor
/// `DISPLAY` name one.
pub const FALLBACK_SCREEN_ID: u32 = 99;

/// Which capture source feeds the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderKind {
    /// Push-based screencast frames from the automation protocol
    #[default]
    #[serde(alias = "cdp")]
    Screencast,
    /// The encoder reads the display surface itself
    #[serde(alias = "x11")]
    Grab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Flv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Flv => "flv",
        }
    }
}

/// Fixed output destination: a container format written to a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub path: PathBuf,
}

impl Default for OutputOptions {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            format: OutputFormat::Mp4,
            path: cwd.join("output.mp4"),
        }
    }
}

/// Caller-supplied hook that configures the encoder output instead of a
/// fixed format and path. Runs after the capture variant has set up its
/// input and codec options.
pub type OutputModifier = Arc<dyn Fn(&mut EncoderCommand) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub enum Output {
    File(OutputOptions),
    Custom(OutputModifier),
}

impl Output {
    pub fn custom<F>(modifier: F) -> Self
    where
        F: Fn(&mut EncoderCommand) -> Result<()> + Send + Sync + 'static,
    {
        Output::Custom(Arc::new(modifier))
    }
}

impl Default for Output {
    fn default() -> Self {
        Output::File(OutputOptions::default())
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::File(options) => f.debug_tuple("File").field(options).finish(),
            Output::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Immutable option snapshot shared by every pipeline component.
///
/// Built from [`Default`] and the `with_*` methods, then frozen behind an
/// `Arc` when the [`crate::Streamer`] is constructed.
#[derive(Debug, Clone)]
pub struct StreamerOptions {
    pub recorder: RecorderKind,
    /// Display to grab; only read by [`RecorderKind::Grab`]
    pub screen_id: Option<u32>,
    pub fps: u32,
    pub threads: u32,
    pub frame_size: FrameSize,
    pub output: Output,
    /// Overrides the `ffmpeg` found on `PATH`
    pub ffmpeg_path: Option<PathBuf>,
}

impl StreamerOptions {
    pub const DEFAULT_FPS: u32 = 30;
    pub const DEFAULT_THREADS: u32 = 1;
    pub const DEFAULT_ENCODER: &'static str = "ffmpeg";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recorder(mut self, recorder: RecorderKind) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_screen_id(mut self, screen_id: u32) -> Self {
        self.screen_id = Some(screen_id);
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = FrameSize::new(width, height);
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn with_output_file(self, format: OutputFormat, path: impl Into<PathBuf>) -> Self {
        self.with_output(Output::File(OutputOptions {
            format,
            path: path.into(),
        }))
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    /// Encoder binary to launch
    pub fn encoder_binary(&self) -> PathBuf {
        self.ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_ENCODER))
    }

    /// Period of the resampling timer (`1000 / fps` milliseconds)
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.fps.max(1)))
    }

    /// Screen to grab: the explicit id, else the `DISPLAY` number, else 99
    pub fn resolved_screen_id(&self) -> u32 {
        resolve_screen_id(self.screen_id, std::env::var("DISPLAY").ok().as_deref())
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(StreamerError::config("fps must be greater than zero"));
        }

        if self.threads == 0 {
            return Err(StreamerError::config("threads must be greater than zero"));
        }

        if self.frame_size.width == 0 || self.frame_size.height == 0 {
            return Err(StreamerError::config(format!(
                "frame size {} must be non-zero in both dimensions",
                self.frame_size
            )));
        }

        if let Output::File(output) = &self.output {
            if output.path.as_os_str().is_empty() {
                return Err(StreamerError::config("output path cannot be empty"));
            }
        }

        if self
            .ffmpeg_path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return Err(StreamerError::config("ffmpeg_path cannot be empty"));
        }

        Ok(())
    }
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self {
            recorder: RecorderKind::default(),
            screen_id: None,
            fps: Self::DEFAULT_FPS,
            threads: Self::DEFAULT_THREADS,
            frame_size: FrameSize::default(),
            output: Output::default(),
            ffmpeg_path: None,
        }
    }
}

/// Pick the X display number to grab.
///
/// `display` is an X11 display name such as `:99`, `:0.0` or
/// `localhost:10.0`; only the display number is used.
pub fn resolve_screen_id(explicit: Option<u32>, display: Option<&str>) -> u32 {
    if let Some(id) = explicit {
        return id;
    }

    display
        .and_then(|name| {
            let after_host = name.rsplit_once(':').map_or(name, |(_, rest)| rest);
            let number = after_host.split('.').next().unwrap_or_default();
            number.parse().ok()
        })
        .unwrap_or(FALLBACK_SCREEN_ID)
}

/// On-disk configuration for the `page-streamer` binary
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub recorder: RecorderKind,

    #[serde(default)]
    pub screen_id: Option<u32>,

    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_threads")]
    pub threads: u32,

    #[serde(default)]
    pub frame_size: FrameSize,

    #[serde(default)]
    pub output: OutputOptions,

    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

fn default_fps() -> u32 {
    StreamerOptions::DEFAULT_FPS
}

fn default_threads() -> u32 {
    StreamerOptions::DEFAULT_THREADS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recorder: RecorderKind::default(),
            screen_id: None,
            fps: default_fps(),
            threads: default_threads(),
            frame_size: FrameSize::default(),
            output: OutputOptions::default(),
            ffmpeg_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/page-streamer/config.json)
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    fn config_path() -> anyhow::Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("page-streamer").join("config.json"))
    }

    pub fn to_options(&self) -> StreamerOptions {
        let mut options = StreamerOptions::new()
            .with_recorder(self.recorder)
            .with_fps(self.fps)
            .with_threads(self.threads)
            .with_frame_size(self.frame_size.width, self.frame_size.height)
            .with_output(Output::File(self.output.clone()));

        options.screen_id = self.screen_id;
        options.ffmpeg_path = self.ffmpeg_path.clone();
        options
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.to_options().validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = StreamerOptions::new();

        assert_eq!(options.recorder, RecorderKind::Screencast);
        assert_eq!(options.fps, 30);
        assert_eq!(options.threads, 1);
        assert_eq!(options.frame_size.to_string(), "1280x720");
        assert_eq!(options.encoder_binary(), PathBuf::from("ffmpeg"));
        match &options.output {
            Output::File(output) => {
                assert_eq!(output.format, OutputFormat::Mp4);
                assert!(output.path.ends_with("output.mp4"));
            }
            Output::Custom(_) => panic!("default output should be a file"),
        }
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(
            StreamerOptions::new().with_fps(10).frame_interval(),
            Duration::from_millis(100)
        );
        assert_eq!(
            StreamerOptions::new().with_fps(30).frame_interval(),
            Duration::from_nanos(33_333_333)
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(StreamerOptions::new().with_fps(0).validate().is_err());
        assert!(StreamerOptions::new().with_threads(0).validate().is_err());
        assert!(
            StreamerOptions::new()
                .with_frame_size(0, 720)
                .validate()
                .is_err()
        );
        assert!(
            StreamerOptions::new()
                .with_output_file(OutputFormat::Flv, "")
                .validate()
                .is_err()
        );
        assert!(StreamerOptions::new().with_ffmpeg_path("").validate().is_err());
    }

    #[test]
    fn test_resolve_screen_id() {
        assert_eq!(resolve_screen_id(Some(7), Some(":1")), 7);
        assert_eq!(resolve_screen_id(None, Some(":99")), 99);
        assert_eq!(resolve_screen_id(None, Some(":0.0")), 0);
        assert_eq!(resolve_screen_id(None, Some("localhost:10.0")), 10);
        assert_eq!(resolve_screen_id(None, Some("garbage")), FALLBACK_SCREEN_ID);
        assert_eq!(resolve_screen_id(None, None), FALLBACK_SCREEN_ID);
    }

    #[test]
    fn test_config_fills_missing_fields() {
        let config: Config =
            serde_json::from_str(r#"{ "recorder": "x11", "fps": 60 }"#).unwrap();

        assert_eq!(config.recorder, RecorderKind::Grab);
        assert_eq!(config.fps, 60);
        assert_eq!(config.threads, 1);
        assert_eq!(config.frame_size, FrameSize::default());

        let options = config.to_options();
        assert_eq!(options.recorder, RecorderKind::Grab);
        assert_eq!(options.fps, 60);
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            screen_id: Some(3),
            output: OutputOptions {
                format: OutputFormat::Flv,
                path: PathBuf::from("/tmp/session.flv"),
            },
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.screen_id, Some(3));
        assert_eq!(loaded.output.format, OutputFormat::Flv);
        assert!(loaded.validate().is_ok());
    }
}
