use thiserror::Error;

/// Errors raised by the capture-to-encode pipeline.
#[derive(Error, Debug)]
pub enum StreamerError {
    /// Options or launch arguments rejected before any process was spawned.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// The encoder binary could not be launched.
    #[error("Failed to launch encoder {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The encoder process exited unsuccessfully.
    #[error("Encoder exited with {status}: {stderr}")]
    EncoderExited { status: String, stderr: String },

    #[error("Encoder I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The process watcher went away before reporting how the process ended.
    #[error("Encoder session ended without reporting completion")]
    CompletionLost,

    /// The screencast feed rejected a command.
    #[error("Capture feed error: {reason}")]
    Capture { reason: String },

    /// The driven page rejected a command.
    #[error("Page controller error: {reason}")]
    Page { reason: String },

    /// Recorders and transcoders run once; they cannot be restarted.
    #[error("{component} has already finished and cannot be restarted")]
    Spent { component: &'static str },
}

impl StreamerError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn capture(reason: impl Into<String>) -> Self {
        Self::Capture {
            reason: reason.into(),
        }
    }

    pub fn page(reason: impl Into<String>) -> Self {
        Self::Page {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamerError>;
