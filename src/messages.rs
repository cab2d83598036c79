use std::sync::Arc;

/// Chunk of encoder input: one encoded still image
pub type FrameBytes = Arc<[u8]>;

/// Recorder lifecycle (observable via watch channel)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    Started,
    Stopped,
}

/// Transcoder lifecycle. A transcoder runs exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TranscoderState {
    #[default]
    NotStarted,
    Running,
    Ended,
}

/// Events published by a recorder.
///
/// `Frame` fires zero or more times, once per distinct captured frame, after
/// that frame was first written to the encoder input.
#[derive(Clone, Debug)]
pub enum RecorderEvent {
    Frame { data: FrameBytes, timestamp: f64 },
}

/// Events published by a transcoder.
///
/// `Start` fires once per launch, `End` at most once, `Error` for every
/// surfaced failure. The pipeline never retries after an `Error`.
#[derive(Clone, Debug, PartialEq)]
pub enum TranscoderEvent {
    /// Diagnostic: the full command line that was launched
    Start { command_line: String },
    Progress { timemark: String },
    Error { message: String },
    End,
}

/// Events published by the streamer facade
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamerEvent {
    Start,
    Stop,
}
