//! External encoder process.
//!
//! * `command`: builds the ffmpeg argument list.
//! * `progress`: parses ffmpeg status lines into a monotonic [`Timemark`].
//! * `session`: owns one running process, its stdin pump and its completion signal.

pub mod command;
pub mod progress;
pub mod session;

pub use command::{EncoderCommand, EncoderInput};
pub use progress::Timemark;
pub use session::{EncoderSession, FrameReader, SessionOutcome, SessionReporter};
