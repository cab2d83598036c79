use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static TIMEMARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):([0-5]\d):([0-5]\d(?:\.\d+)?)$").unwrap());

/// Elapsed output time as reported by the encoder, `HH:MM:SS.cc`
#[derive(Debug, Clone, PartialEq)]
pub struct Timemark {
    text: String,
    seconds: f64,
}

impl Timemark {
    pub fn parse(text: &str) -> Option<Self> {
        let caps = TIMEMARK.captures(text.trim())?;
        let hours: f64 = caps[1].parse().ok()?;
        let minutes: f64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;

        Some(Self {
            text: text.trim().to_string(),
            seconds: hours * 3600.0 + minutes * 60.0 + seconds,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn seconds(&self) -> f64 {
        self.seconds
    }
}

impl Default for Timemark {
    fn default() -> Self {
        Self {
            text: "00:00:00.00".to_string(),
            seconds: 0.0,
        }
    }
}

impl fmt::Display for Timemark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// True for ffmpeg status lines (`frame= ... time=... bitrate=...`)
pub fn is_progress_line(line: &str) -> bool {
    line.contains("time=") && line.contains("bitrate=")
}

/// Timemark of a status line. `time=N/A` and negative marks yield `None`.
pub fn parse_progress(line: &str) -> Option<Timemark> {
    if !is_progress_line(line) {
        return None;
    }
    Timemark::parse(&extract_value(line, "time=")?)
}

/// Value following `key` in an ffmpeg status line
pub fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)?;
    let after_key = line[start + key.len()..].trim_start();
    let end = after_key
        .find(char::is_whitespace)
        .unwrap_or(after_key.len());
    Some(after_key[..end].to_string())
}

/// Replace `current` with `next` unless that would move time backwards.
/// Returns whether `current` changed.
pub fn advance(current: &mut Timemark, next: Timemark) -> bool {
    if next.seconds < current.seconds || next == *current {
        return false;
    }
    *current = next;
    true
}
