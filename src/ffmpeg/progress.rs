//! Progress interpreter for the transcoder's textual output stream.
//!
//! FFmpeg interleaves a live stats line carrying `time=HH:MM:SS.ff`
//! into its merged output; most chunks carry no timestamp at all, which
//! is normal and not an error.

use std::sync::LazyLock;

use regex::Regex;

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=(\d{2}):(\d{2}):(\d{2}\.\d{2})").expect("invalid time regex")
});

/// Extract an integer percentage (0-100) from an output chunk, relative
/// to the known total duration. Returns None when the chunk carries no
/// timestamp or the duration is unusable.
pub fn parse_transcode_progress(chunk: &str, total_duration_secs: f64) -> Option<u32> {
    if total_duration_secs <= 0.0 {
        return None;
    }
    let caps = TIME_RE.captures(chunk)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let current = hours * 3600.0 + minutes * 60.0 + seconds;
    Some((current * 100.0 / total_duration_secs).clamp(0.0, 100.0) as u32)
}
