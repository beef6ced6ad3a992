//! Best-effort failure summary extraction from the transcoder's merged
//! output buffer.
//!
//! The buffer interleaves a version banner, a self-overwriting progress
//! line and, on failure, a trailing error message. This is inherently
//! tool-output-specific: the only stable guarantee is a non-empty
//! best-effort string for non-empty buffers.

use std::sync::LazyLock;

use regex::Regex;

/// Printed right before FFmpeg starts emitting progress; terminal errors
/// appear after it.
const PROGRESS_MARKER: &str = "Press [q] to stop, [?] for help";
/// Fallback split point when the progress marker is absent (e.g. with a
/// non-interactive stdin).
const STREAM_MARKER: &str = "Stream mapping:";

static LOG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("invalid log-tag regex"));
static BANNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(ffmpeg version|built with|configuration:)\b.*$")
        .expect("invalid banner regex")
});
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

/// Derive a human-readable summary from the accumulated process output.
/// Empty input yields an empty string; anything else yields a non-empty
/// best-effort summary.
pub fn extract_diagnostic(output: &str) -> String {
    if output.trim().is_empty() {
        return String::new();
    }

    let tail = split_tail(output, PROGRESS_MARKER)
        .or_else(|| split_tail(output, STREAM_MARKER))
        .unwrap_or(output);

    let without_banner = BANNER_RE.replace_all(tail, "");
    let without_tags = LOG_TAG_RE.replace_all(&without_banner, "");
    let without_literal = without_tags.replace("Conversion failed!", "");
    let summary = WHITESPACE_RE
        .replace_all(&without_literal, " ")
        .trim()
        .to_string();

    if !summary.is_empty() {
        return summary;
    }

    // Everything was stripped away; fall back to the last raw line so
    // the caller still gets something to show.
    output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| output.trim().to_string())
}

fn split_tail<'a>(output: &'a str, marker: &str) -> Option<&'a str> {
    output.rsplit_once(marker).map(|(_, tail)| tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_error_after_progress_marker() {
        let output = "ffmpeg version 6.0 Copyright\n\
            configuration: --enable-gpl\n\
            Press [q] to stop, [?] for help\n\
            frame= 100 time=00:00:10.00\n\
            [libx264 @ 0x5564] Error while opening encoder - maybe bad width or height\n\
            Conversion failed!\n";
        let summary = extract_diagnostic(output);
        assert!(summary.contains("Error while opening encoder"));
        assert!(!summary.contains("Conversion failed!"));
        assert!(!summary.contains("libx264 @"));
        assert!(!summary.contains("ffmpeg version"));
    }

    #[test]
    fn falls_back_to_stream_marker() {
        let output = "Input #0, mov, from 'in.mp4':\n\
            Stream mapping:\n\
            Stream #0:0 -> #0:0 (h264 (native) -> h264 (libx264))\n\
            Could not write header for output file\n";
        let summary = extract_diagnostic(output);
        assert!(summary.contains("Could not write header"));
    }

    #[test]
    fn empty_buffer_yields_empty_summary() {
        assert_eq!(extract_diagnostic(""), "");
        assert_eq!(extract_diagnostic("   \n  "), "");
    }

    #[test]
    fn non_empty_buffer_never_yields_empty_summary() {
        // A tail made entirely of bracketed tags collapses to nothing,
        // so the raw-line fallback must kick in.
        let output = "Press [q] to stop, [?] for help\n[tag1][tag2]\n";
        let summary = extract_diagnostic(output);
        assert!(!summary.is_empty());
    }

    #[test]
    fn collapses_whitespace_runs() {
        let output = "Press [q] to stop, [?] for help\n  broken    pipe \n\n  on   write\n";
        assert_eq!(extract_diagnostic(output), "broken pipe on write");
    }
}
