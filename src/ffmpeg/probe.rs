//! FFprobe-based metadata extraction. Runs once per request, and only
//! when the caller did not supply metadata.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::discovery::get_ffprobe_path;
use crate::error::AppError;
use crate::options::Metadata;

/// Upper bound for one ffprobe run; the request fails rather than
/// blocking indefinitely on a wedged prober.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    display_aspect_ratio: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 2 {
        return None;
    }
    let num: f64 = parts[0].trim().parse().ok()?;
    let den: f64 = parts[1].trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

fn parse_aspect_ratio(s: &str) -> Option<(u32, u32)> {
    let (x, y) = s.split_once(':')?;
    let x: u32 = x.trim().parse().ok()?;
    let y: u32 = y.trim().parse().ok()?;
    if x == 0 || y == 0 {
        return None;
    }
    Some((x, y))
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

/// Parse ffprobe JSON output into a Metadata record. Duration and video
/// dimensions are required and must be positive.
pub fn parse_probe_json(json: &str) -> Result<Metadata, AppError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| AppError::probe("Could not parse ffprobe output.", e.to_string()))?;

    let format = output.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    if duration <= 0.0 {
        return Err(AppError::probe(
            "The input file has no usable duration.",
            json.to_string(),
        ));
    }

    let streams = output.streams.as_deref().unwrap_or(&[]);
    let video_stream = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio_stream = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let width = video_stream.and_then(|s| s.width).unwrap_or(0);
    let height = video_stream.and_then(|s| s.height).unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(AppError::probe(
            "The input file has no usable video dimensions.",
            json.to_string(),
        ));
    }

    let (aspect_x, aspect_y) = video_stream
        .and_then(|s| s.display_aspect_ratio.as_deref())
        .and_then(parse_aspect_ratio)
        .unwrap_or_else(|| {
            let d = gcd(width, height);
            (width / d, height / d)
        });

    let frame_rate = video_stream
        .and_then(|s| s.r_frame_rate.as_deref())
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    let audio_bitrate_kbps = audio_stream
        .and_then(|s| s.bit_rate.as_deref())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(|bps| bps / 1000.0)
        .unwrap_or(0.0);

    Ok(Metadata {
        width,
        height,
        duration_seconds: duration,
        aspect_ratio_x: aspect_x,
        aspect_ratio_y: aspect_y,
        frame_rate,
        audio_bitrate_kbps,
        video_codec: video_stream.and_then(|s| s.codec_name.clone()),
        audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
        container: format.and_then(|f| f.format_name.clone()),
    })
}

/// Probe an input file with ffprobe and return its metadata.
pub fn probe(path: &Path) -> Result<Metadata, AppError> {
    probe_with_timeout(path, PROBE_TIMEOUT)
}

/// Probe with an explicit bound; ffprobe is killed on expiry.
pub fn probe_with_timeout(path: &Path, timeout: Duration) -> Result<Metadata, AppError> {
    let ffprobe = get_ffprobe_path()?;
    let path_str = path.to_string_lossy();

    log::debug!(
        target: "vidsqueeze::ffmpeg::probe",
        "probing input: {}",
        path_str
    );

    let mut child = Command::new(&ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            &path_str,
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AppError::probe("Failed to run ffprobe.", e.to_string()))?;

    let (mut stdout, mut stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(out), Some(err)) => (out, err),
        _ => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::probe("Failed to capture ffprobe output.", ""));
        }
    };
    let stdout_collector = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        buf
    });
    let stderr_collector = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                log::warn!(
                    target: "vidsqueeze::ffmpeg::probe",
                    "probe of {} timed out after {:?}",
                    path_str,
                    timeout
                );
                return Err(AppError::probe(
                    "ffprobe did not respond in time.",
                    path_str.into_owned(),
                ));
            }
            None => thread::sleep(Duration::from_millis(25)),
        }
    };

    let json = stdout_collector.join().unwrap_or_default();
    let stderr_text = stderr_collector.join().unwrap_or_default();

    if !status.success() {
        return Err(AppError::probe(
            "ffprobe could not read the input file.",
            stderr_text.trim().to_string(),
        ));
    }

    parse_probe_json(&json)
}

/// Async wrapper around [`probe`] for callers on a tokio runtime.
pub async fn probe_async(path: std::path::PathBuf) -> Result<Metadata, AppError> {
    match tokio::task::spawn_blocking(move || probe(&path)).await {
        Ok(result) => result,
        Err(join_err) => Err(AppError::probe(
            "Probe task failed.",
            join_err.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_metadata() {
        let json = r#"{
            "format": { "duration": "120.0", "format_name": "mov,mp4,m4a" },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "30000/1001",
                    "display_aspect_ratio": "16:9"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "bit_rate": "192000"
                }
            ]
        }"#;
        let meta = parse_probe_json(json).unwrap();
        assert_eq!(meta.width, 1920);
        assert_eq!(meta.height, 1080);
        assert_eq!(meta.duration_seconds, 120.0);
        assert_eq!((meta.aspect_ratio_x, meta.aspect_ratio_y), (16, 9));
        assert!((meta.frame_rate - 29.97).abs() < 0.01);
        assert_eq!(meta.audio_bitrate_kbps, 192.0);
        assert_eq!(meta.video_codec.as_deref(), Some("h264"));
        assert_eq!(meta.audio_codec.as_deref(), Some("aac"));
        assert_eq!(meta.container.as_deref(), Some("mov,mp4,m4a"));
    }

    #[test]
    fn derives_aspect_ratio_from_dimensions() {
        let json = r#"{
            "format": { "duration": "10.0" },
            "streams": [
                { "codec_type": "video", "width": 1280, "height": 720, "r_frame_rate": "25/1" }
            ]
        }"#;
        let meta = parse_probe_json(json).unwrap();
        assert_eq!((meta.aspect_ratio_x, meta.aspect_ratio_y), (16, 9));
    }

    #[test]
    fn rejects_missing_duration() {
        let json = r#"{
            "format": {},
            "streams": [
                { "codec_type": "video", "width": 1280, "height": 720 }
            ]
        }"#;
        let err = parse_probe_json(json).unwrap_err();
        assert!(err.to_string().contains("duration"));
    }

    #[test]
    fn rejects_missing_dimensions() {
        let json = r#"{
            "format": { "duration": "10.0" },
            "streams": [ { "codec_type": "audio", "codec_name": "aac" } ]
        }"#;
        let err = parse_probe_json(json).unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }

    #[test]
    fn rejects_garbage_output() {
        assert!(parse_probe_json("not json at all").is_err());
    }

    #[test]
    fn frame_rate_fraction_parsing() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!(parse_frame_rate("30/0").is_none());
        assert!(parse_frame_rate("thirty").is_none());
    }
}
