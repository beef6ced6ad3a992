//! Composes the FFmpeg invocation from the request and the planned
//! bitrates, and resolves the container's canonical file extension.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;

use super::discovery::get_ffmpeg_path;
use crate::error::AppError;
use crate::options::{ComputedOptions, Options};

/// Upper bound for the muxer-help query; the request fails rather than
/// blocking indefinitely.
pub const EXTENSION_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

static EXTENSIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Common extensions: ([^.\n]+)\.").expect("invalid extensions regex")
});

/// Video filter chain in fixed order: scale, aspect correction, speed,
/// frame rate. Empty when no filter applies.
fn video_filters(options: &Options) -> Option<String> {
    let mut scale_filter = None;
    let mut aspect_filter = None;

    match (options.output_width, options.output_height) {
        (Some(w), Some(h)) => {
            scale_filter = Some(format!("scale={}:{}", w, h));
            aspect_filter = Some("setsar=1/1".to_string());
        }
        (Some(w), None) => scale_filter = Some(format!("scale={}:-2", w)),
        (None, Some(h)) => scale_filter = Some(format!("scale=-1:{}", h)),
        (None, None) => {}
    }

    if let Some(aspect) = options.aspect_ratio {
        aspect_filter = Some(format!("setsar={}/{}", aspect.y, aspect.x));
    }

    let speed_filter = options
        .speed
        .map(|speed| format!("setpts={}*PTS", 1.0 / speed));

    // The emitted rate is fps * speed so the frame rate stays consistent
    // with the setpts time-stretch.
    let fps_filter = options
        .fps
        .map(|fps| format!("fps={}", fps * options.speed.unwrap_or(1.0)));

    let filters: Vec<String> = [scale_filter, aspect_filter, speed_filter, fps_filter]
        .into_iter()
        .flatten()
        .collect();

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}

/// Audio filter chain: a tempo filter matching the speed multiplier.
fn audio_filters(options: &Options) -> Option<String> {
    options.speed.map(|speed| format!("atempo={}", speed))
}

fn bitrate_flag(kbps: f64) -> String {
    format!("{}k", kbps.round() as i64)
}

/// Build the full FFmpeg argument vector for a compression request. The
/// options are expected to have passed validation; `output_path` already
/// carries the resolved extension.
pub fn build_ffmpeg_args(
    options: &Options,
    computed: &ComputedOptions,
    format_name: &str,
    output_path: &str,
) -> Vec<String> {
    let mut args = vec!["-i".to_string(), options.input_path.to_string_lossy().into_owned()];

    match &options.video_codec {
        Some(codec) => args.extend(["-c:v".to_string(), codec.library.clone()]),
        None => args.push("-vn".to_string()),
    }
    match &options.audio_codec {
        Some(codec) => args.extend(["-c:a".to_string(), codec.library.clone()]),
        None => args.push("-an".to_string()),
    }

    if let Some(kbps) = computed.video_bitrate_kbps {
        args.extend(["-b:v".to_string(), bitrate_flag(kbps)]);
    }
    if let Some(kbps) = computed.audio_bitrate_kbps {
        args.extend(["-b:a".to_string(), bitrate_flag(kbps)]);
    }

    if let Some(filters) = video_filters(options) {
        args.extend(["-filter:v".to_string(), filters]);
    }
    if let Some(filters) = audio_filters(options) {
        args.extend(["-filter:a".to_string(), filters]);
    }

    if let Some(ref custom) = options.custom_args {
        args.extend(custom.split_whitespace().map(str::to_string));
    }

    args.extend(["-f".to_string(), format_name.to_string()]);
    args.push(output_path.to_string());
    args.push("-y".to_string());

    log::debug!(
        target: "vidsqueeze::ffmpeg::builder",
        "built FFmpeg command: {}",
        args.join(" ")
    );

    args
}

/// Single-line rendering of the invocation, kept in failure details for
/// debugging.
pub fn format_command_line(program: &str, args: &[String]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        if arg.contains(' ') {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// Query FFmpeg for the container's canonical file extension, bounded by
/// `timeout`. The first extension of the muxer's "Common extensions"
/// line is used.
pub fn resolve_container_extension(
    format_name: &str,
    timeout: Duration,
) -> Result<String, AppError> {
    let ffmpeg = get_ffmpeg_path()?;

    let mut child = Command::new(ffmpeg)
        .args(["-hide_banner", "-h", &format!("muxer={}", format_name)])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| AppError::build(format!("Failed to start FFmpeg for the extension query: {}", e)))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::build("Failed to capture the extension query output."))?;
    let collector = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(_) => break,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                log::warn!(
                    target: "vidsqueeze::ffmpeg::builder",
                    "extension query for muxer {} timed out after {:?}",
                    format_name,
                    timeout
                );
                return Err(AppError::build(format!(
                    "FFmpeg did not respond in time to the file extension query for container {}.",
                    format_name
                )));
            }
            None => thread::sleep(Duration::from_millis(25)),
        }
    }

    let output = collector.join().unwrap_or_default();
    parse_extension_listing(&output).ok_or_else(|| {
        AppError::build(format!(
            "FFmpeg did not return a file extension for container {}.",
            format_name
        ))
    })
}

fn parse_extension_listing(output: &str) -> Option<String> {
    let caps = EXTENSIONS_RE.captures(output)?;
    let first = caps[1].split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}
