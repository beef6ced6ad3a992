//! Shared fixtures for the lifecycle tests: stand-in ffmpeg/ffprobe
//! shell scripts installed once per test process and selected through
//! the `FFMPEG_PATH` override.
//!
//! The binary path is cached for the process lifetime, so the scripts
//! are installed eagerly and their behavior is switched per test with
//! the `VIDSQUEEZE_FAKE_MODE` variable instead of swapping binaries.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tempfile::TempDir;

use vidsqueeze::options::Options;
use vidsqueeze::{find_audio_codec, find_container, find_video_codec};

pub const FAKE_MODE_VAR: &str = "VIDSQUEEZE_FAKE_MODE";

static FAKE_TOOLS: OnceLock<TempDir> = OnceLock::new();

/// The transcoder: answers the muxer-help and encoder-listing queries,
/// then plays one scripted transcode per `VIDSQUEEZE_FAKE_MODE`. The
/// default script reports progress for a 120 second input and writes
/// the output file, which sits second to last in the argument list.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
mode="${VIDSQUEEZE_FAKE_MODE:-ok}"
case "$1 $2" in
"-hide_banner -encoders")
    echo " V..... libx264              H.264 / AVC / MPEG-4 AVC"
    exit 0
    ;;
"-hide_banner -h")
    if [ "$mode" = "slow-muxer" ]; then
        sleep 5
    fi
    echo "Muxer mp4 [MP4 (MPEG-4 Part 14)]:"
    echo "    Common extensions: mp4,m4v."
    exit 0
    ;;
esac
case "$mode" in
hang)
    exec sleep 30
    ;;
fail)
    echo "ffmpeg version 6.0 Copyright (c) the FFmpeg developers" >&2
    echo "Press [q] to stop, [?] for help" >&2
    echo "[libx264 @ 0x55aa] width not divisible by 2 (641x480)" >&2
    echo "Conversion failed!" >&2
    exit 1
    ;;
no-output)
    echo "Press [q] to stop, [?] for help" >&2
    exit 0
    ;;
*)
    echo "Press [q] to stop, [?] for help" >&2
    echo "frame=  900 fps=30 q=28.0 size= 256kB time=00:00:30.00 bitrate= 500.0kbits/s" >&2
    echo "frame= 1800 fps=30 q=28.0 size= 512kB time=00:01:00.00 bitrate= 500.0kbits/s" >&2
    echo "frame= 3600 fps=30 q=28.0 size= 999kB time=00:02:00.00 bitrate= 500.0kbits/s" >&2
    for arg do
        out_path="$last"
        last="$arg"
    done
    printf 'fake media' > "$out_path"
    exit 0
    ;;
esac
"#;

/// The prober: a fixed 120 second 1280x720 clip regardless of input.
/// The `probe-hang` mode wedges instead of answering.
const FAKE_FFPROBE: &str = r#"#!/bin/sh
if [ "${VIDSQUEEZE_FAKE_MODE:-}" = "probe-hang" ]; then
    exec sleep 30
fi
cat <<'EOF'
{
    "format": { "duration": "120.000000", "format_name": "mov,mp4,m4a,3gp,3g2,mj2" },
    "streams": [
        {
            "codec_type": "video",
            "codec_name": "h264",
            "width": 1280,
            "height": 720,
            "r_frame_rate": "30/1",
            "display_aspect_ratio": "16:9"
        },
        {
            "codec_type": "audio",
            "codec_name": "aac",
            "bit_rate": "128000"
        }
    ]
}
EOF
"#;

pub fn install_fake_tools() -> &'static Path {
    let dir = FAKE_TOOLS.get_or_init(|| {
        let dir = tempfile::tempdir().expect("create fake tool dir");
        write_script(&dir.path().join("ffmpeg"), FAKE_FFMPEG);
        write_script(&dir.path().join("ffprobe"), FAKE_FFPROBE);
        // Discovery reads this once and caches it; it must be set
        // before anything resolves a binary path.
        unsafe { std::env::set_var("FFMPEG_PATH", dir.path().join("ffmpeg")) };
        dir
    });
    dir.path()
}

/// Select which script the next spawned fake tool runs. Tests that call
/// this must be serialized since the environment is process-wide.
pub fn set_fake_mode(mode: Option<&str>) {
    install_fake_tools();
    match mode {
        Some(mode) => unsafe { std::env::set_var(FAKE_MODE_VAR, mode) },
        None => unsafe { std::env::remove_var(FAKE_MODE_VAR) },
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write fake tool");
    let mut perms = fs::metadata(path).expect("stat fake tool").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod fake tool");
}

/// A well-formed request pointing into the given directory.
pub fn request_in(dir: &Path) -> Options {
    let input = dir.join("input.mp4");
    fs::write(&input, b"not really media").expect("write input fixture");
    Options {
        input_path: input,
        output_path: dir.join("output"),
        video_codec: find_video_codec("H.264"),
        audio_codec: find_audio_codec("AAC"),
        container: find_container("mp4"),
        size_kbps: Some(8000.0),
        ..Options::default()
    }
}

pub fn output_file_in(dir: &Path) -> PathBuf {
    dir.join("output.mp4")
}
