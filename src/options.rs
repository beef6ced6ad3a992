//! Request, metadata and derived-parameter types plus the single
//! validation pass that gates every compression request.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::codec::{Codec, Container};
use crate::error::AppError;

/// Characters allowed in caller-supplied raw arguments. A heuristic
/// allow-list to reduce command-injection risk, not a security boundary.
static DISALLOWED_CUSTOM_ARG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9 /-]").expect("invalid custom-args regex"));

/// Probed or caller-supplied facts about the input file. Read-only for
/// the lifetime of one request.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub aspect_ratio_x: u32,
    pub aspect_ratio_y: u32,
    pub frame_rate: f64,
    pub audio_bitrate_kbps: f64,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub container: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AspectRatio {
    pub x: i64,
    pub y: i64,
}

/// The immutable compression request.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    pub input_path: PathBuf,
    /// Output path without extension; the extension is resolved from the
    /// container at build time.
    pub output_path: PathBuf,
    pub video_codec: Option<Codec>,
    pub audio_codec: Option<Codec>,
    pub container: Option<Container>,
    pub size_kbps: Option<f64>,
    /// Fraction of the maximum audio bitrate, 0.0-1.0. Unset means 1.0.
    pub audio_quality: Option<f64>,
    pub output_width: Option<i64>,
    pub output_height: Option<i64>,
    pub aspect_ratio: Option<AspectRatio>,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub custom_args: Option<String>,
    /// Pre-supplied metadata skips the probe step entirely.
    pub input_metadata: Option<Metadata>,
    pub min_video_bitrate_kbps: f64,
    pub min_audio_bitrate_kbps: f64,
    pub max_audio_bitrate_kbps: f64,
    /// Fraction subtracted from the size budget to bias the result under
    /// the requested size (container overhead, encoder variance).
    pub overshoot_correction: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            output_path: PathBuf::new(),
            video_codec: None,
            audio_codec: None,
            container: None,
            size_kbps: None,
            audio_quality: None,
            output_width: None,
            output_height: None,
            aspect_ratio: None,
            fps: None,
            speed: None,
            custom_args: None,
            input_metadata: None,
            min_video_bitrate_kbps: 64.0,
            min_audio_bitrate_kbps: 16.0,
            max_audio_bitrate_kbps: 256.0,
            overshoot_correction: 0.02,
        }
    }
}

/// Bitrates derived by the planner. Audio is populated first since it is
/// subtracted from the size budget before video is derived.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComputedOptions {
    pub video_bitrate_kbps: Option<f64>,
    pub audio_bitrate_kbps: Option<f64>,
}

/// Checks every request rule and returns the first violation. Runs once,
/// before any external process or file I/O.
pub fn validate_options(options: &Options) -> Result<(), AppError> {
    if options.video_codec.is_none() && options.audio_codec.is_none() {
        return Err(AppError::validation(
            "Neither a video nor an audio codec was selected.",
        ));
    }

    if options.video_codec.is_none() && options.container.is_some() {
        return Err(AppError::validation(
            "A container was selected but no video codec was set.",
        ));
    }

    if let Some(ref container) = options.container {
        for codec in [&options.video_codec, &options.audio_codec]
            .into_iter()
            .flatten()
        {
            if !container.supports(&codec.name) {
                return Err(AppError::validation(format!(
                    "The {} container does not support the {} codec.",
                    container.name, codec.name
                )));
            }
        }
    }

    if let Some(width) = options.output_width {
        if width <= 0 {
            return Err(AppError::validation(format!(
                "Output width must be greater than 0, but was {}.",
                width
            )));
        }
    }
    if let Some(height) = options.output_height {
        if height <= 0 {
            return Err(AppError::validation(format!(
                "Output height must be greater than 0, but was {}.",
                height
            )));
        }
    }

    if let Some(aspect) = options.aspect_ratio {
        if aspect.x <= 0 {
            return Err(AppError::validation(format!(
                "Invalid horizontal aspect component {}.",
                aspect.x
            )));
        }
        if aspect.y <= 0 {
            return Err(AppError::validation(format!(
                "Invalid vertical aspect component {}.",
                aspect.y
            )));
        }
    }

    if let Some(fps) = options.fps {
        if fps < 0.0 {
            return Err(AppError::validation(format!(
                "Value for frames per second '{}' is out of range.",
                fps
            )));
        }
    }

    // setpts divides by speed, so zero is as invalid as negative.
    if let Some(speed) = options.speed {
        if speed <= 0.0 {
            return Err(AppError::validation(format!(
                "Value for speed '{}' is out of range.",
                speed
            )));
        }
    }

    if let Some(ref custom) = options.custom_args {
        if DISALLOWED_CUSTOM_ARG_CHARS.is_match(custom) {
            return Err(AppError::validation(
                "Custom arguments contain invalid characters.",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{find_audio_codec, find_container, find_video_codec};

    fn valid_options() -> Options {
        Options {
            input_path: PathBuf::from("/in.mp4"),
            output_path: PathBuf::from("/out"),
            video_codec: find_video_codec("H.264"),
            audio_codec: find_audio_codec("AAC"),
            container: find_container("mp4"),
            ..Options::default()
        }
    }

    #[test]
    fn accepts_valid_request() {
        assert!(validate_options(&valid_options()).is_ok());
    }

    #[test]
    fn rejects_when_no_codec_selected() {
        let mut o = valid_options();
        o.video_codec = None;
        o.audio_codec = None;
        o.container = None;
        let err = validate_options(&o).unwrap_err();
        assert!(err.to_string().contains("Neither"));
    }

    #[test]
    fn rejects_container_without_video_codec() {
        let mut o = valid_options();
        o.video_codec = None;
        assert!(matches!(
            validate_options(&o),
            Err(AppError::Validation(msg)) if msg.contains("container")
        ));
    }

    #[test]
    fn rejects_codec_the_container_cannot_hold() {
        let mut o = valid_options();
        o.container = find_container("webm");
        o.video_codec = find_video_codec("H.264");
        o.audio_codec = None;
        let err = validate_options(&o).unwrap_err();
        assert!(err.to_string().contains("does not support"));

        let mut o = valid_options();
        o.container = find_container("webm");
        o.video_codec = find_video_codec("VP9");
        o.audio_codec = find_audio_codec("AAC");
        let err = validate_options(&o).unwrap_err();
        assert!(err.to_string().contains("AAC"));

        let mut o = valid_options();
        o.container = find_container("webm");
        o.video_codec = find_video_codec("VP9");
        o.audio_codec = find_audio_codec("OPUS");
        assert!(validate_options(&o).is_ok());
    }

    #[test]
    fn audio_only_without_container_is_valid() {
        let mut o = valid_options();
        o.video_codec = None;
        o.container = None;
        assert!(validate_options(&o).is_ok());
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        let mut o = valid_options();
        o.output_width = Some(-1280);
        assert!(validate_options(&o).is_err());

        let mut o = valid_options();
        o.output_height = Some(0);
        assert!(validate_options(&o).is_err());
    }

    #[test]
    fn rejects_non_positive_aspect_components() {
        let mut o = valid_options();
        o.aspect_ratio = Some(AspectRatio { x: 0, y: 9 });
        assert!(validate_options(&o).is_err());

        let mut o = valid_options();
        o.aspect_ratio = Some(AspectRatio { x: 16, y: -9 });
        assert!(validate_options(&o).is_err());
    }

    #[test]
    fn rejects_negative_fps_and_non_positive_speed() {
        let mut o = valid_options();
        o.fps = Some(-24.0);
        assert!(validate_options(&o).is_err());

        let mut o = valid_options();
        o.speed = Some(0.0);
        assert!(validate_options(&o).is_err());

        let mut o = valid_options();
        o.speed = Some(-1.5);
        assert!(validate_options(&o).is_err());
    }

    #[test]
    fn rejects_disallowed_custom_arg_characters() {
        let mut o = valid_options();
        o.custom_args = Some("-preset fast; rm -rf /".to_string());
        assert!(validate_options(&o).is_err());

        let mut o = valid_options();
        o.custom_args = Some("-movflags faststart".to_string());
        assert!(validate_options(&o).is_ok());
    }
}
