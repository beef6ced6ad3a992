//! Bitrate planning: pure arithmetic that turns a target output size
//! into per-stream bitrates.

use crate::error::AppError;
use crate::options::{ComputedOptions, Metadata, Options};

/// Audio bitrate from the quality fraction, floored at the configured
/// minimum or the selected codec's own floor, whichever is higher. An
/// unset quality means maximum.
pub fn plan_audio_bitrate(options: &Options) -> f64 {
    let quality = options.audio_quality.unwrap_or(1.0);
    let codec_floor = options
        .audio_codec
        .as_ref()
        .map(|c| c.min_bitrate_kbps)
        .unwrap_or(0.0);
    options
        .min_audio_bitrate_kbps
        .max(codec_floor)
        .max(quality * options.max_audio_bitrate_kbps)
}

/// Ratio of output to input pixel count, used to compensate the video
/// bitrate when downscaling. Upscales and unchanged sizes yield 1 so the
/// bitrate is never inflated for upscaled output.
pub fn pixel_ratio(options: &Options, metadata: &Metadata) -> f64 {
    let input_pixels = metadata.width as f64 * metadata.height as f64;
    if input_pixels <= 0.0 {
        return 1.0;
    }

    let aspect_x = metadata.aspect_ratio_x.max(1) as f64;
    let aspect_y = metadata.aspect_ratio_y.max(1) as f64;

    // A single explicit dimension derives the other via the input aspect
    // ratio; none means no compensation at all.
    let (output_width, output_height) = match (options.output_width, options.output_height) {
        (Some(w), Some(h)) => (w as f64, h as f64),
        (Some(w), None) => (w as f64, w as f64 * aspect_y / aspect_x),
        (None, Some(h)) => (h as f64 * aspect_x / aspect_y, h as f64),
        (None, None) => return 1.0,
    };

    let output_pixels = output_width * output_height;
    if output_pixels > 0.0 && output_pixels < input_pixels {
        output_pixels / input_pixels
    } else {
        1.0
    }
}

/// Video bitrate from the size budget: subtract the audio bitrate, apply
/// the pixel-scaling compensation and floor at the configured minimum or
/// the codec's own floor, whichever is higher. Only meaningful when a
/// video codec and a target size are both present.
pub fn plan_video_bitrate(
    options: &Options,
    computed: &ComputedOptions,
    metadata: &Metadata,
) -> Result<f64, AppError> {
    let size_kbps = options.size_kbps.ok_or_else(|| {
        AppError::validation("Cannot plan a video bitrate without a target size.")
    })?;

    if metadata.duration_seconds <= 0.0 {
        return Err(AppError::validation(
            "Cannot plan a video bitrate: input duration is zero or unknown.",
        ));
    }

    let audio_bitrate_kbps = computed.audio_bitrate_kbps.unwrap_or(0.0);
    let ratio = pixel_ratio(options, metadata);
    let budget_kbps =
        size_kbps / metadata.duration_seconds * (1.0 - options.overshoot_correction);

    let codec_floor = options
        .video_codec
        .as_ref()
        .map(|c| c.min_bitrate_kbps)
        .unwrap_or(0.0);
    Ok(options
        .min_video_bitrate_kbps
        .max(codec_floor)
        .max(ratio * (budget_kbps - audio_bitrate_kbps)))
}
