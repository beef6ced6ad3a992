//! Size-targeted video compression on top of a local FFmpeg install.
//!
//! The crate probes input media, plans bitrates toward a requested
//! output size, builds an FFmpeg invocation and drives it to completion
//! while reporting progress through a caller-supplied sink.

pub mod codec;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
pub mod options;
pub mod planner;

pub use codec::{Codec, Container, find_audio_codec, find_container, find_video_codec};
pub use encoder::{EncodeEvent, Encoder, EventSink};
pub use error::AppError;
pub use options::{AspectRatio, ComputedOptions, Metadata, Options};
