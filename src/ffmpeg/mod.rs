mod builder;
mod diagnostic;
pub mod discovery;
mod probe;
mod progress;

pub use builder::{
    EXTENSION_QUERY_TIMEOUT, build_ffmpeg_args, format_command_line, resolve_container_extension,
};
pub use diagnostic::extract_diagnostic;
pub use discovery::available_encoders;
pub use probe::{PROBE_TIMEOUT, parse_probe_json, probe, probe_async, probe_with_timeout};
pub use progress::parse_transcode_progress;
