//! Compression orchestrator: the state machine around one external
//! FFmpeg process, from validation to a single terminal notification.
//!
//! Exactly one request may be in flight per [`Encoder`]; a second
//! request is rejected before any side effect. The merged child output
//! is consumed incrementally by two reader threads feeding one buffer;
//! both are joined before the exit status is taken, so no notification
//! can ever follow the terminal one.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::error::AppError;
use crate::ffmpeg::discovery::get_ffmpeg_path;
use crate::ffmpeg::{
    EXTENSION_QUERY_TIMEOUT, build_ffmpeg_args, extract_diagnostic, format_command_line,
    parse_transcode_progress, probe, resolve_container_extension,
};
use crate::options::{ComputedOptions, Options, validate_options};
use crate::planner::{plan_audio_bitrate, plan_video_bitrate};

/// Notification emitted at each externally visible step of a request.
/// `Started` always precedes any `Progress`; exactly one of
/// `Succeeded`/`Failed` closes the request.
#[derive(Debug)]
pub enum EncodeEvent {
    Started {
        video_bitrate_kbps: f64,
        audio_bitrate_kbps: f64,
    },
    Progress {
        percent: u32,
    },
    Succeeded {
        options: Options,
        computed: ComputedOptions,
        output: File,
    },
    Failed {
        summary: String,
        details: String,
    },
}

pub type EventSink = Arc<dyn Fn(EncodeEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EncodeState {
    #[default]
    Idle,
    Validating,
    Probing,
    Planning,
    Building,
    Running,
    Succeeded,
    Failed,
}

impl EncodeState {
    fn is_in_flight(self) -> bool {
        !matches!(self, Self::Idle | Self::Succeeded | Self::Failed)
    }
}

#[derive(Default)]
pub struct Encoder {
    state: Mutex<EncodeState>,
    active: Mutex<Option<std::process::Child>>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().is_in_flight()
    }

    /// Run one compression request to its terminal notification. All
    /// outcomes, including rejection, arrive through the sink; nothing
    /// is thrown across this boundary.
    pub fn encode(&self, options: Options, sink: EventSink) {
        if !self.begin() {
            let (summary, details) = AppError::Busy.into_failure_parts();
            sink(EncodeEvent::Failed { summary, details });
            return;
        }

        match self.run_request(&options, &sink) {
            Ok((computed, output)) => {
                self.transition(EncodeState::Succeeded);
                sink(EncodeEvent::Succeeded {
                    options,
                    computed,
                    output,
                });
            }
            Err(err) => {
                self.transition(EncodeState::Failed);
                let (summary, details) = err.into_failure_parts();
                sink(EncodeEvent::Failed { summary, details });
            }
        }
    }

    /// Async wrapper for callers on a tokio runtime; the blocking work
    /// runs on the blocking pool.
    pub async fn encode_async(self: Arc<Self>, options: Options, sink: EventSink) {
        let encoder = Arc::clone(&self);
        if let Err(join_err) =
            tokio::task::spawn_blocking(move || encoder.encode(options, sink)).await
        {
            log::error!(
                target: "vidsqueeze::encoder",
                "encode task failed to complete: {}",
                join_err
            );
        }
    }

    /// Kill the in-flight transcode, if any. The kill surfaces through
    /// the normal failing-exit path, so cleanup and the terminal
    /// notification still happen exactly once.
    pub fn terminate(&self) {
        let mut guard = self.active.lock();
        if let Some(mut child) = guard.take() {
            log::info!(target: "vidsqueeze::encoder", "terminating FFmpeg process");
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn begin(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_in_flight() {
            return false;
        }
        *state = EncodeState::Validating;
        true
    }

    fn transition(&self, next: EncodeState) {
        let mut state = self.state.lock();
        log::debug!(
            target: "vidsqueeze::encoder",
            "state {:?} -> {:?}",
            *state,
            next
        );
        *state = next;
    }

    fn run_request(
        &self,
        options: &Options,
        sink: &EventSink,
    ) -> Result<(ComputedOptions, File), AppError> {
        validate_options(options)?;

        let metadata = match options.input_metadata {
            Some(ref meta) => meta.clone(),
            None => {
                self.transition(EncodeState::Probing);
                probe(&options.input_path)?
            }
        };

        self.transition(EncodeState::Planning);
        let mut computed = ComputedOptions::default();
        if options.audio_codec.is_some() {
            computed.audio_bitrate_kbps = Some(plan_audio_bitrate(options));
        }
        if options.video_codec.is_some() && options.size_kbps.is_some() {
            computed.video_bitrate_kbps = Some(plan_video_bitrate(options, &computed, &metadata)?);
        }

        self.transition(EncodeState::Building);
        let format_name = options
            .container
            .as_ref()
            .map(|c| c.format_name.clone())
            .or_else(|| options.video_codec.as_ref().map(|c| c.default_format.clone()))
            .or_else(|| options.audio_codec.as_ref().map(|c| c.default_format.clone()))
            .ok_or_else(|| AppError::build("No container or codec to derive a format from."))?;
        let extension = resolve_container_extension(&format_name, EXTENSION_QUERY_TIMEOUT)?;
        // The output path is extension-less by contract; the resolved
        // extension is appended, never substituted, so dots in the file
        // name survive.
        let output_path = {
            let mut raw = options.output_path.as_os_str().to_owned();
            raw.push(".");
            raw.push(&extension);
            PathBuf::from(raw)
        };
        let args = build_ffmpeg_args(
            options,
            &computed,
            &format_name,
            &output_path.to_string_lossy(),
        );

        self.transition(EncodeState::Running);
        sink(EncodeEvent::Started {
            video_bitrate_kbps: computed.video_bitrate_kbps.unwrap_or(0.0),
            audio_bitrate_kbps: computed.audio_bitrate_kbps.unwrap_or(0.0),
        });

        let output = self.run_transcode(args, metadata.duration_seconds, &output_path, sink)?;
        Ok((computed, output))
    }

    fn run_transcode(
        &self,
        args: Vec<String>,
        total_duration_secs: f64,
        output_path: &Path,
        sink: &EventSink,
    ) -> Result<File, AppError> {
        let ffmpeg = get_ffmpeg_path()?;
        let command_line = format_command_line(&ffmpeg.to_string_lossy(), &args);

        // The active slot is held across the spawn: terminate() sees
        // either no request or the live child, never a half-started one.
        let (stdout, stderr) = {
            let mut active = self.active.lock();
            let mut child = Command::new(ffmpeg)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| {
                    AppError::encode_failed(
                        format!("Failed to start FFmpeg: {}", e),
                        command_line.clone(),
                    )
                })?;

            match (child.stdout.take(), child.stderr.take()) {
                (Some(out), Some(err)) => {
                    *active = Some(child);
                    (out, err)
                }
                _ => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AppError::encode_failed(
                        "Failed to capture FFmpeg output.",
                        command_line,
                    ));
                }
            }
        };

        let buffer = Arc::new(Mutex::new(String::new()));
        let stdout_handle = read_stream(
            stdout,
            Arc::clone(&buffer),
            total_duration_secs,
            Arc::clone(sink),
        );
        let stderr_handle = read_stream(
            stderr,
            Arc::clone(&buffer),
            total_duration_secs,
            Arc::clone(sink),
        );
        let _ = stdout_handle.join();
        let _ = stderr_handle.join();

        let child = self.active.lock().take();
        let raw_output = std::mem::take(&mut *buffer.lock());

        let status = match child {
            Some(mut c) => c.wait()?,
            None => {
                // terminate() took the handle; route through the same
                // failure path as any failing exit.
                log::warn!(
                    target: "vidsqueeze::encoder",
                    "transcode was terminated externally"
                );
                return Err(AppError::encode_failed(
                    "Encoding was stopped.",
                    format!("{}\n\n{}", command_line, raw_output),
                ));
            }
        };

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            let diagnostic = extract_diagnostic(&raw_output);
            let summary = if diagnostic.is_empty() {
                format!("FFmpeg failed (exit code {}).", code)
            } else {
                diagnostic
            };
            log::error!(
                target: "vidsqueeze::encoder",
                "FFmpeg failed (code={}): {}",
                code,
                summary
            );
            return Err(AppError::encode_failed(
                summary,
                format!("{}\n\n{}", command_line, raw_output),
            ));
        }

        match File::open(output_path) {
            Ok(file) => {
                log::info!(
                    target: "vidsqueeze::encoder",
                    "compression finished: {}",
                    output_path.display()
                );
                Ok(file)
            }
            Err(e) => Err(AppError::encode_failed(
                "Could not open the compressed media.",
                e.to_string(),
            )),
        }
    }
}

/// Reads one child output stream in chunks, appending to the shared
/// buffer and emitting a progress notification whenever a chunk carries
/// a new timestamp. Chunks without one are normal.
fn read_stream<R: Read + Send + 'static>(
    mut reader: R,
    buffer: Arc<Mutex<String>>,
    total_duration_secs: f64,
    sink: EventSink,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        let mut last_percent = None;
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            };
            let text = String::from_utf8_lossy(&chunk[..n]).into_owned();
            buffer.lock().push_str(&text);
            if let Some(percent) = parse_transcode_progress(&text, total_duration_secs) {
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    sink(EncodeEvent::Progress { percent });
                }
            }
        }
    })
}
