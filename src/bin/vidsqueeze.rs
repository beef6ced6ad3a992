//! Command-line front end: parse flags into an [`Options`], run one
//! compression request and mirror its notifications onto stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc;

use vidsqueeze::encoder::{EncodeEvent, Encoder, EventSink};
use vidsqueeze::ffmpeg::{available_encoders, probe};
use vidsqueeze::options::{AspectRatio, Options};
use vidsqueeze::{find_audio_codec, find_container, find_video_codec};

const USAGE: &str = "\
Usage: vidsqueeze [OPTIONS] <INPUT>

Options:
  -o, --output <PATH>     Output path without extension (default: <INPUT>.compressed)
      --video <CODEC>     Video codec: H.264, H.265, VP9
      --audio <CODEC>     Audio codec: AAC, OPUS, Vorbis, MP3
      --container <NAME>  Container: mp4, webm, mkv, mov
      --size <KBITS>      Target total size in kilobits
      --audio-quality <F> Audio quality fraction, 0.0-1.0
      --width <N>         Output width in pixels
      --height <N>        Output height in pixels
      --aspect <X:Y>      Output pixel aspect ratio
      --fps <F>           Output frame rate
      --speed <F>         Playback speed multiplier
      --custom <ARGS>     Extra arguments passed through to FFmpeg
      --probe             Print probed metadata as JSON and exit
      --encoders          Print the encoders this FFmpeg build supports
  -h, --help              Show this help
";

struct Cli {
    options: Options,
    probe_only: bool,
    list_encoders: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("{}", msg);
            }
            eprint!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    if cli.list_encoders {
        return match available_encoders() {
            Ok(listing) => {
                println!("{}", listing);
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {}", err);
                ExitCode::FAILURE
            }
        };
    }

    if cli.probe_only {
        return match probe(&cli.options.input_path) {
            Ok(metadata) => match serde_json::to_string_pretty(&metadata) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("error: {}", err);
                    ExitCode::FAILURE
                }
            },
            Err(err) => {
                eprintln!("error: {}", err);
                ExitCode::FAILURE
            }
        };
    }

    run_encode(cli.options)
}

fn run_encode(options: Options) -> ExitCode {
    let (tx, rx) = mpsc::channel();
    let sink: EventSink = Arc::new(move |event| {
        let _ = tx.send(event);
    });

    let encoder = Encoder::new();
    let worker = std::thread::spawn(move || encoder.encode(options, sink));

    let mut code = ExitCode::SUCCESS;
    for event in rx {
        match event {
            EncodeEvent::Started {
                video_bitrate_kbps,
                audio_bitrate_kbps,
            } => {
                eprintln!(
                    "encoding started (video {:.0} kbps, audio {:.0} kbps)",
                    video_bitrate_kbps, audio_bitrate_kbps
                );
            }
            EncodeEvent::Progress { percent } => {
                eprintln!("progress: {}%", percent);
            }
            EncodeEvent::Succeeded { output, .. } => {
                let size = output.metadata().map(|m| m.len()).unwrap_or(0);
                println!("done ({} bytes)", size);
            }
            EncodeEvent::Failed { summary, details } => {
                eprintln!("error: {}", summary);
                log::debug!(target: "vidsqueeze::cli", "failure details:\n{}", details);
                code = ExitCode::FAILURE;
            }
        }
    }

    let _ = worker.join();
    code
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut options = Options::default();
    let mut input = None;
    let mut probe_only = false;
    let mut list_encoders = false;
    let mut output = None;

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("missing value for {}", name))
        };
        match arg.as_str() {
            "-h" | "--help" => return Err(String::new()),
            "--probe" => probe_only = true,
            "--encoders" => list_encoders = true,
            "-o" | "--output" => output = Some(PathBuf::from(value("--output")?)),
            "--video" => {
                let name = value("--video")?;
                options.video_codec =
                    Some(find_video_codec(&name).ok_or_else(|| format!("unknown video codec '{}'", name))?);
            }
            "--audio" => {
                let name = value("--audio")?;
                options.audio_codec =
                    Some(find_audio_codec(&name).ok_or_else(|| format!("unknown audio codec '{}'", name))?);
            }
            "--container" => {
                let name = value("--container")?;
                options.container =
                    Some(find_container(&name).ok_or_else(|| format!("unknown container '{}'", name))?);
            }
            "--size" => options.size_kbps = Some(parse_number(&value("--size")?, "--size")?),
            "--audio-quality" => {
                options.audio_quality = Some(parse_number(&value("--audio-quality")?, "--audio-quality")?)
            }
            "--width" => options.output_width = Some(parse_integer(&value("--width")?, "--width")?),
            "--height" => options.output_height = Some(parse_integer(&value("--height")?, "--height")?),
            "--aspect" => options.aspect_ratio = Some(parse_aspect(&value("--aspect")?)?),
            "--fps" => options.fps = Some(parse_number(&value("--fps")?, "--fps")?),
            "--speed" => options.speed = Some(parse_number(&value("--speed")?, "--speed")?),
            "--custom" => options.custom_args = Some(value("--custom")?),
            other if other.starts_with('-') => return Err(format!("unknown option '{}'", other)),
            other => {
                if input.replace(PathBuf::from(other)).is_some() {
                    return Err("only one input file may be given".to_string());
                }
            }
        }
    }

    let input = match input {
        Some(path) => path,
        None if list_encoders => PathBuf::new(),
        None => return Err("no input file given".to_string()),
    };
    options.output_path = output.unwrap_or_else(|| {
        let mut name = input.as_os_str().to_owned();
        name.push(".compressed");
        PathBuf::from(name)
    });
    options.input_path = input;

    Ok(Cli {
        options,
        probe_only,
        list_encoders,
    })
}

fn parse_number(raw: &str, name: &str) -> Result<f64, String> {
    raw.parse()
        .map_err(|_| format!("invalid number '{}' for {}", raw, name))
}

fn parse_integer(raw: &str, name: &str) -> Result<i64, String> {
    raw.parse()
        .map_err(|_| format!("invalid integer '{}' for {}", raw, name))
}

fn parse_aspect(raw: &str) -> Result<AspectRatio, String> {
    let (x, y) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid aspect ratio '{}', expected X:Y", raw))?;
    Ok(AspectRatio {
        x: parse_integer(x, "--aspect")?,
        y: parse_integer(y, "--aspect")?,
    })
}
