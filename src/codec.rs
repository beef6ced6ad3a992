//! Static codec and container catalogs.
//!
//! Codec equality is by (name, library); the bitrate floor is advisory
//! metadata used by the planner, not part of identity.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Codec {
    pub name: String,
    pub library: String,
    pub min_bitrate_kbps: f64,
    /// Muxer used when the codec is encoded without an explicit container
    /// (audio-only output).
    pub default_format: String,
}

impl PartialEq for Codec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.library == other.library
    }
}

impl Eq for Codec {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    /// FFmpeg muxer name passed to `-f` and the extension query.
    pub format_name: String,
    pub supported_codecs: Vec<String>,
}

impl Container {
    pub fn supports(&self, codec_name: &str) -> bool {
        self.supported_codecs.iter().any(|c| c == codec_name)
    }
}

struct CodecRow {
    name: &'static str,
    library: &'static str,
    min_bitrate_kbps: f64,
    default_format: &'static str,
}

struct ContainerRow {
    name: &'static str,
    format_name: &'static str,
    supported_codecs: &'static [&'static str],
}

macro_rules! codec_table {
    (
        $table:ident, $names:ident:
        $( [$name:expr, $library:expr, $floor:expr, $format:expr] ),* $(,)?
    ) => {
        const $table: &[CodecRow] = &[
            $( CodecRow {
                name: $name,
                library: $library,
                min_bitrate_kbps: $floor,
                default_format: $format,
            } ),*
        ];

        pub const $names: &[&str] = &[ $($name),* ];
    };
}

codec_table!(
    VIDEO_CODEC_TABLE, VIDEO_CODEC_NAMES:
    ["H.264", "libx264", 64.0, "mp4"],
    ["H.265", "libx265", 64.0, "mp4"],
    ["VP9", "libvpx-vp9", 64.0, "webm"],
);

codec_table!(
    AUDIO_CODEC_TABLE, AUDIO_CODEC_NAMES:
    ["AAC", "aac", 32.0, "adts"],
    ["OPUS", "libopus", 16.0, "ogg"],
    ["Vorbis", "libvorbis", 64.0, "ogg"],
    ["MP3", "libmp3lame", 32.0, "mp3"],
);

const CONTAINER_TABLE: &[ContainerRow] = &[
    ContainerRow {
        name: "mp4",
        format_name: "mp4",
        supported_codecs: &["H.264", "H.265", "AAC", "MP3"],
    },
    ContainerRow {
        name: "webm",
        format_name: "webm",
        supported_codecs: &["VP9", "OPUS", "Vorbis"],
    },
    ContainerRow {
        name: "mkv",
        format_name: "matroska",
        supported_codecs: &["H.264", "H.265", "VP9", "AAC", "OPUS", "Vorbis", "MP3"],
    },
    ContainerRow {
        name: "mov",
        format_name: "mov",
        supported_codecs: &["H.264", "H.265", "AAC"],
    },
];

pub const CONTAINER_NAMES: &[&str] = &["mp4", "webm", "mkv", "mov"];

fn codec_from_row(row: &CodecRow) -> Codec {
    Codec {
        name: row.name.to_string(),
        library: row.library.to_string(),
        min_bitrate_kbps: row.min_bitrate_kbps,
        default_format: row.default_format.to_string(),
    }
}

pub fn find_video_codec(name: &str) -> Option<Codec> {
    VIDEO_CODEC_TABLE
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
        .map(codec_from_row)
}

pub fn find_audio_codec(name: &str) -> Option<Codec> {
    AUDIO_CODEC_TABLE
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
        .map(codec_from_row)
}

pub fn find_container(name: &str) -> Option<Container> {
    CONTAINER_TABLE
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
        .map(|row| Container {
            name: row.name.to_string(),
            format_name: row.format_name.to_string(),
            supported_codecs: row
                .supported_codecs
                .iter()
                .copied()
                .map(str::to_string)
                .collect(),
        })
}
