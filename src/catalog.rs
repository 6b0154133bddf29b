#![forbid(unsafe_code)]

//! Static reference table describing every upstream encoding profile (itag)
//! we know how to rank.
//!
//! Entries are versioned reference data: a format id missing from this table
//! is an error, never a silent default, because ranking on made-up
//! characteristics would pick the wrong stream.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use crate::error::{RipError, RipResult};

/// Container formats, declared in ascending order of preference. The derived
/// `Ord` is the container rank used by the quality selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Container {
    ThreeGp,
    Flv,
    Mp4,
    WebM,
}

impl Container {
    pub const ALL: [Container; 4] = [
        Container::ThreeGp,
        Container::Flv,
        Container::Mp4,
        Container::WebM,
    ];

    /// File extension used for media written in this container.
    pub fn extension(self) -> &'static str {
        match self {
            Container::ThreeGp => "3gp",
            Container::Flv => "flv",
            Container::Mp4 => "mp4",
            Container::WebM => "webm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    SorensonH263,
    Mpeg4Visual,
    H264,
    Vp8,
    Vp9,
}

impl VideoCodec {
    pub fn name(self) -> &'static str {
        match self {
            VideoCodec::SorensonH263 => "Sorenson h.263",
            VideoCodec::Mpeg4Visual => "MPEG-4 Visual",
            VideoCodec::H264 => "h.264",
            VideoCodec::Vp8 => "vp8",
            VideoCodec::Vp9 => "vp9",
        }
    }
}

/// Audio codecs in ascending order of preference (the codec rank).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AudioCodec {
    Mp3,
    Aac,
    Vorbis,
}

impl AudioCodec {
    pub fn name(self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Aac => "aac",
            AudioCodec::Vorbis => "vorbis",
        }
    }
}

/// Video half of a media type. Bitrate is the minimum rate in Mbit/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoTrack {
    pub width: u32,
    pub height: u32,
    pub codec: VideoCodec,
    pub bitrate_mbps: f64,
}

impl VideoTrack {
    pub fn pixels(&self) -> u32 {
        self.width * self.height
    }
}

/// Audio half of a media type. Bitrate is in kbit/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrack {
    pub codec: AudioCodec,
    pub bitrate_kbps: u32,
}

/// Immutable descriptor of one encoding variant.
///
/// Video and audio characteristics travel as whole tracks so a half-filled
/// track cannot be expressed, and the private constructors guarantee at least
/// one track is present. Identity is the format id alone.
#[derive(Debug, Clone, Copy)]
pub struct MediaType {
    format_id: u32,
    container: Container,
    video: Option<VideoTrack>,
    audio: Option<AudioTrack>,
}

impl MediaType {
    const fn muxed(
        format_id: u32,
        container: Container,
        (width, height): (u32, u32),
        video_codec: VideoCodec,
        bitrate_mbps: f64,
        audio_codec: AudioCodec,
        bitrate_kbps: u32,
    ) -> Self {
        Self {
            format_id,
            container,
            video: Some(VideoTrack {
                width,
                height,
                codec: video_codec,
                bitrate_mbps,
            }),
            audio: Some(AudioTrack {
                codec: audio_codec,
                bitrate_kbps,
            }),
        }
    }

    const fn video_only(
        format_id: u32,
        container: Container,
        (width, height): (u32, u32),
        codec: VideoCodec,
        bitrate_mbps: f64,
    ) -> Self {
        Self {
            format_id,
            container,
            video: Some(VideoTrack {
                width,
                height,
                codec,
                bitrate_mbps,
            }),
            audio: None,
        }
    }

    const fn audio_only(
        format_id: u32,
        container: Container,
        codec: AudioCodec,
        bitrate_kbps: u32,
    ) -> Self {
        Self {
            format_id,
            container,
            video: None,
            audio: Some(AudioTrack {
                codec,
                bitrate_kbps,
            }),
        }
    }

    pub fn format_id(&self) -> u32 {
        self.format_id
    }

    pub fn container(&self) -> Container {
        self.container
    }

    pub fn video(&self) -> Option<&VideoTrack> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&AudioTrack> {
        self.audio.as_ref()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.format_id == other.format_id
    }
}

impl Eq for MediaType {}

impl Hash for MediaType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.format_id.hash(state);
    }
}

use AudioCodec::{Aac, Mp3, Vorbis};
use Container::{Flv, Mp4, ThreeGp, WebM};
use VideoCodec::{H264, Mpeg4Visual, SorensonH263, Vp8, Vp9};

// Entries 13 and 46 carry guessed characteristics, as do the 100-range webm
// profiles and the vp9 video-only bitrates. They rank plausibly but are not
// verified upstream data.
static ENTRIES: &[MediaType] = &[
    MediaType::muxed(5, Flv, (320, 240), SorensonH263, 0.25, Mp3, 64),
    MediaType::muxed(6, Flv, (400, 270), SorensonH263, 0.8, Mp3, 64),
    MediaType::muxed(13, ThreeGp, (400, 270), Mpeg4Visual, 0.5, Aac, 24),
    MediaType::muxed(17, ThreeGp, (176, 144), Mpeg4Visual, 0.05, Aac, 24),
    MediaType::muxed(18, Mp4, (400, 270), H264, 0.5, Aac, 96),
    MediaType::muxed(22, Mp4, (1280, 720), H264, 2.0, Aac, 192),
    MediaType::muxed(34, Flv, (480, 360), H264, 0.5, Aac, 128),
    MediaType::muxed(35, Flv, (640, 480), H264, 0.8, Aac, 128),
    MediaType::muxed(36, ThreeGp, (320, 240), Mpeg4Visual, 0.17, Aac, 38),
    MediaType::muxed(37, Mp4, (1920, 1080), H264, 3.0, Aac, 192),
    MediaType::muxed(38, Mp4, (4096, 3072), H264, 3.5, Aac, 192),
    MediaType::muxed(43, WebM, (480, 360), Vp8, 0.5, Vorbis, 128),
    MediaType::muxed(44, WebM, (640, 480), Vp8, 1.0, Vorbis, 128),
    MediaType::muxed(45, WebM, (1280, 720), Vp8, 2.0, Vorbis, 192),
    MediaType::muxed(46, WebM, (1920, 1080), Vp8, 3.0, Vorbis, 192),
    MediaType::muxed(82, Mp4, (480, 360), H264, 0.5, Aac, 96),
    MediaType::muxed(83, Mp4, (320, 240), H264, 0.5, Aac, 96),
    MediaType::muxed(84, Mp4, (1280, 720), H264, 2.0, Aac, 152),
    MediaType::muxed(85, Mp4, (576, 520), H264, 2.0, Aac, 152),
    MediaType::muxed(100, WebM, (480, 360), Vp8, 0.5, Vorbis, 128),
    MediaType::muxed(101, WebM, (480, 360), Vp8, 0.5, Vorbis, 192),
    MediaType::muxed(102, WebM, (1280, 720), Vp8, 2.0, Vorbis, 192),
    MediaType::muxed(120, Flv, (1280, 720), H264, 2.0, Aac, 128),
    MediaType::video_only(133, Mp4, (320, 240), H264, 0.2),
    MediaType::video_only(134, Mp4, (480, 360), H264, 0.3),
    MediaType::video_only(135, Mp4, (640, 480), H264, 0.5),
    MediaType::video_only(136, Mp4, (1280, 720), H264, 1.0),
    MediaType::video_only(137, Mp4, (1920, 1080), H264, 2.0),
    MediaType::audio_only(139, Mp4, Aac, 48),
    MediaType::audio_only(140, Mp4, Aac, 128),
    MediaType::audio_only(141, Mp4, Aac, 256),
    MediaType::video_only(160, Mp4, (176, 144), H264, 0.1),
    MediaType::audio_only(171, WebM, Vorbis, 128),
    MediaType::audio_only(172, WebM, Vorbis, 192),
    MediaType::video_only(242, WebM, (426, 240), Vp9, 0.15),
    MediaType::video_only(243, WebM, (640, 360), Vp9, 0.3),
    MediaType::video_only(244, WebM, (854, 480), Vp9, 0.5),
    MediaType::video_only(247, WebM, (1280, 720), Vp9, 1.5),
    MediaType::video_only(248, WebM, (1920, 1080), Vp9, 3.0),
];

static CATALOG: LazyLock<HashMap<u32, &'static MediaType>> =
    LazyLock::new(|| ENTRIES.iter().map(|entry| (entry.format_id, entry)).collect());

/// Returns the catalogued characteristics for `format_id`.
pub fn lookup(format_id: u32) -> RipResult<&'static MediaType> {
    CATALOG
        .get(&format_id)
        .copied()
        .ok_or(RipError::UnknownFormat(format_id))
}
