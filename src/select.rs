#![forbid(unsafe_code)]

//! Quality ranking and best-option selection.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::catalog::{AudioCodec, Container, MediaType};
use crate::error::{RipError, RipResult};
use crate::extract::DownloadOption;

/// Video ranking key: container rank, then pixel count, then bitrate.
#[derive(Debug, Clone, Copy)]
pub struct VideoQuality {
    container: Container,
    pixels: u32,
    bitrate_mbps: f64,
}

impl VideoQuality {
    pub fn of(media: &MediaType) -> Option<Self> {
        media.video().map(|video| Self {
            container: media.container(),
            pixels: video.pixels(),
            bitrate_mbps: video.bitrate_mbps,
        })
    }
}

impl Ord for VideoQuality {
    fn cmp(&self, other: &Self) -> Ordering {
        self.container
            .cmp(&other.container)
            .then(self.pixels.cmp(&other.pixels))
            .then(self.bitrate_mbps.total_cmp(&other.bitrate_mbps))
    }
}

impl PartialOrd for VideoQuality {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VideoQuality {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VideoQuality {}

/// Audio ranking key: codec rank, then bitrate. Field order drives the
/// derived ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AudioQuality {
    codec: AudioCodec,
    bitrate_kbps: u32,
}

impl AudioQuality {
    pub fn of(media: &MediaType) -> Option<Self> {
        media.audio().map(|audio| Self {
            codec: audio.codec,
            bitrate_kbps: audio.bitrate_kbps,
        })
    }
}

/// Which part of the final file a downloaded stream provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    Combined,
    Video,
    Audio,
}

/// Outcome of selection: either one stream acquired as-is, or a video and an
/// audio stream that must be remuxed together.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Combined(DownloadOption),
    Split {
        video: DownloadOption,
        audio: DownloadOption,
    },
}

impl Selection {
    /// Container of the final media file. For split selections the video
    /// stream decides.
    pub fn container(&self) -> Container {
        match self {
            Selection::Combined(option) => option.media_type.container(),
            Selection::Split { video, .. } => video.media_type.container(),
        }
    }

    pub fn parts(&self) -> Vec<(StreamRole, &DownloadOption)> {
        match self {
            Selection::Combined(option) => vec![(StreamRole::Combined, option)],
            Selection::Split { video, audio } => {
                vec![(StreamRole::Video, video), (StreamRole::Audio, audio)]
            }
        }
    }
}

/// Picks the best option(s) in a single pass.
///
/// Tracks the best option with video (muxed or not), the best muxed option
/// and the best audio-only option. Splitting is chosen only when it yields
/// strictly better video than any muxed stream; ties go to the muxed stream.
/// With neither a muxed nor an audio-only option the best video stream is
/// taken on its own.
pub fn select<I>(options: I) -> RipResult<Selection>
where
    I: IntoIterator<Item = DownloadOption>,
{
    let mut best_video: Option<(VideoQuality, DownloadOption)> = None;
    let mut best_combined: Option<(VideoQuality, DownloadOption)> = None;
    let mut best_audio: Option<(AudioQuality, DownloadOption)> = None;

    for option in options {
        let media = option.media_type;
        match (VideoQuality::of(media), AudioQuality::of(media)) {
            (Some(video_key), audio_key) => {
                if audio_key.is_some() && outranks(&best_combined, &video_key) {
                    best_combined = Some((video_key, option.clone()));
                }
                if outranks(&best_video, &video_key) {
                    best_video = Some((video_key, option));
                }
            }
            (None, Some(audio_key)) => {
                if outranks(&best_audio, &audio_key) {
                    best_audio = Some((audio_key, option));
                }
            }
            (None, None) => {}
        }
    }

    let (video_key, video) = best_video.ok_or(RipError::NoVideoOption)?;
    let selection = match (best_combined, best_audio) {
        (Some((combined_key, combined)), Some((_, audio))) => {
            if combined_key >= video_key {
                Selection::Combined(combined)
            } else {
                Selection::Split { video, audio }
            }
        }
        (Some((_, combined)), None) => Selection::Combined(combined),
        (None, Some((_, audio))) => Selection::Split { video, audio },
        (None, None) => Selection::Combined(video),
    };
    Ok(selection)
}

fn outranks<K: Ord>(current: &Option<(K, DownloadOption)>, candidate: &K) -> bool {
    current.as_ref().is_none_or(|(best, _)| candidate > best)
}
