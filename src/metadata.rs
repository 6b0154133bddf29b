#![forbid(unsafe_code)]

//! Sidecar metadata written next to every acquired media file.
//!
//! All structs in this module mirror the JSON persisted on disk. The sidecar
//! doubles as the ledger's completion marker, so it is only ever written
//! atomically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::MediaType;
use crate::error::RipResult;
use crate::feed::FeedItem;
use crate::select::{Selection, StreamRole};

/// Format version stamped into every sidecar.
pub const SIDECAR_VERSION: &str = "2.0";

/// Characteristics of one acquired encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTypeRecord {
    pub itag: u32,
    pub file_type: String,
    /// `[width, height]`, or `null` for audio-only streams.
    pub resolution: Option<(u32, u32)>,
    pub video_format: Option<String>,
    /// Minimum video bitrate in Mbit/s.
    pub video_bitrate: Option<f64>,
    pub audio_format: Option<String>,
    /// Audio bitrate in kbit/s.
    pub audio_bitrate: Option<u32>,
}

impl From<&MediaType> for MediaTypeRecord {
    fn from(media: &MediaType) -> Self {
        let video = media.video();
        let audio = media.audio();
        Self {
            itag: media.format_id(),
            file_type: media.container().extension().to_string(),
            resolution: video.map(|video| (video.width, video.height)),
            video_format: video.map(|video| video.codec.name().to_string()),
            video_bitrate: video.map(|video| video.bitrate_mbps),
            audio_format: audio.map(|audio| audio.codec.name().to_string()),
            audio_bitrate: audio.map(|audio| audio.bitrate_kbps),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub role: StreamRole,
    pub media_type: MediaTypeRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItemRecord {
    pub video_id: String,
    /// Seconds since the Unix epoch.
    pub upload_time: f64,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl From<&FeedItem> for FeedItemRecord {
    fn from(item: &FeedItem) -> Self {
        Self {
            video_id: item.video_id().to_string(),
            upload_time: item.upload_epoch(),
            title: item.title().to_string(),
            description: item.description().to_string(),
        }
    }
}

/// Top-level sidecar document: one or two content entries plus the feed
/// item the media was acquired for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    pub version: String,
    pub content: Vec<ContentRecord>,
    pub feed_item: FeedItemRecord,
}

impl Sidecar {
    pub fn new(selection: &Selection, item: &FeedItem) -> Self {
        let content = selection
            .parts()
            .into_iter()
            .map(|(role, option)| ContentRecord {
                role,
                media_type: MediaTypeRecord::from(option.media_type),
            })
            .collect();
        Self {
            version: SIDECAR_VERSION.to_string(),
            content,
            feed_item: FeedItemRecord::from(item),
        }
    }

    pub fn read(path: &Path) -> RipResult<Self> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw).map_err(io::Error::from)?)
    }

    /// Writes `<path>.tmp` and renames it over `path`, so readers never see
    /// a half-written sidecar.
    pub fn write_atomic(&self, path: &Path) -> RipResult<()> {
        let payload = serde_json::to_vec_pretty(self).map_err(io::Error::from)?;
        let tmp_path = tmp_path(path);
        fs::write(&tmp_path, payload)?;
        if let Err(err) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

/// `<base>.json`
pub fn sidecar_path(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::lookup;
    use crate::extract::DownloadOption;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    fn option(format_id: u32) -> DownloadOption {
        DownloadOption {
            media_type: lookup(format_id).unwrap(),
            url: format!("https://cdn/{format_id}"),
        }
    }

    fn item() -> FeedItem {
        FeedItem::new(
            "dQw4w9WgXcQ",
            Utc.with_ymd_and_hms(2013, 11, 9, 12, 30, 0).unwrap(),
            "Title",
            "Description",
        )
        .unwrap()
    }

    #[test]
    fn media_type_record_describes_both_tracks() {
        let record = MediaTypeRecord::from(lookup(22).unwrap());
        assert_eq!(record.itag, 22);
        assert_eq!(record.file_type, "mp4");
        assert_eq!(record.resolution, Some((1280, 720)));
        assert_eq!(record.video_format.as_deref(), Some("h.264"));
        assert_eq!(record.audio_format.as_deref(), Some("aac"));
        assert_eq!(record.audio_bitrate, Some(192));
    }

    #[test]
    fn split_sidecar_serializes_roles_and_null_resolution() {
        let selection = Selection::Split {
            video: option(248),
            audio: option(172),
        };
        let sidecar = Sidecar::new(&selection, &item());
        let json: Value = serde_json::to_value(&sidecar).unwrap();

        assert_eq!(json["version"], "2.0");
        assert_eq!(json["content"][0]["role"], "video");
        assert_eq!(json["content"][0]["media_type"]["resolution"][0], 1920);
        assert_eq!(json["content"][0]["media_type"]["audio_format"], Value::Null);
        assert_eq!(json["content"][1]["role"], "audio");
        assert_eq!(json["content"][1]["media_type"]["resolution"], Value::Null);
        assert_eq!(json["feed_item"]["video_id"], "dQw4w9WgXcQ");
        assert_eq!(json["feed_item"]["upload_time"], 1_384_000_200.0);
    }

    #[test]
    fn write_atomic_leaves_no_tmp_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = sidecar_path(&dir.path().join("1384000200_dQw4w9WgXcQ"));
        let sidecar = Sidecar::new(&Selection::Combined(option(22)), &item());

        sidecar.write_atomic(&path).unwrap();

        assert_eq!(path.file_name().unwrap(), "1384000200_dQw4w9WgXcQ.json");
        assert!(!tmp_path(&path).exists());
        assert_eq!(Sidecar::read(&path).unwrap(), sidecar);
    }
}
