#![forbid(unsafe_code)]

//! Turns one upstream "video info" response into download options.
//!
//! The info endpoint describes an item's encodings in up to three shapes: a
//! form-encoded stream map, an HLS playlist URL and a DASH manifest URL. Each
//! shape has its own extractor; all of them run and their options are
//! concatenated.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use url::{Url, form_urlencoded};

use crate::catalog::{self, MediaType};
use crate::error::{RipError, RipResult};
use crate::http::Transport;

pub const INFO_URL: &str = "https://www.youtube.com/get_video_info";

const STREAM_MAP_KEY: &str = "url_encoded_fmt_stream_map";
const HLS_PLAYLIST_KEY: &str = "hlsvp";
const DASH_MANIFEST_KEY: &str = "dashmpd";

static HLS_ITAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"itag/(\d+)/").expect("static itag pattern"));

/// A catalogued media type paired with its fetch URL. URLs expire quickly, so
/// options are never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOption {
    pub media_type: &'static MediaType,
    pub url: String,
}

/// Parsed info document. Keys may repeat, so every key maps to all of its
/// values in document order.
#[derive(Debug, Clone, Default)]
pub struct VideoInfo {
    fields: HashMap<String, Vec<String>>,
}

impl VideoInfo {
    pub fn parse(body: &str) -> Self {
        Self {
            fields: parse_multimap(body),
        }
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Fails when upstream flagged the request with an `errorcode`.
    pub fn ensure_accepted(&self, video_id: &str) -> RipResult<()> {
        if self.fields.contains_key("errorcode") {
            return Err(RipError::UpstreamRejected {
                video_id: video_id.to_owned(),
                reason: self.first("reason").unwrap_or("no reason given").to_owned(),
            });
        }
        Ok(())
    }
}

/// Builds the info endpoint URL for one item.
pub fn info_url(video_id: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("asv", "3")
        .append_pair("el", "detailpage")
        .append_pair("hl", "en_US")
        .append_pair("video_id", video_id)
        .finish();
    format!("{INFO_URL}?{query}")
}

/// Fetches the info document for `video_id` and runs every extractor on it.
pub fn resolve_options(video_id: &str, transport: &dyn Transport) -> RipResult<Vec<DownloadOption>> {
    let body = transport.fetch_text(&info_url(video_id))?;
    let info = VideoInfo::parse(&body);
    info.ensure_accepted(video_id)?;
    collect_options(&info, transport)
}

/// Concatenates stream-map, HLS and DASH options, in that order.
pub fn collect_options(info: &VideoInfo, transport: &dyn Transport) -> RipResult<Vec<DownloadOption>> {
    let mut options = stream_map_options(info)?;
    options.extend(fetch_playlist_options(info, transport)?);
    options.extend(fetch_manifest_options(info, transport)?);
    Ok(options)
}

/// Reads the form-encoded stream map.
///
/// The map is a comma-joined list of form-encoded entries parsed as one flat
/// document, so scalar values can carry the start of the next entry
/// (`sig=abc,quality=medium`). Those tails are cut at the first comma. A
/// single signature applies to every entry.
pub fn stream_map_options(info: &VideoInfo) -> RipResult<Vec<DownloadOption>> {
    let Some(raw) = info.first(STREAM_MAP_KEY) else {
        return Ok(Vec::new());
    };
    let map = parse_multimap(raw);
    let itags = required(&map, "itag")?;
    let urls = required(&map, "url")?;
    let signatures = required(&map, "sig")?;
    let fallback_host = leading_value(&required(&map, "fallback_host")?[0]);

    itags
        .iter()
        .zip(urls)
        .zip(signatures.iter().cycle())
        .map(|((itag, base_url), signature)| -> RipResult<DownloadOption> {
            let media_type = catalogued(parse_format_id(leading_value(itag))?)?;
            let url = signed_url(base_url, leading_value(signature), fallback_host)?;
            Ok(DownloadOption { media_type, url })
        })
        .collect()
}

/// Lazily reads an HLS playlist: every non-empty, non-comment line is a media
/// URL carrying its format id as an `itag/<digits>/` path segment.
pub fn playlist_options(playlist: &str) -> impl Iterator<Item = RipResult<DownloadOption>> + '_ {
    playlist
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| -> RipResult<DownloadOption> {
            let digits = HLS_ITAG
                .captures(line)
                .and_then(|captures| captures.get(1))
                .ok_or_else(|| RipError::malformed(format!("playlist entry without itag: {line}")))?;
            let media_type = catalogued(parse_format_id(digits.as_str())?)?;
            Ok(DownloadOption {
                media_type,
                url: line.to_owned(),
            })
        })
}

/// Reads a DASH-like manifest. Only `Representation` elements are looked at,
/// at any depth; each must carry an `id` and a `BaseURL` child.
pub fn manifest_options(manifest: &str) -> RipResult<Vec<DownloadOption>> {
    let doc = roxmltree::Document::parse(manifest)
        .map_err(|err| RipError::malformed(format!("manifest XML: {err}")))?;

    doc.descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "Representation")
        .map(|representation| -> RipResult<DownloadOption> {
            let id = representation
                .attribute("id")
                .ok_or_else(|| RipError::malformed("Representation without id"))?;
            let url = representation
                .children()
                .find(|child| child.is_element() && child.tag_name().name() == "BaseURL")
                .and_then(|child| child.text())
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .ok_or_else(|| RipError::malformed(format!("Representation {id} without BaseURL")))?;
            Ok(DownloadOption {
                media_type: catalogued(parse_format_id(id)?)?,
                url: url.to_owned(),
            })
        })
        .collect()
}

fn fetch_playlist_options(info: &VideoInfo, transport: &dyn Transport) -> RipResult<Vec<DownloadOption>> {
    let Some(url) = info.first(HLS_PLAYLIST_KEY) else {
        return Ok(Vec::new());
    };
    let playlist = transport.fetch_text(url)?;
    playlist_options(&playlist).collect()
}

fn fetch_manifest_options(info: &VideoInfo, transport: &dyn Transport) -> RipResult<Vec<DownloadOption>> {
    let Some(url) = info.first(DASH_MANIFEST_KEY) else {
        return Ok(Vec::new());
    };
    let manifest = transport.fetch_text(url)?;
    manifest_options(&manifest)
}

fn parse_multimap(raw: &str) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        map.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    map
}

fn required<'a>(map: &'a HashMap<String, Vec<String>>, key: &str) -> RipResult<&'a [String]> {
    map.get(key)
        .map(Vec::as_slice)
        .filter(|values| !values.is_empty())
        .ok_or_else(|| RipError::malformed(format!("stream map is missing `{key}`")))
}

fn leading_value(value: &str) -> &str {
    value.split_once(',').map_or(value, |(head, _)| head)
}

fn parse_format_id(raw: &str) -> RipResult<u32> {
    raw.trim()
        .parse()
        .map_err(|_| RipError::malformed(format!("format id is not a number: {raw:?}")))
}

fn catalogued(format_id: u32) -> RipResult<&'static MediaType> {
    catalog::lookup(format_id).map_err(|_| RipError::UnrecognizedFormat(format_id))
}

fn signed_url(base_url: &str, signature: &str, fallback_host: &str) -> RipResult<String> {
    let mut url = Url::parse(base_url)
        .map_err(|err| RipError::malformed(format!("stream URL {base_url:?}: {err}")))?;
    url.query_pairs_mut()
        .append_pair("signature", signature)
        .append_pair("fallback_host", fallback_host);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeTransport;

    const HOST: &str = "tc.v1.cache.example.com";

    fn entry(itag: &str, url: &str, sig: Option<&str>) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer
            .append_pair("quality", "medium")
            .append_pair("itag", itag)
            .append_pair("url", url)
            .append_pair("fallback_host", HOST);
        if let Some(sig) = sig {
            serializer.append_pair("sig", sig);
        }
        serializer.finish()
    }

    fn info_with(pairs: &[(&str, &str)]) -> VideoInfo {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        VideoInfo::parse(&body)
    }

    fn stream_info(entries: &[String]) -> VideoInfo {
        info_with(&[("status", "ok"), (STREAM_MAP_KEY, &entries.join(","))])
    }

    #[test]
    fn info_url_encodes_video_id() {
        assert_eq!(
            info_url("abc_DEF-123"),
            "https://www.youtube.com/get_video_info?asv=3&el=detailpage&hl=en_US&video_id=abc_DEF-123"
        );
    }

    #[test]
    fn upstream_error_is_reported_with_reason() {
        let info = info_with(&[("status", "fail"), ("errorcode", "150"), ("reason", "Embedding disabled")]);
        match info.ensure_accepted("abcdefghijk").unwrap_err() {
            RipError::UpstreamRejected { video_id, reason } => {
                assert_eq!(video_id, "abcdefghijk");
                assert_eq!(reason, "Embedding disabled");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn stream_map_strips_quality_suffix_from_signature() {
        // The second entry's leading `quality=` lands on the first signature.
        let info = stream_info(&[
            entry("22", "https://media.example/v?id=22", Some("AAA.BBB")),
            entry("18", "https://media.example/v?id=18", Some("CCC.DDD")),
        ]);
        let options = stream_map_options(&info).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].media_type.format_id(), 22);
        assert_eq!(
            options[0].url,
            format!("https://media.example/v?id=22&signature=AAA.BBB&fallback_host={HOST}")
        );
        assert_eq!(options[1].media_type.format_id(), 18);
        assert!(options[1].url.contains("signature=CCC.DDD&"));
    }

    #[test]
    fn stream_map_strips_explicit_quality_high_suffix() {
        let raw = format!(
            "itag=45&url={}&fallback_host={HOST}&sig=SIG123,quality=high",
            "https%3A%2F%2Fmedia.example%2Fv45"
        );
        let info = info_with(&[(STREAM_MAP_KEY, &raw)]);
        let options = stream_map_options(&info).unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(
            options[0].url,
            format!("https://media.example/v45?signature=SIG123&fallback_host={HOST}")
        );
    }

    #[test]
    fn stream_map_cycles_single_shared_signature() {
        let info = stream_info(&[
            entry("22", "https://media.example/a", None),
            entry("18", "https://media.example/b", None),
            entry("43", "https://media.example/c", Some("SHARED")),
        ]);
        let options = stream_map_options(&info).unwrap();
        let ids: Vec<u32> = options.iter().map(|o| o.media_type.format_id()).collect();
        assert_eq!(ids, vec![22, 18, 43]);
        for option in &options {
            assert!(option.url.contains("signature=SHARED&"), "{}", option.url);
            assert!(option.url.ends_with(&format!("fallback_host={HOST}")));
        }
    }

    #[test]
    fn stream_map_rejects_uncatalogued_itag() {
        let info = stream_info(&[entry("999", "https://media.example/x", Some("S"))]);
        let err = stream_map_options(&info).unwrap_err();
        assert!(matches!(err, RipError::UnrecognizedFormat(999)));
    }

    #[test]
    fn stream_map_requires_signature_and_fallback_host() {
        let info = info_with(&[(STREAM_MAP_KEY, "itag=22&url=https%3A%2F%2Fm%2Fv&fallback_host=h")]);
        assert!(matches!(
            stream_map_options(&info).unwrap_err(),
            RipError::MalformedResponse(_)
        ));

        let info = info_with(&[(STREAM_MAP_KEY, "itag=22&url=https%3A%2F%2Fm%2Fv&sig=S")]);
        assert!(matches!(
            stream_map_options(&info).unwrap_err(),
            RipError::MalformedResponse(_)
        ));
    }

    #[test]
    fn absent_stream_map_yields_nothing() {
        let info = info_with(&[("status", "ok")]);
        assert!(stream_map_options(&info).unwrap().is_empty());
    }

    #[test]
    fn playlist_lines_become_options() {
        let playlist = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=1000\n\
            https://hls.example/api/itag/136/index.m3u8\n\
            \n\
            #EXT-X-STREAM-INF:BANDWIDTH=200\n\
            https://hls.example/api/itag/140/index.m3u8\n";
        let options: Vec<_> = playlist_options(playlist).collect::<RipResult<_>>().unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].media_type.format_id(), 136);
        assert_eq!(options[0].url, "https://hls.example/api/itag/136/index.m3u8");
        assert_eq!(options[1].media_type.format_id(), 140);
    }

    #[test]
    fn playlist_entry_without_itag_is_malformed() {
        let err = playlist_options("https://hls.example/plain.m3u8\n")
            .collect::<RipResult<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, RipError::MalformedResponse(_)));
    }

    #[test]
    fn manifest_representations_found_at_any_depth() {
        let manifest = r#"<?xml version="1.0"?>
            <MPD xmlns="urn:mpeg:DASH:schema:MPD:2011">
              <Period>
                <AdaptationSet mimeType="video/mp4">
                  <Representation id="137" bandwidth="4000000">
                    <BaseURL>https://dash.example/137</BaseURL>
                  </Representation>
                </AdaptationSet>
                <AdaptationSet mimeType="audio/mp4">
                  <ContentComponent id="1"/>
                  <Representation id="140">
                    <BaseURL> https://dash.example/140 </BaseURL>
                  </Representation>
                </AdaptationSet>
              </Period>
            </MPD>"#;
        let options = manifest_options(manifest).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].media_type.format_id(), 137);
        assert_eq!(options[0].url, "https://dash.example/137");
        assert_eq!(options[1].media_type.format_id(), 140);
        assert_eq!(options[1].url, "https://dash.example/140");
    }

    #[test]
    fn manifest_errors_are_malformed_or_unrecognized() {
        assert!(matches!(
            manifest_options("<MPD><Period>").unwrap_err(),
            RipError::MalformedResponse(_)
        ));
        assert!(matches!(
            manifest_options("<MPD><Representation id=\"137\"/></MPD>").unwrap_err(),
            RipError::MalformedResponse(_)
        ));
        assert!(matches!(
            manifest_options("<MPD><Representation id=\"4242\"><BaseURL>u</BaseURL></Representation></MPD>")
                .unwrap_err(),
            RipError::UnrecognizedFormat(4242)
        ));
    }

    #[test]
    fn resolve_options_runs_every_extractor() {
        let playlist_url = "https://hls.example/master.m3u8";
        let manifest_url = "https://dash.example/manifest.mpd";
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair(
                STREAM_MAP_KEY,
                &entry("22", "https://media.example/v22", Some("S")),
            )
            .append_pair(HLS_PLAYLIST_KEY, playlist_url)
            .append_pair(DASH_MANIFEST_KEY, manifest_url)
            .finish();
        let transport = FakeTransport::new()
            .route(info_url("abcdefghijk"), body)
            .route(playlist_url, "#EXTM3U\nhttps://hls.example/itag/135/x\n")
            .route(
                manifest_url,
                "<MPD><Representation id=\"172\"><BaseURL>https://dash.example/172</BaseURL></Representation></MPD>",
            );

        let options = resolve_options("abcdefghijk", &transport).unwrap();
        let ids: Vec<u32> = options.iter().map(|o| o.media_type.format_id()).collect();
        assert_eq!(ids, vec![22, 135, 172]);
        assert_eq!(transport.hits(), 3);
    }

    #[test]
    fn resolve_options_short_circuits_on_upstream_error() {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("errorcode", "100")
            .append_pair("reason", "removed")
            .append_pair(HLS_PLAYLIST_KEY, "https://hls.example/never")
            .finish();
        let transport = FakeTransport::new().route(info_url("abcdefghijk"), body);
        let err = resolve_options("abcdefghijk", &transport).unwrap_err();
        assert!(matches!(err, RipError::UpstreamRejected { .. }));
        assert_eq!(transport.hits(), 1);
    }
}
