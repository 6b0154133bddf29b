#![forbid(unsafe_code)]

//! Account upload feed: item records and the paged walk over the feed API.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{RipError, RipResult};
use crate::http::{self, Transport};
use crate::ledger::RetryPolicy;

pub const FEED_BASE_URL: &str = "https://gdata.youtube.com/feeds/api/users";

/// Entries requested per page. A shorter page is the last one.
pub const FEED_PAGE_SIZE: usize = 50;

const FEED_FIELDS: &str = "entry(id,title,published,media:group(media:description))";

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static video id pattern"));

/// One upload of the account.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    video_id: String,
    upload_time: DateTime<Utc>,
    title: String,
    description: String,
}

impl FeedItem {
    pub fn new(
        video_id: impl Into<String>,
        upload_time: DateTime<Utc>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> RipResult<Self> {
        let video_id = video_id.into();
        if !VIDEO_ID.is_match(&video_id) {
            return Err(RipError::malformed(format!(
                "feed entry has invalid video id {video_id:?}"
            )));
        }
        Ok(Self {
            video_id,
            upload_time,
            title: title.into(),
            description: description.into(),
        })
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn upload_time(&self) -> DateTime<Utc> {
        self.upload_time
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Upload time as fractional seconds since the Unix epoch.
    pub fn upload_epoch(&self) -> f64 {
        self.upload_time.timestamp() as f64
            + f64::from(self.upload_time.timestamp_subsec_micros()) / 1_000_000.0
    }

    /// `<epochSeconds>_<videoId>`, shared by the media file and its sidecar.
    pub fn base_name(&self) -> String {
        format!("{}_{}", self.upload_time.timestamp(), self.video_id)
    }
}

/// URL of the zero-based `page` of `username`'s uploads.
pub fn page_url(username: &str, page: usize) -> RipResult<String> {
    let start_index = (page * FEED_PAGE_SIZE + 1).to_string();
    let max_results = FEED_PAGE_SIZE.to_string();
    let mut url = Url::parse(FEED_BASE_URL)
        .map_err(|err| RipError::malformed(format!("feed base url: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| RipError::malformed(format!("feed base url {FEED_BASE_URL} has no path")))?
        .push(username)
        .push("uploads");
    url.query_pairs_mut()
        .append_pair("alt", "json")
        .append_pair("strict", "true")
        .append_pair("v", "2")
        .append_pair("fields", FEED_FIELDS)
        .append_pair("start-index", &start_index)
        .append_pair("max-results", &max_results);
    Ok(url.into())
}

#[derive(Debug, Deserialize)]
struct FeedDocument {
    feed: FeedBody,
}

#[derive(Debug, Deserialize)]
struct FeedBody {
    #[serde(default)]
    entry: Vec<FeedEntry>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    id: Text,
    published: Text,
    #[serde(default)]
    title: Text,
    #[serde(rename = "media$group", default)]
    media_group: MediaGroup,
}

#[derive(Debug, Default, Deserialize)]
struct MediaGroup {
    #[serde(rename = "media$description", default)]
    description: Text,
}

#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$t", default)]
    text: String,
}

/// Parses one feed page. A page without an `entry` list is empty.
pub fn parse_page(body: &str) -> RipResult<Vec<FeedItem>> {
    let document: FeedDocument = serde_json::from_str(body)
        .map_err(|err| RipError::malformed(format!("feed page: {err}")))?;
    document.feed.entry.into_iter().map(feed_item).collect()
}

fn feed_item(entry: FeedEntry) -> RipResult<FeedItem> {
    let video_id = entry
        .id
        .text
        .rsplit(':')
        .next()
        .unwrap_or_default()
        .to_owned();
    let upload_time = DateTime::parse_from_rfc3339(&entry.published.text)
        .map_err(|err| {
            RipError::malformed(format!(
                "feed entry {video_id} has bad timestamp {:?}: {err}",
                entry.published.text
            ))
        })?
        .with_timezone(&Utc);
    FeedItem::new(
        video_id,
        upload_time,
        entry.title.text,
        entry.media_group.description.text,
    )
}

/// Walks an account's uploads one page at a time, in feed order.
pub struct FeedWalk {
    transport: Arc<dyn Transport>,
    username: String,
    page: usize,
    exhausted: bool,
}

impl FeedWalk {
    pub fn new(transport: Arc<dyn Transport>, username: impl Into<String>) -> Self {
        Self {
            transport,
            username: username.into(),
            page: 0,
            exhausted: false,
        }
    }

    /// Fetches the next page, retrying transient failures. Returns `None`
    /// once a short page has been consumed.
    pub async fn next_page(&mut self, retry: &RetryPolicy) -> RipResult<Option<Vec<FeedItem>>> {
        if self.exhausted {
            return Ok(None);
        }
        let url = page_url(&self.username, self.page)?;
        let body = retry
            .run(&url, || {
                let url = url.clone();
                http::blocking(Arc::clone(&self.transport), move |transport| {
                    transport.fetch_text(&url)
                })
            })
            .await?;
        let items = parse_page(&body)?;
        debug!(page = self.page, entries = items.len(), "feed page fetched");
        self.page += 1;
        if items.len() < FEED_PAGE_SIZE {
            self.exhausted = true;
        }
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(items))
    }
}
