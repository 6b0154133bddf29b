#![forbid(unsafe_code)]

//! Error taxonomy shared by every stage of the acquisition pipeline.

use thiserror::Error;

/// HTTP statuses the upstream service hands out when it is throttling us.
/// Requests failing with one of these are retried after a short sleep.
pub const RETRYABLE_STATUSES: [u16; 4] = [400, 403, 429, 503];

#[derive(Debug, Error)]
pub enum RipError {
    /// Catalog miss on a direct lookup.
    #[error("unknown format id {0}")]
    UnknownFormat(u32),

    /// An extractor produced a format id the catalog does not know about.
    #[error("upstream offered format id {0}, which is not catalogued")]
    UnrecognizedFormat(u32),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("upstream rejected {video_id}: {reason}")]
    UpstreamRejected { video_id: String, reason: String },

    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// Network failure that is not worth retrying (DNS, bad URL, TLS...).
    #[error("network failure: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("no download option carries video")]
    NoVideoOption,

    #[error("remux failed: {0}")]
    RemuxFailure(String),

    #[error("transfer worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RipResult<T> = Result<T, RipError>;

impl RipError {
    /// Only transient network failures are worth another attempt; everything
    /// else aborts the run.
    pub fn is_transient(&self) -> bool {
        matches!(self, RipError::TransientNetwork(_))
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        RipError::MalformedResponse(message.into())
    }

    /// Maps an HTTP status onto the retryable/fatal split.
    pub(crate) fn from_status(status: u16, url: &str) -> Self {
        if RETRYABLE_STATUSES.contains(&status) {
            RipError::TransientNetwork(format!("HTTP {status} from {url}"))
        } else {
            RipError::HttpStatus {
                status,
                url: url.to_owned(),
            }
        }
    }
}
