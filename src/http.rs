#![forbid(unsafe_code)]

//! Blocking HTTP seam. Everything upstream-facing goes through [`Transport`]
//! so the pipeline can be exercised against an in-memory fake.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RipError, RipResult};

/// Without a browser-like user agent the info endpoint rejects requests.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:25.0) Gecko/20100101 Firefox/25.0";

/// Two blocking operations: fetch a small text document, or stream a large
/// body byte-for-byte into a sink. Implementations attempt exactly once.
pub trait Transport: Send + Sync {
    fn fetch_text(&self, url: &str) -> RipResult<String>;

    /// Copies the response body into `sink`, returning the number of bytes
    /// written.
    fn fetch_to(&self, url: &str, sink: &mut dyn Write) -> RipResult<u64>;
}

/// Runs a blocking transport call on the tokio blocking pool.
pub async fn blocking<T, F>(transport: Arc<dyn Transport>, call: F) -> RipResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Transport) -> RipResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(transport.as_ref()))
        .await
        .map_err(|err| RipError::Worker(err.to_string()))?
}

/// `ureq`-backed transport with connect and per-read timeouts.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(user_agent)
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self { agent }
    }

    fn get(&self, url: &str) -> RipResult<ureq::Response> {
        match self.agent.get(url).call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, _)) => Err(RipError::from_status(status, url)),
            Err(ureq::Error::Transport(transport)) => Err(classify_transport(url, &transport)),
        }
    }
}

impl Transport for HttpTransport {
    fn fetch_text(&self, url: &str) -> RipResult<String> {
        self.get(url)?
            .into_string()
            .map_err(|err| classify_io(url, err))
    }

    fn fetch_to(&self, url: &str, sink: &mut dyn Write) -> RipResult<u64> {
        let mut reader = self.get(url)?.into_reader();
        io::copy(&mut reader, sink).map_err(|err| classify_io(url, err))
    }
}

fn classify_transport(url: &str, transport: &ureq::Transport) -> RipError {
    match transport.kind() {
        ureq::ErrorKind::Io | ureq::ErrorKind::ConnectionFailed => {
            RipError::TransientNetwork(format!("{url}: {transport}"))
        }
        _ => RipError::Network(format!("{url}: {transport}")),
    }
}

/// Socket timeouts surface as I/O errors while the body is being read.
fn classify_io(url: &str, err: io::Error) -> RipError {
    match err.kind() {
        io::ErrorKind::TimedOut
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => {
            RipError::TransientNetwork(format!("{url}: {err}"))
        }
        _ => RipError::Io(err),
    }
}
