#![forbid(unsafe_code)]

//! Per-item idempotency. An item counts as done once its sidecar exists; the
//! sidecar is only written after the media file is complete.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::acquire::{Acquirer, PART_SUFFIX, media_path};
use crate::catalog::Container;
use crate::error::{RipError, RipResult};
use crate::extract::resolve_options;
use crate::feed::FeedItem;
use crate::http;
use crate::metadata::{Sidecar, sidecar_path};
use crate::select::select;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Fixed-delay, unbounded retry of transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Runs `attempt` until it succeeds or fails with a non-transient error.
    pub async fn run<T, F, Fut>(&self, what: &str, mut attempt: F) -> RipResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RipResult<T>>,
    {
        loop {
            match attempt().await {
                Err(err) if err.is_transient() => {
                    warn!(
                        what,
                        error = %err,
                        "transient failure, retrying in {:?}",
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Acquired {
        media_path: PathBuf,
        sidecar_path: PathBuf,
    },
    AlreadyPresent {
        sidecar_path: PathBuf,
    },
}

pub struct Ledger {
    acquirer: Acquirer,
    retry: RetryPolicy,
}

impl Ledger {
    pub fn new(acquirer: Acquirer, retry: RetryPolicy) -> Self {
        Self { acquirer, retry }
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn acquirer(&self) -> &Acquirer {
        &self.acquirer
    }

    /// Acquires `item` into `dir` unless its sidecar already exists.
    ///
    /// Resolution, selection and acquisition each run once; transient
    /// failures are returned to the caller untouched.
    pub async fn acquire_item(&self, item: &FeedItem, dir: &Path) -> RipResult<ItemOutcome> {
        let base = dir.join(item.base_name());
        let sidecar_path = sidecar_path(&base);
        if tokio::fs::try_exists(&sidecar_path).await? {
            debug!(video_id = item.video_id(), "already present, skipping");
            return Ok(ItemOutcome::AlreadyPresent { sidecar_path });
        }

        let video_id = item.video_id().to_owned();
        let options = http::blocking(Arc::clone(self.acquirer.transport()), move |transport| {
            resolve_options(&video_id, transport)
        })
        .await?;
        debug!(video_id = item.video_id(), options = options.len(), "options resolved");
        let selection = select(options)?;

        // Left over by an attempt that died before writing its sidecar, possibly
        // after choosing a different container than this one.
        for container in Container::ALL {
            remove_stale(&media_path(&base, container)).await?;
        }

        let media_path = self.acquirer.acquire(&selection, &base).await?;
        let sidecar = Sidecar::new(&selection, item);
        let target = sidecar_path.clone();
        tokio::task::spawn_blocking(move || sidecar.write_atomic(&target))
            .await
            .map_err(|err| RipError::Worker(err.to_string()))??;

        info!(
            video_id = item.video_id(),
            title = item.title(),
            media = %media_path.display(),
            sidecar = %sidecar_path.display(),
            "acquired"
        );
        Ok(ItemOutcome::Acquired {
            media_path,
            sidecar_path,
        })
    }

    /// [`Ledger::acquire_item`] behind the retry policy.
    pub async fn acquire_item_retrying(
        &self,
        item: &FeedItem,
        dir: &Path,
    ) -> RipResult<ItemOutcome> {
        self.retry
            .run(item.video_id(), || self.acquire_item(item, dir))
            .await
    }
}

async fn remove_stale(path: &Path) -> RipResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale media file");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Deletes `*.part` files sitting directly in `dir`, left behind when a
/// previous run was killed mid-transfer. Returns how many were removed.
pub fn sweep_stale_parts(dir: &Path) -> RipResult<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| {
            err.into_io_error()
                .unwrap_or_else(|| io::Error::other("directory walk failed"))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().ends_with(PART_SUFFIX) {
            continue;
        }
        std::fs::remove_file(entry.path())?;
        debug!(path = %entry.path().display(), "removed stale temp file");
        removed += 1;
    }
    Ok(removed)
}
