#![forbid(unsafe_code)]

//! Whole-account run: walks the upload feed in order and hands every item to
//! the ledger, one at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::error::RipResult;
use crate::feed::FeedWalk;
use crate::ledger::{ItemOutcome, Ledger, sweep_stale_parts};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub acquired: usize,
    pub already_present: usize,
    pub stale_parts_removed: usize,
}

/// `<output_root>/<lowercased username>`
pub fn account_dir(output_root: &Path, username: &str) -> PathBuf {
    output_root.join(username.to_lowercase())
}

/// Acquires every upload of `username` below `output_root`.
///
/// Transient failures are retried per item; any other error stops the run.
pub async fn rip_account(
    ledger: &Ledger,
    username: &str,
    output_root: &Path,
) -> RipResult<RunSummary> {
    let username = username.to_lowercase();
    let dir = account_dir(output_root, &username);
    tokio::fs::create_dir_all(&dir).await?;

    let mut summary = RunSummary {
        stale_parts_removed: sweep_stale_parts(&dir)?,
        ..RunSummary::default()
    };
    info!(account = %username, dir = %dir.display(), "processing account");

    let mut walk = FeedWalk::new(Arc::clone(ledger.acquirer().transport()), username.as_str());
    while let Some(items) = walk.next_page(ledger.retry()).await? {
        for item in items {
            match ledger.acquire_item_retrying(&item, &dir).await? {
                ItemOutcome::Acquired { .. } => summary.acquired += 1,
                ItemOutcome::AlreadyPresent { .. } => summary.already_present += 1,
            }
        }
    }
    info!(
        account = %username,
        acquired = summary.acquired,
        already_present = summary.already_present,
        "account finished"
    );
    Ok(summary)
}
