#![forbid(unsafe_code)]

//! Privilege check run before anything touches the output directory.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Refuses to start under an effective uid of 0.
pub fn refuse_root(program: &str) -> Result<()> {
    refuse_root_uid(Uid::effective(), program)
}

fn refuse_root_uid(uid: Uid, program: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{program} refuses to run as root; media and sidecars must be owned by a regular user"
        );
    }
    Ok(())
}
