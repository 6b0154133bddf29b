#![forbid(unsafe_code)]

//! Command-line entry point: rips every upload of one account into
//! `<output_dir>/<username>/`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use riptube::account::{account_dir, rip_account};
use riptube::acquire::{Acquirer, Remuxer};
use riptube::config::{SettingsOverrides, resolve_settings};
use riptube::http::{HttpTransport, Transport};
use riptube::ledger::{Ledger, RetryPolicy};
use riptube::security::refuse_root;
use tracing_subscriber::{EnvFilter, prelude::*};

const LOG_ENV: &str = "RIPTUBE_LOG";
const DEFAULT_LOG_FILTER: &str = "riptube=info";

#[derive(Debug, Parser)]
#[command(
    name = "riptube",
    version,
    about = "Download every upload of an account in its best available quality"
)]
struct Args {
    /// Account whose uploads are fetched.
    username: String,

    /// Root directory; media lands in a per-account subdirectory.
    output_dir: Option<PathBuf>,

    /// Alternative `.env` file.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Remux tool (must accept ffmpeg arguments).
    #[arg(long, value_name = "PATH")]
    remux_bin: Option<PathBuf>,

    /// Pause between attempts after a transient network failure.
    #[arg(long, value_name = "N")]
    retry_delay_secs: Option<u64>,

    /// Connect and read timeout for HTTP requests.
    #[arg(long, value_name = "N")]
    timeout_secs: Option<u64>,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            output_root: self.output_dir.clone(),
            remux_bin: self.remux_bin.clone(),
            retry_delay_secs: self.retry_delay_secs,
            timeout_secs: self.timeout_secs,
            env_path: self.env_file.clone(),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    refuse_root("riptube")?;

    let args = Args::parse();
    let settings = resolve_settings(args.overrides()).context("resolving configuration")?;

    let remuxer = Remuxer::new(&settings.remux_bin);
    remuxer.ensure_available().await.with_context(|| {
        format!(
            "remux tool {} is not usable; install ffmpeg or pass --remux-bin",
            settings.remux_bin.display()
        )
    })?;
    tokio::fs::create_dir_all(&settings.output_root)
        .await
        .with_context(|| format!("creating {}", settings.output_root.display()))?;

    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&settings.user_agent, settings.timeout));
    let ledger = Ledger::new(
        Acquirer::new(transport, remuxer),
        RetryPolicy::new(settings.retry_delay),
    );

    println!("Output root: {}", settings.output_root.display());
    println!(
        "Account directory: {}",
        account_dir(&settings.output_root, &args.username).display()
    );

    let summary = rip_account(&ledger, &args.username, &settings.output_root)
        .await
        .with_context(|| format!("ripping uploads of {}", args.username))?;

    println!();
    println!(
        "Finished {}: {} acquired, {} already present.",
        args.username, summary.acquired, summary.already_present
    );
    if summary.stale_parts_removed > 0 {
        println!(
            "Removed {} stale temp file(s) from an interrupted run.",
            summary.stale_parts_removed
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_map_onto_overrides() {
        let args = Args::try_parse_from([
            "riptube",
            "SomeOne",
            "/srv/rips",
            "--remux-bin",
            "/opt/ffmpeg",
            "--timeout-secs",
            "9",
        ])
        .unwrap();
        assert_eq!(args.username, "SomeOne");
        let overrides = args.overrides();
        assert_eq!(overrides.output_root, Some(PathBuf::from("/srv/rips")));
        assert_eq!(overrides.remux_bin, Some(PathBuf::from("/opt/ffmpeg")));
        assert_eq!(overrides.timeout_secs, Some(9));
        assert_eq!(overrides.retry_delay_secs, None);
        assert_eq!(overrides.env_path, None);
    }

    #[test]
    fn output_dir_is_optional() {
        let args = Args::try_parse_from(["riptube", "someone"]).unwrap();
        assert_eq!(args.overrides().output_root, None);
    }

    #[test]
    fn username_is_required() {
        assert!(Args::try_parse_from(["riptube"]).is_err());
    }

    #[test]
    fn non_numeric_timeout_is_rejected() {
        assert!(Args::try_parse_from(["riptube", "someone", "--timeout-secs", "soon"]).is_err());
    }
}
