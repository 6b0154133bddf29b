#![forbid(unsafe_code)]

//! Turns a [`Selection`] into one media file on disk.
//!
//! Combined selections are streamed straight into `<base>.<ext>`. Split
//! selections are fetched in parallel by a small pool of blocking workers into
//! `.part` temp files next to the destination, then remuxed into the final
//! container. Temp files are owned by [`TempPath`] guards, so every exit path
//! (success, transfer failure, remux failure) leaves no `.part` behind.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempPath;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::catalog::Container;
use crate::error::{RipError, RipResult};
use crate::extract::DownloadOption;
use crate::http::Transport;
use crate::select::{Selection, StreamRole};

/// Number of blocking transfer workers used for split selections.
pub const TRANSFER_WORKERS: usize = 2;

pub const PART_SUFFIX: &str = ".part";

/// `<base>.<ext>` for the given container.
pub fn media_path(base: &Path, container: Container) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(container.extension());
    PathBuf::from(name)
}

/// External tool that copies a video and an audio stream into one container
/// without re-encoding.
#[derive(Debug, Clone)]
pub struct Remuxer {
    program: PathBuf,
}

impl Remuxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Probes the tool with `-version`. Used at startup so a missing binary
    /// fails the run before anything is downloaded.
    pub async fn ensure_available(&self) -> RipResult<()> {
        let status = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|err| {
                RipError::RemuxFailure(format!("{}: {err}", self.program.display()))
            })?;
        if !status.success() {
            return Err(RipError::RemuxFailure(format!(
                "{} -version exited with {status}",
                self.program.display()
            )));
        }
        Ok(())
    }

    /// Writes `output` from the first video stream of `video` and the first
    /// audio stream of `audio`. A failed run never leaves `output` behind.
    pub async fn remux(&self, video: &Path, audio: &Path, output: &Path) -> RipResult<()> {
        let result = self.run(video, audio, output).await;
        if result.is_err() {
            discard(output);
        }
        result
    }

    async fn run(&self, video: &Path, audio: &Path, output: &Path) -> RipResult<()> {
        let outcome = Command::new(&self.program)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-map", "0:v:0", "-map", "1:a:0", "-c", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                RipError::RemuxFailure(format!("{}: {err}", self.program.display()))
            })?;
        if outcome.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&outcome.stderr);
        let detail = stderr.trim();
        Err(RipError::RemuxFailure(if detail.is_empty() {
            format!("{} exited with {}", self.program.display(), outcome.status)
        } else {
            format!("{} exited with {}: {detail}", self.program.display(), outcome.status)
        }))
    }
}

/// One stream to copy into an already-open temp file.
struct TransferJob {
    role: StreamRole,
    url: String,
    sink: File,
}

struct TransferReport {
    role: StreamRole,
    result: RipResult<u64>,
}

pub struct Acquirer {
    transport: Arc<dyn Transport>,
    remuxer: Remuxer,
}

impl Acquirer {
    pub fn new(transport: Arc<dyn Transport>, remuxer: Remuxer) -> Self {
        Self { transport, remuxer }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Produces `<base>.<ext>`, the extension following the selection's
    /// container, and returns its path.
    pub async fn acquire(&self, selection: &Selection, base: &Path) -> RipResult<PathBuf> {
        let output = media_path(base, selection.container());
        match selection {
            Selection::Combined(option) => self.fetch_combined(option, &output).await?,
            Selection::Split { video, audio } => {
                self.fetch_split(video, audio, base, &output).await?
            }
        }
        Ok(output)
    }

    async fn fetch_combined(&self, option: &DownloadOption, output: &Path) -> RipResult<()> {
        let transport = Arc::clone(&self.transport);
        let url = option.url.clone();
        let target = output.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || {
            let result = File::create(&target)
                .map_err(RipError::from)
                .and_then(|file| copy_into(transport.as_ref(), &url, file));
            if result.is_err() {
                discard(&target);
            }
            result
        })
        .await
        .map_err(|err| RipError::Worker(err.to_string()))??;
        debug!(
            itag = option.media_type.format_id(),
            bytes,
            path = %output.display(),
            "combined stream written"
        );
        Ok(())
    }

    async fn fetch_split(
        &self,
        video: &DownloadOption,
        audio: &DownloadOption,
        base: &Path,
        output: &Path,
    ) -> RipResult<()> {
        let (video_sink, video_part) = part_file(base, StreamRole::Video)?;
        let (audio_sink, audio_part) = part_file(base, StreamRole::Audio)?;
        let jobs = vec![
            TransferJob {
                role: StreamRole::Video,
                url: video.url.clone(),
                sink: video_sink,
            },
            TransferJob {
                role: StreamRole::Audio,
                url: audio.url.clone(),
                sink: audio_sink,
            },
        ];

        self.run_transfers(jobs).await?;
        debug!(
            video = video.media_type.format_id(),
            audio = audio.media_type.format_id(),
            "remuxing split streams"
        );
        self.remuxer.remux(&video_part, &audio_part, output).await
    }

    /// Feeds `jobs` to the worker pool and waits for every report. When
    /// several transfers fail, the first reported error wins.
    async fn run_transfers(&self, jobs: Vec<TransferJob>) -> RipResult<()> {
        let expected = jobs.len();
        let (job_tx, job_rx) = mpsc::channel::<TransferJob>(TRANSFER_WORKERS);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<TransferReport>();

        for worker in 0..TRANSFER_WORKERS {
            let jobs = Arc::clone(&job_rx);
            let reports = report_tx.clone();
            let transport = Arc::clone(&self.transport);
            tokio::task::spawn_blocking(move || {
                transfer_worker(worker, transport.as_ref(), &jobs, &reports)
            });
        }
        drop(report_tx);

        for job in jobs {
            job_tx
                .send(job)
                .await
                .map_err(|_| RipError::Worker("transfer workers exited early".into()))?;
        }
        drop(job_tx);

        let mut first_error = None;
        for _ in 0..expected {
            let Some(report) = report_rx.recv().await else {
                return Err(RipError::Worker(
                    "transfer worker stopped before reporting".into(),
                ));
            };
            match report.result {
                Ok(bytes) => debug!(role = ?report.role, bytes, "stream transferred"),
                Err(err) => {
                    warn!(role = ?report.role, error = %err, "stream transfer failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn transfer_worker(
    worker: usize,
    transport: &dyn Transport,
    jobs: &Mutex<mpsc::Receiver<TransferJob>>,
    reports: &mpsc::UnboundedSender<TransferReport>,
) {
    loop {
        let Some(job) = jobs.lock().blocking_recv() else {
            break;
        };
        debug!(worker, role = ?job.role, "transfer started");
        let result = copy_into(transport, &job.url, job.sink);
        let report = TransferReport {
            role: job.role,
            result,
        };
        if reports.send(report).is_err() {
            break;
        }
    }
}

fn copy_into(transport: &dyn Transport, url: &str, file: File) -> RipResult<u64> {
    let mut writer = BufWriter::new(file);
    let bytes = transport.fetch_to(url, &mut writer)?;
    writer.flush()?;
    Ok(bytes)
}

/// Creates `<base>.<role>.XXXXXX.part` beside the destination.
fn part_file(base: &Path, role: StreamRole) -> RipResult<(File, TempPath)> {
    let parent = base
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = base
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let label = match role {
        StreamRole::Video => "video",
        StreamRole::Audio => "audio",
        StreamRole::Combined => "combined",
    };
    let part = tempfile::Builder::new()
        .prefix(&format!("{stem}.{label}."))
        .suffix(PART_SUFFIX)
        .rand_bytes(6)
        .tempfile_in(parent)?;
    Ok(part.into_parts())
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %err, "could not remove partial file");
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Fake remux tool: concatenates every `-i` input into the last argument.
    pub(crate) fn install_concat_remuxer(dir: &Path) -> PathBuf {
        install(
            dir,
            "remux-ok",
            r#"#!/bin/sh
set -eu
inputs=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -version) exit 0 ;;
    -i) shift; inputs="$inputs $1" ;;
    *) out="$1" ;;
  esac
  shift
done
cat $inputs > "$out"
"#,
        )
    }

    /// Fake remux tool that writes half an output file and then fails.
    pub(crate) fn install_failing_remuxer(dir: &Path) -> PathBuf {
        install(
            dir,
            "remux-broken",
            r#"#!/bin/sh
for last; do :; done
printf 'partial' > "$last"
echo "  Could not find codec parameters  " >&2
exit 1
"#,
        )
    }

    fn install(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, script).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }
}
