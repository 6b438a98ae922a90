//! Driving the decompression backend process
//!
//! Spawns the backend with piped output, feeds its percent indicator into
//! the progress sink as it streams, and classifies its diagnostics when
//! it exits. Cancellation kills the backend; the source archive is never
//! modified, so a failed or cancelled extraction can always be retried
//! without re-downloading.

use crate::error::{DepotError, DepotResult};
use crate::extract::backend::{backend_args, is_error_line, is_unsupported_method, parse_progress};
use crate::progress::{Phase, ProgressSink, ProgressUpdate};
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extraction pipeline around one backend binary
pub struct Extractor {
    backend: String,
}

impl Extractor {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
        }
    }

    /// Unpack `archive` into `dest_dir`
    ///
    /// For a split archive pass the first part; the backend follows the
    /// remaining parts by naming convention.
    pub async fn extract(
        &self,
        archive: &Path,
        dest_dir: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> DepotResult<()> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| DepotError::io(format!("creating {}", dest_dir.display()), e))?;

        info!(
            "Extracting {} into {}",
            archive.display(),
            dest_dir.display()
        );

        let mut child = Command::new(&self.backend)
            .args(backend_args(archive, dest_dir))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DepotError::BackendNotFound {
                        name: self.backend.clone(),
                        hint: "Not found on PATH".to_string(),
                    }
                } else {
                    DepotError::command_failed(self.backend.clone(), e)
                }
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // The percent indicator arrives CR-separated; the reader splits on
        // both CR and LF and forwards each line. Error-class lines that
        // the backend prints to stdout are kept as diagnostics too.
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let stdout_task = tokio::spawn(async move {
            let mut error_lines = Vec::new();
            if let Some(mut out) = stdout {
                let mut buf = [0u8; 4096];
                let mut pending = Vec::new();
                while let Ok(n) = out.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                    for &byte in &buf[..n] {
                        if byte == b'\r' || byte == b'\n' {
                            if !pending.is_empty() {
                                let line = String::from_utf8_lossy(&pending).into_owned();
                                if is_error_line(&line) {
                                    error_lines.push(line.trim().to_string());
                                } else {
                                    let _ = line_tx.send(line);
                                }
                                pending.clear();
                            }
                        } else {
                            pending.push(byte);
                        }
                    }
                }
            }
            error_lines
        });

        let stderr_task = tokio::spawn(async move {
            let mut diagnostics = Vec::new();
            if let Some(err) = stderr {
                let mut reader = BufReader::new(err).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        diagnostics.push(line);
                    }
                }
            }
            diagnostics
        });

        let started = Instant::now();
        let mut stdout_done = false;
        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    info!("Extraction cancelled");
                    return Err(DepotError::Cancelled);
                }
                line = line_rx.recv(), if !stdout_done => {
                    match line {
                        Some(line) => {
                            if let Some(percent) = parse_progress(&line) {
                                sink.report(percent_update(percent, started));
                            }
                        }
                        None => stdout_done = true,
                    }
                }
            }
        }
        .map_err(|e| DepotError::command_failed(self.backend.clone(), e))?;

        let stdout_errors = stdout_task.await.unwrap_or_default();
        let mut diagnostics = stderr_task.await.unwrap_or_default();
        diagnostics.extend(stdout_errors);

        if status.success() {
            for line in diagnostics.iter().filter(|l| is_unsupported_method(l)) {
                warn!("Backend reported optional filter: {}", line);
            }
            sink.report(ProgressUpdate::percent(Phase::Extract, 100.0, "extracted"));
            debug!("Extraction complete: {}", dest_dir.display());
            return Ok(());
        }

        // Non-zero exit: per-entry unsupported-method reports alone are
        // tolerated (those filters are optional per platform); anything
        // else is fatal.
        let error_lines: Vec<&String> = diagnostics.iter().filter(|l| is_error_line(l)).collect();
        let only_unsupported =
            !error_lines.is_empty() && error_lines.iter().all(|l| is_unsupported_method(l));

        if only_unsupported {
            for line in error_lines {
                warn!("Backend skipped entries: {}", line);
            }
            sink.report(ProgressUpdate::percent(Phase::Extract, 100.0, "extracted"));
            return Ok(());
        }

        Err(DepotError::extraction(
            format!("backend exited with {status}"),
            diagnostics,
        ))
    }
}

/// A percent report with elapsed/ETA derived from wall time so far
fn percent_update(percent: u8, started: Instant) -> ProgressUpdate {
    let elapsed = started.elapsed().as_secs();
    let eta = if percent > 0 {
        Some(elapsed * u64::from(100 - percent.min(100)) / u64::from(percent))
    } else {
        None
    };
    ProgressUpdate {
        phase: Phase::Extract,
        percent: Some(f64::from(percent)),
        status: format!("extracting ({percent}%)"),
        bytes_per_sec: None,
        eta_secs: eta,
        bytes_done: None,
    }
}
