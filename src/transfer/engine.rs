//! Resumable streaming download
//!
//! One call fetches one remote resource to one local path. A sidecar
//! marker written before streaming starts is the only durable signal
//! distinguishing "complete" from "crashed mid-write"; it is deleted only
//! once the final size checks out. Interrupted transfers keep both files
//! so a later call resumes with a byte-range request.
//!
//! Exactly one concurrent writer per destination path is assumed, not
//! enforced.

use crate::cache::format_bytes;
use crate::error::{DepotError, DepotResult};
use crate::progress::{Phase, ProgressSink, ProgressUpdate, ThroughputWindow};
use crate::transfer::sidecar::Sidecar;
use futures_util::StreamExt;
use reqwest::header;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Maximum redirect depth before the transfer is failed outright
const MAX_REDIRECTS: usize = 5;

/// Options threaded through a single transfer call
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Cancellation token observed at every suspension point
    pub cancel: CancellationToken,

    /// Caller-declared total size, checked against the server's
    pub expected_size: Option<u64>,

    /// HTTP connect timeout
    pub connect_timeout: Duration,

    /// User-Agent header
    pub user_agent: String,

    /// Minimum interval between progress reports
    pub progress_interval: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        let defaults = crate::config::schema::TransferConfig::default();
        Self {
            cancel: CancellationToken::new(),
            expected_size: None,
            connect_timeout: Duration::from_secs(defaults.connect_timeout_secs),
            user_agent: defaults.user_agent,
            progress_interval: Duration::from_millis(defaults.progress_interval_ms),
        }
    }
}

impl TransferOptions {
    /// Build options from config with a fresh token and no expected size
    pub fn from_config(config: &crate::config::schema::TransferConfig) -> Self {
        Self {
            cancel: CancellationToken::new(),
            expected_size: None,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            user_agent: config.user_agent.clone(),
            progress_interval: Duration::from_millis(config.progress_interval_ms),
        }
    }
}

/// How this call will treat what is already on disk
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResumePlan {
    /// Nothing usable on disk; start from byte zero
    Fresh,
    /// Destination complete (data present, no sidecar); do nothing
    AlreadyComplete,
    /// Partial with a matching marker; continue from `offset`
    Resume {
        offset: u64,
        validator: Option<String>,
    },
}

/// Inspect the destination and decide fresh/resume/done
///
/// A sidecar whose URL differs from this request, or a partial that can no
/// longer be stat'ed, is purged outright — the only case where existing
/// state is discarded without replacement.
fn plan_resume(dest: &Path, url: &str) -> DepotResult<ResumePlan> {
    let marker = Sidecar::load(dest)?;
    let dest_exists = dest.exists();

    match (dest_exists, marker) {
        (true, None) => Ok(ResumePlan::AlreadyComplete),
        (false, None) => Ok(ResumePlan::Fresh),
        (false, Some(_)) => {
            // Marker without data: leftover from a purge that lost the race.
            Sidecar::remove(dest)?;
            Ok(ResumePlan::Fresh)
        }
        (true, Some(marker)) => {
            if marker.url != url {
                debug!("Sidecar URL mismatch, discarding partial");
                purge(dest);
                return Ok(ResumePlan::Fresh);
            }
            let offset = match std::fs::metadata(dest) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    debug!("Cannot stat partial ({}), discarding", e);
                    purge(dest);
                    return Ok(ResumePlan::Fresh);
                }
            };
            Ok(ResumePlan::Resume {
                offset,
                validator: marker.validator,
            })
        }
    }
}

/// Best-effort removal of data file and sidecar, data file first
fn purge(dest: &Path) {
    let _ = std::fs::remove_file(dest);
    let _ = Sidecar::remove(dest);
}

/// Total size from a `Content-Range: bytes N-M/total` header value
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

/// Reconcile the caller-declared size with the server-declared one
///
/// Both known and different is a fail-fast validation error; otherwise
/// whichever is known wins.
fn effective_total(expected: Option<u64>, server: Option<u64>) -> DepotResult<Option<u64>> {
    match (expected, server) {
        (Some(e), Some(s)) if e != s => Err(DepotError::validation(format!(
            "declared size {e} conflicts with server-declared size {s}"
        ))),
        (_, Some(s)) => Ok(Some(s)),
        (e, None) => Ok(e),
    }
}

/// Server-declared total for a response: Content-Range total on 206,
/// Content-Length otherwise
fn server_total(resp: &Response, resumed: bool) -> Option<u64> {
    if resumed && resp.status() == StatusCode::PARTIAL_CONTENT {
        resp.headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
    } else {
        resp.headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }
}

/// Entity tag of a response, if any
fn response_validator(resp: &Response) -> Option<String> {
    resp.headers()
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Fetch `url` to `dest`, resuming a previous partial when possible
///
/// Returns `dest` on verified completion. On cancellation or network
/// failure the partial and its sidecar stay on disk for a later resume.
pub async fn transfer(
    url: &str,
    dest: &Path,
    sink: &dyn ProgressSink,
    opts: &TransferOptions,
) -> DepotResult<PathBuf> {
    let plan = plan_resume(dest, url)?;

    if plan == ResumePlan::AlreadyComplete {
        debug!("Destination already complete: {}", dest.display());
        sink.report(ProgressUpdate::percent(
            Phase::Download,
            100.0,
            "already downloaded",
        ));
        return Ok(dest.to_path_buf());
    }

    let client = Client::builder()
        .user_agent(opts.user_agent.clone())
        .redirect(Policy::limited(MAX_REDIRECTS))
        .connect_timeout(opts.connect_timeout)
        .build()
        .map_err(|e| DepotError::Internal(format!("building http client: {e}")))?;

    let mut request = client.get(url);
    let resume_offset = match &plan {
        ResumePlan::Resume { offset, validator } => {
            debug!("Resuming from byte {offset}");
            request = request.header(header::RANGE, format!("bytes={offset}-"));
            if let Some(validator) = validator {
                request = request.header(header::IF_RANGE, validator.clone());
            }
            *offset
        }
        _ => 0,
    };

    let resp = request.send().await.map_err(|e| {
        if e.is_redirect() {
            DepotError::validation(format!("redirect chain exceeded {MAX_REDIRECTS}: {e}"))
        } else {
            DepotError::network(format!("request failed: {e}"))
        }
    })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(DepotError::network(format!(
            "server responded {status} for {url}"
        )));
    }

    // A 200 on a range request means the validator no longer matches (or
    // the server cannot serve ranges): the stale partial is discarded and
    // the stream starts over from byte zero.
    let resumed = resume_offset > 0 && status == StatusCode::PARTIAL_CONTENT;
    if resume_offset > 0 && !resumed {
        info!("Server sent full content; restarting from zero");
    }

    // Fail on a size conflict before any byte or marker is written.
    let total = effective_total(opts.expected_size, server_total(&resp, resumed))?;
    let validator = response_validator(&resp);

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DepotError::io(format!("creating {}", parent.display()), e))?;
    }

    // The marker goes down before streaming begins. While it exists, the
    // data file is not to be trusted.
    Sidecar::new(url, total, validator.clone()).write(dest)?;

    let mut file = if resumed {
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(dest)
            .await
            .map_err(|e| DepotError::io(format!("opening partial {}", dest.display()), e))?
    } else {
        tokio::fs::File::create(dest)
            .await
            .map_err(|e| DepotError::io(format!("creating {}", dest.display()), e))?
    };

    let mut received = if resumed { resume_offset } else { 0 };
    let mut window = ThroughputWindow::new();
    window.record(received);
    let mut last_report: Option<Instant> = None;

    let mut stream = resp.bytes_stream();
    loop {
        let chunk = tokio::select! {
            _ = opts.cancel.cancelled() => {
                // Partial and sidecar stay for a later resume.
                info!("Transfer cancelled at {} bytes", received);
                return Err(DepotError::Cancelled);
            }
            chunk = stream.next() => chunk,
        };

        let Some(chunk) = chunk else {
            break;
        };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Stream failed at {} bytes: {}", received, e);
                return Err(DepotError::network(format!("stream read failed: {e}")));
            }
        };

        file.write_all(&chunk)
            .await
            .map_err(|e| DepotError::io(format!("writing {}", dest.display()), e))?;
        received += chunk.len() as u64;
        window.record(received);

        let due = last_report.is_none_or(|at| at.elapsed() >= opts.progress_interval);
        if due {
            last_report = Some(Instant::now());
            sink.report(progress_update(received, total, &window));
        }
    }

    file.flush()
        .await
        .map_err(|e| DepotError::io(format!("flushing {}", dest.display()), e))?;
    drop(file);

    finish(dest, received, total)?;
    sink.report(ProgressUpdate::percent(
        Phase::Download,
        100.0,
        format!("downloaded {}", format_bytes(received)),
    ));
    Ok(dest.to_path_buf())
}

/// Verify the final size and clear the in-progress marker
///
/// With a known total, an exact match is required; anything else deletes
/// both files and fails — a partial is never passed off as complete.
fn finish(dest: &Path, received: u64, total: Option<u64>) -> DepotResult<()> {
    if let Some(total) = total {
        let actual = std::fs::metadata(dest).map(|m| m.len()).unwrap_or(received);
        if actual != total {
            purge(dest);
            return Err(DepotError::validation(format!(
                "transfer ended at {actual} bytes, expected {total}"
            )));
        }
    }
    Sidecar::remove(dest)?;
    debug!("Transfer complete: {}", dest.display());
    Ok(())
}

fn progress_update(received: u64, total: Option<u64>, window: &ThroughputWindow) -> ProgressUpdate {
    let rate = window.bytes_per_sec();
    let status = match (total, rate) {
        (Some(total), Some(rate)) => format!(
            "{} / {} ({}/s)",
            format_bytes(received),
            format_bytes(total),
            format_bytes(rate)
        ),
        (Some(total), None) => format!("{} / {}", format_bytes(received), format_bytes(total)),
        (None, Some(rate)) => format!("{} ({}/s)", format_bytes(received), format_bytes(rate)),
        (None, None) => format_bytes(received),
    };

    ProgressUpdate {
        phase: Phase::Download,
        percent: total.map(|t| {
            if t == 0 {
                100.0
            } else {
                (received as f64 / t as f64) * 100.0
            }
        }),
        status,
        bytes_per_sec: rate,
        eta_secs: total.and_then(|t| window.eta_secs(t)),
        bytes_done: Some(received),
    }
}
