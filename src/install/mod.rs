//! Install orchestration: download into the cache, then extract
//!
//! Composes the transfer engine, content cache, and extraction pipeline
//! into single- or multi-file operations with phase-based progress. The
//! cache is populated content-addressed by key and filename, so a failed
//! operation leaves everything it fetched in place and a retry resumes
//! rather than re-downloads.

use crate::cache::ContentCache;
use crate::error::{DepotError, DepotResult};
use crate::extract::{select_entry_point, Extractor};
use crate::progress::{Phase, ProgressSink, ProgressUpdate};
use crate::transfer::{self, Sidecar, TransferOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One remote file in an install request
#[derive(Debug, Clone)]
pub struct InstallFile {
    /// Source URL
    pub url: String,

    /// Declared size, enabling aggregate percent/ETA across a batch
    pub expected_size: Option<u64>,
}

impl InstallFile {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_size: None,
        }
    }

    pub fn with_size(url: impl Into<String>, size: u64) -> Self {
        Self {
            url: url.into(),
            expected_size: Some(size),
        }
    }

    /// Filename the artifact is cached under
    pub fn filename(&self) -> DepotResult<String> {
        filename_from_url(&self.url)
    }
}

/// Last path segment of a URL, query stripped
fn filename_from_url(url: &str) -> DepotResult<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if name.is_empty() || name.contains(':') {
        return Err(DepotError::validation(format!(
            "cannot derive a filename from url {url}"
        )));
    }
    Ok(name.to_string())
}

/// Download-then-extract orchestrator
pub struct Installer<'a> {
    cache: &'a ContentCache,
    extractor: &'a Extractor,
    transfer: TransferOptions,
    max_cache_entries: usize,
}

impl<'a> Installer<'a> {
    pub fn new(
        cache: &'a ContentCache,
        extractor: &'a Extractor,
        transfer: TransferOptions,
        max_cache_entries: usize,
    ) -> Self {
        Self {
            cache,
            extractor,
            transfer,
            max_cache_entries,
        }
    }

    /// Install one remote archive into `dest_dir`
    pub async fn install_single(
        &self,
        url: &str,
        dest_dir: &Path,
        cache_key: &str,
        expected_size: Option<u64>,
        sink: &dyn ProgressSink,
    ) -> DepotResult<()> {
        let file = InstallFile {
            url: url.to_string(),
            expected_size,
        };
        self.install_multi(std::slice::from_ref(&file), dest_dir, cache_key, sink)
            .await
    }

    /// Install a batch of remote files into `dest_dir`
    ///
    /// Files are processed strictly in order. When every file declares a
    /// size, percent/ETA is reported against the aggregate byte total so
    /// progress never appears to move backward at a file boundary.
    /// Failure at any stage aborts the whole operation; whatever reached
    /// the cache stays there for the next attempt.
    pub async fn install_multi(
        &self,
        files: &[InstallFile],
        dest_dir: &Path,
        cache_key: &str,
        sink: &dyn ProgressSink,
    ) -> DepotResult<()> {
        if files.is_empty() {
            return Err(DepotError::validation("no files to install"));
        }

        let folder = self.cache.resolve(cache_key)?;
        let aggregate_total = aggregate_total(files);
        let mut done_bytes: u64 = 0;
        let mut artifacts = Vec::with_capacity(files.len());

        info!(
            "Installing {} file(s) into {} (cache key {})",
            files.len(),
            dest_dir.display(),
            cache_key
        );

        for (index, file) in files.iter().enumerate() {
            let dest = folder.join(file.filename()?);

            if artifact_complete(&dest, file.expected_size)? {
                debug!("Cache hit for {}", dest.display());
                let size = file.expected_size.or_else(|| file_len(&dest)).unwrap_or(0);
                done_bytes += size;
                sink.report(batch_update(
                    index,
                    files.len(),
                    done_bytes,
                    aggregate_total,
                    "cached",
                ));
            } else {
                invalidate_mismatched(&dest, file.expected_size);

                let mut opts = self.transfer.clone();
                opts.expected_size = file.expected_size;

                let batch = BatchSink {
                    inner: sink,
                    index,
                    count: files.len(),
                    base_bytes: done_bytes,
                    aggregate_total,
                };
                transfer::transfer(&file.url, &dest, &batch, &opts).await?;

                done_bytes += file.expected_size.or_else(|| file_len(&dest)).unwrap_or(0);
                self.cache.touch(cache_key)?;
            }

            artifacts.push(dest);
        }

        // Our entry is freshest at this point, so a single eviction pass
        // cannot take it out.
        self.cache.touch(cache_key)?;
        self.cache.evict(self.max_cache_entries)?;

        let entry_point = select_entry_point(&artifacts)
            .ok_or_else(|| DepotError::validation("no extraction entry point"))?;

        self.extractor
            .extract(&entry_point, dest_dir, sink, &self.transfer.cancel)
            .await
    }
}

/// Sum of declared sizes, only when every file declares one
fn aggregate_total(files: &[InstallFile]) -> Option<u64> {
    files.iter().map(|f| f.expected_size).sum()
}

/// Whether the cached artifact can be used as-is
///
/// Data present, no in-progress marker, and — when a size is declared —
/// an exact length match.
fn artifact_complete(dest: &Path, expected_size: Option<u64>) -> DepotResult<bool> {
    if !dest.exists() || Sidecar::load(dest)?.is_some() {
        return Ok(false);
    }
    match expected_size {
        Some(expected) => Ok(file_len(dest) == Some(expected)),
        None => Ok(true),
    }
}

/// Drop a sidecar-less artifact whose length contradicts the declared
/// size, so the transfer engine re-fetches instead of trusting it
fn invalidate_mismatched(dest: &Path, expected_size: Option<u64>) {
    if let Some(expected) = expected_size {
        if dest.exists()
            && Sidecar::load(dest).map(|m| m.is_none()).unwrap_or(false)
            && file_len(dest) != Some(expected)
        {
            debug!("Cached artifact size mismatch, discarding {}", dest.display());
            let _ = std::fs::remove_file(dest);
        }
    }
}

fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).map(|m| m.len()).ok()
}

fn batch_update(
    index: usize,
    count: usize,
    done: u64,
    total: Option<u64>,
    status: &str,
) -> ProgressUpdate {
    ProgressUpdate {
        phase: Phase::Download,
        percent: total.map(|t| {
            if t == 0 {
                100.0
            } else {
                (done as f64 / t as f64) * 100.0
            }
        }),
        status: format!("file {}/{}: {}", index + 1, count, status),
        bytes_per_sec: None,
        eta_secs: None,
        bytes_done: Some(done),
    }
}

/// Re-bases one file's transfer progress onto the whole batch
///
/// Keeps the batch percent monotonic across file boundaries: bytes done
/// by previous files are folded into every report, and percent is against
/// the aggregate total instead of the current file's.
struct BatchSink<'a> {
    inner: &'a dyn ProgressSink,
    index: usize,
    count: usize,
    base_bytes: u64,
    aggregate_total: Option<u64>,
}

impl ProgressSink for BatchSink<'_> {
    fn report(&self, update: ProgressUpdate) {
        if update.phase != Phase::Download {
            self.inner.report(update);
            return;
        }

        let overall_done = self.base_bytes + update.bytes_done.unwrap_or(0);
        let percent = self.aggregate_total.map(|t| {
            if t == 0 {
                100.0
            } else {
                (overall_done as f64 / t as f64) * 100.0
            }
        });
        let eta_secs = match (self.aggregate_total, update.bytes_per_sec) {
            (Some(total), Some(rate)) if rate > 0 => {
                Some(total.saturating_sub(overall_done).div_ceil(rate))
            }
            _ => None,
        };

        self.inner.report(ProgressUpdate {
            phase: Phase::Download,
            percent,
            status: format!("file {}/{}: {}", self.index + 1, self.count, update.status),
            bytes_per_sec: update.bytes_per_sec,
            eta_secs,
            bytes_done: Some(overall_done),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSink;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Recorder(Mutex<Vec<ProgressUpdate>>);

    impl Recorder {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }
        fn percents(&self) -> Vec<f64> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter_map(|u| u.percent)
                .collect()
        }
    }

    impl ProgressSink for Recorder {
        fn report(&self, update: ProgressUpdate) {
            self.0.lock().unwrap().push(update);
        }
    }

    #[test]
    fn filename_from_url_takes_last_segment() {
        assert_eq!(
            filename_from_url("https://example.com/dl/bundle.7z.001?token=x").unwrap(),
            "bundle.7z.001"
        );
        assert_eq!(
            filename_from_url("https://example.com/bundle.tar.zst").unwrap(),
            "bundle.tar.zst"
        );
    }

    #[test]
    fn filename_from_bare_host_fails() {
        assert!(filename_from_url("https://example.com/").is_err());
    }

    #[test]
    fn aggregate_total_needs_every_size() {
        let all = vec![
            InstallFile::with_size("https://e.com/a", 10),
            InstallFile::with_size("https://e.com/b", 20),
        ];
        assert_eq!(aggregate_total(&all), Some(30));

        let partial = vec![
            InstallFile::with_size("https://e.com/a", 10),
            InstallFile::new("https://e.com/b"),
        ];
        assert_eq!(aggregate_total(&partial), None);
    }

    #[test]
    fn artifact_complete_requires_no_marker() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("bundle.bin");
        std::fs::write(&dest, b"1234").unwrap();

        assert!(artifact_complete(&dest, Some(4)).unwrap());
        assert!(artifact_complete(&dest, None).unwrap());
        assert!(!artifact_complete(&dest, Some(9)).unwrap());

        Sidecar::new("https://e.com/b", Some(4), None)
            .write(&dest)
            .unwrap();
        assert!(!artifact_complete(&dest, Some(4)).unwrap());
    }

    #[test]
    fn mismatched_artifact_is_invalidated() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("bundle.bin");
        std::fs::write(&dest, b"1234").unwrap();

        invalidate_mismatched(&dest, Some(9));
        assert!(!dest.exists());
    }

    #[test]
    fn partial_with_marker_is_not_invalidated() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("bundle.bin");
        std::fs::write(&dest, b"12").unwrap();
        Sidecar::new("https://e.com/b", Some(9), None)
            .write(&dest)
            .unwrap();

        // In-progress partials are the transfer engine's to resume.
        invalidate_mismatched(&dest, Some(9));
        assert!(dest.exists());
    }

    #[test]
    fn batch_sink_keeps_percent_monotonic_across_files() {
        let recorder = Recorder::new();
        let total = Some(200u64);

        // File 1 of 2 (100 bytes), reports at 50 and 100 bytes.
        let first = BatchSink {
            inner: &recorder,
            index: 0,
            count: 2,
            base_bytes: 0,
            aggregate_total: total,
        };
        let mut update = ProgressUpdate::percent(Phase::Download, 50.0, "downloading");
        update.bytes_done = Some(50);
        first.report(update.clone());
        update.bytes_done = Some(100);
        update.percent = Some(100.0);
        first.report(update);

        // File 2 of 2 starts at zero of its own bytes; the batch percent
        // must not reset.
        let second = BatchSink {
            inner: &recorder,
            index: 1,
            count: 2,
            base_bytes: 100,
            aggregate_total: total,
        };
        let mut update = ProgressUpdate::percent(Phase::Download, 0.0, "downloading");
        update.bytes_done = Some(0);
        second.report(update.clone());
        update.bytes_done = Some(100);
        second.report(update);

        let percents = recorder.percents();
        assert_eq!(percents, vec![25.0, 50.0, 50.0, 100.0]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn batch_sink_omits_percent_without_total() {
        let recorder = Recorder::new();
        let sink = BatchSink {
            inner: &recorder,
            index: 0,
            count: 1,
            base_bytes: 0,
            aggregate_total: None,
        };
        let mut update = ProgressUpdate::status(Phase::Download, "downloading");
        update.bytes_done = Some(10);
        sink.report(update);

        assert!(recorder.0.lock().unwrap()[0].percent.is_none());
    }
}
