//! Cache folder lifecycle: resolve, touch, evict, sweep
//!
//! Eviction is a non-atomic scan-then-delete over immediate subfolders
//! sorted by modification time. Callers must `touch` a freshly populated
//! entry before calling `evict`, or it risks being treated as the oldest.
//! Multiple independent processes may share the base directory; every
//! deletion here is best-effort and a single failure never aborts a sweep.

use crate::error::{DepotError, DepotResult};
use crate::transfer::sidecar::SIDECAR_EXT;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Derive a stable cache key from a source URL
///
/// SHA256 of the URL, first 12 hex chars. Same URL = same folder, so a
/// retried install resumes against the same partial.
pub fn key_for_url(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..6])
}

/// A cached entry as listed for inspection
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Folder name (the cache key)
    pub key: String,
    /// Absolute path of the entry folder
    pub path: PathBuf,
    /// Total size of the folder contents
    pub size_bytes: u64,
    /// Last-touched time
    pub modified: DateTime<Utc>,
}

/// Bounded set of named folders under one base directory
pub struct ContentCache {
    base: PathBuf,
}

impl ContentCache {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The cache base directory
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of the folder for `key`, creating the base directory lazily
    ///
    /// The entry folder itself is not created; population is the caller's
    /// job.
    pub fn resolve(&self, key: &str) -> DepotResult<PathBuf> {
        fs::create_dir_all(&self.base).map_err(|e| {
            DepotError::io(format!("creating cache base {}", self.base.display()), e)
        })?;
        Ok(self.base.join(key))
    }

    /// Refresh the recency of an entry
    pub fn touch(&self, key: &str) -> DepotResult<()> {
        let path = self.base.join(key);
        if !path.exists() {
            return Err(DepotError::PathNotFound(path));
        }
        filetime::set_file_mtime(&path, FileTime::now())
            .map_err(|e| DepotError::io(format!("touching cache entry {}", path.display()), e))
    }

    /// Delete the oldest-touched entries beyond `max_entries`
    ///
    /// Returns the number of entries removed. Deletions are best-effort.
    pub fn evict(&self, max_entries: usize) -> DepotResult<usize> {
        let mut entries = self.scan_dirs()?;
        if entries.len() <= max_entries {
            return Ok(0);
        }

        // Newest first; everything past max_entries goes.
        entries.sort_by(|a, b| b.1.cmp(&a.1));

        let mut removed = 0;
        for (path, _) in entries.into_iter().skip(max_entries) {
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!("Evicted cache entry {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to evict {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }

    /// Remove abandoned transfer markers and their orphaned partials
    ///
    /// Scans every entry for sidecar files older than `max_age` and removes
    /// both the marker and its data file. Independent of normal eviction.
    pub fn clean_stale_partials(&self, max_age: Duration) -> DepotResult<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        for (dir, _) in self.scan_dirs()? {
            let files = match fs::read_dir(&dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!("Failed to scan {}: {}", dir.display(), e);
                    continue;
                }
            };

            for file in files.flatten() {
                let path = file.path();
                if path.extension().is_none_or(|ext| ext != SIDECAR_EXT) {
                    continue;
                }
                let old_enough = file
                    .metadata()
                    .and_then(|m| m.modified())
                    .map(|mtime| mtime < cutoff)
                    .unwrap_or(false);
                if !old_enough {
                    continue;
                }

                // Data file first, then the marker; a marker without data
                // is harmless and gets purged on the next transfer attempt.
                let data = path.with_extension("");
                if data.exists() {
                    if let Err(e) = fs::remove_file(&data) {
                        warn!("Failed to remove stale partial {}: {}", data.display(), e);
                    }
                }
                match fs::remove_file(&path) {
                    Ok(()) => {
                        debug!("Removed stale transfer marker {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to remove marker {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }

    /// List entries with sizes, newest-touched first
    pub fn entries(&self) -> DepotResult<Vec<CacheEntry>> {
        let mut scanned = self.scan_dirs()?;
        scanned.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(scanned
            .into_iter()
            .map(|(path, mtime)| CacheEntry {
                key: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size_bytes: dir_size(&path),
                modified: DateTime::<Utc>::from(mtime),
                path,
            })
            .collect())
    }

    /// Immediate subfolders with their modification times
    fn scan_dirs(&self) -> DepotResult<Vec<(PathBuf, SystemTime)>> {
        if !self.base.exists() {
            return Ok(vec![]);
        }

        let entries = fs::read_dir(&self.base).map_err(|e| {
            DepotError::io(format!("reading cache base {}", self.base.display()), e)
        })?;

        let mut dirs = vec![];
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            dirs.push((path, mtime));
        }
        Ok(dirs)
    }
}

/// Total size of a directory's contents, best-effort
fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}
