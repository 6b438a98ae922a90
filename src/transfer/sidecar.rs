//! Transfer-in-progress sidecar marker
//!
//! A sidecar sits beside a partially downloaded file and records enough
//! state to resume or invalidate it: source URL, expected size, and the
//! server's cache validator. Its presence is the sole signal that the
//! data file is incomplete — absence of the sidecar plus presence of the
//! data file means "done", never inferred any other way.

use crate::error::{DepotError, DepotResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File extension appended to the data file's name
pub const SIDECAR_EXT: &str = "dlmeta";

/// Durable record of an in-progress transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sidecar {
    /// Source URL the partial was fetched from
    pub url: String,

    /// Total size declared when the transfer started, if known
    pub expected_size: Option<u64>,

    /// Cache validator (entity tag) for conditional resume
    pub validator: Option<String>,
}

/// Path of the sidecar for a given data file
pub fn sidecar_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(SIDECAR_EXT);
    dest.with_file_name(name)
}

impl Sidecar {
    pub fn new(url: impl Into<String>, expected_size: Option<u64>, validator: Option<String>) -> Self {
        Self {
            url: url.into(),
            expected_size,
            validator,
        }
    }

    /// Write the marker beside `dest`, before any byte is streamed
    pub fn write(&self, dest: &Path) -> DepotResult<()> {
        let path = sidecar_path(dest);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .map_err(|e| DepotError::io(format!("writing sidecar {}", path.display()), e))
    }

    /// Load the marker beside `dest`, if present
    pub fn load(dest: &Path) -> DepotResult<Option<Self>> {
        let path = sidecar_path(dest);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| DepotError::io(format!("reading sidecar {}", path.display()), e))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Remove the marker beside `dest`; missing is not an error
    pub fn remove(dest: &Path) -> DepotResult<()> {
        let path = sidecar_path(dest);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DepotError::io(
                format!("removing sidecar {}", path.display()),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sidecar_path_appends_extension() {
        let path = sidecar_path(Path::new("/tmp/bundle.tar.zst"));
        assert_eq!(path, PathBuf::from("/tmp/bundle.tar.zst.dlmeta"));
    }

    #[test]
    fn write_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("bundle.bin");

        let marker = Sidecar::new(
            "https://example.com/bundle.bin",
            Some(1024),
            Some("\"etag-1\"".to_string()),
        );
        marker.write(&dest).unwrap();

        let loaded = Sidecar::load(&dest).unwrap().unwrap();
        assert_eq!(loaded, marker);
    }

    #[test]
    fn load_absent_returns_none() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("bundle.bin");
        assert!(Sidecar::load(&dest).unwrap().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("bundle.bin");

        Sidecar::new("https://example.com/x", None, None)
            .write(&dest)
            .unwrap();
        Sidecar::remove(&dest).unwrap();
        // Second remove is a no-op, not an error.
        Sidecar::remove(&dest).unwrap();
        assert!(Sidecar::load(&dest).unwrap().is_none());
    }
}
