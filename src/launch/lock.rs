//! Advisory port ownership records
//!
//! Independent depot instances agree on who owns a port through
//! `port-<N>.json` files in a shared directory. The files are advisory:
//! nothing at the OS level enforces them, so every read re-validates the
//! recorded owner's liveness. A crashed owner leaves a stale file behind;
//! the next reader deletes it and reports the port unowned, which is how
//! stale state self-heals instead of lingering.

use crate::error::{DepotError, DepotResult};
use crate::launch::platform::PlatformOps;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Ownership record for one port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortLock {
    /// Owning process id
    pub pid: u32,

    /// What the owner is running, for display
    pub label: String,

    /// When ownership was recorded
    pub timestamp: DateTime<Utc>,
}

impl PortLock {
    pub fn new(pid: u32, label: impl Into<String>) -> Self {
        Self {
            pid,
            label: label.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Lock file path for a port
pub fn lock_path(lock_dir: &Path, port: u16) -> PathBuf {
    lock_dir.join(format!("port-{port}.json"))
}

/// Port encoded in a lock file name, if it is one
pub fn port_from_lock_path(path: &Path) -> Option<u16> {
    path.file_name()?
        .to_str()?
        .strip_prefix("port-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Record ownership of a port
///
/// Written only once the launched process is reachable; an unreachable
/// process never holds a lock.
pub fn write_port_lock(lock_dir: &Path, port: u16, lock: &PortLock) -> DepotResult<()> {
    std::fs::create_dir_all(lock_dir)
        .map_err(|e| DepotError::io(format!("creating lock dir {}", lock_dir.display()), e))?;

    let path = lock_path(lock_dir, port);
    let content = serde_json::to_string_pretty(lock)?;
    std::fs::write(&path, content)
        .map_err(|e| DepotError::io(format!("writing lock {}", path.display()), e))?;
    info!("Recorded port {port} owned by pid {}", lock.pid);
    Ok(())
}

/// Read and validate the ownership record for a port
///
/// The recorded pid's liveness is re-checked on every read. A lock whose
/// owner is gone is deleted as a side effect and reported as absent.
pub fn read_port_lock(
    lock_dir: &Path,
    port: u16,
    ops: &dyn PlatformOps,
) -> DepotResult<Option<PortLock>> {
    let path = lock_path(lock_dir, port);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| DepotError::io(format!("reading lock {}", path.display()), e))?;

    let lock: PortLock = match serde_json::from_str(&content) {
        Ok(lock) => lock,
        Err(e) => {
            // Unparseable lock: treat like stale.
            debug!("Discarding malformed lock {}: {}", path.display(), e);
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
    };

    if !ops.process_alive(lock.pid) {
        info!(
            "Port {port} lock owner (pid {}) is gone; clearing stale lock",
            lock.pid
        );
        let _ = std::fs::remove_file(&path);
        return Ok(None);
    }

    Ok(Some(lock))
}

/// Drop the ownership record for a port; missing is not an error
pub fn remove_port_lock(lock_dir: &Path, port: u16) -> DepotResult<()> {
    let path = lock_path(lock_dir, port);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            debug!("Removed lock for port {port}");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DepotError::io(
            format!("removing lock {}", path.display()),
            e,
        )),
    }
}

/// Every port with a lock file present, unvalidated
pub fn list_locked_ports(lock_dir: &Path) -> DepotResult<Vec<u16>> {
    if !lock_dir.exists() {
        return Ok(vec![]);
    }
    let entries = std::fs::read_dir(lock_dir)
        .map_err(|e| DepotError::io(format!("reading lock dir {}", lock_dir.display()), e))?;

    let mut ports: Vec<u16> = entries
        .flatten()
        .filter_map(|entry| port_from_lock_path(&entry.path()))
        .collect();
    ports.sort_unstable();
    Ok(ports)
}
