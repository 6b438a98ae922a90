//! Platform capability for process and socket inspection
//!
//! Process killing and port-owner lookup differ per OS. One trait
//! gathers them; one variant is selected at startup by platform
//! detection, so call sites never branch on the OS themselves.

use crate::error::{DepotError, DepotResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Detected platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    /// Anything else
    Unsupported,
}

impl Platform {
    /// Detect the current platform
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOS,
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            _ => Platform::Unsupported,
        }
    }

    /// Get a human-readable platform name
    pub fn name(&self) -> &'static str {
        match self {
            Platform::MacOS => "macOS",
            Platform::Linux => "Linux",
            Platform::Windows => "Windows",
            Platform::Unsupported => "Unsupported",
        }
    }
}

/// OS-specific process and socket primitives
#[async_trait]
pub trait PlatformOps: Send + Sync {
    /// Pids of processes listening on a TCP port
    ///
    /// Queries the OS networking stack directly — independent of the
    /// lock-file mechanism, so a missing or stale lock cannot hide a
    /// real conflicting listener.
    async fn find_pids_by_port(&self, port: u16) -> DepotResult<Vec<u32>>;

    /// Forcibly terminate a process and its descendants
    async fn kill_tree(&self, pid: u32) -> DepotResult<()>;

    /// Whether a pid refers to a live process
    fn process_alive(&self, pid: u32) -> bool;
}

/// Create the capability implementation for the current platform
pub fn create_platform_ops() -> DepotResult<Box<dyn PlatformOps>> {
    match Platform::detect() {
        #[cfg(unix)]
        Platform::MacOS | Platform::Linux => Ok(Box::new(UnixOps)),
        #[cfg(windows)]
        Platform::Windows => Ok(Box::new(WindowsOps)),
        _ => Err(DepotError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        )),
    }
}

/// Parse pids from `lsof -t` output (one pid per line)
#[cfg(any(unix, test))]
fn parse_lsof_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Parse pids of listeners on `port` from `netstat -ano -p tcp` output
#[cfg(any(windows, test))]
fn parse_netstat_pids(output: &str, port: u16) -> Vec<u32> {
    let needle = format!(":{port}");
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let proto = cols.next()?;
            if !proto.eq_ignore_ascii_case("tcp") {
                return None;
            }
            let local = cols.next()?;
            if !local.ends_with(&needle) {
                return None;
            }
            let _remote = cols.next()?;
            let state = cols.next()?;
            if !state.eq_ignore_ascii_case("LISTENING") {
                return None;
            }
            cols.next()?.parse().ok()
        })
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// POSIX implementation: lsof for lookup, process-group signals for kill
#[cfg(unix)]
struct UnixOps;

#[cfg(unix)]
#[async_trait]
impl PlatformOps for UnixOps {
    async fn find_pids_by_port(&self, port: u16) -> DepotResult<Vec<u32>> {
        let result = Command::new("lsof")
            .args(["-ti", &format!("tcp:{port}"), "-sTCP:LISTEN"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        let output = match result {
            Ok(output) => output,
            // Minimal systems may not ship lsof; degrade to "no pids
            // found" rather than blocking every launch.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("lsof not found; skipping port-owner lookup");
                return Ok(vec![]);
            }
            Err(e) => return Err(DepotError::command_failed("lsof", e)),
        };

        // lsof exits non-zero when nothing matches; that is "no pids",
        // not a failure.
        Ok(parse_lsof_pids(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn kill_tree(&self, pid: u32) -> DepotResult<()> {
        debug!("Killing process group of {pid}");
        let pgid = -(pid as i32);
        // The child was spawned as its own group leader; signal the whole
        // group, falling back to the single process for anything that
        // changed its group.
        let killed = unsafe { libc::kill(pgid, libc::SIGKILL) } == 0;
        if !killed {
            let direct = unsafe { libc::kill(pid as i32, libc::SIGKILL) };
            if direct != 0 {
                let errno = std::io::Error::last_os_error();
                if errno.raw_os_error() != Some(libc::ESRCH) {
                    return Err(DepotError::io(format!("killing pid {pid}"), errno));
                }
            }
        }
        Ok(())
    }

    fn process_alive(&self, pid: u32) -> bool {
        // Signal 0 probes without delivering; EPERM still means alive.
        let rc = unsafe { libc::kill(pid as i32, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

/// Windows implementation: netstat for lookup, taskkill for tree kill
#[cfg(windows)]
struct WindowsOps;

#[cfg(windows)]
#[async_trait]
impl PlatformOps for WindowsOps {
    async fn find_pids_by_port(&self, port: u16) -> DepotResult<Vec<u32>> {
        let output = Command::new("netstat")
            .args(["-ano", "-p", "tcp"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| DepotError::command_failed("netstat", e))?;

        Ok(parse_netstat_pids(
            &String::from_utf8_lossy(&output.stdout),
            port,
        ))
    }

    async fn kill_tree(&self, pid: u32) -> DepotResult<()> {
        debug!("taskkill /T on {pid}");
        let output = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DepotError::command_failed("taskkill", e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        // "not found" means the tree is already gone.
        if !output.status.success() && !stderr.contains("not found") {
            return Err(DepotError::command_exec("taskkill", stderr));
        }
        Ok(())
    }

    fn process_alive(&self, pid: u32) -> bool {
        std::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/FO", "CSV", "/NH"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .map(|out| String::from_utf8_lossy(&out.stdout).contains(&format!("\"{pid}\"")))
            .unwrap_or(false)
    }
}
