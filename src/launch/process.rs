//! Detached process spawn and readiness polling

use crate::error::{DepotError, DepotResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How to start the external process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Executable to run
    pub program: PathBuf,

    /// Argument list; `set_port_arg` injects the resolved port here
    pub args: Vec<String>,

    /// Working directory, when the bundle needs one
    pub cwd: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }
}

/// Start the process detached from this one
///
/// The child gets its own process group (POSIX) or console-free group
/// (Windows) so it survives the launcher's exit and can later be torn
/// down as a tree. Returns the child's pid; the handle is dropped —
/// tracking happens through the pid and the port lock, not through a
/// wait.
pub fn spawn_detached(spec: &LaunchSpec) -> DepotResult<u32> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false);

    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
    }

    debug!("Spawning {} {:?}", spec.program.display(), spec.args);
    let child = cmd
        .spawn()
        .map_err(|e| DepotError::Spawn(format!("{}: {e}", spec.program.display())))?;

    let pid = child
        .id()
        .ok_or_else(|| DepotError::Spawn("child exited before pid was read".to_string()))?;
    info!("Spawned pid {pid}");
    Ok(pid)
}

/// Knobs for readiness polling
#[derive(Debug, Clone)]
pub struct ReadinessOptions {
    /// Interval between connect attempts
    pub poll_interval: Duration,

    /// Overall deadline
    pub timeout: Duration,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        let defaults = crate::config::schema::LaunchConfig::default();
        Self {
            poll_interval: Duration::from_millis(defaults.poll_interval_ms),
            timeout: Duration::from_secs(defaults.ready_timeout_secs),
        }
    }
}

/// Poll until something accepts TCP connections on `host:port`
///
/// Invokes `on_attempt(attempt, elapsed_ms)` before each probe.
/// Cancellation short-circuits with `Cancelled`; the deadline expiring is
/// a `Timeout` — distinct, because the target may still come up later.
pub async fn wait_for_reachable(
    host: &str,
    port: u16,
    opts: &ReadinessOptions,
    cancel: &CancellationToken,
    mut on_attempt: impl FnMut(u32, u64),
) -> DepotResult<()> {
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DepotError::Cancelled);
        }

        attempt += 1;
        on_attempt(attempt, started.elapsed().as_millis() as u64);

        let probe = tokio::time::timeout(opts.poll_interval, TcpStream::connect((host, port)));
        match probe.await {
            Ok(Ok(_stream)) => {
                debug!("{host}:{port} reachable after {attempt} attempt(s)");
                return Ok(());
            }
            Ok(Err(_)) | Err(_) => {}
        }

        if started.elapsed() >= opts.timeout {
            return Err(DepotError::Timeout {
                what: format!("{host}:{port} to accept connections"),
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(DepotError::Cancelled),
            _ = tokio::time::sleep(opts.poll_interval) => {}
        }
    }
}
