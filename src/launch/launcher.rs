//! Launch lifecycle state machine
//!
//! `Idle → PortSelection → Spawning → WaitingForReachable → Ready →
//! Running → {Stopped, Crashed}`. Cancellation is accepted through the
//! first three working states and returns to `Idle` without writing a
//! lock; once the process is reachable, ownership is recorded and the
//! launch is `Running`.

use crate::config::schema::LaunchConfig;
use crate::error::{DepotError, DepotResult};
use crate::launch::lock::{
    list_locked_ports, read_port_lock, remove_port_lock, write_port_lock, PortLock,
};
use crate::launch::platform::PlatformOps;
use crate::launch::ports::{find_available_port, set_port_arg};
use crate::launch::process::{spawn_detached, wait_for_reachable, LaunchSpec, ReadinessOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where a launch attempt currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchPhase {
    Idle,
    PortSelection,
    Spawning,
    WaitingForReachable,
    Ready,
    Running,
    Stopped,
    Crashed,
}

impl fmt::Display for LaunchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::PortSelection => "port-selection",
            Self::Spawning => "spawning",
            Self::WaitingForReachable => "waiting-for-reachable",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Crashed => "crashed",
        };
        write!(f, "{name}")
    }
}

/// Result of a successful launch
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub port: u16,
    pub pid: u32,
}

/// One live/stale row in a status listing
#[derive(Debug, Clone)]
pub struct PortStatus {
    pub port: u16,
    /// Validated ownership record; `None` means the lock was stale and
    /// has been cleared
    pub lock: Option<PortLock>,
}

/// Launch coordinator for one lock directory
pub struct Launcher<'a> {
    ops: &'a dyn PlatformOps,
    lock_dir: PathBuf,
    config: LaunchConfig,
}

impl<'a> Launcher<'a> {
    pub fn new(ops: &'a dyn PlatformOps, lock_dir: impl Into<PathBuf>, config: LaunchConfig) -> Self {
        Self {
            ops,
            lock_dir: lock_dir.into(),
            config,
        }
    }

    /// Select a port, spawn the process, wait until reachable, record
    /// ownership
    ///
    /// With `fixed_port` the caller insists on one port; anything already
    /// listening there turns into a `PortConflict` carrying the pids and
    /// whether a valid lock marks the listener as depot-owned. Without
    /// it, the configured range is probed in order.
    ///
    /// `on_phase` observes each state transition; `on_attempt` observes
    /// readiness polling.
    pub async fn launch(
        &self,
        mut spec: LaunchSpec,
        label: &str,
        fixed_port: Option<u16>,
        cancel: &CancellationToken,
        mut on_phase: impl FnMut(LaunchPhase),
        on_attempt: impl FnMut(u32, u64),
    ) -> DepotResult<LaunchOutcome> {
        on_phase(LaunchPhase::PortSelection);
        if cancel.is_cancelled() {
            on_phase(LaunchPhase::Idle);
            return Err(DepotError::Cancelled);
        }

        let port = match fixed_port {
            Some(port) => {
                let pids = self.ops.find_pids_by_port(port).await?;
                if !pids.is_empty() {
                    let lock = read_port_lock(&self.lock_dir, port, self.ops)?;
                    let owned = lock.map(|l| pids.contains(&l.pid)).unwrap_or(false);
                    on_phase(LaunchPhase::Idle);
                    return Err(DepotError::PortConflict { port, pids, owned });
                }
                port
            }
            None => find_available_port(
                &self.config.host,
                self.config.port_range_start,
                self.config.port_range_end,
            )?,
        };
        set_port_arg(&mut spec, port);

        on_phase(LaunchPhase::Spawning);
        if cancel.is_cancelled() {
            on_phase(LaunchPhase::Idle);
            return Err(DepotError::Cancelled);
        }
        let pid = spawn_detached(&spec)?;

        on_phase(LaunchPhase::WaitingForReachable);
        let readiness = ReadinessOptions {
            poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            timeout: Duration::from_secs(self.config.ready_timeout_secs),
        };
        match wait_for_reachable(&self.config.host, port, &readiness, cancel, on_attempt).await {
            Ok(()) => {}
            Err(DepotError::Cancelled) => {
                // Cancelled before ownership was recorded: tear the
                // process back down and return to idle.
                let _ = self.ops.kill_tree(pid).await;
                on_phase(LaunchPhase::Idle);
                return Err(DepotError::Cancelled);
            }
            Err(e) => {
                warn!("Process {pid} never became reachable: {e}");
                let _ = self.ops.kill_tree(pid).await;
                on_phase(LaunchPhase::Crashed);
                return Err(e);
            }
        }

        on_phase(LaunchPhase::Ready);
        write_port_lock(&self.lock_dir, port, &PortLock::new(pid, label))?;
        on_phase(LaunchPhase::Running);
        info!("{label} running on port {port} (pid {pid})");

        Ok(LaunchOutcome { port, pid })
    }

    /// Stop whatever owns a port
    ///
    /// With a valid lock, the recorded owner's tree is killed and the
    /// lock removed. Without one, the socket table is consulted: any
    /// listeners found are a conflict unless `force`, in which case
    /// their trees are killed too.
    pub async fn stop(&self, port: u16, force: bool) -> DepotResult<LaunchPhase> {
        if let Some(lock) = read_port_lock(&self.lock_dir, port, self.ops)? {
            info!("Stopping {} (pid {}) on port {port}", lock.label, lock.pid);
            self.ops.kill_tree(lock.pid).await?;
            remove_port_lock(&self.lock_dir, port)?;
            return Ok(LaunchPhase::Stopped);
        }

        // No valid lock; a listener may still be there.
        let pids = self.ops.find_pids_by_port(port).await?;
        if pids.is_empty() {
            remove_port_lock(&self.lock_dir, port)?;
            return Ok(LaunchPhase::Idle);
        }

        if !force {
            return Err(DepotError::PortConflict {
                port,
                pids,
                owned: false,
            });
        }

        for pid in pids {
            warn!("Force-killing unowned listener {pid} on port {port}");
            self.ops.kill_tree(pid).await?;
        }
        remove_port_lock(&self.lock_dir, port)?;
        Ok(LaunchPhase::Stopped)
    }

    /// Validated view of every recorded port
    ///
    /// Reading validates each lock, so stale entries are cleared as a
    /// side effect and show up as `lock: None`.
    pub fn status(&self) -> DepotResult<Vec<PortStatus>> {
        let mut rows = vec![];
        for port in list_locked_ports(&self.lock_dir)? {
            let lock = read_port_lock(&self.lock_dir, port, self.ops)?;
            rows.push(PortStatus { port, lock });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeOps {
        alive: Vec<u32>,
        listeners: Vec<(u16, u32)>,
        killed: Mutex<Vec<u32>>,
    }

    impl FakeOps {
        fn new(alive: Vec<u32>, listeners: Vec<(u16, u32)>) -> Self {
            Self {
                alive,
                listeners,
                killed: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl PlatformOps for FakeOps {
        async fn find_pids_by_port(&self, port: u16) -> DepotResult<Vec<u32>> {
            Ok(self
                .listeners
                .iter()
                .filter(|(p, _)| *p == port)
                .map(|(_, pid)| *pid)
                .collect())
        }
        async fn kill_tree(&self, pid: u32) -> DepotResult<()> {
            self.killed.lock().unwrap().push(pid);
            Ok(())
        }
        fn process_alive(&self, pid: u32) -> bool {
            self.alive.contains(&pid)
        }
    }

    fn launcher<'a>(ops: &'a FakeOps, dir: &TempDir) -> Launcher<'a> {
        Launcher::new(ops, dir.path(), LaunchConfig::default())
    }

    #[tokio::test]
    async fn cancelled_before_port_selection_returns_idle() {
        let ops = FakeOps::new(vec![], vec![]);
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut phases = vec![];
        let err = launcher(&ops, &dir)
            .launch(
                LaunchSpec::new("/opt/x/server", vec![]),
                "x",
                None,
                &cancel,
                |p| phases.push(p),
                |_, _| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DepotError::Cancelled));
        assert_eq!(
            phases,
            vec![LaunchPhase::PortSelection, LaunchPhase::Idle]
        );
        // No lock was written.
        assert!(list_locked_ports(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn fixed_port_conflict_carries_pids_and_ownership() {
        let ops = FakeOps::new(vec![4242], vec![(9100, 4242)]);
        let dir = TempDir::new().unwrap();
        write_port_lock(dir.path(), 9100, &PortLock::new(4242, "bundle")).unwrap();

        let err = launcher(&ops, &dir)
            .launch(
                LaunchSpec::new("/opt/x/server", vec![]),
                "x",
                Some(9100),
                &CancellationToken::new(),
                |_| {},
                |_, _| {},
            )
            .await
            .unwrap_err();

        match err {
            DepotError::PortConflict { port, pids, owned } => {
                assert_eq!(port, 9100);
                assert_eq!(pids, vec![4242]);
                assert!(owned);
            }
            other => panic!("expected PortConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_listener_is_unowned_conflict() {
        let ops = FakeOps::new(vec![], vec![(9100, 777)]);
        let dir = TempDir::new().unwrap();

        let err = launcher(&ops, &dir)
            .launch(
                LaunchSpec::new("/opt/x/server", vec![]),
                "x",
                Some(9100),
                &CancellationToken::new(),
                |_| {},
                |_, _| {},
            )
            .await
            .unwrap_err();

        match err {
            DepotError::PortConflict { owned, .. } => assert!(!owned),
            other => panic!("expected PortConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_kills_lock_owner_and_clears_lock() {
        let ops = FakeOps::new(vec![4242], vec![]);
        let dir = TempDir::new().unwrap();
        write_port_lock(dir.path(), 9100, &PortLock::new(4242, "bundle")).unwrap();

        let phase = launcher(&ops, &dir).stop(9100, false).await.unwrap();
        assert_eq!(phase, LaunchPhase::Stopped);
        assert_eq!(*ops.killed.lock().unwrap(), vec![4242]);
        assert!(list_locked_ports(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_without_lock_or_listener_is_idle() {
        let ops = FakeOps::new(vec![], vec![]);
        let dir = TempDir::new().unwrap();

        let phase = launcher(&ops, &dir).stop(9100, false).await.unwrap();
        assert_eq!(phase, LaunchPhase::Idle);
    }

    #[tokio::test]
    async fn stop_foreign_listener_requires_force() {
        let ops = FakeOps::new(vec![], vec![(9100, 777)]);
        let dir = TempDir::new().unwrap();

        let err = launcher(&ops, &dir).stop(9100, false).await.unwrap_err();
        assert!(matches!(err, DepotError::PortConflict { owned: false, .. }));
        assert!(ops.killed.lock().unwrap().is_empty());

        let phase = launcher(&ops, &dir).stop(9100, true).await.unwrap();
        assert_eq!(phase, LaunchPhase::Stopped);
        assert_eq!(*ops.killed.lock().unwrap(), vec![777]);
    }

    #[tokio::test]
    async fn status_clears_stale_rows() {
        let ops = FakeOps::new(vec![4242], vec![]);
        let dir = TempDir::new().unwrap();
        write_port_lock(dir.path(), 9100, &PortLock::new(4242, "live")).unwrap();
        write_port_lock(dir.path(), 9101, &PortLock::new(31337, "dead")).unwrap();

        let rows = launcher(&ops, &dir).status().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.port == 9100 && r.lock.is_some()));
        assert!(rows.iter().any(|r| r.port == 9101 && r.lock.is_none()));
        // The stale file is gone after the read.
        assert_eq!(list_locked_ports(dir.path()).unwrap(), vec![9100]);
    }
}
