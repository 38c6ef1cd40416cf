//! XWayland process supervision
//!
//! The core never forks or waits on children itself. The event loop reaps the
//! X server and forwards what happened as a [`ProcessEvent`]; the supervisor
//! answers with the [`SupervisorAction`] the loop should take.

use crate::compositor::Compositor;
use crate::config::XWaylandConfig;
use crate::renderer::Renderer;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Highest X display number probed for a free lock file
const MAX_DISPLAY: u32 = 100;

/// How a reaped child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ExitStatus {
    /// Returned from main or called exit
    Exited(i32),
    /// Killed by a signal
    Signaled(i32),
}

impl ExitStatus {
    pub fn is_normal(self) -> bool {
        matches!(self, ExitStatus::Exited(_))
    }
}

/// Something the event loop observed about child processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessEvent {
    ChildExited { pid: u32, status: ExitStatus },
    Interrupted,
}

/// What the event loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorAction {
    /// Start a new X server and report its pid with [`XwaylandSupervisor::spawned`]
    Respawn,
    /// Stop the compositor
    Shutdown,
    Ignore,
}

/// XWayland server state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running { pid: u32 },
    /// Gave up after a crash or too many restarts
    Failed,
}

/// Tracks the X server pid and decides how to react to its exit
#[derive(Debug)]
pub struct XwaylandSupervisor {
    config: XWaylandConfig,
    state: ServerState,
    restarts: u32,
}

impl XwaylandSupervisor {
    pub fn new(config: &XWaylandConfig) -> Self {
        Self {
            config: config.clone(),
            state: ServerState::Stopped,
            restarts: 0,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        match self.state {
            ServerState::Running { pid } => Some(pid),
            _ => None,
        }
    }

    /// Respawns performed so far
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Records the pid of a freshly started X server
    pub fn spawned(&mut self, pid: u32) {
        if !self.config.enabled {
            warn!("XWayland is disabled, not tracking pid {}", pid);
            return;
        }
        info!("🔗 XWayland server running as pid {}", pid);
        self.state = ServerState::Running { pid };
    }

    pub fn handle(&mut self, event: ProcessEvent) -> SupervisorAction {
        match event {
            ProcessEvent::Interrupted => {
                info!("🛑 Interrupted, shutting down");
                self.state = ServerState::Stopped;
                SupervisorAction::Shutdown
            }
            ProcessEvent::ChildExited { pid, status } => self.child_exited(pid, status),
        }
    }

    fn child_exited(&mut self, pid: u32, status: ExitStatus) -> SupervisorAction {
        if !status.is_normal() {
            // respawning a crashing server would loop forever
            error!("❌ Child {} died abnormally ({:?}), shutting down", pid, status);
            self.state = ServerState::Failed;
            return SupervisorAction::Shutdown;
        }
        if self.pid() != Some(pid) {
            debug!("reaped unrelated child {} ({:?})", pid, status);
            return SupervisorAction::Ignore;
        }

        if !self.config.respawn {
            info!("XWayland exited ({:?}), respawn disabled", status);
            self.state = ServerState::Stopped;
            return SupervisorAction::Ignore;
        }
        let limit = self.config.max_restarts;
        if limit != 0 && self.restarts >= limit {
            error!("❌ XWayland exited again after {} restarts, giving up", self.restarts);
            self.state = ServerState::Failed;
            return SupervisorAction::Shutdown;
        }

        self.restarts += 1;
        self.state = ServerState::Stopped;
        warn!("🔄 XWayland exited ({:?}), restarting (attempt {})", status, self.restarts);
        SupervisorAction::Respawn
    }
}

impl<R: Renderer> Compositor<R> {
    pub fn xwayland(&self) -> &XwaylandSupervisor {
        &self.xwayland
    }

    pub fn xwayland_mut(&mut self) -> &mut XwaylandSupervisor {
        &mut self.xwayland
    }

    /// Delivers a child-process notification from the event loop
    pub fn process_event(&mut self, event: ProcessEvent) -> SupervisorAction {
        self.xwayland.handle(event)
    }
}

/// Finds the lowest X display number without a live lock file in `lock_dir`
/// (normally `/tmp`).
///
/// Lock files hold the owner's pid as ten right-aligned digits. Locks whose
/// owner no longer exists are removed; unreadable ones are skipped.
pub fn find_available_display(lock_dir: &Path) -> Result<u32> {
    for display in 0..MAX_DISPLAY {
        let lock_file = lock_dir.join(format!(".X{}-lock", display));
        let contents = match fs::read_to_string(&lock_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("🔍 Found available display: :{}", display);
                return Ok(display);
            }
            Err(e) => {
                warn!("can't read lock file {}: {}", lock_file.display(), e);
                continue;
            }
        };

        let Ok(owner) = contents.trim().parse::<i32>() else {
            warn!("can't parse lock file {}", lock_file.display());
            continue;
        };
        if !process_exists(owner) {
            warn!("unlinking stale lock file {}", lock_file.display());
            fs::remove_file(&lock_file)
                .with_context(|| format!("Failed to remove stale lock {}", lock_file.display()))?;
            return Ok(display);
        }
    }

    Err(anyhow::anyhow!("No available X11 display numbers found"))
}

fn process_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks for existence and permission
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn supervisor(max_restarts: u32) -> XwaylandSupervisor {
        let config = XWaylandConfig {
            max_restarts,
            ..XWaylandConfig::default()
        };
        let mut supervisor = XwaylandSupervisor::new(&config);
        supervisor.spawned(42);
        supervisor
    }

    fn exited(pid: u32, code: i32) -> ProcessEvent {
        ProcessEvent::ChildExited {
            pid,
            status: ExitStatus::Exited(code),
        }
    }

    #[test]
    fn test_clean_exit_of_server_respawns() {
        let mut supervisor = supervisor(5);
        assert_eq!(supervisor.handle(exited(42, 0)), SupervisorAction::Respawn);
        assert_eq!(supervisor.restarts(), 1);
        assert_eq!(supervisor.pid(), None);

        supervisor.spawned(43);
        assert_eq!(supervisor.state(), ServerState::Running { pid: 43 });
    }

    #[test]
    fn test_crash_shuts_down() {
        let mut supervisor = supervisor(5);
        let event = ProcessEvent::ChildExited {
            pid: 42,
            status: ExitStatus::Signaled(libc::SIGSEGV),
        };
        assert_eq!(supervisor.handle(event), SupervisorAction::Shutdown);
        assert_eq!(supervisor.state(), ServerState::Failed);
    }

    #[test]
    fn test_unknown_child_is_ignored() {
        let mut supervisor = supervisor(5);
        assert_eq!(supervisor.handle(exited(7, 1)), SupervisorAction::Ignore);
        assert_eq!(supervisor.pid(), Some(42));
    }

    #[test]
    fn test_interrupt_shuts_down() {
        let mut supervisor = supervisor(5);
        assert_eq!(supervisor.handle(ProcessEvent::Interrupted), SupervisorAction::Shutdown);
    }

    #[test]
    fn test_restart_limit() {
        let mut supervisor = supervisor(2);
        for pid in [42, 43] {
            assert_eq!(supervisor.handle(exited(pid, 0)), SupervisorAction::Respawn);
            supervisor.spawned(pid + 1);
        }
        assert_eq!(supervisor.handle(exited(44, 0)), SupervisorAction::Shutdown);
        assert_eq!(supervisor.restarts(), 2);
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let mut supervisor = supervisor(0);
        for pid in 42..62 {
            assert_eq!(supervisor.handle(exited(pid, 0)), SupervisorAction::Respawn);
            supervisor.spawned(pid + 1);
        }
        assert_eq!(supervisor.restarts(), 20);
    }

    #[test]
    fn test_respawn_disabled() {
        let config = XWaylandConfig {
            respawn: false,
            ..XWaylandConfig::default()
        };
        let mut supervisor = XwaylandSupervisor::new(&config);
        supervisor.spawned(42);
        assert_eq!(supervisor.handle(exited(42, 0)), SupervisorAction::Ignore);
        assert_eq!(supervisor.state(), ServerState::Stopped);
    }

    #[test]
    fn test_process_event_serde() {
        let event: ProcessEvent =
            serde_json::from_str(r#"{"event":"child_exited","pid":3,"status":{"kind":"signaled","code":9}}"#)
                .unwrap();
        assert_eq!(
            event,
            ProcessEvent::ChildExited {
                pid: 3,
                status: ExitStatus::Signaled(9)
            }
        );
    }

    #[test]
    fn test_find_display_skips_live_locks() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".X0-lock"), format!("{:>10}\n", std::process::id())).unwrap();
        assert_eq!(find_available_display(dir.path()).unwrap(), 1);
    }

    #[test]
    fn test_find_display_removes_stale_locks() {
        let dir = TempDir::new().unwrap();
        // pid_max never reaches i32::MAX
        fs::write(dir.path().join(".X0-lock"), format!("{:>10}\n", i32::MAX)).unwrap();
        assert_eq!(find_available_display(dir.path()).unwrap(), 0);
        assert!(!dir.path().join(".X0-lock").exists());
    }

    #[test]
    fn test_find_display_skips_garbage() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".X0-lock"), "not a pid").unwrap();
        assert_eq!(find_available_display(dir.path()).unwrap(), 1);
    }
}
