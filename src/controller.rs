//! Single-shot control process: toggle a live daemon or launch one.
//!
//! Fire-and-forget. If the PID record points at a live process the toggle
//! signal is delivered and nothing is awaited; otherwise a fresh daemon is
//! spawned fully detached and begins recording on its own once its model is
//! loaded. A stale record (dead process) counts as "not running". Two
//! controllers racing each other can launch two daemons; the record is not
//! locked.

use crate::daemon;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Failed to locate the sotto executable: {0}")]
    NoExecutable(std::io::Error),

    #[error("Failed to spawn daemon: {0}")]
    SpawnFailed(std::io::Error),

    #[error("Failed to signal daemon: {0}")]
    SignalFailed(String),
}

/// What the liveness probe decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// A live daemon: deliver the toggle signal, nothing else
    SignalToggle(i32),
    /// No record, or a stale one: spawn a fresh daemon
    LaunchDaemon,
}

fn plan(live_pid: Option<i32>) -> Action {
    match live_pid {
        Some(pid) => Action::SignalToggle(pid),
        None => Action::LaunchDaemon,
    }
}

/// Toggle recording, launching the daemon first if none is alive
pub fn toggle_or_launch() -> Result<(), ControllerError> {
    match plan(daemon::live_pid()) {
        Action::SignalToggle(pid) => send_toggle(pid),
        Action::LaunchDaemon => launch_daemon(),
    }
}

#[cfg(unix)]
fn send_toggle(pid: i32) -> Result<(), ControllerError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), Signal::SIGUSR1)
        .map_err(|e| ControllerError::SignalFailed(e.to_string()))?;

    info!("Sent toggle to daemon (PID: {})", pid);
    Ok(())
}

#[cfg(not(unix))]
fn send_toggle(_pid: i32) -> Result<(), ControllerError> {
    Err(ControllerError::SignalFailed(
        "signal delivery not supported on this platform".to_string(),
    ))
}

/// Spawn `sotto daemon` detached, with stdio discarded, and return without
/// waiting for the model to load
fn launch_daemon() -> Result<(), ControllerError> {
    let exe = std::env::current_exe().map_err(ControllerError::NoExecutable)?;

    let mut command = Command::new(exe);
    command
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group: the daemon outlives this controller
        command.process_group(0);
    }

    command.spawn().map_err(ControllerError::SpawnFailed)?;

    info!("Spawned daemon; recording starts once the model is loaded");
    Ok(())
}
