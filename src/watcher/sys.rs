//! Unix shims for probing, signalling, and reaping a watched process.
//!
//! Every `kill(2)`/`waitpid(2)` call the watcher makes goes through here,
//! so the state machine in `pid_watcher` stays free of OS plumbing.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Signal-0 existence probe.
///
/// Returns `true` while `pid` names a live process, including a zombie
/// that has not been reaped yet.
pub(crate) fn alive(pid: Pid) -> bool {
    kill(pid, None).is_ok()
}

/// Delivers `signal` to `pid`, swallowing failures.
///
/// `ESRCH` means the process won the race and is already gone, which
/// callers treat the same as delivered. Any other failure is logged and
/// swallowed as well; the caller asked the child to terminate, and the
/// child disappearing on its own is an acceptable outcome of that.
pub(crate) fn send_signal(pid: Pid, signal: Signal) {
    match kill(pid, signal) {
        Ok(()) => debug!("sent {} to process {}", signal, pid),
        Err(Errno::ESRCH) => {
            debug!("process {} already gone, {} not delivered", pid, signal);
        }
        Err(err) => {
            warn!("failed to send {} to process {}: {}", signal, pid, err);
        }
    }
}

/// Blocking reap. Returns the collected status, or `None` when `waitpid`
/// fails (e.g., the PID is not a child of this process, or the status was
/// already collected elsewhere).
pub(crate) fn reap_blocking(pid: Pid) -> Option<WaitStatus> {
    match waitpid(pid, None) {
        Ok(status) => {
            debug!("process {} reaped with status {:?}", pid, status);
            Some(status)
        }
        Err(err) => {
            debug!("waitpid({}) failed: {}", pid, err);
            None
        }
    }
}

/// Non-blocking reap attempt.
///
/// `Ok(None)` means the process is still running. `Err` means the status
/// cannot be collected at all (not a child, or already reaped).
pub(crate) fn try_reap(pid: Pid) -> std::result::Result<Option<WaitStatus>, Errno> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG))? {
        WaitStatus::StillAlive => Ok(None),
        status => Ok(Some(status)),
    }
}
