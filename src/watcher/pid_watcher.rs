//! The `PidWatcher` itself: one mutex, one condition variable, and a
//! three-state lifecycle (no PID yet, running, exited).

use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::sys;
use crate::error::{PidwatchError, Result};

/// How often `terminate_now` re-checks a child that was asked to exit.
const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct WatchState {
    /// Assigned at most once; only `reset()` discards it.
    pid: Option<Pid>,
    /// Authoritative reap result. Stays `None` when the exit was only
    /// presumed via the liveness probe, which never reaps.
    wait_status: Option<WaitStatus>,
    /// Monotonic: never goes back to `false` once set.
    has_exited: bool,
    /// Whether dropping the watcher should wait for the child to die.
    wait_on_drop: bool,
}

/// Thread-safe watcher for a single child process.
///
/// The PID may be assigned after the watcher has been shared with other
/// threads, so that spawning can happen on a worker thread without the
/// observers having to coordinate with it. Any call that needs the PID
/// blocks until one is assigned; before assignment the child is assumed
/// to have been started successfully, so to observers the process is
/// always either running or terminated.
///
/// A watcher is bound to at most one PID for its whole lifetime. It is
/// deliberately neither `Clone` nor `Copy` ("the one thing watching this
/// process" must not be duplicated); share it across threads by reference
/// or behind an [`Arc`](std::sync::Arc).
///
/// Unless [`reset`](Self::reset) was called or the policy was disabled via
/// [`set_wait_on_drop`](Self::set_wait_on_drop), dropping the watcher
/// blocks until the child has been reaped, so no zombie is left behind.
#[derive(Debug)]
pub struct PidWatcher {
    state: Mutex<WatchState>,
    pid_assigned: Condvar,
}

impl PidWatcher {
    /// Creates an empty watcher. Use [`set_pid`](Self::set_pid) to bind it.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WatchState {
                pid: None,
                wait_status: None,
                has_exited: false,
                wait_on_drop: true,
            }),
            pid_assigned: Condvar::new(),
        }
    }

    /// Creates a watcher already bound to `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`PidwatchError::InvalidPid`] if `pid` is not positive.
    pub fn watching(pid: Pid) -> Result<Self> {
        let watcher = Self::new();
        watcher.set_pid(pid)?;
        Ok(watcher)
    }

    /// Binds the watcher to `pid` and wakes every thread blocked waiting
    /// for assignment.
    ///
    /// A watcher accepts exactly one PID for its lifetime. Re-assigning
    /// the identical PID is a no-op (without re-notifying waiters);
    /// anything else is a usage error, since observers would suddenly be
    /// watching a different process than they thought.
    ///
    /// # Errors
    ///
    /// - [`PidwatchError::InvalidPid`] if `pid` is not positive. Zero and
    ///   negative values have group/broadcast semantics in `kill(2)` and
    ///   `waitpid(2)`, and this watcher tracks a single process, not a
    ///   process group.
    /// - [`PidwatchError::AlreadyWatching`] if a different PID is already
    ///   bound; the original binding is retained.
    pub fn set_pid(&self, pid: Pid) -> Result<&Self> {
        if pid.as_raw() < 1 {
            return Err(PidwatchError::InvalidPid(pid.as_raw()));
        }

        let mut state = self.state.lock();
        match state.pid {
            Some(current) if current != pid => Err(PidwatchError::AlreadyWatching {
                current: current.as_raw(),
                requested: pid.as_raw(),
            }),
            Some(_) => Ok(self),
            None => {
                state.pid = Some(pid);
                self.pid_assigned.notify_all();
                Ok(self)
            }
        }
    }

    /// Returns the watched PID, blocking until one has been assigned.
    pub fn pid(&self) -> Pid {
        let mut state = self.state.lock();
        loop {
            if let Some(pid) = state.pid {
                return pid;
            }
            self.pid_assigned.wait(&mut state);
        }
    }

    /// Returns true iff a PID has been assigned. Never blocks.
    pub fn has_pid(&self) -> bool {
        self.state.lock().pid.is_some()
    }

    /// Waits for the child to exit, reaping it exactly once.
    ///
    /// Blocks until a PID is assigned if none is yet, then blocks in
    /// `waitpid(2)` until the child terminates. The collected status feeds
    /// [`exited_normally`](Self::exited_normally),
    /// [`exit_code`](Self::exit_code) and [`success`](Self::success).
    /// Once the child has been observed to exit this returns immediately.
    pub fn wait(&self) -> &Self {
        let mut state = self.state.lock();
        loop {
            if state.pid.is_some() {
                break;
            }
            self.pid_assigned.wait(&mut state);
        }
        Self::reap_locked(&mut state);
        self
    }

    /// Reaps the child if it has a PID and was not observed to exit yet.
    /// The caller holds the state lock.
    fn reap_locked(state: &mut WatchState) {
        if let Some(pid) = state.pid {
            if !state.has_exited {
                state.wait_status = sys::reap_blocking(pid);
                state.has_exited = true;
            }
        }
    }

    /// Non-blocking liveness check.
    ///
    /// With a PID assigned this probes the OS (signal 0); a process that
    /// is gone flips the watcher to exited *without* reaping, so no exit
    /// status becomes available through this path. With no PID assigned
    /// yet this is optimistic and reports the child as running, on the
    /// assumption that a PID will be assigned eventually.
    pub fn is_running(&self) -> bool {
        let mut state = self.state.lock();
        if !state.has_exited {
            if let Some(pid) = state.pid {
                // An exited-but-unreaped child still probes as alive; only
                // a fully gone process flips the flag here.
                state.has_exited = !sys::alive(pid);
            }
        }
        !state.has_exited
    }

    /// Detaches the watcher: no PID, considered exited, no status.
    ///
    /// After this call [`is_running`](Self::is_running) reports false and
    /// dropping the watcher will not wait for anything. Threads already
    /// blocked waiting for a PID stay blocked.
    pub fn reset(&self) -> &Self {
        let mut state = self.state.lock();
        state.pid = None;
        state.wait_status = None;
        state.has_exited = true;
        self
    }

    /// Asks the child to terminate as soon as possible (SIGTERM).
    ///
    /// Does nothing when no PID is assigned or the child was already
    /// observed to exit. Delivery failures are logged and swallowed: the
    /// child exiting between our liveness knowledge and the signal is not
    /// an error for the caller. To wait for the child to actually die use
    /// `watcher.terminate().wait()`.
    pub fn terminate(&self) -> &Self {
        let state = self.state.lock();
        if let Some(pid) = state.pid {
            if !state.has_exited {
                sys::send_signal(pid, Signal::SIGTERM);
            }
        }
        self
    }

    /// Terminates the child, forcibly if needed, and reaps it.
    ///
    /// Sends SIGTERM, then polls for the child's exit for up to `timeout`.
    /// If the child is still alive after that it is killed with SIGKILL
    /// and reaped. Unlike [`terminate`](Self::terminate) this does not
    /// return until the child is gone.
    ///
    /// A watcher with no PID assigned, or whose child already exited,
    /// returns immediately.
    pub fn terminate_now(&self, timeout: Duration) -> &Self {
        let mut state = self.state.lock();
        let pid = match state.pid {
            Some(pid) if !state.has_exited => pid,
            _ => return self,
        };

        sys::send_signal(pid, Signal::SIGTERM);

        let deadline = Instant::now() + timeout;
        loop {
            match sys::try_reap(pid) {
                Ok(Some(status)) => {
                    state.wait_status = Some(status);
                    state.has_exited = true;
                    return self;
                }
                Ok(None) => {}
                Err(err) => {
                    // Not collectable (not our child, or reaped elsewhere);
                    // the process is gone as far as we can tell.
                    debug!("collecting status of process {} failed: {}", pid, err);
                    state.has_exited = true;
                    return self;
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(TERMINATE_POLL_INTERVAL);
        }

        warn!(
            "process {} did not exit within {:?} after SIGTERM, sending SIGKILL",
            pid, timeout
        );
        sys::send_signal(pid, Signal::SIGKILL);
        state.wait_status = sys::reap_blocking(pid);
        state.has_exited = true;
        self
    }

    /// Returns true iff the child ended via normal termination rather than
    /// a fatal signal. Implies [`wait`](Self::wait).
    ///
    /// An exit that was only presumed through the liveness probe carries
    /// no status and reports false here.
    pub fn exited_normally(&self) -> bool {
        self.wait();
        let state = self.state.lock();
        matches!(state.wait_status, Some(WaitStatus::Exited(..)))
    }

    /// Returns the child's exit code, or `None` if it died from a signal
    /// or its exit was only presumed. Implies [`wait`](Self::wait).
    pub fn exit_code(&self) -> Option<i32> {
        self.wait();
        let state = self.state.lock();
        match state.wait_status {
            Some(WaitStatus::Exited(_, code)) => Some(code),
            _ => None,
        }
    }

    /// Returns true iff the child exited normally with code 0. Implies
    /// [`wait`](Self::wait).
    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }

    /// Whether dropping the watcher waits for the child to die.
    pub fn wait_on_drop(&self) -> bool {
        self.state.lock().wait_on_drop
    }

    /// Sets whether dropping the watcher waits for the child to die.
    pub fn set_wait_on_drop(&self, wait_on_drop: bool) -> &Self {
        self.state.lock().wait_on_drop = wait_on_drop;
        self
    }
}

impl Default for PidWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PidWatcher {
    fn drop(&mut self) {
        let should_wait = {
            let state = self.state.lock();
            state.pid.is_some() && state.wait_on_drop
        };
        if should_wait {
            self.wait();
        }
    }
}
