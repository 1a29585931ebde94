//! Thread-safe watching of a single child process.
//!
//! One thread spawns a child; other threads observe, wait on, or terminate
//! it through a shared [`PidWatcher`] without knowing the PID in advance.

pub mod error;
pub mod watcher;

pub use error::{PidwatchError, Result};
pub use watcher::PidWatcher;

pub use nix::unistd::Pid;
