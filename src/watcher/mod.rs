//! Watching a single child process across threads.
//!
//! This module provides infrastructure for observing one child process
//! whose PID may only become known after the watcher has already been
//! shared with other threads (e.g., spawning happens on a worker thread).

mod pid_watcher;
mod sys;

pub use pid_watcher::PidWatcher;
