use thiserror::Error;

#[derive(Error, Debug)]
pub enum PidwatchError {
    #[error("Invalid PID to watch: {0} (non-positive values address process groups)")]
    InvalidPid(i32),

    #[error("Already watching PID {current}, refusing to switch to PID {requested}")]
    AlreadyWatching { current: i32, requested: i32 },
}

pub type Result<T> = std::result::Result<T, PidwatchError>;
