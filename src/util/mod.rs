use std::io;
use std::os::unix::prelude::*;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// Logs `$result` at the error level if it is an `Err`, then discards it.
macro_rules! log_if_err {
    ($result:expr, $($arg:tt)+) => {
        if let Err(ref e) = $result {
            error!("{}: {}", format_args!($($arg)+), e);
        }
    };
}

pub use self::unix::isatty;

pub mod unix;

/// Yash Utility Extensions for `ExitStatus`
pub trait YashExitStatusExt {
    /// Create an ExitStatus to indicate *unsuccessful* program execution.
    fn from_failure() -> Self;

    /// Create an ExitStatus from a status code
    fn from_status(code: i32) -> Self;

    /// Create the ExitStatus a shell reports for a process killed by `signal`
    fn from_signal(signal: Signal) -> Self;
}

impl YashExitStatusExt for ExitStatus {
    /// # Examples
    /// ```rust
    /// use yash_rs::YashExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(!ExitStatus::from_failure().success());
    /// ```
    fn from_failure() -> Self {
        ExitStatus::from_status(1)
    }

    /// # Examples
    /// ```rust
    /// use yash_rs::YashExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_status(0).success());
    /// assert_eq!(ExitStatus::from_status(3).code(), Some(3));
    /// ```
    fn from_status(code: i32) -> Self {
        ExitStatus::from_raw(code << 8)
    }

    fn from_signal(signal: Signal) -> Self {
        ExitStatus::from_status(128 + signal as i32)
    }
}

/// The file descriptor of the controlling terminal.
pub fn get_terminal() -> RawFd {
    io::stdin().as_raw_fd()
}
