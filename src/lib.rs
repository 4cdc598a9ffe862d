//! Yash - a command line shell with POSIX-style job control.
//!
//! A command line is split into tokens, parsed into at most two piped
//! segments, and launched as one process group. The shell keeps a fixed-size
//! table of jobs and moves the terminal between itself and its foreground job.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

#[macro_use]
mod util;

pub mod core;
pub mod errors;
pub mod shell;

pub use crate::shell::{Editor, LineSource, Limits, Shell, ShellConfig};
pub use crate::util::YashExitStatusExt;
