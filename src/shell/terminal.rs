//! Signal dispositions and ownership of the controlling terminal.
//!
//! Terminal-generated signals are delivered by the kernel to whichever process
//! group owns the terminal, so the shell never forwards signals itself: it
//! ignores them and moves terminal ownership between itself and its jobs.

use nix::{
    libc,
    sys::{
        signal::{self, SigHandler, Signal},
        termios::{self, Termios},
    },
    unistd::{self, Pid},
};

use crate::errors::{Error, Result};
use crate::util;

/// Signals the shell ignores for its whole lifetime.
const SHELL_IGNORED_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Signals a child restores to their default action before exec.
///
/// `SIGPIPE` is ignored by the Rust runtime at startup, and an ignored
/// disposition survives exec.
const CHILD_DEFAULT_SIGNALS: [Signal; 6] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGCHLD,
    Signal::SIGPIPE,
];

/// Puts the shell in its own process group in the foreground of its terminal
/// and makes it immune to job-control signals.
pub fn initialize_job_control() -> Result<()> {
    let shell_terminal = util::get_terminal();

    // Loop until the shell is in the foreground
    loop {
        let shell_pgid = unistd::getpgrp();
        if unistd::tcgetpgrp(shell_terminal)? == shell_pgid {
            break;
        }
        signal::kill(
            Pid::from_raw(-libc::pid_t::from(shell_pgid)),
            Signal::SIGTTIN,
        )?;
    }

    ignore_job_control_signals()?;

    // Put ourselves in our own process group. This fails for a session
    // leader, which already leads its own group.
    let shell_pgid = Pid::this();
    let temp_result = unistd::setpgid(shell_pgid, shell_pgid);
    log_if_err!(temp_result, "failed to put shell in its own process group");

    let temp_result = unistd::tcsetpgrp(shell_terminal, unistd::getpgrp());
    log_if_err!(temp_result, "failed to grab control of terminal");

    info!("job control initialized");
    Ok(())
}

fn ignore_job_control_signals() -> Result<()> {
    for &sig in &SHELL_IGNORED_SIGNALS {
        // Safe because no handler is installed, only a disposition.
        unsafe { signal::signal(sig, SigHandler::SigIgn) }?;
    }
    Ok(())
}

/// Restores the default disposition of job-control signals in a freshly
/// forked child, keeping `SIGTTOU` ignored.
///
/// Runs between fork and exec, so it neither allocates nor logs.
pub fn reset_child_signals() {
    for &sig in &CHILD_DEFAULT_SIGNALS {
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }
    let _ = unsafe { signal::signal(Signal::SIGTTOU, SigHandler::SigIgn) };
}

/// Reads the current terminal modes, e.g. to save those of a stopped job.
pub fn terminal_modes() -> Option<Termios> {
    termios::tcgetattr(util::get_terminal()).ok()
}

/// RAII struct to encapsulate manipulating terminal state.
///
/// Gives the terminal to a job's process group on creation and hands it back
/// to the shell, with the shell's terminal modes, when dropped.
#[derive(Debug)]
pub struct TerminalState {
    prev_pgid: Pid,
    prev_tmodes: Option<Termios>,
}

impl TerminalState {
    pub fn new(new_pgid: Pid) -> Result<TerminalState> {
        debug!("setting terminal process group to {}", new_pgid);
        let shell_terminal = util::get_terminal();
        let prev_tmodes = termios::tcgetattr(shell_terminal).ok();
        unistd::tcsetpgrp(shell_terminal, new_pgid)
            .map_err(|e| Error::resource("tcsetpgrp", e))?;
        Ok(TerminalState {
            prev_pgid: unistd::getpgrp(),
            prev_tmodes,
        })
    }

    /// Applies a job's saved terminal modes before it is continued.
    pub fn set_job_modes(&self, tmodes: &Termios) {
        let temp_result =
            termios::tcsetattr(util::get_terminal(), termios::SetArg::TCSADRAIN, tmodes);
        log_if_err!(temp_result, "error setting terminal configuration for job");
    }
}

impl Drop for TerminalState {
    fn drop(&mut self) {
        debug!("putting shell back into foreground and restoring shell's terminal modes");
        let shell_terminal = util::get_terminal();
        let temp_result = unistd::tcsetpgrp(shell_terminal, self.prev_pgid);
        log_if_err!(temp_result, "failed to take back control of terminal");
        if let Some(ref prev_tmodes) = self.prev_tmodes {
            let temp_result =
                termios::tcsetattr(shell_terminal, termios::SetArg::TCSADRAIN, prev_tmodes);
            log_if_err!(
                temp_result,
                "error restoring terminal configuration for shell"
            );
        }
    }
}
