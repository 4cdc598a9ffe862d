//! Turns a parsed job into running processes sharing one process group.

use std::ffi::CString;
use std::fs::File;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use nix::{
    errno::Errno,
    fcntl::{self, FcntlArg, OFlag},
    libc,
    sys::{
        signal::{self, Signal},
        stat::Mode,
        wait,
    },
    unistd::{self, ForkResult, Pid},
};

use crate::core::{
    job::{Process, ProcessGroup},
    parser::{JobDescriptor, Segment},
};
use crate::errors::{Error, Result};
use crate::shell::terminal;
use crate::util;

/// Exit status of a child that failed to redirect or exec.
pub const CHILD_ERROR_EXIT_STATUS: i32 = 3;

/// A segment converted ahead of `fork`, so the child does not allocate before
/// exec.
struct PreparedSegment<'a> {
    segment: &'a Segment,
    argv: Vec<CString>,
    stdin: Option<CString>,
    stdout: Option<CString>,
    stderr: Option<CString>,
}

impl<'a> PreparedSegment<'a> {
    fn new(segment: &'a Segment) -> Result<Self> {
        let to_c_string =
            |s: &str| CString::new(s).map_err(|_| Error::exec(segment.program(), Errno::EINVAL));
        let argv = segment
            .argv
            .iter()
            .map(|arg| to_c_string(arg.as_str()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            segment,
            argv,
            stdin: segment.stdin.as_deref().map(to_c_string).transpose()?,
            stdout: segment.stdout.as_deref().map(to_c_string).transpose()?,
            stderr: segment.stderr.as_deref().map(to_c_string).transpose()?,
        })
    }
}

/// How a child is wired up before it applies its own redirections.
struct ChildSetup {
    /// Process group to join; `None` creates a new group led by the child
    pgid: Option<Pid>,
    /// Take the terminal before exec (foreground group leader only)
    take_terminal: bool,
    pipe_stdin: Option<RawFd>,
    pipe_stdout: Option<RawFd>,
    /// Pipe descriptors the child must close after wiring
    pipe_fds: Vec<RawFd>,
    /// Duplicate of the shell's stdout used to report failures
    diagnostics: RawFd,
}

/// Spawns the processes of `job`, returning them along with their process group.
///
/// Creating the pipe, the diagnostics descriptor, or a child aborts the whole
/// job. A child that fails to redirect or exec reports on the shell's
/// original stdout and exits with `CHILD_ERROR_EXIT_STATUS`; the job still
/// gets launched.
pub fn spawn_processes(job: &JobDescriptor, job_control: bool) -> Result<ProcessGroup> {
    let first = PreparedSegment::new(&job.first)?;
    let second = job.second.as_ref().map(PreparedSegment::new).transpose()?;

    let diagnostics = duplicate_stdout()?;
    let pipe = if second.is_some() {
        Some(create_pipe()?)
    } else {
        None
    };
    let pipe_fds: Vec<RawFd> = pipe
        .iter()
        .flat_map(|(read_end, write_end)| vec![read_end.as_raw_fd(), write_end.as_raw_fd()])
        .collect();

    let first_setup = ChildSetup {
        pgid: None,
        take_terminal: job_control && !job.background,
        pipe_stdin: None,
        pipe_stdout: pipe.as_ref().map(|(_, write_end)| write_end.as_raw_fd()),
        pipe_fds: pipe_fds.clone(),
        diagnostics: diagnostics.as_raw_fd(),
    };
    let pgid = fork_child(&first, &first_setup)?;
    let temp_result = unistd::setpgid(pgid, pgid);
    log_if_err!(temp_result, "failed to set pgid ({}) for pid ({})", pgid, pgid);
    let mut processes = vec![Process::new(pgid)];

    if let Some(ref second) = second {
        let second_setup = ChildSetup {
            pgid: Some(pgid),
            take_terminal: false,
            pipe_stdin: pipe.as_ref().map(|(read_end, _)| read_end.as_raw_fd()),
            pipe_stdout: None,
            pipe_fds,
            diagnostics: diagnostics.as_raw_fd(),
        };
        let pid = match fork_child(second, &second_setup) {
            Ok(pid) => pid,
            Err(e) => {
                warn!("failed to spawn second child, killing job's process group");
                let _ = signal::killpg(pgid, Signal::SIGKILL);
                let _ = wait::waitpid(pgid, None);
                return Err(e);
            }
        };
        let temp_result = unistd::setpgid(pid, pgid);
        log_if_err!(temp_result, "failed to set pgid ({}) for pid ({})", pgid, pid);
        processes.push(Process::new(pid));
    }

    // Dropping the pipe ends and the duplicate closes them in the parent so the
    // reader sees EOF once the writer exits.
    drop(pipe);
    drop(diagnostics);

    debug!("spawned {} process(es) in group {}", processes.len(), pgid);
    Ok(ProcessGroup {
        id: pgid,
        processes,
        foreground: !job.background,
    })
}

fn fork_child(segment: &PreparedSegment<'_>, setup: &ChildSetup) -> Result<Pid> {
    // Safe because the child only performs async-signal-safe work on
    // pre-allocated data before exec, except when reporting a failure.
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Parent { child }) => Ok(child),
        Ok(ForkResult::Child) => exec_child(segment, setup),
        Err(e) => Err(Error::resource("fork", e)),
    }
}

fn exec_child(segment: &PreparedSegment<'_>, setup: &ChildSetup) -> ! {
    let pid = unistd::getpid();
    let pgid = setup.pgid.unwrap_or(pid);
    let _ = unistd::setpgid(pid, pgid);

    // Must happen before stdin is redirected, while it is still the terminal.
    if setup.take_terminal {
        let _ = unistd::tcsetpgrp(util::get_terminal(), pgid);
    }

    terminal::reset_child_signals();

    if let Err(e) = redirect(segment, setup) {
        exit_child_with_error(setup.diagnostics, &e);
    }

    let errno = match unistd::execvp(&segment.argv[0], &segment.argv) {
        Ok(infallible) => match infallible {},
        Err(errno) => errno,
    };
    exit_child_with_error(setup.diagnostics, &Error::exec(segment.segment.program(), errno))
}

/// Wires the pipe ends first so that explicit redirections take precedence.
fn redirect(segment: &PreparedSegment<'_>, setup: &ChildSetup) -> Result<()> {
    if let Some(fd) = setup.pipe_stdin {
        dup_onto(fd, libc::STDIN_FILENO)?;
    }
    if let Some(fd) = setup.pipe_stdout {
        dup_onto(fd, libc::STDOUT_FILENO)?;
    }
    for &fd in &setup.pipe_fds {
        let _ = unistd::close(fd);
    }

    let input_flags = OFlag::O_RDONLY;
    let output_flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
    let redirects = [
        (&segment.stdin, &segment.segment.stdin, input_flags, libc::STDIN_FILENO),
        (&segment.stdout, &segment.segment.stdout, output_flags, libc::STDOUT_FILENO),
        (&segment.stderr, &segment.segment.stderr, output_flags, libc::STDERR_FILENO),
    ];
    for &(path, name, flags, target) in &redirects {
        if let (Some(path), Some(name)) = (path, name) {
            let fd = fcntl::open(path.as_c_str(), flags, output_file_mode())
                .map_err(|e| Error::resource(format!("could not open file `{}`", name), e))?;
            dup_onto(fd, target)?;
            let _ = unistd::close(fd);
        }
    }

    Ok(())
}

fn dup_onto(fd: RawFd, target: RawFd) -> Result<()> {
    if fd != target {
        unistd::dup2(fd, target).map_err(|e| Error::resource("dup2", e))?;
    }
    Ok(())
}

fn exit_child_with_error(diagnostics: RawFd, error: &Error) -> ! {
    let message = format!("yash: {}\n", error);
    let _ = unistd::write(diagnostics, message.as_bytes());
    // Safe because _exit skips the parent's atexit handlers and buffers,
    // which the child must not run.
    unsafe { libc::_exit(CHILD_ERROR_EXIT_STATUS) }
}

/// Read and write for owner, group and other; the umask applies.
fn output_file_mode() -> Mode {
    Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IWGRP | Mode::S_IROTH | Mode::S_IWOTH
}

/// Duplicates the shell's stdout with close-on-exec set, so exec'd programs
/// never inherit it.
fn duplicate_stdout() -> Result<File> {
    let fd = fcntl::fcntl(libc::STDOUT_FILENO, FcntlArg::F_DUPFD_CLOEXEC(0))
        .map_err(|e| Error::resource("dup", e))?;
    // Safe because `fd` was just created and nothing else owns it.
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Wraps `unistd::pipe()` to return RAII structs instead of raw, owning file descriptors
/// Returns (`read_end_pipe`, `write_end_pipe`)
fn create_pipe() -> Result<(File, File)> {
    // IMPORTANT: immediately pass the RawFds returned by unistd::pipe()
    // into RAII structs (File). If the function returns before they are moved
    // into RAII structs, the fds could be leaked.
    let (read_end_pipe, write_end_pipe) =
        unistd::pipe().map_err(|e| Error::resource("pipe", e))?;
    unsafe {
        Ok((
            File::from_raw_fd(read_end_pipe),
            File::from_raw_fd(write_end_pipe),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::Parser;
    use crate::errors::ErrorKind;
    use nix::sys::signal::SigHandler;
    use nix::sys::wait::{WaitPidFlag, WaitStatus};
    use std::fs;
    use tempdir::TempDir;

    fn wait_all(group: &ProcessGroup) -> Vec<WaitStatus> {
        group
            .processes
            .iter()
            .map(|p| wait::waitpid(p.id(), Some(WaitPidFlag::empty())).unwrap())
            .collect()
    }

    fn spawn(line: &str) -> ProcessGroup {
        let job = Parser::default().parse(line).unwrap();
        spawn_processes(&job, false).unwrap()
    }

    #[test]
    fn test_single_process_leads_its_group() {
        let group = spawn("true");
        assert_eq!(group.processes.len(), 1);
        assert_eq!(group.id, group.processes[0].id());
        assert!(group.foreground);
        assert_eq!(
            wait_all(&group),
            vec![WaitStatus::Exited(group.id, 0)]
        );
    }

    #[test]
    fn test_pipeline_shares_one_group() {
        let dir = TempDir::new("yash-launch").unwrap();
        let out = dir.path().join("out.txt");
        let group = spawn(&format!("echo needle | cat > {} &", out.display()));
        assert_eq!(group.processes.len(), 2);
        assert!(!group.foreground);
        for status in wait_all(&group) {
            match status {
                WaitStatus::Exited(_, 0) => {}
                other => panic!("unexpected status: {:?}", other),
            }
        }
        assert_eq!(fs::read_to_string(&out).unwrap(), "needle\n");
    }

    #[test]
    fn test_output_redirect_truncates() {
        let dir = TempDir::new("yash-launch").unwrap();
        let out = dir.path().join("out.txt");
        fs::write(&out, "old contents that are longer\n").unwrap();
        let group = spawn(&format!("echo new > {}", out.display()));
        wait_all(&group);
        assert_eq!(fs::read_to_string(&out).unwrap(), "new\n");
    }

    #[test]
    fn test_missing_input_file_exits_with_child_error() {
        let dir = TempDir::new("yash-launch").unwrap();
        let missing = dir.path().join("missing.txt");
        let group = spawn(&format!("cat < {}", missing.display()));
        assert_eq!(
            wait_all(&group),
            vec![WaitStatus::Exited(group.id, CHILD_ERROR_EXIT_STATUS)]
        );
    }

    #[test]
    fn test_unknown_program_exits_with_child_error() {
        let group = spawn("yash-test-no-such-program");
        assert_eq!(
            wait_all(&group),
            vec![WaitStatus::Exited(group.id, CHILD_ERROR_EXIT_STATUS)]
        );
    }

    #[test]
    fn test_nul_in_argument_is_rejected_before_fork() {
        let job = Parser::default().parse("echo a\0b").unwrap();
        let err = spawn_processes(&job, false).unwrap_err();
        match *err.kind() {
            ErrorKind::Exec(ref program, Errno::EINVAL) => assert_eq!(program, "echo"),
            ref kind => panic!("unexpected error: {:?}", kind),
        }
    }

    #[test]
    fn test_pipeline_writer_dies_of_sigpipe() {
        let dir = TempDir::new("yash-launch").unwrap();
        let err = dir.path().join("err.txt");
        let out = dir.path().join("out.txt");
        let group = spawn(&format!(
            "yes 2> {} | head -n 1 > {}",
            err.display(),
            out.display()
        ));

        let statuses = wait_all(&group);
        match statuses[0] {
            WaitStatus::Signaled(_, Signal::SIGPIPE, _) => {}
            other => panic!("unexpected status: {:?}", other),
        }
        assert_eq!(statuses[1], WaitStatus::Exited(group.processes[1].id(), 0));
        assert_eq!(fs::read_to_string(&out).unwrap(), "y\n");
        assert!(fs::read_to_string(&err).unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_child_signal_dispositions() {
        fn ignored(mask: u64, sig: Signal) -> bool {
            mask & (1 << (sig as u64 - 1)) != 0
        }

        let dir = TempDir::new("yash-launch").unwrap();
        let out = dir.path().join("out.txt");

        // SIGPIPE is already ignored by the test runtime.
        let inherited = [Signal::SIGQUIT, Signal::SIGTSTP, Signal::SIGTTIN];
        for &sig in &inherited {
            unsafe { signal::signal(sig, SigHandler::SigIgn) }.unwrap();
        }
        let group = spawn(&format!("grep SigIgn /proc/self/status > {}", out.display()));
        for &sig in &inherited {
            unsafe { signal::signal(sig, SigHandler::SigDfl) }.unwrap();
        }
        assert_eq!(wait_all(&group), vec![WaitStatus::Exited(group.id, 0)]);

        let line = fs::read_to_string(&out).unwrap();
        let mask = u64::from_str_radix(line.trim_start_matches("SigIgn:").trim(), 16).unwrap();
        for &sig in &[
            Signal::SIGINT,
            Signal::SIGQUIT,
            Signal::SIGTSTP,
            Signal::SIGTTIN,
            Signal::SIGCHLD,
            Signal::SIGPIPE,
        ] {
            assert!(!ignored(mask, sig), "{} is still ignored", sig);
        }
        assert!(ignored(mask, Signal::SIGTTOU));
    }
}
