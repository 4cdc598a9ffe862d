//! The interactive session: reads command lines, launches jobs, and keeps the
//! job table and the terminal in a consistent state between prompts.

use std::fmt;
use std::io::{self, Write};

use crate::core::parser::Parser;
use crate::core::tokenizer::Tokenizer;
use crate::errors::Result;
use crate::util;

use self::execute_command::spawn_processes;
use self::job_control::JobManager;

pub use self::editor::Editor;

pub mod builtins;
pub mod editor;
pub mod execute_command;
pub mod job_control;
pub mod terminal;

const PROMPT: &str = "# ";

/// Read failures in a row after which input is treated as exhausted.
const MAX_CONSECUTIVE_READ_ERRORS: usize = 3;

/// Supplies command lines to the shell one at a time.
pub trait LineSource {
    /// Reads one line after displaying `prompt`.
    /// Returns `None` when end of input is reached.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Ceilings on the size of a command line and on the number of active jobs.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Limits {
    pub max_line_len: usize,
    pub max_tokens: usize,
    pub max_jobs: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_len: 2000,
            max_tokens: 1000,
            max_jobs: 20,
        }
    }
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Number of entries to store in the shell's command history
    pub command_history_capacity: usize,

    /// Determines if job control (terminal hand-off, fg and bg) is supported.
    pub enable_job_control: bool,

    /// Determines if some messages (e.g. stopped foreground jobs) should be
    /// displayed.
    pub display_messages: bool,

    pub limits: Limits,
}

impl ShellConfig {
    /// Creates an interactive shell, e.g. command history, job control
    ///
    /// # Complete List
    /// - Command History is enabled
    /// - Job Control is enabled when standard input is a terminal
    /// - Some additional messages are displayed
    pub fn interactive(command_history_capacity: usize) -> Self {
        Self {
            command_history_capacity,
            enable_job_control: true,
            display_messages: true,
            limits: Limits::default(),
        }
    }

    /// Creates a noninteractive shell, e.g. no command history, no job control
    ///
    /// # Complete List
    /// - Command History is disabled.
    /// - Job Control is disabled. Jobs still run in their own process groups.
    /// - Fewer messages are displayed
    pub fn noninteractive() -> Self {
        Default::default()
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            command_history_capacity: 0,
            enable_job_control: false,
            display_messages: false,
            limits: Limits::default(),
        }
    }
}

/// One shell session and everything it owns.
pub struct Shell {
    parser: Parser,
    tokenizer: Tokenizer,
    job_manager: JobManager,
    /// Is `false` if job control is disabled or initializing it fails.
    is_interactive: bool,
}

impl Shell {
    /// Constructs a new Shell, taking the terminal if job control is enabled
    /// and standard input is a terminal.
    pub fn new(config: ShellConfig) -> Result<Self> {
        let mut is_interactive = config.enable_job_control && util::isatty();
        if is_interactive {
            if let Err(e) = terminal::initialize_job_control() {
                error!(
                    "failed to initialize shell for job control despite isatty: {}",
                    e
                );
                is_interactive = false;
            }
        }

        let limits = config.limits;
        let shell = Self {
            parser: Parser::new(limits.max_line_len, limits.max_tokens),
            tokenizer: Tokenizer::new(limits.max_tokens),
            job_manager: JobManager::new(
                limits.max_jobs,
                is_interactive,
                config.display_messages,
            ),
            is_interactive,
        };

        info!("yash started up (job control: {})", is_interactive);
        Ok(shell)
    }

    pub fn job_manager(&self) -> &JobManager {
        &self.job_manager
    }

    /// Reads and runs lines from `source` until it is exhausted, then
    /// terminates the remaining jobs.
    ///
    /// Errors from a single line are reported on standard error and never end
    /// the loop. A source that keeps failing to read counts as exhausted.
    pub fn run<L: LineSource>(&mut self, source: &mut L) -> Result<()> {
        let stdout = io::stdout();
        let mut read_errors = 0;
        loop {
            // Check the status of background jobs, removing exited ones.
            let temp_result = self.job_manager.do_job_notification(&mut stdout.lock());
            report(temp_result);

            let line = match source.read_line(PROMPT) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("failed to read line: {}", e);
                    eprintln!("yash: {}", e);
                    read_errors += 1;
                    if read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        warn!("giving up after {} failed reads", read_errors);
                        break;
                    }
                    continue;
                }
            };
            read_errors = 0;

            let temp_result = self.handle_line(&line, &mut stdout.lock());
            report(temp_result);
        }

        println!();
        self.shutdown();
        Ok(())
    }

    /// Runs one command line: a built-in, or a job launched in the foreground
    /// or background.
    pub fn handle_line(&mut self, line: &str, stdout: &mut dyn Write) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let tokens = self.tokenizer.tokenize(line)?;
        if let Some(result) = builtins::dispatch(self, &tokens, stdout) {
            return result;
        }

        let job_id = self.job_manager.reserve(line)?;
        let job = match self.parser.parse(line) {
            Ok(job) => job,
            Err(e) => {
                self.job_manager.release(job_id);
                return Err(e);
            }
        };

        let process_group = match spawn_processes(&job, self.is_interactive) {
            Ok(process_group) => process_group,
            Err(e) => {
                self.job_manager.release(job_id);
                return Err(e);
            }
        };
        self.job_manager.launch(job_id, process_group)?;

        if job.background {
            self.job_manager.put_job_in_background(Some(job_id), false)?;
        } else {
            self.job_manager
                .put_job_in_foreground(Some(job_id), false, stdout)?;
        }

        Ok(())
    }

    /// Terminates every remaining job.
    pub fn shutdown(&mut self) {
        self.job_manager.kill_all_jobs();
        info!("yash has shut down");
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interactive: {}\n{:?}",
            self.is_interactive, self.job_manager
        )
    }
}

fn report(result: Result<()>) {
    if let Err(e) = result {
        error!("{}", e);
        eprintln!("yash: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempdir::TempDir;

    use crate::core::job::{JobId, JobStatus};
    use crate::errors::ErrorKind;
    use nix::errno::Errno;

    struct ScriptedLines(VecDeque<String>);

    impl ScriptedLines {
        fn new(lines: &[&str]) -> Self {
            ScriptedLines(lines.iter().map(|line| line.to_string()).collect())
        }
    }

    impl LineSource for ScriptedLines {
        fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
            Ok(self.0.pop_front())
        }
    }

    /// A source whose every read fails.
    struct BrokenInput {
        reads: usize,
    }

    impl LineSource for BrokenInput {
        fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
            self.reads += 1;
            Err(ErrorKind::Wait(Errno::EIO).into())
        }
    }

    fn shell() -> Shell {
        Shell::new(ShellConfig::noninteractive()).unwrap()
    }

    fn run_line(shell: &mut Shell, line: &str) -> (Result<()>, String) {
        let mut stdout = Vec::new();
        let result = shell.handle_line(line, &mut stdout);
        (result, String::from_utf8(stdout).unwrap())
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let mut shell = shell();
        for line in &["", "   ", "\t\n"] {
            let (result, stdout) = run_line(&mut shell, line);
            assert!(result.is_ok());
            assert!(stdout.is_empty());
        }
        assert!(!shell.job_manager().has_jobs());
    }

    #[test]
    fn test_syntax_error_releases_slot() {
        let mut shell = shell();
        let (result, _) = run_line(&mut shell, "ls |");
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "syntax error: command must not end with `|`");
        assert!(!shell.job_manager().has_jobs());
    }

    #[test]
    fn test_foreground_job_redirects_output() {
        let dir = TempDir::new("yash-shell").unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = shell();

        let (result, _) = run_line(&mut shell, &format!("echo hello > {}", out.display()));
        result.unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
        assert!(!shell.job_manager().has_jobs());
    }

    #[test]
    fn test_interrupted_foreground_job_leaves_shell_running() {
        let dir = TempDir::new("yash-shell").unwrap();
        let script = dir.path().join("interrupt.sh");
        let out = dir.path().join("out.txt");
        fs::write(&script, "kill -INT 0\n").unwrap();
        let mut shell = shell();

        let started = Instant::now();
        let line = format!("sh {} | sleep 10", script.display());
        let (result, stdout) = run_line(&mut shell, &line);
        result.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(stdout.is_empty());
        assert!(!shell.job_manager().has_jobs());

        run_line(&mut shell, &format!("echo alive > {}", out.display())).0.unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "alive\n");
    }

    #[test]
    fn test_background_job_returns_immediately() {
        let mut shell = shell();
        let (result, stdout) = run_line(&mut shell, "sleep 10 &");
        result.unwrap();
        assert!(stdout.is_empty());

        let jobs = shell.job_manager().get_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id(), JobId(1));
        assert_eq!(jobs[0].status(), JobStatus::Running);

        let (result, stdout) = run_line(&mut shell, "jobs");
        result.unwrap();
        assert_eq!(stdout, "[1]+ Running\tsleep 10 &\n");

        shell.shutdown();
        assert!(!shell.job_manager().has_jobs());
    }

    #[test]
    fn test_job_table_full() {
        let mut config = ShellConfig::noninteractive();
        config.limits.max_jobs = 2;
        let mut shell = Shell::new(config).unwrap();

        run_line(&mut shell, "sleep 10 &").0.unwrap();
        run_line(&mut shell, "sleep 10 &").0.unwrap();
        let err = run_line(&mut shell, "sleep 10 &").0.unwrap_err();
        assert_eq!(err.to_string(), "max number of concurrent jobs reached: 2");
        assert_eq!(shell.job_manager().len(), 2);

        shell.shutdown();
    }

    #[test]
    fn test_run_until_end_of_input() {
        let dir = TempDir::new("yash-shell").unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = shell();
        let mut source = ScriptedLines::new(&[
            "",
            "| bad",
            &format!("echo one two | wc -w > {}", out.display()),
            "sleep 10 &",
        ]);

        shell.run(&mut source).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "2");
        assert!(!shell.job_manager().has_jobs());
    }

    #[test]
    fn test_run_stops_after_repeated_read_errors() {
        let mut shell = shell();
        let mut source = BrokenInput { reads: 0 };

        shell.run(&mut source).unwrap();
        assert_eq!(source.reads, MAX_CONSECUTIVE_READ_ERRORS);
    }
}
