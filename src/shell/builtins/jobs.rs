use std::io::Write;

use crate::core::job::{JobId, JobStatus};
use crate::errors::Result;
use crate::shell::builtins::{self, parse_args, parse_jobspec};
use crate::shell::Shell;

#[derive(Debug, Deserialize)]
struct JobspecArgs {
    arg_jobspec: Option<String>,
}

impl JobspecArgs {
    fn parse<T: AsRef<str>>(usage: &str, name: &str, args: &[T]) -> Result<Option<JobId>> {
        let args: JobspecArgs = parse_args(usage, name, args.iter().map(AsRef::as_ref))?;
        debug!("{:?}", args);
        args.arg_jobspec
            .map(|jobspec| parse_jobspec(name, &jobspec))
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
struct JobsArgs {}

pub struct Jobs;

impl builtins::BuiltinCommand for Jobs {
    const NAME: &'static str = builtins::JOBS_NAME;

    const HELP: &'static str = "
jobs: Display status of jobs.

Lists the active jobs in ascending job number order. The current job is
marked with `+`, every other job with `-`. Jobs that have completed since
the last prompt are reported once and then forgotten. An empty table is
reported as such.

Usage:
    jobs
";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let _: JobsArgs = parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;

        shell.job_manager.do_job_notification(stdout)?;
        if !shell.job_manager.has_jobs() {
            writeln!(stdout, "No jobs in job table")?;
            return Ok(());
        }

        let current = shell.job_manager.current_job();
        for job in shell.job_manager.get_jobs() {
            writeln!(stdout, "{}", job.display(current == Some(job.id())))?;
        }

        Ok(())
    }
}

pub struct Fg;

impl builtins::BuiltinCommand for Fg {
    const NAME: &'static str = builtins::FG_NAME;

    const HELP: &'static str = "
fg: Move job to the foreground.

Place the job identified by JOBSPEC in the foreground, making it the current
job. If JOBSPEC is not present, the shell's notion of the current job is
used. A stopped job is continued.

Usage:
    fg [<jobspec>]
";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let job_id = JobspecArgs::parse(Self::HELP, Self::NAME, args)?;
        let job_id = shell.job_manager.resolve(job_id)?;

        let cont = match shell.job_manager.get_job(job_id) {
            Some(job) => {
                writeln!(stdout, "{}", job.input())?;
                job.status() == JobStatus::Stopped
            }
            None => false,
        };
        stdout.flush()?;

        shell.job_manager.put_job_in_foreground(Some(job_id), cont, stdout)?;
        Ok(())
    }
}

pub struct Bg;

impl builtins::BuiltinCommand for Bg {
    const NAME: &'static str = builtins::BG_NAME;

    const HELP: &'static str = "
bg: Move a job to the background.

Continue the job identified by JOBSPEC in the background, as if it had been
started with `&`. If JOBSPEC is not present, the shell's notion of the
current job is used.

Usage:
    bg [<jobspec>]
";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let job_id = JobspecArgs::parse(Self::HELP, Self::NAME, args)?;
        let job_id = shell.job_manager.put_job_in_background(job_id, true)?;

        if let Some(job) = shell.job_manager.get_job(job_id) {
            writeln!(stdout, "[{}] {}", job.id(), job.input())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::shell::builtins::BuiltinCommand;
    use crate::shell::ShellConfig;
    use nix::sys::signal::{self, Signal};
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempdir::TempDir;

    fn shell() -> Shell {
        Shell::new(ShellConfig::noninteractive()).unwrap()
    }

    fn output<F>(f: F) -> (Result<()>, String)
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let mut stdout = Vec::new();
        let result = f(&mut stdout);
        (result, String::from_utf8(stdout).unwrap())
    }

    fn stop_job(shell: &mut Shell, job_id: JobId) {
        let pgid = shell.job_manager.get_job(job_id).unwrap().pgid().unwrap();
        signal::killpg(pgid, Signal::SIGSTOP).unwrap();
        while shell.job_manager.get_job(job_id).unwrap().status() != JobStatus::Stopped {
            shell.job_manager.update_job_statuses().unwrap();
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_jobs_lists_in_order_with_current_marker() {
        let mut shell = shell();
        shell.handle_line("sleep 10 &", &mut Vec::new()).unwrap();
        shell.handle_line("sleep 20 &", &mut Vec::new()).unwrap();

        let (result, stdout) = output(|out| Jobs::run(&mut shell, &[] as &[&str], out));
        result.unwrap();
        assert_eq!(
            stdout,
            "[1]- Running\tsleep 10 &\n[2]+ Running\tsleep 20 &\n"
        );

        shell.shutdown();
    }

    #[test]
    fn test_jobs_with_empty_table() {
        let mut shell = shell();
        let (result, stdout) = output(|out| Jobs::run(&mut shell, &[] as &[&str], out));
        result.unwrap();
        assert_eq!(stdout, "No jobs in job table\n");
    }

    #[test]
    fn test_jobs_rejects_arguments() {
        let mut shell = shell();
        let (result, _) = output(|out| Jobs::run(&mut shell, &["-x"], out));
        match *result.unwrap_err().kind() {
            ErrorKind::BuiltinCommand(_, 2) => {}
            ref kind => panic!("unexpected error: {:?}", kind),
        }
    }

    #[test]
    fn test_fg_without_jobs() {
        let mut shell = shell();
        let (result, stdout) = output(|out| Fg::run(&mut shell, &[] as &[&str], out));
        assert_eq!(result.unwrap_err().to_string(), "current: no such job");
        assert!(stdout.is_empty());
    }

    #[test]
    fn test_fg_unknown_job() {
        let mut shell = shell();
        let (result, _) = output(|out| Fg::run(&mut shell, &["%5"], out));
        assert_eq!(result.unwrap_err().to_string(), "5: no such job");
    }

    #[test]
    fn test_fg_waits_for_background_job() {
        let mut shell = shell();
        shell.handle_line("sleep 0.2 &", &mut Vec::new()).unwrap();

        let (result, stdout) = output(|out| Fg::run(&mut shell, &["1"], out));
        result.unwrap();
        assert_eq!(stdout, "sleep 0.2 &\n");
        assert!(!shell.job_manager.has_jobs());
    }

    #[test]
    fn test_fg_resumes_job_stopped_in_foreground() {
        let dir = TempDir::new("yash-jobs").unwrap();
        let script = dir.path().join("stop.sh");
        let out_file = dir.path().join("out.txt");
        fs::write(&script, "kill -STOP $$\necho resumed\n").unwrap();
        let mut shell = Shell::new(ShellConfig {
            display_messages: true,
            ..ShellConfig::noninteractive()
        })
        .unwrap();

        let line = format!("sh {} > {}", script.display(), out_file.display());
        let (result, stdout) = output(|out| shell.handle_line(&line, out));
        result.unwrap();
        assert_eq!(stdout, format!("\n[1]+ Stopped\t{}\n", line));
        assert_eq!(
            shell.job_manager.get_job(JobId(1)).unwrap().status(),
            JobStatus::Stopped
        );

        let (result, stdout) = output(|out| Fg::run(&mut shell, &["1"], out));
        result.unwrap();
        assert_eq!(stdout, format!("{}\n", line));
        assert!(!shell.job_manager.has_jobs());
        assert_eq!(fs::read_to_string(&out_file).unwrap(), "resumed\n");
    }

    #[test]
    fn test_bg_continues_stopped_job() {
        let mut shell = shell();
        shell.handle_line("sleep 10 &", &mut Vec::new()).unwrap();
        stop_job(&mut shell, JobId(1));

        let (result, stdout) = output(|out| Bg::run(&mut shell, &["%1"], out));
        result.unwrap();
        assert_eq!(stdout, "[1] sleep 10 &\n");
        assert_eq!(
            shell.job_manager.get_job(JobId(1)).unwrap().status(),
            JobStatus::Running
        );

        shell.shutdown();
    }

    #[test]
    fn test_bg_invalid_jobspec() {
        let mut shell = shell();
        let (result, _) = output(|out| Bg::run(&mut shell, &["%one"], out));
        assert_eq!(
            result.unwrap_err().to_string(),
            "bg: %one: invalid job specification"
        );
    }
}
