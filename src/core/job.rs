use std::{fmt, process::ExitStatus};

use nix::{
    sys::{signal::Signal, termios::Termios},
    unistd::Pid,
};

use crate::util::YashExitStatusExt;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProcessStatus {
    Running,
    Stopped,
    Completed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Process {
    id: Pid,
    status: ProcessStatus,
}

impl Process {
    pub fn new(id: Pid) -> Self {
        Self {
            id,
            status: ProcessStatus::Running,
        }
    }

    pub fn id(&self) -> Pid {
        self.id
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    fn mark_completed(&mut self) {
        self.status = ProcessStatus::Completed;
    }

    fn mark_stopped(&mut self) {
        if self.status != ProcessStatus::Completed {
            self.status = ProcessStatus::Stopped;
        }
    }

    fn mark_running(&mut self) {
        if self.status != ProcessStatus::Completed {
            self.status = ProcessStatus::Running;
        }
    }
}

/// The processes the launcher started for one job, all in process group `id`.
#[derive(Debug)]
pub struct ProcessGroup {
    pub id: Pid,
    pub processes: Vec<Process>,
    pub foreground: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Stopped => write!(f, "Stopped"),
            JobStatus::Done => write!(f, "Done"),
        }
    }
}

/// A job table entry.
///
/// An entry is reserved before its command line is parsed, so it may exist
/// without a process group for a short while; such an entry is reported as
/// `Running` and is never polled.
pub struct Job {
    id: JobId,
    slot: usize,
    input: String,
    pgid: Option<Pid>,
    processes: Vec<Process>,
    last_status_code: Option<ExitStatus>,
    last_running_in_foreground: bool,
    notified_stopped_job: bool,
    tmodes: Option<Termios>,
}

impl Job {
    pub fn new(id: JobId, slot: usize, input: &str) -> Self {
        Self {
            id,
            slot,
            input: input.trim().to_string(),
            pgid: None,
            processes: Vec::new(),
            last_status_code: None,
            last_running_in_foreground: true,
            notified_stopped_job: false,
            tmodes: None,
        }
    }

    /// Records the processes spawned for this job.
    pub fn launched(&mut self, process_group: ProcessGroup) {
        self.pgid = Some(process_group.id);
        self.processes = process_group.processes;
        self.last_running_in_foreground = process_group.foreground;
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn pgid(&self) -> Option<Pid> {
        self.pgid
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn status(&self) -> JobStatus {
        if self.is_completed() {
            JobStatus::Done
        } else if self.is_stopped() {
            JobStatus::Stopped
        } else {
            JobStatus::Running
        }
    }

    pub fn last_status_code(&self) -> Option<ExitStatus> {
        self.last_status_code
    }

    pub fn last_running_in_foreground(&self) -> bool {
        self.last_running_in_foreground
    }

    pub fn set_last_running_in_foreground(&mut self, last_running_in_foreground: bool) {
        self.last_running_in_foreground = last_running_in_foreground;
    }

    pub fn notified_stopped_job(&self) -> bool {
        self.notified_stopped_job
    }

    pub fn set_notified_stopped_job(&mut self, notified_stopped_job: bool) {
        self.notified_stopped_job = notified_stopped_job;
    }

    pub fn tmodes(&self) -> Option<&Termios> {
        self.tmodes.as_ref()
    }

    pub fn set_tmodes(&mut self, tmodes: Option<Termios>) {
        self.tmodes = tmodes;
    }

    /// A job is stopped once none of its processes is running and at least
    /// one of them is stopped.
    pub fn is_stopped(&self) -> bool {
        self.processes
            .iter()
            .any(|p| p.status() == ProcessStatus::Stopped)
            && self
                .processes
                .iter()
                .all(|p| p.status() != ProcessStatus::Running)
    }

    pub fn is_completed(&self) -> bool {
        !self.processes.is_empty()
            && self
                .processes
                .iter()
                .all(|p| p.status() == ProcessStatus::Completed)
    }

    pub fn mark_exited(&mut self, pid: Pid, status_code: i32) {
        let status_code = ExitStatus::from_status(status_code);
        if let Some(index) = self.find_process(pid) {
            self.processes[index].mark_completed();
            self.last_status_code = Some(status_code);
        }
    }

    pub fn mark_signaled(&mut self, pid: Pid, signal: Signal) {
        let status_code = ExitStatus::from_signal(signal);
        if let Some(index) = self.find_process(pid) {
            self.processes[index].mark_completed();
            self.last_status_code = Some(status_code);
        }
    }

    pub fn mark_stopped(&mut self, pid: Pid, signal: Signal) {
        if let Some(index) = self.find_process(pid) {
            self.processes[index].mark_stopped();
            self.last_status_code = Some(ExitStatus::from_signal(signal));
        }
    }

    pub fn mark_continued(&mut self, pid: Pid) {
        if let Some(index) = self.find_process(pid) {
            self.processes[index].mark_running();
            self.notified_stopped_job = false;
        }
    }

    /// Marks every unfinished process as running again, e.g. after the whole
    /// group was sent `SIGCONT`.
    pub fn mark_all_running(&mut self) {
        for process in &mut self.processes {
            process.mark_running();
        }
        self.notified_stopped_job = false;
    }

    /// Marks every unfinished process as completed. Used when the process
    /// group has no children left to wait for.
    pub fn mark_all_completed(&mut self) {
        for process in &mut self.processes {
            process.mark_completed();
        }
    }

    /// Formats the job the way `jobs` and job announcements show it.
    pub fn display(&self, current: bool) -> String {
        format!(
            "[{}]{} {}\t{}",
            self.id,
            if current { '+' } else { '-' },
            self.status(),
            self.input
        )
    }

    fn find_process(&self, pid: Pid) -> Option<usize> {
        self.processes.iter().position(|p| p.id() == pid)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}\tslot: {}\tpgid: {:?}\tinput: {}",
            self.id, self.slot, self.pgid, self.input
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launched_job(pids: &[i32]) -> Job {
        let mut job = Job::new(JobId(1), 0, "cmd1 | cmd2");
        job.launched(ProcessGroup {
            id: Pid::from_raw(pids[0]),
            processes: pids
                .iter()
                .map(|&pid| Process::new(Pid::from_raw(pid)))
                .collect(),
            foreground: false,
        });
        job
    }

    #[test]
    fn test_external_process() {
        let process = Process::new(Pid::from_raw(1));
        assert_eq!(process.id(), Pid::from_raw(1));
        assert_eq!(process.status(), ProcessStatus::Running);
    }

    #[test]
    fn test_reserved_job_is_running() {
        let job = Job::new(JobId(1), 0, "sleep 10 &\n");
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.input(), "sleep 10 &");
        assert!(job.pgid().is_none());
    }

    #[test]
    fn test_job_is_stopped() {
        let mut job = launched_job(&[10]);
        assert!(!job.is_stopped());

        job.mark_stopped(Pid::from_raw(10), Signal::SIGTSTP);
        assert!(job.is_stopped());
        assert_eq!(job.status(), JobStatus::Stopped);

        job.mark_continued(Pid::from_raw(10));
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[test]
    fn test_job_is_completed() {
        let mut job = launched_job(&[10]);
        assert!(!job.is_completed());

        job.mark_exited(Pid::from_raw(10), 0);
        assert!(job.is_completed());
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.last_status_code(), Some(ExitStatus::from_status(0)));
    }

    #[test]
    fn test_pipeline_completes_when_all_processes_exit() {
        let mut job = launched_job(&[10, 11]);

        job.mark_exited(Pid::from_raw(10), 0);
        assert_eq!(job.status(), JobStatus::Running);

        job.mark_signaled(Pid::from_raw(11), Signal::SIGINT);
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.last_status_code().and_then(|s| s.code()), Some(130));
    }

    #[test]
    fn test_pipeline_with_one_finished_process_can_stop() {
        let mut job = launched_job(&[10, 11]);
        job.mark_exited(Pid::from_raw(10), 0);
        job.mark_stopped(Pid::from_raw(11), Signal::SIGTSTP);
        assert_eq!(job.status(), JobStatus::Stopped);

        job.mark_all_running();
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.processes()[0].status(), ProcessStatus::Completed);
    }

    #[test]
    fn test_display() {
        let mut job = launched_job(&[10]);
        assert_eq!(job.display(true), "[1]+ Running\tcmd1 | cmd2");
        job.mark_exited(Pid::from_raw(10), 1);
        assert_eq!(job.display(false), "[1]- Done\tcmd1 | cmd2");
    }
}
