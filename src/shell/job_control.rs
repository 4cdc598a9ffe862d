use std::fmt;
use std::io::Write;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::core::job::{Job, JobId, JobStatus, ProcessGroup};
use crate::errors::{Error, ErrorKind, Result};
use crate::shell::terminal::{self, TerminalState};

/// The job table: a fixed number of slots holding the shell's active jobs.
///
/// All foreground/background transitions go through here, so a job's status
/// and the table's notion of the current job are always updated together.
pub struct JobManager {
    slots: Vec<Option<Job>>,
    /// Transfer the terminal to foreground jobs
    job_control: bool,
    /// Announce foreground jobs that stop
    notify_stopped: bool,
}

impl JobManager {
    pub fn new(capacity: usize, job_control: bool, notify_stopped: bool) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            job_control,
            notify_stopped,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reserves a slot for a command line about to be parsed and launched.
    ///
    /// The new job is numbered one past the highest active job, so it becomes
    /// the current job.
    pub fn reserve(&mut self, input: &str) -> Result<JobId> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| Error::from(ErrorKind::JobTableFull(self.capacity())))?;
        let job_id = JobId(self.current_job().map_or(1, |id| id.0 + 1));
        debug!("reserved slot {} for job [{}]", slot, job_id);
        self.slots[slot] = Some(Job::new(job_id, slot, input));
        Ok(job_id)
    }

    /// Frees a job's slot without any announcement.
    pub fn release(&mut self, job_id: JobId) -> Option<Job> {
        let slot = self.find_job(job_id)?;
        debug!("released job [{}]", job_id);
        self.slots[slot].take()
    }

    /// Records the processes launched for a reserved job.
    pub fn launch(&mut self, job_id: JobId, process_group: ProcessGroup) -> Result<()> {
        let job = self
            .get_job_mut(job_id)
            .ok_or_else(|| Error::no_such_job(job_id.to_string()))?;
        job.launched(process_group);
        Ok(())
    }

    pub fn has_jobs(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns the active jobs in ascending job number order.
    pub fn get_jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.slots.iter().flatten().collect();
        jobs.sort_by_key(|job| job.id());
        jobs
    }

    pub fn get_job(&self, job_id: JobId) -> Option<&Job> {
        self.find_job(job_id).and_then(|slot| self.slots[slot].as_ref())
    }

    /// The active job with the highest job number.
    pub fn current_job(&self) -> Option<JobId> {
        self.slots.iter().flatten().map(Job::id).max()
    }

    /// Waits for a job to stop or complete, blocking the shell.
    ///
    /// Only the job's own process group is waited on, so background jobs keep
    /// their pending status changes for the next poll.
    pub fn wait_for_job(&mut self, job_id: JobId) -> Result<JobStatus> {
        let slot = self
            .find_job(job_id)
            .ok_or_else(|| Error::no_such_job(job_id.to_string()))?;
        let pgid = match self.job_at(slot).pgid() {
            Some(pgid) => pgid,
            None => return Ok(self.job_at(slot).status()),
        };

        while self.job_at(slot).status() == JobStatus::Running {
            match wait::waitpid(group(pgid), Some(WaitPidFlag::WUNTRACED)) {
                Ok(wait_status) => self.mark_process_status(slot, &wait_status),
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => self.job_at_mut(slot).mark_all_completed(),
                Err(e) => return Err(ErrorKind::Wait(e).into()),
            }
        }

        let status = self.job_at(slot).status();
        debug!("job [{}] is {}", job_id, status);
        Ok(status)
    }

    /// Gives the terminal to the job (or the current job), continues it if
    /// `cont` is set, and waits for it to stop or complete.
    ///
    /// A completed job is removed silently; a stopped one stays in the table
    /// and is announced.
    pub fn put_job_in_foreground(
        &mut self,
        job_id: Option<JobId>,
        cont: bool,
        stdout: &mut dyn Write,
    ) -> Result<JobStatus> {
        let job_id = self.resolve(job_id)?;
        debug!("putting job [{}] in foreground", job_id);

        let slot = self
            .find_job(job_id)
            .ok_or_else(|| Error::no_such_job(job_id.to_string()))?;
        self.job_at_mut(slot).set_last_running_in_foreground(true);
        let pgid = self.job_at(slot).pgid();

        let status = {
            let terminal_state = match pgid {
                Some(pgid) if self.job_control => Some(TerminalState::new(pgid)?),
                _ => None,
            };

            // Send the job a continue signal if necessary
            if cont {
                if let (Some(ref state), Some(tmodes)) =
                    (&terminal_state, self.job_at(slot).tmodes())
                {
                    state.set_job_modes(tmodes);
                }
                if let Some(pgid) = pgid {
                    signal::killpg(pgid, Signal::SIGCONT)
                        .map_err(|e| Error::resource("kill", e))?;
                }
                self.job_at_mut(slot).mark_all_running();
            }

            let status = self.wait_for_job(job_id)?;
            if status == JobStatus::Stopped && terminal_state.is_some() {
                self.job_at_mut(slot).set_tmodes(terminal::terminal_modes());
            }
            status
        };

        match status {
            JobStatus::Done => {
                if let Some(job) = self.release(job_id) {
                    debug!("job [{}] finished: {:?}", job_id, job.last_status_code());
                }
            }
            JobStatus::Stopped => {
                if self.notify_stopped {
                    let line = self.display_job(job_id);
                    writeln!(stdout, "\n{}", line)?;
                }
                self.job_at_mut(slot).set_notified_stopped_job(true);
            }
            JobStatus::Running => {}
        }
        Ok(status)
    }

    /// Marks the job (or the current job) as running in the background,
    /// continuing it if `cont` is set. Never touches the terminal.
    pub fn put_job_in_background(&mut self, job_id: Option<JobId>, cont: bool) -> Result<JobId> {
        let job_id = self.resolve(job_id)?;
        debug!("putting job [{}] in background", job_id);

        let slot = self
            .find_job(job_id)
            .ok_or_else(|| Error::no_such_job(job_id.to_string()))?;
        self.job_at_mut(slot).set_last_running_in_foreground(false);

        if cont {
            if let Some(pgid) = self.job_at(slot).pgid() {
                signal::killpg(pgid, Signal::SIGCONT).map_err(|e| Error::resource("kill", e))?;
            }
            self.job_at_mut(slot).mark_all_running();
        }

        Ok(job_id)
    }

    /// Checks for processes that have status information available, without
    /// blocking.
    ///
    /// Every job is polled even if one poll fails; the first failure is
    /// returned.
    pub fn update_job_statuses(&mut self) -> Result<()> {
        let mut result = Ok(());
        for slot in 0..self.slots.len() {
            let pgid = match self.slots[slot].as_ref().and_then(Job::pgid) {
                Some(pgid) => pgid,
                None => continue,
            };
            if self.job_at(slot).is_completed() {
                continue;
            }

            loop {
                let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WNOHANG | WaitPidFlag::WCONTINUED;
                match wait::waitpid(group(pgid), Some(flags)) {
                    Ok(WaitStatus::StillAlive) => break,
                    Ok(wait_status) => self.mark_process_status(slot, &wait_status),
                    Err(Errno::EINTR) => continue,
                    Err(Errno::ECHILD) => {
                        self.job_at_mut(slot).mark_all_completed();
                        break;
                    }
                    Err(e) => {
                        if result.is_ok() {
                            result = Err(ErrorKind::Wait(e).into());
                        }
                        break;
                    }
                }
            }
        }

        result
    }

    /// Notify the user about stopped or terminated jobs and remove terminated
    /// jobs from the active job list.
    pub fn do_job_notification(&mut self, stdout: &mut dyn Write) -> Result<()> {
        let poll_result = self.update_job_statuses();

        let current = self.current_job();
        for job_id in self.get_jobs().iter().map(|job| job.id()).collect::<Vec<_>>() {
            let slot = match self.find_job(job_id) {
                Some(slot) => slot,
                None => continue,
            };
            let job = self.job_at(slot);
            if job.is_completed() {
                // Unnecessary to notify if the job was last running in the
                // foreground, because the user will have noticed it completed.
                if !job.last_running_in_foreground() {
                    writeln!(stdout, "{}", job.display(current == Some(job_id)))?;
                }
                info!("job [{}] is done: {:?}", job_id, job.last_status_code());
                self.slots[slot] = None;
            } else if job.is_stopped() && !job.notified_stopped_job() {
                writeln!(stdout, "{}", job.display(current == Some(job_id)))?;
                self.job_at_mut(slot).set_notified_stopped_job(true);
            }
        }

        poll_result
    }

    /// Sends `SIGTERM` to every remaining job and forgets about them.
    pub fn kill_all_jobs(&mut self) {
        for job in self.slots.iter_mut().filter_map(Option::take) {
            if let Some(pgid) = job.pgid() {
                if job.is_completed() {
                    continue;
                }
                debug!("terminating job [{}]", job.id());
                let temp_result = signal::killpg(pgid, Signal::SIGTERM);
                log_if_err!(temp_result, "failed to terminate job [{}]", job.id());
                if job.is_stopped() {
                    let temp_result = signal::killpg(pgid, Signal::SIGCONT);
                    log_if_err!(temp_result, "failed to continue job [{}]", job.id());
                }
            }
        }
    }

    /// Formats a job with its current-job marker.
    pub fn display_job(&self, job_id: JobId) -> String {
        let current = self.current_job() == Some(job_id);
        self.get_job(job_id)
            .map(|job| job.display(current))
            .unwrap_or_default()
    }

    /// Resolves an explicit job number, or the current job when absent.
    pub fn resolve(&self, job_id: Option<JobId>) -> Result<JobId> {
        match job_id {
            Some(job_id) if self.find_job(job_id).is_some() => Ok(job_id),
            Some(job_id) => Err(Error::no_such_job(job_id.to_string())),
            None => self
                .current_job()
                .ok_or_else(|| Error::no_such_job("current")),
        }
    }

    fn mark_process_status(&mut self, slot: usize, wait_status: &WaitStatus) {
        let job = self.job_at_mut(slot);
        match *wait_status {
            WaitStatus::Exited(pid, status_code) => {
                debug!("{} exited with {}.", pid, status_code);
                job.mark_exited(pid, status_code);
            }
            WaitStatus::Signaled(pid, signal, ..) => {
                debug!("{} terminated by signal {:?}.", pid, signal);
                job.mark_signaled(pid, signal);
            }
            WaitStatus::Stopped(pid, signal) => {
                debug!("{} was signaled to stop {:?}.", pid, signal);
                job.mark_stopped(pid, signal);
            }
            WaitStatus::Continued(pid) => {
                debug!("{} was continued.", pid);
                job.mark_continued(pid);
            }
            _ => (),
        }
    }

    fn find_job(&self, job_id: JobId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().map(Job::id) == Some(job_id))
    }

    /// # Panics
    /// Panics if the slot is empty
    fn job_at(&self, slot: usize) -> &Job {
        self.slots[slot].as_ref().expect("job slot is empty")
    }

    /// # Panics
    /// Panics if the slot is empty
    fn job_at_mut(&mut self, slot: usize) -> &mut Job {
        self.slots[slot].as_mut().expect("job slot is empty")
    }

    fn get_job_mut(&mut self, job_id: JobId) -> Option<&mut Job> {
        let slot = self.find_job(job_id)?;
        self.slots[slot].as_mut()
    }
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} of {} jobs", self.len(), self.capacity())?;
        for job in self.get_jobs() {
            writeln!(f, "{:?}", job)?;
        }

        Ok(())
    }
}

/// The pid argument that makes `waitpid` wait for any member of `pgid`.
fn group(pgid: Pid) -> Pid {
    Pid::from_raw(-pgid.as_raw())
}
