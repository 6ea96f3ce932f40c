//! Process registry for merge jobs.
//!
//! A job is registered when its process is spawned and stays registered,
//! finished or not, until [`JobSupervisor::stop`] removes it. Polling updates
//! a job in place and never adds or removes entries.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use merge_control_types::{
    sys_debug, sys_info, sys_warn, ControlError, ControlResult, JobSnapshot, JobStatus,
};

use crate::invocation::{MergeInvocation, MergeRequest};
use crate::output::{spawn_reader, OutputCapture};

/// How long a poll that first observes the exit waits for the pipes to drain.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(250);

pub type SharedJobSupervisor = Arc<JobSupervisor>;

struct JobRecord {
    invocation: MergeInvocation,
    child: Child,
    capture: Arc<OutputCapture>,
    output: Vec<u8>,
    status: JobStatus,
    exit_code: Option<i32>,
    exited_at: Option<Instant>,
    started_at: DateTime<Local>,
}

impl JobRecord {
    /// Record the exit if it has happened. Never blocks.
    fn check_exit(&mut self, pid: u32) {
        if self.status != JobStatus::Running {
            return;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = JobStatus::Finished;
                self.exit_code = status.code();
                self.exited_at = Some(Instant::now());
                sys_info!("[JOBS] pid {} finished ({})", pid, status);
            }
            Ok(None) => {}
            Err(e) => sys_warn!("[JOBS] Failed to query pid {}: {}", pid, e),
        }
    }

    /// How much longer to wait for the pipes of an exited job to close.
    fn drain_grace(&self) -> Option<Duration> {
        let exited_at = self.exited_at?;
        if self.capture.is_closed() {
            return None;
        }
        let remaining = EXIT_DRAIN_GRACE.saturating_sub(exited_at.elapsed());
        (!remaining.is_zero()).then_some(remaining)
    }

    /// Append whatever the readers buffered since the last drain.
    fn drain(&mut self) {
        let fresh = self.capture.take_pending();
        if !fresh.is_empty() {
            self.output.extend_from_slice(&fresh);
        }
    }

    fn snapshot(&self, pid: u32) -> JobSnapshot {
        JobSnapshot {
            pid,
            status: self.status,
            output: String::from_utf8_lossy(&self.output).into_owned(),
            merged_folder: self.invocation.output_dir.to_string_lossy().into_owned(),
            yaml_file_path: self.invocation.config_path.to_string_lossy().into_owned(),
            exit_code: self.exit_code,
            command: self.invocation.argv().join(" "),
            started_at: self.started_at.to_rfc3339(),
        }
    }
}

/// Owns every supervised merge process and its captured output.
pub struct JobSupervisor {
    program: String,
    jobs: Mutex<HashMap<u32, JobRecord>>,
}

impl JobSupervisor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Launch the merge tool for `request` and register the new process.
    ///
    /// Only guarantees that the process was spawned; whether the merge
    /// succeeds is visible later through [`poll`](Self::poll).
    pub fn start(&self, request: &MergeRequest) -> ControlResult<JobSnapshot> {
        let invocation = MergeInvocation::from_request(&self.program, request)?;

        if !invocation.config_path.exists() {
            return Err(ControlError::not_found(format!(
                "YAML file not found: {}",
                invocation.config_path.display()
            )));
        }

        fs::create_dir_all(&invocation.output_dir)?;

        let mut child = Command::new(&invocation.program)
            .args(invocation.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ControlError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let streams = usize::from(stdout.is_some()) + usize::from(stderr.is_some());
        let capture = OutputCapture::new(streams);

        if let Err(e) = attach_readers(pid, stdout, stderr, &capture) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e.into());
        }

        sys_info!("[JOBS] Started pid {}: {}", pid, invocation.argv().join(" "));

        let record = JobRecord {
            invocation,
            child,
            capture,
            output: Vec::new(),
            status: JobStatus::Running,
            exit_code: None,
            exited_at: None,
            started_at: Local::now(),
        };
        let snapshot = record.snapshot(pid);

        if let Some(stale) = self.registry().insert(pid, record) {
            // The OS reused the id of a finished job that was never stopped.
            sys_warn!(
                "[JOBS] pid {} reused; dropping stale record for {}",
                pid,
                stale.invocation.config_path.display()
            );
        }

        Ok(snapshot)
    }

    /// Refresh a job's status and output and return the current snapshot.
    ///
    /// Right after the exit is observed this may wait briefly for the output
    /// pipes to close, without holding the registry lock.
    pub fn poll(&self, pid: u32) -> ControlResult<JobSnapshot> {
        let (capture, grace) = {
            let mut jobs = self.registry();
            let record = jobs.get_mut(&pid).ok_or_else(|| process_not_found(pid))?;
            record.check_exit(pid);
            match record.drain_grace() {
                Some(grace) => (record.capture.clone(), grace),
                None => {
                    record.drain();
                    return Ok(record.snapshot(pid));
                }
            }
        };

        if !capture.wait_closed(grace) {
            sys_debug!("[JOBS] pid {} exited but its pipes are still open", pid);
        }

        let mut jobs = self.registry();
        let record = jobs.get_mut(&pid).ok_or_else(|| process_not_found(pid))?;
        record.drain();
        Ok(record.snapshot(pid))
    }

    /// Signal the process to terminate and forget it. Does not wait for exit.
    pub fn stop(&self, pid: u32) -> ControlResult<u32> {
        let record = self
            .registry()
            .remove(&pid)
            .ok_or_else(|| process_not_found(pid))?;

        release(pid, record);
        sys_info!("[JOBS] Stopped pid {}", pid);
        Ok(pid)
    }

    /// Ids of every registered job.
    pub fn list(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.registry().keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<u32, JobRecord>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for JobSupervisor {
    fn drop(&mut self) {
        let jobs = std::mem::take(&mut *self.registry());
        for (pid, record) in jobs {
            release(pid, record);
        }
    }
}

fn process_not_found(pid: u32) -> ControlError {
    ControlError::not_found(format!("Process not found: {pid}"))
}

fn attach_readers(
    pid: u32,
    stdout: Option<std::process::ChildStdout>,
    stderr: Option<std::process::ChildStderr>,
    capture: &Arc<OutputCapture>,
) -> io::Result<()> {
    if let Some(stdout) = stdout {
        spawn_reader(format!("job-{pid}-stdout"), stdout, capture.clone())?;
    }
    if let Some(stderr) = stderr {
        spawn_reader(format!("job-{pid}-stderr"), stderr, capture.clone())?;
    }
    Ok(())
}

/// Terminate a removed job's process (if it may still be running) and reap
/// it on a detached thread.
fn release(pid: u32, mut record: JobRecord) {
    // An already-reaped pid may belong to another process by now.
    let exited = record.status == JobStatus::Finished
        || matches!(record.child.try_wait(), Ok(Some(_)));

    if !exited {
        if let Err(e) = terminate(&mut record.child) {
            sys_warn!("[JOBS] Failed to signal pid {}: {}", pid, e);
        }
    }

    let mut child = record.child;
    let spawned = thread::Builder::new()
        .name(format!("job-{pid}-reaper"))
        .spawn(move || match child.wait() {
            Ok(status) => sys_debug!("[JOBS] pid {} reaped ({})", pid, status),
            Err(e) => sys_debug!("[JOBS] Failed to reap pid {}: {}", pid, e),
        });
    if let Err(e) = spawned {
        sys_warn!("[JOBS] Could not start reaper for pid {}: {}", pid, e);
    }
}

#[cfg(not(windows))]
fn terminate(child: &mut Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) only delivers a signal; the pid belongs to our unreaped child.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(windows)]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}
