//! Signals and wait-status handling for a single task

use std::io;
use std::thread;
use std::time::Duration;

use libc::{pid_t, SIGCONT, SIGSTOP, SIGTRAP};

use crate::error::{CryoError, Result};
use crate::proc_parse::parse_task_state;

/// How long to sleep between /proc polls while waiting for a non-child to stop
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Decoded `waitpid` status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Exited(i32),
    Signaled(i32),
    Stopped(i32),
    Continued,
}

impl WaitStatus {
    pub fn from_raw(status: i32) -> Self {
        if libc::WIFEXITED(status) {
            WaitStatus::Exited(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            WaitStatus::Signaled(libc::WTERMSIG(status))
        } else if libc::WIFSTOPPED(status) {
            WaitStatus::Stopped(libc::WSTOPSIG(status))
        } else {
            WaitStatus::Continued
        }
    }

    /// Whether the task is gone for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, WaitStatus::Exited(_) | WaitStatus::Signaled(_))
    }
}

/// Blocks in `waitpid` until `pid` changes state. Retries on EINTR.
pub fn wait_raw(pid: pid_t, options: i32) -> io::Result<i32> {
    let mut status: i32 = 0;
    loop {
        let ret = unsafe { libc::waitpid(pid, &mut status, options) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(status);
    }
}

pub fn wait_status(pid: pid_t, options: i32) -> Result<WaitStatus> {
    wait_raw(pid, options)
        .map(WaitStatus::from_raw)
        .map_err(|e| CryoError::ProcessControl(format!("waitpid({}) failed: {}", pid, e)))
}

/// True when a tracee reports the stop that follows a traced execve.
/// Anything else is left for the caller to report.
pub fn task_is_trapped(status: i32, pid: pid_t) -> bool {
    match WaitStatus::from_raw(status) {
        WaitStatus::Stopped(sig) if sig == SIGTRAP => true,
        other => {
            log::debug!("Task {} is not trapped: {:x} ({:?})", pid, status, other);
            false
        }
    }
}

pub fn send_signal(pid: pid_t, sig: i32) -> Result<()> {
    if unsafe { libc::kill(pid, sig) } == -1 {
        return Err(CryoError::ProcessControl(format!(
            "kill({}, {}) failed: {}",
            pid,
            sig,
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Sends SIGSTOP and blocks until the kernel reports the task stopped.
///
/// Our own children are waited for with `waitpid(WUNTRACED)`. Anything else
/// can't be waited on (ECHILD), so its /proc state is polled instead.
pub fn stop_task(pid: pid_t) -> Result<()> {
    send_signal(pid, SIGSTOP)?;

    match wait_raw(pid, libc::WUNTRACED) {
        Ok(status) => match WaitStatus::from_raw(status) {
            WaitStatus::Stopped(sig) => {
                log::debug!("Task {} stopped by signal {}", pid, sig);
                Ok(())
            }
            _ => Err(CryoError::UnexpectedState { pid, status }),
        },
        Err(e) if e.raw_os_error() == Some(libc::ECHILD) => poll_until_stopped(pid),
        Err(e) => Err(CryoError::ProcessControl(format!(
            "waitpid({}) failed: {}",
            pid, e
        ))),
    }
}

fn poll_until_stopped(pid: pid_t) -> Result<()> {
    log::debug!("Task {} is not our child, polling its state", pid);
    loop {
        match parse_task_state(pid)? {
            'T' | 't' => return Ok(()),
            state @ ('Z' | 'X' | 'x') => {
                return Err(CryoError::ProcessControl(format!(
                    "task {} exited while stopping (state {})",
                    pid, state
                )))
            }
            _ => thread::sleep(STOP_POLL_INTERVAL),
        }
    }
}

pub fn continue_task(pid: pid_t) -> Result<()> {
    send_signal(pid, SIGCONT)
}
