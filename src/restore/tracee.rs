//! Traced child lifecycle
//!
//! The child walks `forked -> trace-armed -> exec'd/trapped` on its own side
//! of `fork`; the parent only ever holds it from the trap onwards, as
//! `Tracee<Trapped> -> Tracee<Restored> -> Tracee<Running> -> ExitStatus`.
//! Memory can only be written through `Tracee<Trapped>`.

use std::ffi::CString;
use std::io;
use std::marker::PhantomData;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use libc::{c_char, pid_t, EINVAL, SIGKILL, SIGSTOP, SIGTRAP, SIGTSTP, SIGTTIN, SIGTTOU};

use crate::compel::ptrace::{
    ptrace_cont, ptrace_detach, ptrace_getsiginfo, ptrace_poke_word, ptrace_traceme, Word, WORD_SIZE,
};
use crate::compel::task::{task_is_trapped, wait_raw, wait_status, WaitStatus};
use crate::error::{CryoError, Result};
use crate::images::Segment;

/// Stopped at the exec trap, nothing of its own has run yet
#[derive(Debug)]
pub struct Trapped;

/// Memory written, still stopped
#[derive(Debug)]
pub struct Restored;

/// Let go, either continued under trace or detached
#[derive(Debug)]
pub struct Running;

/// How the child finally went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
}

/// Something that accepts word-sized memory writes
pub trait PokeTarget {
    fn poke_word(&mut self, addr: u64, word: Word) -> Result<()>;
}

/// Writes the whole words of `segment` at consecutive addresses.
///
/// Returns the number of words written and the count of trailing bytes
/// that did not fill a word and were left out.
pub fn write_segment<T: PokeTarget + ?Sized>(target: &mut T, segment: &Segment) -> Result<(usize, usize)> {
    let chunks = segment.bytes.chunks_exact(WORD_SIZE);
    let tail = chunks.remainder().len();
    let mut words = 0;

    for (k, chunk) in chunks.enumerate() {
        let addr = (k as u64)
            .checked_mul(WORD_SIZE as u64)
            .and_then(|off| segment.start.checked_add(off));
        let Some(addr) = addr else {
            log::warn!(
                "Segment at 0x{:x} runs past the end of the address space after {} words",
                segment.start,
                words
            );
            break;
        };

        let mut buf = [0u8; WORD_SIZE];
        buf.copy_from_slice(chunk);
        target.poke_word(addr, Word::from_ne_bytes(buf))?;
        words += 1;
    }

    Ok((words, tail))
}

/// A child we forked and trace
#[derive(Debug)]
pub struct Tracee<S> {
    pid: pid_t,
    _state: PhantomData<S>,
}

impl<S> Tracee<S> {
    pub fn pid(&self) -> pid_t {
        self.pid
    }

    fn transition<T>(self) -> Tracee<T> {
        let pid = self.pid;
        mem::forget(self);
        Tracee {
            pid,
            _state: PhantomData,
        }
    }
}

/// Dropping a tracee that never reached `wait_exit` kills it: a half
/// restored image must not be left running.
impl<S> Drop for Tracee<S> {
    fn drop(&mut self) {
        log::warn!("Killing tracee {}", self.pid);
        unsafe { libc::kill(self.pid, SIGKILL) };
        let _ = wait_raw(self.pid, 0);
    }
}

fn child_abort(msg: &[u8]) -> ! {
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr() as *const libc::c_void, msg.len());
        libc::_exit(127)
    }
}

impl Tracee<Trapped> {
    /// Forks and execs `binary` under trace, returning once the child has
    /// stopped on the exec trap.
    pub fn spawn(binary: &Path) -> Result<Self> {
        let c_path = CString::new(binary.as_os_str().as_bytes())
            .map_err(|_| CryoError::Spawn(format!("{} contains a NUL byte", binary.display())))?;
        let argv: [*const c_char; 2] = [c_path.as_ptr(), ptr::null()];

        let pid = unsafe { libc::fork() };
        if pid == -1 {
            return Err(CryoError::Spawn(format!(
                "fork failed: {}",
                io::Error::last_os_error()
            )));
        }

        if pid == 0 {
            // Child: no allocation, no logging from here on
            if unsafe { libc::setpgid(0, 0) } == -1 {
                child_abort(b"cryo: child setpgid failed\n");
            }
            if ptrace_traceme().is_err() {
                child_abort(b"cryo: PTRACE_TRACEME failed\n");
            }
            unsafe { libc::execv(c_path.as_ptr(), argv.as_ptr()) };
            child_abort(b"cryo: execv failed\n");
        }

        let status = wait_raw(pid, 0)
            .map_err(|e| CryoError::ProcessControl(format!("waitpid({}) failed: {}", pid, e)))?;

        if task_is_trapped(status, pid) {
            log::debug!("{} trapped after exec of {}", pid, binary.display());
            return Ok(Tracee {
                pid,
                _state: PhantomData,
            });
        }

        match WaitStatus::from_raw(status) {
            WaitStatus::Exited(code) => Err(CryoError::Spawn(format!(
                "child {} exited with {} before reaching exec",
                pid, code
            ))),
            WaitStatus::Signaled(sig) => Err(CryoError::Spawn(format!(
                "child {} killed by signal {} before reaching exec",
                pid, sig
            ))),
            _ => {
                // Still around in some odd state, make sure it dies
                drop(Tracee::<Trapped> {
                    pid,
                    _state: PhantomData,
                });
                Err(CryoError::UnexpectedState { pid, status })
            }
        }
    }

    /// Marks memory restoration done
    pub fn restored(self) -> Tracee<Restored> {
        self.transition()
    }

    /// Detaches without restoring anything; the child runs as freshly started
    pub fn release(self) -> Result<Tracee<Running>> {
        ptrace_detach(self.pid, 0)?;
        Ok(self.transition())
    }
}

impl PokeTarget for Tracee<Trapped> {
    fn poke_word(&mut self, addr: u64, word: Word) -> Result<()> {
        ptrace_poke_word(self.pid, addr, word)
    }
}

impl Tracee<Restored> {
    /// Continues the child under trace
    pub fn resume(self) -> Result<Tracee<Running>> {
        ptrace_cont(self.pid, 0)?;
        Ok(self.transition())
    }
}

/// Whether a stop on `sig` is the group-stop of a job-control signal, as
/// opposed to the signal-delivery stop that precedes it.
fn in_group_stop(pid: pid_t, sig: i32) -> Result<bool> {
    if !matches!(sig, SIGSTOP | SIGTSTP | SIGTTIN | SIGTTOU) {
        return Ok(false);
    }
    match ptrace_getsiginfo(pid) {
        Ok(_) => Ok(false),
        Err(CryoError::Ptrace { ref source, .. }) if source.raw_os_error() == Some(EINVAL) => Ok(true),
        Err(e) => Err(e),
    }
}

impl Tracee<Running> {
    /// Waits for the child to exit and reaps it.
    ///
    /// Signals sent to a traced child show up as stops first; they are
    /// passed on with PTRACE_CONT. Trap stops are continued without a signal.
    /// Once a job-control signal puts the child in group-stop it is
    /// detached, so it stays stopped until SIGCONT like any other job.
    pub fn wait_exit(self) -> Result<ExitStatus> {
        let pid = self.pid;
        let mut traced = true;
        loop {
            match wait_status(pid, 0)? {
                WaitStatus::Exited(code) => {
                    mem::forget(self);
                    return Ok(ExitStatus::Exited(code));
                }
                WaitStatus::Signaled(sig) => {
                    mem::forget(self);
                    return Ok(ExitStatus::Signaled(sig));
                }
                WaitStatus::Stopped(sig) if traced => {
                    if in_group_stop(pid, sig)? {
                        log::debug!("{} in group-stop on signal {}, detaching", pid, sig);
                        ptrace_detach(pid, 0)?;
                        traced = false;
                        continue;
                    }
                    let forward = if sig == SIGTRAP { 0 } else { sig };
                    log::debug!("{} stopped by signal {}, continuing", pid, sig);
                    ptrace_cont(pid, forward)?;
                }
                WaitStatus::Stopped(_) | WaitStatus::Continued => {}
            }
        }
    }
}
