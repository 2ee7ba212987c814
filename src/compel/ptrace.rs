//! Ptrace wrapper functions

use std::io;
use std::mem;
use std::ptr;

use libc::{
    c_long, c_void, pid_t, ptrace, siginfo_t, PTRACE_CONT, PTRACE_DETACH, PTRACE_GETSIGINFO, PTRACE_POKEDATA,
    PTRACE_TRACEME,
};

use crate::error::{CryoError, Result};

/// Machine word moved by a single PTRACE_POKEDATA
pub type Word = c_long;

/// Size of [`Word`] in bytes
pub const WORD_SIZE: usize = mem::size_of::<Word>();

fn ptrace_error(request: &'static str, pid: pid_t) -> CryoError {
    CryoError::Ptrace {
        request,
        pid,
        source: io::Error::last_os_error(),
    }
}

/// Asks to be traced by the parent. Only meaningful in a freshly forked child.
pub fn ptrace_traceme() -> io::Result<()> {
    let ret = unsafe {
        ptrace(
            PTRACE_TRACEME,
            0,
            ptr::null_mut::<c_void>(),
            ptr::null_mut::<c_void>(),
        )
    };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Restarts a ptrace-stopped tracee, delivering `sig` (0 for none).
pub fn ptrace_cont(pid: pid_t, sig: i32) -> Result<()> {
    let ret = unsafe { ptrace(PTRACE_CONT, pid, ptr::null_mut::<c_void>(), sig as c_long as *mut c_void) };
    if ret == -1 {
        return Err(ptrace_error("PTRACE_CONT", pid));
    }
    Ok(())
}

/// Detaches from a ptrace-stopped tracee and lets it run.
pub fn ptrace_detach(pid: pid_t, sig: i32) -> Result<()> {
    let ret = unsafe { ptrace(PTRACE_DETACH, pid, ptr::null_mut::<c_void>(), sig as c_long as *mut c_void) };
    if ret == -1 {
        return Err(ptrace_error("PTRACE_DETACH", pid));
    }
    Ok(())
}

/// Stores one word at `addr` in the tracee.
pub fn ptrace_poke_word(pid: pid_t, addr: u64, word: Word) -> Result<()> {
    let ret = unsafe { ptrace(PTRACE_POKEDATA, pid, addr as *mut c_void, word as *mut c_void) };
    if ret == -1 {
        return Err(ptrace_error("PTRACE_POKEDATA", pid));
    }
    Ok(())
}

/// Fetches the siginfo of the signal that put the tracee in its current stop.
///
/// Fails with EINVAL when the stop is a group-stop rather than a
/// signal-delivery stop.
pub fn ptrace_getsiginfo(pid: pid_t) -> Result<siginfo_t> {
    let mut info: siginfo_t = unsafe { mem::zeroed() };
    let ret = unsafe {
        ptrace(
            PTRACE_GETSIGINFO,
            pid,
            ptr::null_mut::<c_void>(),
            &mut info as *mut siginfo_t as *mut c_void,
        )
    };
    if ret == -1 {
        return Err(ptrace_error("PTRACE_GETSIGINFO", pid));
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_size() {
        assert_eq!(WORD_SIZE, mem::size_of::<usize>());
    }

    #[test]
    fn test_cont_on_untraced_pid_fails() {
        // we are not tracing ourselves, ESRCH
        let pid = std::process::id() as pid_t;
        match ptrace_cont(pid, 0) {
            Err(CryoError::Ptrace { request, .. }) => assert_eq!(request, "PTRACE_CONT"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_poke_untraced_pid_fails() {
        let pid = std::process::id() as pid_t;
        assert!(ptrace_poke_word(pid, 0x1000, 0).is_err());
    }

    #[test]
    fn test_getsiginfo_untraced_pid_fails() {
        let pid = std::process::id() as pid_t;
        match ptrace_getsiginfo(pid) {
            Err(CryoError::Ptrace { request, .. }) => assert_eq!(request, "PTRACE_GETSIGINFO"),
            other => panic!("unexpected result: {:?}", other.map(|info| info.si_signo)),
        }
    }
}
