//! Controlling terminal handoff

use std::io;

use libc::{pid_t, SIGTTOU, SIG_DFL, SIG_ERR, SIG_IGN, STDIN_FILENO};

use crate::error::{CryoError, Result};

pub fn stdin_isatty() -> bool {
    unsafe { libc::isatty(STDIN_FILENO) == 1 }
}

fn set_sigttou(handler: libc::sighandler_t, what: &str) -> Result<()> {
    if unsafe { libc::signal(SIGTTOU, handler) } == SIG_ERR {
        return Err(CryoError::ProcessControl(format!(
            "{} SIGTTOU failed: {}",
            what,
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Runs `f` with SIGTTOU ignored, so that a background caller changing the
/// foreground group is not stopped by it.
fn with_sigttou_ignored<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    set_sigttou(SIG_IGN, "ignoring")?;
    let ret = f();
    set_sigttou(SIG_DFL, "restoring default handling of")?;
    ret
}

fn set_foreground(pgrp: pid_t) -> Result<()> {
    if unsafe { libc::tcsetpgrp(STDIN_FILENO, pgrp) } == -1 {
        return Err(CryoError::ProcessControl(format!(
            "setting foreground process group to {} failed: {}",
            pgrp,
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Makes `pgrp` the foreground process group of our terminal.
///
/// Returns `false` without doing anything when stdin is not a terminal.
pub fn hand_terminal_to(pgrp: pid_t) -> Result<bool> {
    if !stdin_isatty() {
        log::info!("Standard input is not a terminal, keeping job control as is");
        return Ok(false);
    }

    with_sigttou_ignored(|| set_foreground(pgrp))?;
    log::debug!("Process group {} is now in the foreground", pgrp);
    Ok(true)
}

/// Puts our own process group back in the foreground
pub fn reclaim_terminal() -> Result<()> {
    let own = unsafe { libc::getpgrp() };
    with_sigttou_ignored(|| set_foreground(own))
}
