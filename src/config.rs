//! Runtime configuration

use std::path::PathBuf;

use libc::pid_t;

use crate::error::{CryoError, Result};
use crate::proc_parse::RegionFilter;

pub const DEFAULT_DUMP_PATH: &str = "/tmp/cryo.dump";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Stop a running process and write its memory to the dump
    Save,
    /// Start the binary and replay the dump into it
    Load,
    /// List the records of a dump
    Inspect,
}

/// What happens to the target once its memory has been saved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePolicy {
    LeaveStopped,
    #[default]
    Resume,
}

impl ResumePolicy {
    pub fn from_leave_stopped(leave_stopped: bool) -> Self {
        if leave_stopped {
            ResumePolicy::LeaveStopped
        } else {
            ResumePolicy::Resume
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
    pub target_pid: Option<pid_t>,
    pub dump_path: PathBuf,
    pub binary_path: Option<PathBuf>,
    pub resume: ResumePolicy,
    pub capture: RegionFilter,
}

impl Config {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            target_pid: None,
            dump_path: PathBuf::from(DEFAULT_DUMP_PATH),
            binary_path: None,
            resume: ResumePolicy::default(),
            capture: RegionFilter::default(),
        }
    }

    /// Rejects combinations that can't run, before anything is touched
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            Mode::Save => match self.target_pid {
                None => Err(CryoError::InvalidConfig("save needs a target pid".into())),
                Some(pid) if pid <= 0 => Err(CryoError::InvalidConfig(format!(
                    "target pid must be positive, got {}",
                    pid
                ))),
                Some(_) => Ok(()),
            },
            Mode::Load => match &self.binary_path {
                None => Err(CryoError::InvalidConfig("load needs a binary path".into())),
                Some(path) if path.as_os_str().is_empty() => {
                    Err(CryoError::InvalidConfig("binary path is empty".into()))
                }
                Some(_) => Ok(()),
            },
            Mode::Inspect => Ok(()),
        }
    }
}
