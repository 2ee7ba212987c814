use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot open memory map listing of pid {pid}: {source}")]
    MapsUnavailable { pid: i32, source: io::Error },

    #[error("Cannot open memory image of pid {pid}: {source}")]
    MemImageUnavailable { pid: i32, source: io::Error },

    #[error("Cannot open dump file {}: {source}", path.display())]
    DumpUnavailable { path: PathBuf, source: io::Error },

    #[error("{request} on pid {pid} failed: {source}")]
    Ptrace {
        request: &'static str,
        pid: i32,
        source: io::Error,
    },

    #[error("Process control failed: {0}")]
    ProcessControl(String),

    #[error("Spawning traced child failed: {0}")]
    Spawn(String),

    #[error("Task {pid} is in unexpected state: {status:#x}")]
    UnexpectedState { pid: i32, status: i32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CryoError>;
