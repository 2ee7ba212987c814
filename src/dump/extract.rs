//! Copies memory out of a stopped task through /proc/<pid>/mem
//!
//! Capture side only. A freshly exec'd tracee is written with
//! PTRACE_POKEDATA instead, see `restore::tracee`.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{CryoError, Result};
use crate::images::Segment;

/// Seekable view of a process address space
pub struct MemImage<R> {
    inner: R,
}

impl MemImage<File> {
    pub fn open(pid: libc::pid_t) -> Result<Self> {
        let path = format!("/proc/{}/mem", pid);
        let file = File::open(&path).map_err(|source| CryoError::MemImageUnavailable { pid, source })?;
        Ok(Self::new(file))
    }
}

impl<R: Read + Seek> MemImage<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn read_at(&mut self, start: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.seek(SeekFrom::Start(start))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // EIO past the readable part of a mapping, keep what we have
                Err(e) if filled > 0 => {
                    log::debug!("Read at 0x{:x} stopped: {}", start + filled as u64, e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Copies `[start, end)` out of the image.
    ///
    /// Anything short of the full range yields `None`: the region was
    /// unmapped or lost its read permission after it was listed.
    pub fn extract(&mut self, start: u64, end: u64) -> Option<Segment> {
        let len = usize::try_from(end.checked_sub(start)?).ok()?;
        let mut bytes = vec![0u8; len];

        match self.read_at(start, &mut bytes) {
            Ok(n) if n == len => {
                log::debug!("Read {} bytes at 0x{:x}", n, start);
                Some(Segment::new(start, bytes))
            }
            Ok(n) => {
                log::warn!(
                    "Short read at 0x{:x}-0x{:x}: {} of {} bytes, skipping",
                    start,
                    end,
                    n,
                    len
                );
                None
            }
            Err(e) => {
                log::warn!("Cannot read 0x{:x}-0x{:x}: {}, skipping", start, end, e);
                None
            }
        }
    }
}
