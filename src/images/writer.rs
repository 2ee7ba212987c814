// Dump file writer
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::segment::Segment;
use crate::error::{CryoError, Result};

pub struct DumpWriter<W: Write> {
    inner: W,
    records: usize,
    bytes: u64,
}

impl DumpWriter<BufWriter<File>> {
    /// Creates (or truncates) the dump file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| CryoError::DumpUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> DumpWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            records: 0,
            bytes: 0,
        }
    }

    /// Appends one record. Empty segments are not written and return `false`.
    pub fn write_segment(&mut self, segment: &Segment) -> Result<bool> {
        if segment.is_empty() {
            log::debug!("Not writing empty segment at 0x{:x}", segment.start);
            return Ok(false);
        }

        self.inner.write_all(&segment.start.to_ne_bytes())?;
        self.inner.write_all(&segment.end().to_ne_bytes())?;
        self.inner.write_all(&segment.bytes)?;

        self.records += 1;
        self.bytes += segment.len() as u64;
        Ok(true)
    }

    /// Records written so far
    pub fn records(&self) -> usize {
        self.records
    }

    /// Payload bytes written so far, excluding the address fields
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Flushes and hands back the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
