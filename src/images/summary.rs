// Dump summary for inspection
use std::io::Read;

use super::reader::DumpReader;
use crate::error::Result;

/// One record as listed by `inspect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    pub start: u64,
    pub end: u64,
}

impl RecordInfo {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

/// What a dump holds, without the memory contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub records: Vec<RecordInfo>,
    pub total_bytes: u64,
    /// Bytes consumed from the file, including any discarded tail
    pub file_bytes: u64,
    pub truncated: bool,
}

impl DumpSummary {
    /// Walks every record of `reader`
    pub fn scan<R: Read>(mut reader: DumpReader<R>) -> Result<Self> {
        let mut summary = DumpSummary::default();

        for segment in reader.by_ref() {
            let segment = segment?;
            summary.total_bytes += segment.len() as u64;
            summary.records.push(RecordInfo {
                start: segment.start,
                end: segment.end(),
            });
        }

        summary.file_bytes = reader.offset();
        summary.truncated = reader.is_truncated();
        Ok(summary)
    }

    /// Display dump information
    pub fn display(&self) {
        log::info!("Records: {}", self.records.len());
        log::info!("Payload: {} bytes", self.total_bytes);
        log::info!("File: {} bytes", self.file_bytes);

        for (i, rec) in self.records.iter().enumerate() {
            log::info!(
                "  [{:3}] 0x{:016x}-0x{:016x} ({} bytes)",
                i,
                rec.start,
                rec.end,
                rec.size()
            );
        }

        if self.truncated {
            log::warn!("Dump ends mid-record; the partial tail is ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{DumpWriter, Segment};
    use std::io::Cursor;

    #[test]
    fn test_scan_counts_records() {
        let mut writer = DumpWriter::new(Vec::new());
        writer.write_segment(&Segment::new(0x1000, vec![0; 0x1000])).unwrap();
        writer.write_segment(&Segment::new(0x5000, vec![1; 0x10])).unwrap();
        let mut data = writer.finish().unwrap();
        let whole = data.len() as u64;
        data.extend_from_slice(&[0xff; 5]);

        let summary = DumpSummary::scan(DumpReader::new(Cursor::new(data))).unwrap();

        assert_eq!(
            summary.records,
            vec![
                RecordInfo { start: 0x1000, end: 0x2000 },
                RecordInfo { start: 0x5000, end: 0x5010 },
            ]
        );
        assert_eq!(summary.total_bytes, 0x1010);
        assert_eq!(summary.file_bytes, whole + 5);
        assert!(summary.truncated);
    }

    #[test]
    fn test_scan_empty() {
        let summary = DumpSummary::scan(DumpReader::new(Cursor::new(Vec::new()))).unwrap();
        assert_eq!(summary, DumpSummary::default());
    }
}
