// Dump file reader
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::segment::Segment;
use super::ADDR_FIELD_SIZE;
use crate::error::{CryoError, Result};

/// Streams the records of a dump.
///
/// A short read anywhere in a record is the end of the dump rather than an
/// error, so a file left behind by an interrupted capture still yields every
/// whole record before the cut. Only genuine I/O failures surface as `Err`.
pub struct DumpReader<R: Read> {
    inner: R,
    offset: u64,
    truncated: bool,
    done: bool,
}

impl DumpReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CryoError::DumpUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> DumpReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            truncated: false,
            done: false,
        }
    }

    /// Bytes consumed from the underlying reader
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the dump ended part-way through a record
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn read_full(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }

    fn read_addr(&mut self) -> io::Result<Option<u64>> {
        let mut buf = [0u8; ADDR_FIELD_SIZE];
        let n = self.read_full(&mut buf)?;
        if n < ADDR_FIELD_SIZE {
            if n > 0 {
                self.truncated = true;
            }
            return Ok(None);
        }
        Ok(Some(u64::from_ne_bytes(buf)))
    }

    fn read_record(&mut self) -> io::Result<Option<Segment>> {
        loop {
            let record_offset = self.offset;

            let Some(start) = self.read_addr()? else {
                return Ok(None);
            };
            let Some(end) = self.read_addr()? else {
                self.truncated = true;
                return Ok(None);
            };

            if end < start {
                log::warn!(
                    "Record at offset {} has end 0x{:x} below start 0x{:x}, stopping",
                    record_offset,
                    end,
                    start
                );
                self.truncated = true;
                return Ok(None);
            }

            // Never written by DumpWriter, but harmless to step over
            if end == start {
                log::debug!("Skipping empty record at 0x{:x}", start);
                continue;
            }

            let len = end - start;
            let mut bytes = Vec::with_capacity(len.min(1 << 20) as usize);
            let got = Read::by_ref(&mut self.inner).take(len).read_to_end(&mut bytes)?;
            self.offset += got as u64;

            if (got as u64) < len {
                log::warn!(
                    "Record 0x{:x}-0x{:x} truncated after {} of {} bytes",
                    start,
                    end,
                    got,
                    len
                );
                self.truncated = true;
                return Ok(None);
            }

            return Ok(Some(Segment::new(start, bytes)));
        }
    }
}

impl<R: Read> Iterator for DumpReader<R> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.read_record() {
            Ok(Some(segment)) => Some(Ok(segment)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::DumpWriter;
    use std::io::Cursor;

    fn encode(segments: &[Segment]) -> Vec<u8> {
        let mut writer = DumpWriter::new(Vec::new());
        for seg in segments {
            writer.write_segment(seg).unwrap();
        }
        writer.finish().unwrap()
    }

    fn decode(data: Vec<u8>) -> (Vec<Segment>, bool) {
        let mut reader = DumpReader::new(Cursor::new(data));
        let segments = reader.by_ref().collect::<Result<Vec<_>>>().unwrap();
        (segments, reader.is_truncated())
    }

    fn sample() -> Vec<Segment> {
        vec![
            Segment::new(0x1000, (0..=255u8).cycle().take(0x1000).collect()),
            Segment::new(0x5000, vec![0xab; 0x10]),
            Segment::new(0x7f00_0000_0000, vec![7; 24]),
        ]
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let segments = sample();
        let (decoded, truncated) = decode(encode(&segments));
        assert_eq!(decoded, segments);
        assert!(!truncated);
    }

    #[test]
    fn test_empty_dump() {
        let (decoded, truncated) = decode(Vec::new());
        assert!(decoded.is_empty());
        assert!(!truncated);
    }

    #[test]
    fn test_zero_length_segments_never_decoded() {
        let with_empty = vec![
            Segment::new(0x1000, vec![1; 8]),
            Segment::new(0x9000, Vec::new()),
            Segment::new(0x2000, vec![2; 8]),
        ];
        let (decoded, _) = decode(encode(&with_empty));
        assert_eq!(decoded.len(), 2);
        assert!(decoded.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn test_hand_written_empty_record_skipped() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x9000u64.to_ne_bytes());
        data.extend_from_slice(&0x9000u64.to_ne_bytes());
        data.extend(encode(&[Segment::new(0x1000, vec![3; 4])]));

        let (decoded, _) = decode(data);
        assert_eq!(decoded, vec![Segment::new(0x1000, vec![3; 4])]);
    }

    #[test]
    fn test_truncation_at_every_offset() {
        let segments = sample();
        let data = encode(&segments);

        let mut boundaries = vec![0usize];
        let mut at = 0;
        for seg in &segments {
            at += 16 + seg.len();
            boundaries.push(at);
        }

        for cut in 0..data.len() {
            let whole = boundaries.iter().filter(|&&b| b > 0 && b <= cut).count();
            let (decoded, truncated) = decode(data[..cut].to_vec());
            assert_eq!(decoded, &segments[..whole], "cut at {}", cut);
            assert_eq!(truncated, !boundaries.contains(&cut), "cut at {}", cut);
        }
    }

    #[test]
    fn test_inverted_record_stops_reading() {
        let mut data = encode(&[Segment::new(0x1000, vec![1; 8])]);
        data.extend_from_slice(&0x3000u64.to_ne_bytes());
        data.extend_from_slice(&0x2000u64.to_ne_bytes());
        data.extend(encode(&[Segment::new(0x4000, vec![4; 8])]));

        let (decoded, truncated) = decode(data);
        assert_eq!(decoded.len(), 1);
        assert!(truncated);
    }

    #[test]
    fn test_huge_declared_length_is_truncation() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u64.to_ne_bytes());
        data.extend_from_slice(&u64::MAX.to_ne_bytes());
        data.extend_from_slice(&[0u8; 32]);

        let (decoded, truncated) = decode(data);
        assert!(decoded.is_empty());
        assert!(truncated);
    }

    #[test]
    fn test_offset_tracks_consumed_bytes() {
        let data = encode(&sample());
        let len = data.len() as u64;
        let mut reader = DumpReader::new(Cursor::new(data));
        while reader.next().is_some() {}
        assert_eq!(reader.offset(), len);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        match DumpReader::open(dir.path().join("absent.dump")) {
            Err(CryoError::DumpUnavailable { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
