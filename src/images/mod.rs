//! Dump image format
//!
//! A dump is a bare sequence of records, each laid out as
//! `[8 bytes start][8 bytes end][end - start bytes of memory]` with the
//! addresses in native byte order. There is no header, record count or
//! checksum; the end of the file is the end of the dump.

pub mod reader;
pub mod segment;
pub mod summary;
pub mod writer;

pub use reader::DumpReader;
pub use segment::Segment;
pub use summary::DumpSummary;
pub use writer::DumpWriter;

/// Width of the two address fields opening every record
pub const ADDR_FIELD_SIZE: usize = 8;
