//! Parsers for the /proc/<pid> pseudo-files

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CryoError, Result};

/// Matches `<start>-<end> <perms>` followed by anything at all.
///
/// Offset, device, inode and pathname columns are optional so that
/// truncated or unusual listings still yield their address ranges.
static MAPS_LINE: OnceLock<Regex> = OnceLock::new();

fn maps_line_regex() -> &'static Regex {
    MAPS_LINE.get_or_init(|| {
        Regex::new(r"^([0-9a-fA-F]+)-([0-9a-fA-F]+)\s+(\S+)(.*)$").expect("static maps regex")
    })
}

/// One line of /proc/<pid>/maps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmaArea {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    pub inode: u64,
    pub name: Option<String>,
}

impl VmaArea {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_readable(&self) -> bool {
        self.perms.starts_with('r')
    }

    pub fn is_writable(&self) -> bool {
        self.perms.chars().nth(1) == Some('w')
    }

    pub fn is_private(&self) -> bool {
        self.perms.chars().nth(3) == Some('p')
    }
}

/// Which regions a capture pass keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionFilter {
    /// Only regions whose permission field carries `w`
    #[default]
    Writable,
    /// Every region the listing reports
    All,
}

impl RegionFilter {
    pub fn matches(&self, vma: &VmaArea) -> bool {
        match self {
            RegionFilter::Writable => vma.is_writable(),
            RegionFilter::All => true,
        }
    }
}

/// Parses a single maps line. Lines that don't look like a mapping yield `None`.
pub fn parse_maps_line(line: &str) -> Option<VmaArea> {
    let caps = maps_line_regex().captures(line.trim_end())?;

    let start = u64::from_str_radix(&caps[1], 16).ok()?;
    let end = u64::from_str_radix(&caps[2], 16).ok()?;
    if start > end {
        return None;
    }

    // offset dev inode pathname; the kernel pads before pathname
    let mut rest = caps[4].trim_start().splitn(4, char::is_whitespace);
    let offset = rest
        .next()
        .and_then(|s| u64::from_str_radix(s, 16).ok())
        .unwrap_or(0);
    let _dev = rest.next();
    let inode = rest.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let name = rest
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(VmaArea {
        start,
        end,
        perms: caps[3].to_string(),
        offset,
        inode,
        name,
    })
}

/// Lazy iterator over the mappings of a maps listing.
///
/// A read error ends the iteration: the listing of a task that is exiting
/// can disappear underneath us and whatever was read so far is still valid.
pub struct MapsIter<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> MapsIter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
        }
    }
}

impl<R: BufRead> Iterator for MapsIter<R> {
    type Item = VmaArea;

    fn next(&mut self) -> Option<VmaArea> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Maps listing ended early: {}", e);
                    return None;
                }
            }

            let line = String::from_utf8_lossy(&self.buf);
            match parse_maps_line(&line) {
                Some(vma) => return Some(vma),
                None => log::debug!("Skipping maps line {:?}", line.trim_end()),
            }
        }
    }
}

/// Opens /proc/<pid>/maps.
pub fn read_maps(pid: libc::pid_t) -> Result<MapsIter<BufReader<File>>> {
    let path = format!("/proc/{}/maps", pid);
    let file = File::open(&path).map_err(|source| CryoError::MapsUnavailable { pid, source })?;
    Ok(MapsIter::new(BufReader::new(file)))
}

/// Extracts the state letter from the contents of /proc/<pid>/stat.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so the state is located after the last `)`.
pub fn parse_stat_state(stat: &str) -> Option<char> {
    let close = stat.rfind(')')?;
    stat[close + 1..].trim_start().chars().next()
}

/// Reads the scheduler state letter of a task (`R`, `S`, `T`, `t`, `Z`, ...).
pub fn parse_task_state(pid: libc::pid_t) -> Result<char> {
    let path = format!("/proc/{}/stat", pid);
    let stat = fs::read_to_string(&path)
        .map_err(|e| CryoError::ProcessControl(format!("reading {} failed: {}", path, e)))?;
    parse_stat_state(&stat)
        .ok_or_else(|| CryoError::ProcessControl(format!("malformed {}", path)))
}
