//! Stop a process and write its memory to a dump

use std::io::{Read, Seek, Write};
use std::path::Path;

use libc::pid_t;

use super::extract::MemImage;
use crate::compel::task::{continue_task, stop_task};
use crate::config::ResumePolicy;
use crate::error::Result;
use crate::images::DumpWriter;
use crate::proc_parse::{read_maps, VmaArea};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Records written to the dump
    pub captured: usize,
    /// Regions dropped because they could not be read in full
    pub skipped_unreadable: usize,
    /// Zero-length regions
    pub skipped_empty: usize,
    /// Regions rejected by the filter
    pub filtered: usize,
    /// Memory bytes written
    pub bytes: u64,
}

/// Copies every region accepted by `keep` from `mem` into `writer`, in
/// listing order. Unreadable regions are skipped, write failures are fatal.
pub fn capture<I, R, W, F>(
    regions: I,
    mem: &mut MemImage<R>,
    writer: &mut DumpWriter<W>,
    keep: F,
) -> Result<CaptureStats>
where
    I: IntoIterator<Item = VmaArea>,
    R: Read + Seek,
    W: Write,
    F: Fn(&VmaArea) -> bool,
{
    let mut stats = CaptureStats::default();

    for vma in regions {
        if !keep(&vma) {
            stats.filtered += 1;
            continue;
        }
        if vma.is_empty() {
            log::debug!("Skipping empty region at 0x{:x}", vma.start);
            stats.skipped_empty += 1;
            continue;
        }
        if !vma.is_readable() {
            log::warn!("Region 0x{:x}-0x{:x} is not readable, skipping", vma.start, vma.end);
            stats.skipped_unreadable += 1;
            continue;
        }

        log::debug!(
            "Saving segment 0x{:x}-0x{:x} ({} bytes) {}",
            vma.start,
            vma.end,
            vma.len(),
            vma.name.as_deref().unwrap_or("")
        );

        match mem.extract(vma.start, vma.end) {
            Some(segment) => {
                writer.write_segment(&segment)?;
                stats.captured += 1;
                stats.bytes += segment.len() as u64;
            }
            None => stats.skipped_unreadable += 1,
        }
    }

    Ok(stats)
}

fn capture_to_file<F>(pid: pid_t, dump_path: &Path, keep: F) -> Result<CaptureStats>
where
    F: Fn(&VmaArea) -> bool,
{
    let maps = read_maps(pid)?;
    let mut mem = MemImage::open(pid)?;
    let mut writer = DumpWriter::create(dump_path)?;

    let stats = capture(maps, &mut mem, &mut writer, keep)?;
    log::info!(
        "Wrote {} records ({} bytes) to {}",
        writer.records(),
        writer.bytes(),
        dump_path.display()
    );
    writer.finish()?;
    Ok(stats)
}

/// Stops `pid`, dumps the regions accepted by `keep` to `dump_path` and
/// then applies `resume`.
///
/// The resume policy is applied whether or not the capture succeeded; the
/// stop itself is never rolled back otherwise.
pub fn suspend<F>(pid: pid_t, dump_path: &Path, keep: F, resume: ResumePolicy) -> Result<CaptureStats>
where
    F: Fn(&VmaArea) -> bool,
{
    log::info!("Stopping {}", pid);
    stop_task(pid)?;

    let result = capture_to_file(pid, dump_path, keep);

    match resume {
        ResumePolicy::Resume => {
            log::info!("Continuing {}", pid);
            if let Err(e) = continue_task(pid) {
                if result.is_ok() {
                    return Err(e);
                }
                log::error!("Could not continue {}: {}", pid, e);
            }
        }
        ResumePolicy::LeaveStopped => log::info!("Leaving {} stopped", pid),
    }

    let stats = result?;
    log::info!(
        "Saved {} segments ({} bytes) to {}, skipped {} unreadable",
        stats.captured,
        stats.bytes,
        dump_path.display(),
        stats.skipped_unreadable
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryoError;
    use crate::images::DumpReader;
    use crate::proc_parse::{parse_maps_line, RegionFilter};
    use std::io::Cursor;
    use std::process::Command;

    fn image() -> MemImage<Cursor<Vec<u8>>> {
        let data: Vec<u8> = (0..0x4000u32).map(|i| (i * 7) as u8).collect();
        MemImage::new(Cursor::new(data))
    }

    fn regions(lines: &[&str]) -> Vec<VmaArea> {
        lines.iter().filter_map(|l| parse_maps_line(l)).collect()
    }

    #[test]
    fn test_capture_counts() {
        let vmas = regions(&[
            "1000-2000 rw-p 00000000 00:00 0",
            "2000-3000 r-xp 00000000 00:00 0 /bin/x",
            "3000-3000 rw-p 00000000 00:00 0",
            "3800-5000 rw-p 00000000 00:00 0",
            "5000-6000 -w-p 00000000 00:00 0",
        ]);
        let mut writer = DumpWriter::new(Vec::new());

        let stats = capture(vmas, &mut image(), &mut writer, |v| RegionFilter::Writable.matches(v)).unwrap();

        assert_eq!(
            stats,
            CaptureStats {
                captured: 1,
                skipped_unreadable: 2,
                skipped_empty: 1,
                filtered: 1,
                bytes: 0x1000,
            }
        );
        assert_eq!(writer.records(), 1);
    }

    #[test]
    fn test_capture_all_filter() {
        let vmas = regions(&["1000-1100 rw-p", "2000-2100 r-xp", "3000-3100 r--p"]);
        let mut writer = DumpWriter::new(Vec::new());

        let stats = capture(vmas, &mut image(), &mut writer, |v| RegionFilter::All.matches(v)).unwrap();
        assert_eq!(stats.captured, 3);

        let data = writer.finish().unwrap();
        let starts: Vec<u64> = DumpReader::new(Cursor::new(data))
            .map(|s| s.unwrap().start)
            .collect();
        assert_eq!(starts, vec![0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn test_capture_custom_predicate() {
        let vmas = regions(&[
            "1000-1100 rw-p 00000000 00:00 0 [heap]",
            "2000-2100 rw-p 00000000 00:00 0 [stack]",
        ]);
        let mut writer = DumpWriter::new(Vec::new());

        let stats = capture(vmas, &mut image(), &mut writer, |v| {
            v.name.as_deref() == Some("[stack]")
        })
        .unwrap();
        assert_eq!((stats.captured, stats.filtered), (1, 1));
    }

    #[test]
    fn test_suspend_missing_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cryo.dump");
        let err = suspend(999_999_999, &path, |_| true, ResumePolicy::Resume).unwrap_err();
        assert!(matches!(err, CryoError::ProcessControl(_)));
        assert!(!path.exists());
    }

    #[test]
    #[ignore] // Requires ptrace access to children
    fn test_suspend_child_leave_stopped() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id() as pid_t;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cryo.dump");

        let stats = suspend(pid, &path, |v| RegionFilter::Writable.matches(v), ResumePolicy::LeaveStopped)
            .unwrap();

        assert!(stats.captured > 0);
        assert_eq!(crate::proc_parse::parse_task_state(pid).unwrap(), 'T');

        let decoded = DumpReader::open(&path).unwrap().count();
        assert_eq!(decoded, stats.captured);

        child.kill().unwrap();
        child.wait().unwrap();
    }
}
