//! Replays a dump into a fresh instance of the captured binary

use std::io;
use std::path::Path;

use super::tracee::{write_segment, ExitStatus, PokeTarget, Tracee};
use super::tty;
use crate::error::{CryoError, Result};
use crate::images::{DumpReader, Segment};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub segments: usize,
    pub words: usize,
    pub tail_bytes_dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The dump was replayed before the child ran
    Restored { stats: RestoreStats, exit: ExitStatus },
    /// No dump file, the child ran as freshly started
    NothingToRestore { exit: ExitStatus },
}

/// Writes every decoded segment into `target`, in dump order.
pub fn restore_segments<T, I>(target: &mut T, segments: I) -> Result<RestoreStats>
where
    T: PokeTarget + ?Sized,
    I: IntoIterator<Item = Result<Segment>>,
{
    let mut stats = RestoreStats::default();

    for segment in segments {
        let segment = segment?;
        let (words, tail) = write_segment(target, &segment)?;

        log::debug!(
            "Restored 0x{:x}-0x{:x} ({} bytes)",
            segment.start,
            segment.end(),
            segment.len()
        );
        if tail > 0 {
            log::warn!(
                "Segment at 0x{:x}: last {} bytes do not fill a word and were not written",
                segment.start,
                tail
            );
        }

        stats.segments += 1;
        stats.words += words;
        stats.tail_bytes_dropped += tail;
    }

    Ok(stats)
}

fn open_dump(path: &Path) -> Result<Option<DumpReader<io::BufReader<std::fs::File>>>> {
    match DumpReader::open(path) {
        Ok(reader) => Ok(Some(reader)),
        Err(CryoError::DumpUnavailable { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Starts `binary` under trace, writes the dump at `dump_path` into it
/// while it sits on the exec trap, then lets it run in the foreground
/// until it exits.
///
/// A missing dump is not an error: the child is released unrestored.
pub fn load(dump_path: &Path, binary: &Path) -> Result<LoadOutcome> {
    log::info!("Starting {} under trace", binary.display());
    let mut tracee = Tracee::spawn(binary)?;
    log::info!("Child {} trapped at exec", tracee.pid());

    let (running, stats) = match open_dump(dump_path)? {
        Some(reader) => {
            let stats = restore_segments(&mut tracee, reader)?;
            log::info!(
                "Restored {} segments ({} words) into {}",
                stats.segments,
                stats.words,
                tracee.pid()
            );
            (tracee.restored().resume()?, Some(stats))
        }
        None => {
            log::warn!(
                "Dump {} does not exist, nothing to restore",
                dump_path.display()
            );
            (tracee.release()?, None)
        }
    };

    let pid = running.pid();
    let handed = tty::hand_terminal_to(pid)?;
    let exit = running.wait_exit()?;
    log::info!("Child {} finished: {:?}", pid, exit);

    if handed {
        tty::reclaim_terminal()?;
    }

    Ok(match stats {
        Some(stats) => LoadOutcome::Restored { stats, exit },
        None => LoadOutcome::NothingToRestore { exit },
    })
}
