//! End-to-end runs against real processes
//!
//! These fork, signal and trace children, so they are ignored by default.

use std::path::{Path, PathBuf};
use std::process::Command;

use cryo::compel::WORD_SIZE;
use cryo::dump::MemImage;
use cryo::images::Segment;
use cryo::proc_parse::{parse_task_state, read_maps};
use cryo::restore::{restore_segments, ExitStatus, LoadOutcome, RestoreStats, Tracee};
use cryo::{Config, CryoError, Mode, Outcome, ResumePolicy};

#[test]
#[ignore] // Requires ptrace access to children
fn test_save_then_inspect() {
    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("sleep.dump");

    let mut save = Config::new(Mode::Save);
    save.target_pid = Some(child.id() as i32);
    save.dump_path = dump.clone();
    save.resume = ResumePolicy::Resume;

    let saved = match cryo::run(&save).unwrap() {
        Outcome::Saved(stats) => stats,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert!(saved.captured > 0);
    assert_ne!(parse_task_state(child.id() as i32).unwrap(), 'T');

    let mut inspect = Config::new(Mode::Inspect);
    inspect.dump_path = dump;
    match cryo::run(&inspect).unwrap() {
        Outcome::Inspected(summary) => {
            assert_eq!(summary.records.len(), saved.captured);
            assert_eq!(summary.total_bytes, saved.bytes);
            assert!(!summary.truncated);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    child.kill().unwrap();
    child.wait().unwrap();
}

#[test]
#[ignore] // Requires ptrace access to children
fn test_load_without_dump_runs_fresh() {
    let dir = tempfile::tempdir().unwrap();

    let mut load = Config::new(Mode::Load);
    load.dump_path = dir.path().join("missing.dump");
    load.binary_path = Some(PathBuf::from("/bin/true"));

    assert_eq!(
        cryo::run(&load).unwrap(),
        Outcome::Loaded(LoadOutcome::NothingToRestore {
            exit: ExitStatus::Exited(0)
        })
    );
}

#[test]
#[ignore] // Requires ptrace access to children
fn test_load_empty_dump_resumes_child() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("empty.dump");
    std::fs::write(&dump, b"").unwrap();

    let mut load = Config::new(Mode::Load);
    load.dump_path = dump;
    load.binary_path = Some(PathBuf::from("/bin/true"));

    match cryo::run(&load).unwrap() {
        Outcome::Loaded(LoadOutcome::Restored { stats, exit }) => {
            assert_eq!(stats.segments, 0);
            assert_eq!(exit, ExitStatus::Exited(0));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
#[ignore] // Requires ptrace access to children
fn test_restore_into_trapped_stack() {
    let mut tracee = Tracee::spawn(Path::new("/bin/true")).unwrap();
    let pid = tracee.pid();

    let stack = read_maps(pid)
        .unwrap()
        .find(|vma| vma.name.as_deref() == Some("[stack]"))
        .expect("child has a stack mapping");
    let addr = stack.end - 0x1000;

    let payload: Vec<u8> = b"0123456789abcdef".iter().copied().cycle().take(2 * WORD_SIZE + 3).collect();
    let stats = restore_segments(&mut tracee, vec![Ok(Segment::new(addr, payload.clone()))]).unwrap();
    assert_eq!(
        stats,
        RestoreStats {
            segments: 1,
            words: 2,
            tail_bytes_dropped: 3
        }
    );

    let written = MemImage::open(pid)
        .unwrap()
        .extract(addr, addr + 2 * WORD_SIZE as u64)
        .unwrap();
    assert_eq!(written.bytes, payload[..2 * WORD_SIZE]);

    // Nothing is mapped at the bottom of the address space
    let unmapped = vec![Ok(Segment::new(0x10, vec![0; WORD_SIZE]))];
    match restore_segments(&mut tracee, unmapped) {
        Err(CryoError::Ptrace { request, pid: p, .. }) => {
            assert_eq!(request, "PTRACE_POKEDATA");
            assert_eq!(p, pid);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_inspect_missing_dump_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut inspect = Config::new(Mode::Inspect);
    inspect.dump_path = dir.path().join("absent.dump");
    assert!(matches!(
        cryo::run(&inspect),
        Err(CryoError::DumpUnavailable { .. })
    ));
}

#[test]
fn test_invalid_config_rejected_before_side_effects() {
    let save = Config::new(Mode::Save);
    assert!(matches!(cryo::run(&save), Err(CryoError::InvalidConfig(_))));
}
