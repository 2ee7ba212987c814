// Core modules
pub mod compel;
pub mod config;
pub mod dump;
pub mod error;
pub mod images;
pub mod proc_parse;
pub mod restore;

pub use config::{Config, Mode, ResumePolicy};
pub use error::{CryoError, Result};

use dump::CaptureStats;
use images::{DumpReader, DumpSummary};
use restore::LoadOutcome;

/// What a completed run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Saved(CaptureStats),
    Loaded(LoadOutcome),
    Inspected(DumpSummary),
}

/// Validates `config` and runs the selected mode
pub fn run(config: &Config) -> Result<Outcome> {
    config.validate()?;

    match config.mode {
        Mode::Save => {
            let pid = config
                .target_pid
                .ok_or_else(|| CryoError::InvalidConfig("save needs a target pid".into()))?;
            let filter = config.capture;
            let stats = dump::suspend(pid, &config.dump_path, |v| filter.matches(v), config.resume)?;
            Ok(Outcome::Saved(stats))
        }
        Mode::Load => {
            let binary = config
                .binary_path
                .as_deref()
                .ok_or_else(|| CryoError::InvalidConfig("load needs a binary path".into()))?;
            let outcome = restore::load(&config.dump_path, binary)?;
            Ok(Outcome::Loaded(outcome))
        }
        Mode::Inspect => {
            let summary = DumpSummary::scan(DumpReader::open(&config.dump_path)?)?;
            summary.display();
            Ok(Outcome::Inspected(summary))
        }
    }
}
