use anyhow::Context;
use clap::{Parser, ValueEnum};
use cryo::config::DEFAULT_DUMP_PATH;
use cryo::proc_parse::RegionFilter;
use cryo::restore::LoadOutcome;
use cryo::{Config, Mode, Outcome, ResumePolicy};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Instant;

// Global start time for dmesg-style logging
static START_TIME: OnceLock<Instant> = OnceLock::new();

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliMode {
    /// Stop a running process and save its memory
    Save,
    /// Start the binary and load the saved memory into it
    Load,
    /// List the contents of a dump
    Inspect,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Save => Mode::Save,
            CliMode::Load => Mode::Load,
            CliMode::Inspect => Mode::Inspect,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "cryo")]
#[command(about = "freeze a process's memory and thaw it into a new instance", long_about = None)]
struct Args {
    /// What to do
    #[arg(value_enum)]
    mode: CliMode,

    /// Process to save
    #[arg(short, long, env = "CRYO_PID")]
    pid: Option<i32>,

    /// Dump file to write or read
    #[arg(short, long, env = "CRYO_DUMP", value_name = "FILE", default_value = DEFAULT_DUMP_PATH)]
    dump: PathBuf,

    /// Binary to start when loading
    #[arg(short, long, env = "CRYO_BINARY", value_name = "PATH")]
    binary: Option<PathBuf>,

    /// Keep the process stopped after saving
    #[arg(long)]
    leave_stopped: bool,

    /// Save every mapping, not only writable ones
    #[arg(long)]
    all_regions: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            mode: self.mode.into(),
            target_pid: self.pid,
            dump_path: self.dump,
            binary_path: self.binary,
            resume: ResumePolicy::from_leave_stopped(self.leave_stopped),
            capture: if self.all_regions {
                RegionFilter::All
            } else {
                RegionFilter::Writable
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    START_TIME.get_or_init(Instant::now);

    // Initialize logging with dmesg-style timestamps
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format(|buf, record| {
            use std::io::Write;

            let elapsed = START_TIME.get_or_init(Instant::now).elapsed();

            // [  123.456789] LEVEL message
            writeln!(
                buf,
                "[{:5}.{:06}] {} {}",
                elapsed.as_secs(),
                elapsed.subsec_micros(),
                record.level(),
                record.args()
            )
        })
        .init();

    let config = args.into_config();
    log::debug!("{:?}", config);

    let outcome = cryo::run(&config).with_context(|| format!("{:?} failed", config.mode))?;

    match outcome {
        Outcome::Saved(stats) => log::info!(
            "Saved {} segments to {}",
            stats.captured,
            config.dump_path.display()
        ),
        Outcome::Loaded(LoadOutcome::Restored { stats, exit }) => {
            log::info!("Loaded {} segments, child ended with {:?}", stats.segments, exit)
        }
        Outcome::Loaded(LoadOutcome::NothingToRestore { exit }) => {
            log::info!("Nothing loaded, child ended with {:?}", exit)
        }
        Outcome::Inspected(summary) => log::info!(
            "{} records, {} bytes",
            summary.records.len(),
            summary.total_bytes
        ),
    }

    Ok(())
}
