//! Process restoration logic
//!
//! Starts a new instance of the captured binary under trace and writes a
//! dump into it before it runs any of its own code.

pub mod load;
pub mod tracee;
pub mod tty;

pub use load::{load, restore_segments, LoadOutcome, RestoreStats};
pub use tracee::{write_segment, ExitStatus, PokeTarget, Restored, Running, Tracee, Trapped};
