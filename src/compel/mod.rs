//! Process control primitives
//!
//! Thin wrappers over ptrace, signals and waitpid, shared by the capture
//! and restore paths.

pub mod ptrace;
pub mod task;

pub use ptrace::{ptrace_cont, ptrace_detach, ptrace_getsiginfo, ptrace_poke_word, ptrace_traceme, Word, WORD_SIZE};
pub use task::{continue_task, send_signal, stop_task, task_is_trapped, wait_status, WaitStatus};
