//! Capturing a live process into a dump

pub mod extract;
pub mod suspend;

pub use extract::MemImage;
pub use suspend::{capture, suspend, CaptureStats};
