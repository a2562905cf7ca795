//! seqrender - frame specification parsing and image sequence rendering
//!
//! Re-exports all modules for use by the binary target.

// Core engine (parsing, sequences, scheduling)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod history;
pub mod progress;
pub mod runner;
pub mod settings;

// Re-export commonly used types from core
pub use core::frame_spec::{parse, FrameSet, FrameValue};
pub use core::scheduler::{RenderScheduler, RunReport, ScheduleError, ScheduleOptions};
pub use core::sequence::{SequenceMap, SequencePattern};
