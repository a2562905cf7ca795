//! Core engine modules - frame parsing, sequence indexing, render scheduling
//!
//! These modules are independent of the CLI and of any host application.

pub mod compact;
pub mod frame_spec;
pub mod globals;
pub mod guess;
pub mod outputs;
pub mod renderer;
pub mod scheduler;
pub mod sequence;
pub mod template;

// Re-exports for convenience
pub use compact::{compact, verify_report};
pub use frame_spec::{parse, parse_verbose, ExclusionScope, FrameSet, FrameSpecError, FrameValue, ParseWarning};
pub use globals::{GlobalVars, GlobalsResolver, NoGlobals};
pub use outputs::{FileOutput, OutputTargets};
pub use renderer::{CommandRenderer, DryRunRenderer, RenderJob, RenderMode, RenderOutcome, Renderer};
pub use scheduler::{RenderScheduler, RunReport, ScheduleError, ScheduleOptions, SchedulerState};
pub use sequence::{Renumber, SequenceError, SequenceMap, SequencePattern};
pub use template::OutputTemplate;
