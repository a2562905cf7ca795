//! Host output-path record
//!
//! **Why**: The host has one "current output path" plus a path per auxiliary file
//! output. A render run rewrites them every frame and must put them back. Owning
//! them in one record makes the save/restore contract explicit.
//!
//! **Used by**: [`RenderScheduler`](crate::core::scheduler::RenderScheduler)

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::frame_spec::FrameValue;
use super::globals::GlobalsResolver;
use super::template::{format_frame, split_output_path};

/// Auxiliary file output (compositor "file output" node)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutput {
    pub name: String,
    /// `folder/filename` for layered outputs, folder for slotted ones
    pub base_path: String,
    /// Per-slot file names; `None` for a single multi-layer file
    #[serde(default)]
    pub slots: Option<Vec<String>>,
}

impl FileOutput {
    /// Single multi-layer output written to `base_path`
    pub fn layered(name: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
            slots: None,
        }
    }

    /// Output with one file per slot under `base_path`
    pub fn slotted(name: impl Into<String>, base_path: impl Into<String>, slots: Vec<String>) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
            slots: Some(slots),
        }
    }

    /// Rewrite `self` for `frame`, starting from `original`
    ///
    /// Whole frames only get placeholders resolved; the host appends its own
    /// frame number. Sub-frames are baked into the name (`name_000125_`).
    pub(crate) fn repath_from<G: GlobalsResolver + ?Sized>(
        &mut self,
        original: &FileOutput,
        frame: FrameValue,
        digits: usize,
        subframe_digits: Option<usize>,
        globals: &G,
    ) {
        let bake = |name: &str| match subframe_digits {
            Some(_) => format_frame(&globals.resolve(name), frame, digits, subframe_digits, None),
            None => globals.resolve(name),
        };

        match &original.slots {
            Some(slots) => {
                self.base_path = globals.resolve(&original.base_path);
                self.slots = Some(slots.iter().map(|s| bake(s)).collect());
            }
            None => {
                let (folder, file_name) = split_output_path(&original.base_path);
                let folder = globals.resolve(&folder);
                self.base_path = Path::new(&folder).join(bake(&file_name)).to_string_lossy().to_string();
            }
        }
    }
}

/// Every output path a render run touches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTargets {
    /// Main output, e.g. `/renders/$shot/shot_####`
    pub main_path: String,
    /// Main image extension without dot
    pub extension: String,
    #[serde(default)]
    pub file_outputs: Vec<FileOutput>,
}

impl OutputTargets {
    pub fn new(main_path: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            main_path: main_path.into(),
            extension: extension.into(),
            file_outputs: Vec::new(),
        }
    }

    pub fn with_file_output(mut self, output: FileOutput) -> Self {
        self.file_outputs.push(output);
        self
    }

    /// Put every path back to `saved`
    pub fn restore(&mut self, saved: &OutputTargets) {
        self.main_path = saved.main_path.clone();
        self.extension = saved.extension.clone();
        self.file_outputs = saved.file_outputs.clone();
    }
}
