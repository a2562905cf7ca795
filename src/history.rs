//! Render history (`seqrender_log.json`)
//!
//! One entry per started run, capped at a limit with the oldest dropped first.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::frame_spec::FrameSet;
use crate::core::template::OutputTemplate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderLogEntry {
    pub id: String,
    /// Seconds since the Unix epoch
    pub started: u64,
    pub start_frame: String,
    pub end_frame: String,
    pub name: String,
    pub file_path: String,
    /// Frame digits plus sub-frame digits
    pub padding: usize,
    pub extension: String,
}

impl RenderLogEntry {
    pub fn new(frames: &FrameSet, template: &OutputTemplate, file_path: &str) -> Self {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started,
            start_frame: frames.first().map(|f| f.to_string()).unwrap_or_default(),
            end_frame: frames.last().map(|f| f.to_string()).unwrap_or_default(),
            name: template.base_name.clone(),
            file_path: file_path.to_string(),
            padding: template.total_padding(),
            extension: template.extension.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderLog {
    pub entries: Vec<RenderLogEntry>,
}

impl RenderLog {
    /// Load from JSON; a missing file gives an empty log
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read render log: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse render log: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize render log")?;
        fs::write(path, json).with_context(|| format!("Failed to write render log: {}", path.display()))
    }

    /// Append, dropping the oldest entries to stay within `limit` (0 keeps nothing)
    pub fn push(&mut self, entry: RenderLogEntry, limit: usize) {
        if limit == 0 {
            return;
        }
        while self.entries.len() >= limit {
            let dropped = self.entries.remove(0);
            debug!("Render log full, dropping {}", dropped.id);
        }
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
