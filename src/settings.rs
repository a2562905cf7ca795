//! Persistent application settings (`seqrender.json`)

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, info};
use std::fs;
use std::path::Path;

use crate::core::frame_spec::ExclusionScope;
use crate::core::globals::GlobalVars;
use crate::core::renderer::RenderMode;
use crate::core::scheduler::ScheduleOptions;

/// Application settings
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct AppSettings {
    // Frame input
    pub default_step: f64,
    pub isolate_numbers: bool,

    // Output naming
    pub default_digits: usize, // Padding when the output name has no '#'
    pub fallback_name: String, // Base name when the output path has no file name

    // Rendering
    pub overwrite: bool,
    pub render_silent: bool,
    pub render_command: Option<String>, // Shell template, {path} {folder} {frame}

    // Global placeholders ($shot -> sh010)
    pub globals: IndexMap<String, String>,

    // Render history
    pub log_render: bool,
    pub log_render_limit: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_step: 1.0,
            isolate_numbers: false,
            default_digits: 4,
            fallback_name: "untitled".to_string(),
            overwrite: false,
            render_silent: false,
            render_command: None,
            globals: IndexMap::new(),
            log_render: true,
            log_render_limit: 3,
        }
    }
}

impl AppSettings {
    /// Load from JSON; a missing file gives defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: AppSettings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    /// Load, or write the defaults on first run so the file can be edited
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let settings = Self::default();
        settings.save(path)?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn exclusion_scope(&self) -> ExclusionScope {
        ExclusionScope::from_isolate(self.isolate_numbers)
    }

    pub fn global_vars(&self) -> GlobalVars {
        GlobalVars::from_map(self.globals.clone())
    }

    pub fn schedule_options(&self) -> ScheduleOptions {
        ScheduleOptions {
            overwrite: self.overwrite,
            mode: if self.render_silent {
                RenderMode::Silent
            } else {
                RenderMode::Interactive
            },
            default_digits: self.default_digits,
            fallback_name: self.fallback_name.clone(),
        }
    }
}
