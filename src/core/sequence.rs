//! Image sequence indexing and gap detection
//!
//! **Why**: Before (re)rendering, artists need to know which frames already exist
//! on disk (render_0001.png, render_0002.png...) and which are missing.
//!
//! **Used by**: CLI `scan`/`fill`/`rename` commands, frame guessing, encode preparation
//!
//! # Detection Algorithm
//!
//! 1. Glob the directory (non-recursive) for `<base>*<ext>`, case-insensitive
//! 2. Keep files whose name is exactly `<base><N digits><ext>`
//! 3. Map frame number -> path (first match wins)
//! 4. Fewer than two matches: no usable sequence
//!
//! # Missing Frames
//!
//! Gaps are computed inside the observed span only. Callers that care about
//! a scene range use [`SequenceMap::missing_extended`] or
//! [`SequenceMap::missing_in_range`].

use glob::{MatchOptions, Pattern};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Last digit group in a file stem
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digits regex"));

/// Sequence scanning errors
#[derive(Debug)]
pub enum SequenceError {
    DirectoryMissing(PathBuf),
    /// Fewer than two files matched the pattern
    NotFound { name: String, dir: PathBuf, found: usize },
    InvalidPattern(String),
    /// Rename target is a file outside the sequence
    TargetExists(PathBuf),
    Io(String),
}

impl fmt::Display for SequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceError::DirectoryMissing(dir) => {
                write!(f, "Directory \"{}\" does not exist", dir.display())
            }
            SequenceError::NotFound { name, dir, found } => write!(
                f,
                "No matching sequence with the name \"{}\" found in directory \"{}\" ({} file(s) matched)",
                name,
                dir.display(),
                found
            ),
            SequenceError::InvalidPattern(e) => write!(f, "Invalid sequence pattern: {}", e),
            SequenceError::TargetExists(path) => {
                write!(f, "Rename would overwrite \"{}\"", path.display())
            }
            SequenceError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for SequenceError {}

/// Numbered file name pattern: `<base><digits><extension>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePattern {
    pub base: String,      // "shot_"
    pub digits: usize,     // 4 for "0001"
    pub extension: String, // ".png" (always with leading dot, may be empty)
}

impl SequencePattern {
    pub fn new(base: impl Into<String>, digits: usize, extension: &str) -> Self {
        Self {
            base: base.into(),
            digits,
            extension: normalize_extension(extension),
        }
    }

    /// Pattern from a hash template like `shot_####.png`
    ///
    /// Hash count sets the padding; without hashes `default_digits` is used.
    /// Without extension in `name`, `default_ext` is used.
    pub fn from_template(name: &str, default_digits: usize, default_ext: &str) -> Self {
        let (stem, ext) = split_known_extension(name, default_ext);
        let hashes = stem.matches('#').count();
        let base = stem.replace('#', "");
        let digits = if hashes > 0 { hashes } else { default_digits };
        Self::new(base, digits, &ext)
    }

    /// Pattern from one frame of a sequence, e.g. `/renders/shot_0042.exr`
    ///
    /// Returns the directory, the pattern and the sample's frame number.
    /// `None` if the stem does not end in digits.
    pub fn from_sample(path: &Path) -> Option<(PathBuf, Self, i64)> {
        let stem = path.file_stem()?.to_str()?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let last = DIGITS_RE.find_iter(stem).last()?;
        if last.end() != stem.len() {
            return None;
        }
        let number = last.as_str().parse::<i64>().ok()?;
        let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let pattern = Self::new(&stem[..last.start()], last.as_str().len(), &ext);
        Some((dir, pattern, number))
    }

    /// File name for a frame: `shot_0042.png`
    pub fn file_name(&self, frame: i64) -> String {
        format!("{}{:0width$}{}", self.base, frame, self.extension, width = self.digits)
    }

    /// Human-readable name: `shot_####.png`
    pub fn display_name(&self) -> String {
        format!("{}{}{}", self.base, "#".repeat(self.digits), self.extension)
    }

    fn regex(&self) -> Result<Regex, SequenceError> {
        let expr = format!(
            r"(?i)^{}(\d{{{}}}){}$",
            regex::escape(&self.base),
            self.digits,
            regex::escape(&self.extension)
        );
        Regex::new(&expr).map_err(|e| SequenceError::InvalidPattern(e.to_string()))
    }

    fn glob(&self, dir: &Path) -> String {
        let dir = Pattern::escape(&dir.to_string_lossy());
        let name = format!("{}*{}", Pattern::escape(&self.base), Pattern::escape(&self.extension));
        Path::new(&dir).join(name).to_string_lossy().to_string()
    }
}

impl fmt::Display for SequencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.is_empty() || ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Split `name.ext` when `ext` looks like a file extension, else use `default_ext`
fn split_known_extension(name: &str, default_ext: &str) -> (String, String) {
    let path = Path::new(name);
    match (path.file_stem().and_then(|s| s.to_str()), path.extension().and_then(|s| s.to_str())) {
        (Some(stem), Some(ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            (stem.to_string(), format!(".{}", ext))
        }
        _ => (name.to_string(), normalize_extension(default_ext)),
    }
}

/// Frames between first and last that are not in `frames` (sorted input)
pub fn missing_frames(frames: &[i64]) -> Vec<i64> {
    let (Some(&first), Some(&last)) = (frames.first(), frames.last()) else {
        return Vec::new();
    };
    let mut present = frames.iter().peekable();
    let mut missing = Vec::new();
    for f in first..=last {
        while present.next_if(|&&p| p < f).is_some() {}
        if present.peek().is_some_and(|&&p| p == f) {
            continue;
        }
        missing.push(f);
    }
    missing
}

/// One planned copy when filling gaps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapFill {
    pub frame: i64,
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Frame numbers of a renamed sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renumber {
    /// Consecutive numbers from this start, in frame order
    From(i64),
    /// Keep each file's frame number
    Keep,
}

impl Default for Renumber {
    fn default() -> Self {
        Renumber::From(1)
    }
}

/// One planned rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRename {
    pub frame: i64,
    pub new_frame: i64,
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Renames for a whole sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub pattern: SequencePattern,
    /// Files whose name changes, ascending by old frame
    pub renames: Vec<SequenceRename>,
    /// Some targets are current names of the sequence: go through temporary names
    pub needs_staging: bool,
}

/// Frame number -> file path for one sequence in one directory
#[derive(Debug, Clone)]
pub struct SequenceMap {
    dir: PathBuf,
    pattern: SequencePattern,
    frames: BTreeMap<i64, PathBuf>,
}

impl SequenceMap {
    /// Scan `dir` for files matching `pattern`
    ///
    /// # Errors
    ///
    /// - `DirectoryMissing`: `dir` does not exist
    /// - `NotFound`: fewer than two files matched (no usable sequence)
    pub fn scan(dir: &Path, pattern: &SequencePattern) -> Result<Self, SequenceError> {
        if !dir.is_dir() {
            return Err(SequenceError::DirectoryMissing(dir.to_path_buf()));
        }
        let dir = dir.canonicalize().map_err(|e| SequenceError::Io(e.to_string()))?;

        let re = pattern.regex()?;
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        let glob_pattern = pattern.glob(&dir);
        let entries = glob::glob_with(&glob_pattern, options)
            .map_err(|e| SequenceError::InvalidPattern(format!("{}: {}", glob_pattern, e)))?;

        let mut files: Vec<PathBuf> = entries.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        files.sort();

        let mut frames: BTreeMap<i64, PathBuf> = BTreeMap::new();
        for path in files {
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(caps) = re.captures(name) else {
                continue;
            };
            if let Ok(num) = caps[1].parse::<i64>() {
                frames.entry(num).or_insert(path);
            }
        }

        debug!("Scanned {} for {}: {} frame(s)", dir.display(), pattern, frames.len());

        if frames.len() < 2 {
            return Err(SequenceError::NotFound {
                name: pattern.display_name(),
                dir,
                found: frames.len(),
            });
        }

        let map = Self {
            dir,
            pattern: pattern.clone(),
            frames,
        };
        if let Some((start, end)) = map.range() {
            info!("Sequence: {} ({} frames, {}-{})", map.pattern, map.len(), start, end);
        }
        Ok(map)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pattern(&self) -> &SequencePattern {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame: i64) -> Option<&Path> {
        self.frames.get(&frame).map(PathBuf::as_path)
    }

    pub fn contains(&self, frame: i64) -> bool {
        self.frames.contains_key(&frame)
    }

    /// Frame numbers on disk, ascending
    pub fn frames(&self) -> Vec<i64> {
        self.frames.keys().copied().collect()
    }

    /// First and last frame on disk
    pub fn range(&self) -> Option<(i64, i64)> {
        let first = *self.frames.keys().next()?;
        let last = *self.frames.keys().next_back()?;
        Some((first, last))
    }

    /// Gaps inside the observed span
    pub fn missing(&self) -> Vec<i64> {
        missing_frames(&self.frames())
    }

    /// Gaps inside the span plus frames of `start..=end` outside of it
    pub fn missing_extended(&self, start: i64, end: i64) -> Vec<i64> {
        let mut missing = self.missing();
        if let Some((first, last)) = self.range() {
            missing.extend(start..first.min(end + 1));
            missing.extend((last + 1).max(start)..=end);
        }
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Frames of `start..=end` that are not on disk
    pub fn missing_in_range(&self, start: i64, end: i64) -> Vec<i64> {
        (start..=end).filter(|f| !self.frames.contains_key(f)).collect()
    }

    /// Path a frame would have in this sequence
    pub fn frame_path(&self, frame: i64) -> PathBuf {
        self.dir.join(self.pattern.file_name(frame))
    }

    /// Plan copies that fill every gap with the previous existing frame
    ///
    /// With `scene_range`, frames before the first/after the last file are
    /// filled with copies of the first/last file.
    pub fn plan_gap_fill(&self, scene_range: Option<(i64, i64)>) -> Vec<GapFill> {
        let Some((first, last)) = self.range() else {
            return Vec::new();
        };
        let mut plan = Vec::new();

        let mut previous = &self.frames[&first];
        for frame in first..=last {
            match self.frames.get(&frame) {
                Some(path) => previous = path,
                None => plan.push(GapFill {
                    frame,
                    source: previous.clone(),
                    target: self.frame_path(frame),
                }),
            }
        }

        if let Some((start, end)) = scene_range {
            for frame in start..first {
                plan.push(GapFill {
                    frame,
                    source: self.frames[&first].clone(),
                    target: self.frame_path(frame),
                });
            }
            for frame in (last + 1)..=end {
                plan.push(GapFill {
                    frame,
                    source: self.frames[&last].clone(),
                    target: self.frame_path(frame),
                });
            }
        }

        plan.sort_by_key(|g| g.frame);
        plan
    }

    /// Execute [`plan_gap_fill`](Self::plan_gap_fill), returns number of copied frames
    pub fn fill_gaps(&mut self, scene_range: Option<(i64, i64)>) -> Result<usize, SequenceError> {
        let plan = self.plan_gap_fill(scene_range);
        for fill in &plan {
            std::fs::copy(&fill.source, &fill.target).map_err(|e| {
                SequenceError::Io(format!(
                    "copy {} -> {}: {}",
                    fill.source.display(),
                    fill.target.display(),
                    e
                ))
            })?;
            debug!("Filled frame {} from {}", fill.frame, fill.source.display());
            self.frames.insert(fill.frame, fill.target.clone());
        }
        info!("Filled {} frame(s) in {}", plan.len(), self.pattern);
        Ok(plan.len())
    }

    /// Target pattern for `new_name` (`shot_####`, `shot_`, `shot_##.png`)
    ///
    /// Padding defaults to the current one. The sequence keeps its extension.
    pub fn rename_pattern(&self, new_name: &str) -> SequencePattern {
        let mut pattern = SequencePattern::from_template(new_name, self.pattern.digits, "");
        pattern.extension = self.pattern.extension.clone();
        pattern
    }

    /// Plan renaming every file of the sequence to `pattern`
    ///
    /// # Errors
    ///
    /// `TargetExists` when a target is an existing file outside the sequence.
    pub fn plan_rename(&self, pattern: &SequencePattern, renumber: Renumber) -> Result<RenamePlan, SequenceError> {
        // Scan matches case-insensitively, so compare names the same way
        let current: Vec<String> = self.frames.values().map(|p| lowercase_path(p)).collect();
        let mut renames = Vec::new();
        let mut needs_staging = false;

        for (index, (&frame, source)) in self.frames.iter().enumerate() {
            let new_frame = match renumber {
                Renumber::From(start) => start + index as i64,
                Renumber::Keep => frame,
            };
            let target = self.dir.join(pattern.file_name(new_frame));
            if &target == source {
                continue;
            }
            if current.contains(&lowercase_path(&target)) {
                needs_staging = true;
            } else if target.exists() {
                return Err(SequenceError::TargetExists(target));
            }
            renames.push(SequenceRename {
                frame,
                new_frame,
                source: source.clone(),
                target,
            });
        }

        Ok(RenamePlan {
            pattern: pattern.clone(),
            renames,
            needs_staging,
        })
    }

    /// Execute [`plan_rename`](Self::plan_rename), returns number of renamed files
    ///
    /// The map follows the files: afterwards it describes the renamed sequence.
    pub fn rename(&mut self, pattern: &SequencePattern, renumber: Renumber) -> Result<usize, SequenceError> {
        let plan = self.plan_rename(pattern, renumber)?;

        let mut moves: Vec<(PathBuf, &SequenceRename)> =
            plan.renames.iter().map(|r| (r.source.clone(), r)).collect();
        if plan.needs_staging {
            let token = uuid::Uuid::new_v4().simple().to_string();
            for (from, r) in moves.iter_mut() {
                let staged = self.dir.join(format!("seqrender_tmp_{}_{}{}", token, r.frame, pattern.extension));
                rename_file(from.as_path(), &staged)?;
                *from = staged;
            }
            debug!("Staged {} file(s) under temporary names", moves.len());
        }
        for (from, r) in &moves {
            rename_file(from, &r.target)?;
        }

        let mut frames: BTreeMap<i64, PathBuf> = BTreeMap::new();
        for (index, (&frame, path)) in self.frames.iter().enumerate() {
            let new_frame = match renumber {
                Renumber::From(start) => start + index as i64,
                Renumber::Keep => frame,
            };
            let path = match plan.renames.binary_search_by_key(&frame, |r| r.frame) {
                Ok(i) => plan.renames[i].target.clone(),
                Err(_) => path.clone(),
            };
            frames.insert(new_frame, path);
        }
        info!("{} file(s) renamed to {}", plan.renames.len(), pattern);
        self.frames = frames;
        self.pattern = pattern.clone();
        Ok(plan.renames.len())
    }
}

fn lowercase_path(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

fn rename_file(from: &Path, to: &Path) -> Result<(), SequenceError> {
    std::fs::rename(from, to)
        .map_err(|e| SequenceError::Io(format!("rename {} -> {}: {}", from.display(), to.display(), e)))
}

/// Scan `dir` for `<base><digits><extension>` files
pub fn scan(dir: &Path, base: &str, digits: usize, extension: &str) -> Result<SequenceMap, SequenceError> {
    SequenceMap::scan(dir, &SequencePattern::new(base, digits, extension))
}
