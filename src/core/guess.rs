//! Frame input suggestions
//!
//! Produces the text for the frame input field: either the scene's timeline
//! range or, when the output path already holds part of the sequence, the
//! frames still missing from it.

use log::{debug, info};
use std::path::Path;

use super::compact::{compact, plural};
use super::globals::GlobalsResolver;
use super::sequence::{SequenceError, SequenceMap, SequencePattern};
use super::template::split_output_path;

/// Padding assumed when the output name has no `#`
const GUESS_DIGITS: usize = 4;

/// Scene timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneRange {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl SceneRange {
    pub fn new(start: i64, end: i64, step: i64) -> Self {
        Self { start, end, step }
    }

    /// `1-250`, or `1-250x2` for a non-unit step
    pub fn expression(&self) -> String {
        if self.step != 1 {
            format!("{}-{}x{}", self.start, self.end, self.step)
        } else {
            format!("{}-{}", self.start, self.end)
        }
    }
}

/// Suggested frame input plus a message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameGuess {
    pub frames: String,
    /// Missing frames when detection found a usable sequence
    pub missing: Vec<i64>,
    pub message: Option<String>,
}

impl FrameGuess {
    fn timeline(scene: SceneRange, message: Option<String>) -> Self {
        Self {
            frames: scene.expression(),
            missing: Vec::new(),
            message,
        }
    }
}

/// Guess the frames to render for `output_path`
///
/// Without `detect_missing` this is the timeline range. With it, the output
/// folder is scanned and frames of the scene range not on disk are returned in
/// range notation. Any scan problem falls back to the timeline range.
pub fn guess_frames<G: GlobalsResolver + ?Sized>(
    output_path: &str,
    extension: &str,
    scene: SceneRange,
    detect_missing: bool,
    fallback_name: &str,
    globals: &G,
) -> FrameGuess {
    if !detect_missing {
        return FrameGuess::timeline(scene, None);
    }

    let (folder, file_name) = split_output_path(output_path);
    let folder = globals.resolve(&folder);
    let mut file_name = globals.resolve(&file_name);

    let given_filename = !file_name.is_empty();
    if !given_filename {
        file_name = format!("{}_", fallback_name);
    }
    if !file_name.contains('#') {
        file_name.push_str(&"#".repeat(GUESS_DIGITS));
    }

    let pattern = SequencePattern::from_template(&file_name, GUESS_DIGITS, extension);
    let dir = if folder.is_empty() { Path::new(".") } else { Path::new(&folder) };
    debug!("Guessing frames from {} in {}", pattern, dir.display());

    let map = match SequenceMap::scan(dir, &pattern) {
        Ok(map) => map,
        Err(SequenceError::DirectoryMissing(dir)) => {
            let msg = format!("Set to default range, \"{}\" does not exist on disk", dir.display());
            return FrameGuess::timeline(scene, Some(msg));
        }
        Err(e @ SequenceError::NotFound { .. }) => {
            let msg = given_filename.then(|| format!("{}, set to default timeline range", e));
            return FrameGuess::timeline(scene, msg);
        }
        Err(e) => return FrameGuess::timeline(scene, Some(e.to_string())),
    };

    let missing = map.missing_in_range(scene.start, scene.end);
    if missing.is_empty() {
        let msg = format!("All given Frames are rendered, see \"{}\" folder", map.dir().display());
        return FrameGuess::timeline(scene, Some(msg));
    }

    let frames = compact(&missing);
    let msg = format!(
        "{} missing {} to render based on the output path: {} [{}]",
        missing.len(),
        plural(missing.len(), "Frame"),
        pattern,
        frames
    );
    info!("{}", msg);
    FrameGuess {
        frames,
        missing,
        message: Some(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::globals::{GlobalVars, NoGlobals};
    use std::fs;
    use std::path::PathBuf;

    fn temp_dir(files: &[&str]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seqrender_guess_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        for f in files {
            fs::write(dir.join(f), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_timeline_expression() {
        assert_eq!(SceneRange::new(1, 250, 1).expression(), "1-250");
        assert_eq!(SceneRange::new(1, 250, 2).expression(), "1-250x2");
        let g = guess_frames("/nowhere/x_####", "png", SceneRange::new(1, 10, 1), false, "untitled", &NoGlobals);
        assert_eq!(g.frames, "1-10");
        assert!(g.message.is_none());
    }

    #[test]
    fn test_missing_frames_in_scene_range() {
        let dir = temp_dir(&["shot_0002.png", "shot_0003.png", "shot_0006.png"]);
        let path = format!("{}/shot_####", dir.display());
        let g = guess_frames(&path, "png", SceneRange::new(1, 8, 1), true, "untitled", &NoGlobals);
        assert_eq!(g.missing, vec![1, 4, 5, 7, 8]);
        assert_eq!(g.frames, "1,4-5,7-8");
        assert!(g.message.unwrap().starts_with("5 missing Frames to render"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_complete_sequence_keeps_timeline() {
        let dir = temp_dir(&["a_01.exr", "a_02.exr", "a_03.exr"]);
        let mut globals = GlobalVars::new();
        globals.insert("name", "a");
        let path = format!("{}/$name_##", dir.display());
        let g = guess_frames(&path, "exr", SceneRange::new(1, 3, 1), true, "untitled", &globals);
        assert_eq!(g.frames, "1-3");
        assert!(g.missing.is_empty());
        assert!(g.message.unwrap().starts_with("All given Frames are rendered"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_fallbacks() {
        let scene = SceneRange::new(1, 5, 1);
        let g = guess_frames("/definitely/not/here/x_", "png", scene, true, "untitled", &NoGlobals);
        assert_eq!(g.frames, "1-5");
        assert!(g.message.unwrap().contains("does not exist"));

        let dir = temp_dir(&["other_0001.png"]);
        let empty_name = format!("{}/", dir.display());
        let g = guess_frames(&empty_name, "png", scene, true, "untitled", &NoGlobals);
        assert_eq!(g.frames, "1-5");
        assert!(g.message.is_none());
        let _ = fs::remove_dir_all(&dir);
    }
}
