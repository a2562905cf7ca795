//! Output path templates
//!
//! **Why**: The host's output path (`//renders/shot_####.png`) has to be turned
//! into one concrete file name per frame, including sub-frames (`shot_000125.png`
//! for frame 1.25) and hash-padding rules.
//!
//! **Used by**: [`RenderScheduler`](crate::core::scheduler::RenderScheduler), frame guessing, CLI

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::frame_spec::FrameValue;

/// Image extensions the host writes (lowercase, no dot)
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "bmp", "iris", "png", "jpg", "jpeg", "jp2", "tga", "cin", "dpx", "exr", "hdr", "tif", "tiff", "webp",
];

/// Extensions recognized when inserting a version string
const VERSION_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".exr", ".dpx", ".tga", ".tif", ".tiff", ".cin"];

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"v(\d+)").expect("version regex"));
static TRAILING_HASHES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#+$").expect("hash regex"));

/// Folder + base name + padding + extension for one render target
///
/// Padding and sub-frame width stay fixed for a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTemplate {
    /// May contain `$` placeholders
    pub folder: String,
    /// May contain `$` placeholders
    pub base_name: String,
    pub digits: usize,
    /// Without dot, e.g. `png`
    pub extension: String,
    pub subframe_digits: Option<usize>,
}

impl OutputTemplate {
    /// Build from a host output path such as `/renders/shot_####.png`
    ///
    /// Hashes set the padding (else `default_digits`). An empty file name
    /// falls back to `fallback_name`.
    pub fn from_output_path(path: &str, extension: &str, default_digits: usize, fallback_name: &str) -> Self {
        let (folder, file_name) = split_output_path(path);
        let (base_name, digits) = safe_filename(&file_name, default_digits, fallback_name);
        Self {
            folder,
            base_name,
            digits,
            extension: extension.trim_start_matches('.').to_string(),
            subframe_digits: None,
        }
    }

    pub fn with_subframe_digits(mut self, digits: Option<usize>) -> Self {
        self.subframe_digits = digits;
        self
    }

    /// File name for `frame` with an already resolved base name
    pub fn file_name(&self, base_name: &str, frame: FrameValue) -> String {
        format_frame(base_name, frame, self.digits, self.subframe_digits, Some(&self.extension))
    }

    /// Full path for `frame` with already resolved folder and base name
    pub fn path(&self, folder: &str, base_name: &str, frame: FrameValue) -> PathBuf {
        Path::new(folder).join(self.file_name(base_name, frame))
    }

    /// Padding as stored in render logs (digits + sub-frame digits)
    pub fn total_padding(&self) -> usize {
        self.digits + self.subframe_digits.unwrap_or(0)
    }
}

/// Split `folder/name`; trailing separator means empty name
pub fn split_output_path(path: &str) -> (String, String) {
    match path.rfind(['/', '\\']) {
        Some(i) => (path[..i].to_string(), path[i + 1..].to_string()),
        None => (String::new(), path.to_string()),
    }
}

/// Normalize a host file name into a frame-number prefix
///
/// - strips a known image extension
/// - removes `#` (a trailing run sets the padding, else `default_digits`)
/// - appends `_` when the name ends in a digit
/// - empty name -> `fallback_`
///
/// Returns `(base_name, digits)`.
pub fn safe_filename(file_name: &str, default_digits: usize, fallback: &str) -> (String, usize) {
    if file_name.is_empty() {
        return (format!("{}_", fallback), default_digits);
    }

    let path = Path::new(file_name);
    let known_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()));
    let mut name = if known_ext {
        path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name).to_string()
    } else {
        file_name.to_string()
    };

    let mut digits = default_digits;
    if name.contains('#') {
        digits = TRAILING_HASHES_RE
            .find(&name)
            .map(|m| m.as_str().len())
            .unwrap_or(default_digits);
        name = name.replace('#', "");
    }

    if name.ends_with(|c: char| c.is_ascii_digit()) {
        name.push('_');
    }
    (name, digits)
}

/// `base` + zero padded frame (+ sub-frame digits) + `.ext` or trailing `_`
///
/// Sub-frame digits are right-padded with zeros to `subframe_digits` so every
/// name in a batch has the same width.
pub fn format_frame(
    base: &str,
    frame: FrameValue,
    digits: usize,
    subframe_digits: Option<usize>,
    extension: Option<&str>,
) -> String {
    let number = match frame {
        FrameValue::Whole(f) => format!("{:0width$}", f, width = digits),
        FrameValue::Sub(_) => {
            let (main, mut frac) = frame.split();
            if let Some(width) = subframe_digits {
                while frac.len() < width {
                    frac.push('0');
                }
            }
            format!("{:0width$}{}", main, frac, width = digits)
        }
    };
    match extension {
        Some(ext) => format!("{}{}.{}", base, number, ext),
        None => format!("{}{}_", base, number),
    }
}

/// Widest fractional part in a batch (`[1.0, 1.25, 2.5]` -> 2)
pub fn subframe_width(frames: &[FrameValue]) -> Option<usize> {
    frames
        .iter()
        .filter(|f| matches!(f, FrameValue::Sub(_)))
        .map(|f| f.split().1.len())
        .max()
}

/// Replace or insert a `v<NN>` version in an output path
///
/// - existing `v<digits>`: number replaced, width kept
/// - `#` run: `_vNN_` inserted before it
/// - known image extension: `_vNN` inserted before it
/// - otherwise `_vNN_` appended
pub fn version_path(path: &str, number: u32) -> String {
    const DELIMITER: char = '_';
    const MIN_LEAD: usize = 2;

    if let Some(caps) = VERSION_RE.captures(path) {
        let width = caps[1].len();
        let replacement = format!("v{:0width$}", number, width = width);
        return path.replace(&caps[0], &replacement);
    }

    let version = format!("v{:0width$}", number, width = MIN_LEAD);
    if let Some(hash) = path.find('#') {
        let (head, tail) = path.split_at(hash);
        return format!("{}{}{}{}{}", head.trim_end_matches(DELIMITER), DELIMITER, version, DELIMITER, tail);
    }

    let lower = path.to_lowercase();
    if let Some(ext) = VERSION_EXTENSIONS.iter().find(|e| lower.ends_with(*e)) {
        let (head, extension) = path.split_at(path.len() - ext.len());
        return format!("{}{}{}{}", head.trim_end_matches(DELIMITER), DELIMITER, version, extension);
    }

    format!("{}{}{}{}", path.trim_end_matches(DELIMITER), DELIMITER, version, DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("shot_####.png", 4, "untitled"), ("shot_".to_string(), 4));
        assert_eq!(safe_filename("shot_###", 4, "untitled"), ("shot_".to_string(), 3));
        assert_eq!(safe_filename("shot#", 4, "untitled"), ("shot".to_string(), 1));
        assert_eq!(safe_filename("take2", 4, "untitled"), ("take2_".to_string(), 4));
        assert_eq!(safe_filename("", 5, "scene"), ("scene_".to_string(), 5));
        assert_eq!(safe_filename("beauty.v01", 4, "x"), ("beauty.v01_".to_string(), 4));
    }

    #[test]
    fn test_from_output_path() {
        let t = OutputTemplate::from_output_path("/renders/$shot/shot_##.exr", "exr", 4, "untitled");
        assert_eq!(t.folder, "/renders/$shot");
        assert_eq!(t.base_name, "shot_");
        assert_eq!(t.digits, 2);
        assert_eq!(t.file_name("shot_", FrameValue::Whole(7)), "shot_07.exr");

        let t = OutputTemplate::from_output_path("/renders/", ".png", 4, "scene");
        assert_eq!(t.base_name, "scene_");
        assert_eq!(t.path("/renders", "scene_", FrameValue::Whole(12)), PathBuf::from("/renders/scene_0012.png"));
    }

    #[test]
    fn test_format_frame() {
        assert_eq!(format_frame("a_", FrameValue::Whole(3), 4, None, Some("png")), "a_0003.png");
        assert_eq!(format_frame("a_", FrameValue::Whole(-1), 4, None, Some("png")), "a_-001.png");
        assert_eq!(format_frame("slot_", FrameValue::Whole(3), 4, None, None), "slot_0003_");
        assert_eq!(format_frame("a_", FrameValue::Sub(1.25), 4, Some(2), Some("png")), "a_000125.png");
        assert_eq!(format_frame("a_", FrameValue::Sub(2.5), 4, Some(2), Some("png")), "a_000250.png");
    }

    #[test]
    fn test_subframe_width_uniform() {
        let batch = [FrameValue::Sub(1.0), FrameValue::Sub(1.25), FrameValue::Sub(2.5)];
        let width = subframe_width(&batch);
        assert_eq!(width, Some(2));
        let names: Vec<String> = batch
            .iter()
            .map(|f| format_frame("s_", *f, 4, width, Some("exr")))
            .collect();
        assert_eq!(names, vec!["s_000100.exr", "s_000125.exr", "s_000250.exr"]);
        assert_eq!(subframe_width(&[FrameValue::Whole(1)]), None);
    }

    #[test]
    fn test_version_path() {
        assert_eq!(version_path("/r/shot_v003/shot_v003_####", 12), "/r/shot_v012/shot_v012_####");
        assert_eq!(version_path("/r/shot_####", 2), "/r/shot_v02_####");
        assert_eq!(version_path("/r/shot_.png", 3), "/r/shot_v03.png");
        assert_eq!(version_path("/r/shot_", 1), "/r/shot_v01_");
    }

    #[test]
    fn test_split_output_path() {
        assert_eq!(split_output_path("/a/b/c_"), ("/a/b".to_string(), "c_".to_string()));
        assert_eq!(split_output_path("c_"), (String::new(), "c_".to_string()));
        assert_eq!(split_output_path("/a/"), ("/a".to_string(), String::new()));
    }
}
