use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Frame list parsing, sequence checks and frame-by-frame rendering
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable logging to file (default: seqrender.log in the data dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a frame expression and report the frames it selects
    Frames {
        /// Frame expression, e.g. "1-10x2, 15, ^3"
        #[arg(value_name = "EXPR", allow_hyphen_values = true)]
        expr: String,

        /// Step for ranges without an explicit increment (default from settings)
        #[arg(short = 's', long = "step", value_name = "STEP")]
        step: Option<f64>,

        /// Exclusions apply only to the item they mark
        #[arg(short = 'i', long = "isolate")]
        isolate: bool,

        /// List every frame instead of range notation
        #[arg(long = "individual")]
        individual: bool,
    },

    /// Collapse frame numbers into range notation
    Compact {
        #[arg(value_name = "FRAME", allow_negative_numbers = true, required = true)]
        frames: Vec<i64>,
    },

    /// Index an image sequence and report missing frames
    Scan {
        /// Directory, or one file of the sequence
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Name template when PATH is a directory, e.g. "shot_####.png"
        #[arg(short = 'p', long = "pattern", value_name = "TEMPLATE")]
        pattern: Option<String>,

        /// Scene range to check coverage against
        #[arg(long = "range", value_names = ["START", "END"], num_args = 2, allow_negative_numbers = true)]
        range: Option<Vec<i64>>,
    },

    /// Fill gaps in a sequence with copies of the previous frame
    Fill {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        #[arg(short = 'p', long = "pattern", value_name = "TEMPLATE")]
        pattern: Option<String>,

        /// Also fill up to this scene range
        #[arg(long = "range", value_names = ["START", "END"], num_args = 2, allow_negative_numbers = true)]
        range: Option<Vec<i64>>,

        /// Only print the planned copies
        #[arg(short = 'n', long = "dry-run")]
        dry_run: bool,
    },

    /// Rename a sequence, renumbering from a start frame by default
    Rename {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        #[arg(short = 'p', long = "pattern", value_name = "TEMPLATE")]
        pattern: Option<String>,

        /// New name, e.g. "final_" or "final_###" to change the padding
        #[arg(value_name = "NEW_NAME")]
        new_name: String,

        /// First frame of the renamed sequence
        #[arg(long = "start", value_name = "FRAME", default_value_t = 1, allow_negative_numbers = true)]
        start: i64,

        /// Keep the original frame numbers
        #[arg(short = 'k', long = "keep-numbers", conflicts_with = "start")]
        keep_numbers: bool,

        /// Only print the planned renames
        #[arg(short = 'n', long = "dry-run")]
        dry_run: bool,
    },

    /// Suggest frames to render for an output path
    Guess {
        /// Output path, e.g. "/renders/shot_####"
        #[arg(value_name = "OUTPUT")]
        output: String,

        #[arg(short = 'e', long = "ext", value_name = "EXT", default_value = "png")]
        extension: String,

        #[arg(long = "range", value_names = ["START", "END"], num_args = 2, allow_negative_numbers = true, required = true)]
        range: Vec<i64>,

        #[arg(short = 's', long = "step", value_name = "STEP", default_value_t = 1)]
        step: i64,

        /// Timeline range only, skip missing-frame detection
        #[arg(long = "no-detect")]
        no_detect: bool,
    },

    /// Render frames one by one through an external command
    Render {
        #[arg(value_name = "EXPR", allow_hyphen_values = true)]
        expr: String,

        /// Main output path, e.g. "/renders/$shot/shot_####"
        #[arg(short = 'o', long = "output", value_name = "OUTPUT")]
        output: String,

        #[arg(short = 'e', long = "ext", value_name = "EXT", default_value = "png")]
        extension: String,

        /// Shell command per frame; placeholders {path} {folder} {frame}
        #[arg(long = "command", value_name = "CMD")]
        command: Option<String>,

        /// Auxiliary file output, NAME=PATH (repeatable)
        #[arg(long = "aux", value_name = "NAME=PATH")]
        aux: Vec<String>,

        /// Global placeholder, KEY=VALUE (repeatable)
        #[arg(short = 'g', long = "global", value_name = "KEY=VALUE")]
        globals: Vec<String>,

        #[arg(short = 's', long = "step", value_name = "STEP")]
        step: Option<f64>,

        #[arg(short = 'i', long = "isolate")]
        isolate: bool,

        /// Render frames whose file already exists
        #[arg(long = "overwrite")]
        overwrite: bool,

        /// Block on each frame, no progress bar
        #[arg(long = "silent")]
        silent: bool,

        /// Walk the frames without rendering
        #[arg(short = 'n', long = "dry-run")]
        dry_run: bool,
    },

    /// Insert or bump the version number in an output path
    VersionPath {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(value_name = "NUMBER")]
        number: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render_args() {
        let args = Args::try_parse_from([
            "seqrender", "-vv", "render", "1-10,^5", "-o", "/r/shot_####", "--aux", "passes=/c/p_", "--silent",
        ])
        .unwrap();
        assert_eq!(args.verbosity, 2);
        match args.command {
            Command::Render { expr, output, aux, silent, .. } => {
                assert_eq!(expr, "1-10,^5");
                assert_eq!(output, "/r/shot_####");
                assert_eq!(aux, vec!["passes=/c/p_".to_string()]);
                assert!(silent);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_rename_args() {
        let args = Args::try_parse_from(["seqrender", "rename", "/r/shot_0001.png", "final_###", "--start", "101"]).unwrap();
        match args.command {
            Command::Rename { new_name, start, keep_numbers, .. } => {
                assert_eq!(new_name, "final_###");
                assert_eq!(start, 101);
                assert!(!keep_numbers);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Args::try_parse_from(["seqrender", "rename", "/r", "x_", "-k", "--start", "5"]).is_err());
    }

    #[test]
    fn test_negative_frames() {
        let args = Args::try_parse_from(["seqrender", "compact", "-3", "-2", "5"]).unwrap();
        match args.command {
            Command::Compact { frames } => assert_eq!(frames, vec![-3, -2, 5]),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
