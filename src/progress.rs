use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::core::frame_spec::FrameValue;

/// Render progress with a separate status line
#[derive(Debug)]
pub struct RenderProgress {
    log_line: ProgressBar,
    progress_bar: ProgressBar,
}

impl RenderProgress {
    /// Create new progress tracker with separate log and progress lines
    pub fn new(total_frames: usize) -> Self {
        let multi = MultiProgress::new();

        // Top line for status messages (non-scrolling, always visible)
        let log_line = multi.add(ProgressBar::new_spinner());
        log_line.set_style(ProgressStyle::default_spinner().template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
        log_line.set_message("Rendering image sequence...");

        let progress_bar = multi.add(ProgressBar::new(total_frames as u64));
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) | {msg}")
                .map(|s| s.progress_chars("█▓░"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        Self { log_line, progress_bar }
    }

    /// Frame currently rendering
    pub fn frame(&self, frame: Option<FrameValue>) {
        if let Some(frame) = frame {
            self.progress_bar.set_message(format!("frame {}", frame));
        }
    }

    /// Frames processed so far (rendered + skipped)
    pub fn update(&self, processed: usize) {
        self.progress_bar.set_position(processed as u64);
    }

    pub fn finish(&self, message: &str) {
        self.progress_bar.finish_and_clear();
        self.log_line.finish_with_message(message.to_string());
    }
}
