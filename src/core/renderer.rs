//! Renderer collaborator interface
//!
//! The scheduler never renders pixels itself. It hands one [`RenderJob`] per
//! frame to a [`Renderer`] and waits for the outcome:
//!
//! - synchronous renderers return [`RenderOutcome::Completed`] directly
//! - asynchronous renderers return [`RenderOutcome::Pending`] and report later
//!   through [`Renderer::poll`] or the scheduler's `notify_*` methods

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Child, Command};

use super::frame_spec::FrameValue;
use super::outputs::FileOutput;

/// How the caller wants frames rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderMode {
    /// Blocking batch render, no progress UI
    Silent,
    /// Render with progress, completion arrives asynchronously
    #[default]
    Interactive,
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub frame: FrameValue,
    /// Main output file for this frame
    pub path: PathBuf,
    /// Auxiliary file outputs with their per-frame paths applied
    pub file_outputs: Vec<FileOutput>,
    pub mode: RenderMode,
}

/// Result of starting or polling a render
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Completed,
    /// Still running; the scheduler waits in `AwaitingCompletion`
    Pending,
    Cancelled,
    Failed(String),
}

/// External renderer
pub trait Renderer {
    /// Start rendering one frame
    fn render(&mut self, job: &RenderJob) -> RenderOutcome;

    /// Check on a pending render; `None` means no news
    fn poll(&mut self) -> Option<RenderOutcome> {
        None
    }

    /// Abort a pending render
    fn cancel(&mut self) {}
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&mut self, job: &RenderJob) -> RenderOutcome {
        (**self).render(job)
    }

    fn poll(&mut self) -> Option<RenderOutcome> {
        (**self).poll()
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }
}

/// Completes every frame without writing anything
#[derive(Debug, Default)]
pub struct DryRunRenderer {
    pub jobs: Vec<PathBuf>,
}

impl Renderer for DryRunRenderer {
    fn render(&mut self, job: &RenderJob) -> RenderOutcome {
        info!("[dry-run] frame {} -> {}", job.frame, job.path.display());
        self.jobs.push(job.path.clone());
        RenderOutcome::Completed
    }
}

/// Runs a shell command per frame
///
/// Placeholders in the command: `{path}`, `{folder}`, `{frame}`.
/// Silent jobs block until the command exits; interactive jobs are polled.
#[derive(Debug)]
pub struct CommandRenderer {
    command: String,
    child: Option<Child>,
}

impl CommandRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            child: None,
        }
    }

    fn expand(&self, job: &RenderJob) -> String {
        let folder = job
            .path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        self.command
            .replace("{path}", &job.path.to_string_lossy())
            .replace("{folder}", &folder)
            .replace("{frame}", &job.frame.to_string())
    }

    fn shell(cmdline: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", cmdline]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", cmdline]);
            cmd
        }
    }

    fn exit_outcome(status: std::process::ExitStatus) -> RenderOutcome {
        if status.success() {
            RenderOutcome::Completed
        } else {
            RenderOutcome::Failed(format!("render command exited with {}", status))
        }
    }
}

impl Renderer for CommandRenderer {
    fn render(&mut self, job: &RenderJob) -> RenderOutcome {
        let cmdline = self.expand(job);
        debug!("Render command: {}", cmdline);

        match job.mode {
            RenderMode::Silent => match Self::shell(&cmdline).status() {
                Ok(status) => Self::exit_outcome(status),
                Err(e) => RenderOutcome::Failed(format!("failed to run \"{}\": {}", cmdline, e)),
            },
            RenderMode::Interactive => match Self::shell(&cmdline).spawn() {
                Ok(child) => {
                    self.child = Some(child);
                    RenderOutcome::Pending
                }
                Err(e) => RenderOutcome::Failed(format!("failed to start \"{}\": {}", cmdline, e)),
            },
        }
    }

    fn poll(&mut self) -> Option<RenderOutcome> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                Some(Self::exit_outcome(status))
            }
            Ok(None) => None,
            Err(e) => {
                self.child = None;
                Some(RenderOutcome::Failed(e.to_string()))
            }
        }
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!("Failed to stop render command: {}", e);
            }
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(mode: RenderMode) -> RenderJob {
        RenderJob {
            frame: FrameValue::Whole(7),
            path: PathBuf::from("/out/img_0007.png"),
            file_outputs: Vec::new(),
            mode,
        }
    }

    #[test]
    fn test_command_expansion() {
        let r = CommandRenderer::new("render --frame {frame} -o {path} -d {folder}");
        assert_eq!(
            r.expand(&job(RenderMode::Silent)),
            "render --frame 7 -o /out/img_0007.png -d /out"
        );
    }

    #[test]
    fn test_dry_run_completes() {
        let mut r = DryRunRenderer::default();
        assert_eq!(r.render(&job(RenderMode::Interactive)), RenderOutcome::Completed);
        assert_eq!(r.jobs, vec![PathBuf::from("/out/img_0007.png")]);
        assert_eq!(r.poll(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_renderer_silent_status() {
        let mut ok = CommandRenderer::new("true");
        assert_eq!(ok.render(&job(RenderMode::Silent)), RenderOutcome::Completed);
        let mut fail = CommandRenderer::new("false");
        assert!(matches!(fail.render(&job(RenderMode::Silent)), RenderOutcome::Failed(_)));
    }

    #[cfg(unix)]
    fn poll_until_done(r: &mut CommandRenderer) -> RenderOutcome {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        loop {
            if let Some(outcome) = r.poll() {
                return outcome;
            }
            assert!(std::time::Instant::now() < deadline, "render command never finished");
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_renderer_interactive_poll() {
        let mut r = CommandRenderer::new("sleep 0.05");
        assert_eq!(r.render(&job(RenderMode::Interactive)), RenderOutcome::Pending);
        assert_eq!(poll_until_done(&mut r), RenderOutcome::Completed);
        assert_eq!(r.poll(), None);

        let mut fail = CommandRenderer::new("exit 3");
        assert_eq!(fail.render(&job(RenderMode::Interactive)), RenderOutcome::Pending);
        assert!(matches!(poll_until_done(&mut fail), RenderOutcome::Failed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_renderer_cancel_kills_child() {
        let mut r = CommandRenderer::new("sleep 5");
        let started = std::time::Instant::now();
        assert_eq!(r.render(&job(RenderMode::Interactive)), RenderOutcome::Pending);
        assert_eq!(r.poll(), None);
        r.cancel();
        assert!(started.elapsed() < std::time::Duration::from_secs(4));
        assert_eq!(r.poll(), None);
    }
}
