//! Cooperative render scheduler
//!
//! **Why**: Rendering a frame list means rewriting the host's output paths once per
//! frame, skipping frames already on disk and putting every path back afterwards,
//! without ever blocking the caller's event loop.
//!
//! **Used by**: CLI `render` command, [`run_blocking`](RenderScheduler::run_blocking) for batch mode
//!
//! # States
//!
//! ```text
//! Idle -> Priming -> RenderingFrame -> AwaitingCompletion -> Advancing
//!                         ^                                      |
//!                         +--------------------------------------+
//!                                                                v
//!                              Cancelled ---> Restoring <--- Draining
//!                                                 |
//!                                                 v
//!                                               Done
//! ```
//!
//! Each [`tick`](RenderScheduler::tick) performs exactly one transition.
//! `Restoring` runs on every exit path: completion, cancel, render failure,
//! unwritable folder and [`abort`](RenderScheduler::abort).
//!
//! # Sub-frames
//!
//! When the frame set is in sub-frame mode the fractional width is computed once in
//! `Priming` and every file name of the run gets the same suffix width.

use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use super::frame_spec::{FrameSet, FrameValue};
use super::globals::GlobalsResolver;
use super::outputs::OutputTargets;
use super::renderer::{RenderJob, RenderMode, RenderOutcome, Renderer};
use super::template::{subframe_width, OutputTemplate};

/// Sleep between polls in [`RenderScheduler::run_blocking`]
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Scheduler errors
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleError {
    AlreadyRunning,
    NothingToRender,
    PathUnwritable { path: PathBuf, reason: String },
    RenderFailure { frame: FrameValue, reason: String },
    Cancelled,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::AlreadyRunning => write!(f, "A render is already running"),
            ScheduleError::NothingToRender => write!(f, "No frames to render"),
            ScheduleError::PathUnwritable { path, reason } => {
                write!(f, "Specified folder can not be created: {} ({})", path.display(), reason)
            }
            ScheduleError::RenderFailure { frame, reason } => {
                write!(f, "Render of frame {} failed: {}", frame, reason)
            }
            ScheduleError::Cancelled => write!(f, "Render cancelled"),
        }
    }
}

impl std::error::Error for ScheduleError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Priming,
    RenderingFrame,
    AwaitingCompletion,
    Advancing,
    Draining,
    Cancelled,
    Restoring,
    Done,
}

/// Caller flags for a run
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Render even when the target file exists
    pub overwrite: bool,
    pub mode: RenderMode,
    /// Padding when the output name has no `#`
    pub default_digits: usize,
    /// Base name when the output path has no file name
    pub fallback_name: String,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            mode: RenderMode::Interactive,
            default_digits: 4,
            fallback_name: "untitled".to_string(),
        }
    }
}

/// Mutable state of one run; dropped after `Restoring`
#[derive(Debug)]
pub struct ScheduleState {
    pending: VecDeque<FrameValue>,
    total: usize,
    current: Option<FrameValue>,
    saved: OutputTargets,
    template: OutputTemplate,
    /// Last resolved main folder
    folder: String,
    rendered: Vec<FrameValue>,
    skipped: Vec<FrameValue>,
    cancel_requested: bool,
    error: Option<ScheduleError>,
}

/// Outcome of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub rendered: Vec<FrameValue>,
    pub skipped: Vec<FrameValue>,
    pub total: usize,
    pub folder: String,
    /// `None` when every frame was processed
    pub error: Option<ScheduleError>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// `"Frames: 1,3 rendered."`
    pub fn rendered_message(&self) -> Option<String> {
        if self.rendered.is_empty() {
            return None;
        }
        let label = if self.rendered.len() > 1 { "Frames:" } else { "Frame:" };
        Some(format!("{} {} rendered.", label, join_frames(&self.rendered)))
    }

    /// `"Images saved to /renders"`
    pub fn saved_message(&self) -> Option<String> {
        if self.rendered.is_empty() {
            return None;
        }
        let label = if self.rendered.len() > 1 { "Images" } else { "Image" };
        Some(format!("{} saved to {}", label, self.folder))
    }

    /// `"2 skipped (would overwrite existing file(s))"`
    pub fn skipped_message(&self) -> Option<String> {
        if self.skipped.is_empty() {
            return None;
        }
        Some(format!(
            "{} skipped (would overwrite existing file(s))",
            join_frames(&self.skipped)
        ))
    }

    pub fn log_summary(&self) {
        if let Some(msg) = self.rendered_message() {
            info!("{}", msg);
        }
        if let Some(msg) = self.saved_message() {
            info!("{}", msg);
        }
        if let Some(msg) = self.skipped_message() {
            warn!("{}", msg);
        }
        if let Some(e) = &self.error {
            warn!("{}", e);
        }
    }
}

/// Sub-frames join with `", "` (`1.25, 2.5`), whole frames with `","`
fn join_frames(frames: &[FrameValue]) -> String {
    let sep = if frames.iter().any(|f| matches!(f, FrameValue::Sub(_))) { ", " } else { "," };
    frames.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(sep)
}

/// Drives one render per frame, one step per [`tick`](Self::tick)
///
/// Owns the [`OutputTargets`] for its whole lifetime; get them back restored with
/// [`into_parts`](Self::into_parts).
pub struct RenderScheduler<R: Renderer, G: GlobalsResolver> {
    renderer: R,
    globals: G,
    targets: OutputTargets,
    options: ScheduleOptions,
    state: SchedulerState,
    run: Option<ScheduleState>,
    report: Option<RunReport>,
}

impl<R: Renderer, G: GlobalsResolver> RenderScheduler<R, G> {
    pub fn new(renderer: R, globals: G, targets: OutputTargets, options: ScheduleOptions) -> Self {
        Self {
            renderer,
            globals,
            targets,
            options,
            state: SchedulerState::Idle,
            run: None,
            report: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == SchedulerState::Done
    }

    /// Current (possibly mid-run) output paths
    pub fn outputs(&self) -> &OutputTargets {
        &self.targets
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Report of the last finished run
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    /// Frame being rendered right now
    pub fn current_frame(&self) -> Option<FrameValue> {
        self.run.as_ref().and_then(|r| r.current)
    }

    /// `(processed, total)` for progress display
    pub fn progress(&self) -> (usize, usize) {
        match (&self.run, &self.report) {
            (Some(run), _) => (run.rendered.len() + run.skipped.len(), run.total),
            (None, Some(report)) => (report.rendered.len() + report.skipped.len(), report.total),
            (None, None) => (0, 0),
        }
    }

    /// Begin a run over `frames`; paths are saved here
    pub fn start(&mut self, frames: &FrameSet) -> Result<(), ScheduleError> {
        if !matches!(self.state, SchedulerState::Idle | SchedulerState::Done) {
            return Err(ScheduleError::AlreadyRunning);
        }
        if frames.is_empty() {
            return Err(ScheduleError::NothingToRender);
        }

        let template = OutputTemplate::from_output_path(
            &self.targets.main_path,
            &self.targets.extension,
            self.options.default_digits,
            &self.options.fallback_name,
        );
        let pending: VecDeque<FrameValue> = frames.values().into();
        info!(
            "Rendering {} frame(s) to {} ({:?})",
            pending.len(),
            self.targets.main_path,
            self.options.mode
        );

        self.run = Some(ScheduleState {
            total: pending.len(),
            pending,
            current: None,
            saved: self.targets.clone(),
            folder: template.folder.clone(),
            template,
            rendered: Vec::new(),
            skipped: Vec::new(),
            cancel_requested: false,
            error: None,
        });
        self.report = None;
        self.state = SchedulerState::Priming;
        Ok(())
    }

    /// Advance one step; returns the new state
    pub fn tick(&mut self) -> SchedulerState {
        let before = self.state;
        match self.state {
            SchedulerState::Idle | SchedulerState::Done => {}
            SchedulerState::Priming => self.prime(),
            SchedulerState::RenderingFrame => self.render_next(),
            SchedulerState::AwaitingCompletion => self.await_completion(),
            SchedulerState::Advancing => self.advance(),
            SchedulerState::Draining => self.drain(),
            SchedulerState::Cancelled => self.state = SchedulerState::Restoring,
            SchedulerState::Restoring => self.restore(),
        }
        if before != self.state {
            debug!("Scheduler: {:?} -> {:?}", before, self.state);
        }
        self.state
    }

    /// Request cancellation; observed on the next tick
    pub fn cancel(&mut self) {
        if let Some(run) = self.run.as_mut() {
            debug!("Cancellation requested");
            run.cancel_requested = true;
        }
    }

    /// Stop immediately and restore paths without further ticks
    pub fn abort(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        warn!("Render aborted");
        if run.current.take().is_some() {
            self.renderer.cancel();
        }
        run.error.get_or_insert(ScheduleError::Cancelled);
        self.restore();
    }

    /// Asynchronous renderer finished the current frame
    pub fn notify_render_complete(&mut self) {
        self.notify(RenderOutcome::Completed);
    }

    /// Asynchronous renderer was cancelled by the user
    pub fn notify_render_cancelled(&mut self) {
        self.notify(RenderOutcome::Cancelled);
    }

    pub fn notify_render_failed(&mut self, reason: impl Into<String>) {
        self.notify(RenderOutcome::Failed(reason.into()));
    }

    fn notify(&mut self, outcome: RenderOutcome) {
        if self.state != SchedulerState::AwaitingCompletion {
            warn!("Ignoring {:?} signal in state {:?}", outcome, self.state);
            return;
        }
        self.settle(outcome);
    }

    /// Run to completion on the calling thread (silent/batch mode)
    pub fn run_blocking(&mut self, frames: &FrameSet) -> Result<RunReport, ScheduleError> {
        self.start(frames)?;
        while !self.is_done() {
            let before = self.state;
            if self.tick() == SchedulerState::AwaitingCompletion && before == SchedulerState::AwaitingCompletion {
                thread::sleep(POLL_INTERVAL);
            }
        }
        Ok(self.report.clone().unwrap_or_default())
    }

    /// Tear down, restoring paths if a run is still active
    pub fn into_parts(mut self) -> (R, G, OutputTargets) {
        self.abort();
        (self.renderer, self.globals, self.targets)
    }

    fn prime(&mut self) {
        let Some(run) = self.run.as_mut() else {
            self.state = SchedulerState::Done;
            return;
        };

        let frames: Vec<FrameValue> = run.pending.iter().copied().collect();
        run.template.subframe_digits = subframe_width(&frames);
        if let Some(digits) = run.template.subframe_digits {
            debug!("Sub-frame mode, {} decimal digit(s)", digits);
        }

        if let Some(first) = run.pending.front().copied() {
            self.globals.frame_changed(first);
        }
        let folder = self.globals.resolve(&run.template.folder);
        match ensure_folder(&folder) {
            Ok(()) => {
                run.folder = folder;
                self.state = SchedulerState::RenderingFrame;
            }
            Err(e) => {
                error!("{}", e);
                run.error = Some(e);
                self.state = SchedulerState::Restoring;
            }
        }
    }

    fn render_next(&mut self) {
        let Some(run) = self.run.as_mut() else {
            self.state = SchedulerState::Done;
            return;
        };
        if run.cancel_requested {
            run.error = Some(ScheduleError::Cancelled);
            self.state = SchedulerState::Cancelled;
            return;
        }
        let Some(frame) = run.pending.pop_front() else {
            self.state = SchedulerState::Draining;
            return;
        };

        self.globals.frame_changed(frame);
        let path = match repath(&mut self.targets, run, frame, &self.globals) {
            Ok(path) => path,
            Err(e) => {
                error!("{}", e);
                run.error = Some(e);
                self.state = SchedulerState::Restoring;
                return;
            }
        };

        if !self.options.overwrite && path.is_file() {
            info!("Frame {} skipped, {} exists", frame, path.display());
            run.skipped.push(frame);
            self.state = SchedulerState::Advancing;
            return;
        }

        info!("Rendering frame {} -> {}", frame, path.display());
        run.current = Some(frame);
        let job = RenderJob {
            frame,
            path,
            file_outputs: self.targets.file_outputs.clone(),
            mode: self.options.mode,
        };
        let outcome = self.renderer.render(&job);
        self.state = SchedulerState::AwaitingCompletion;
        self.settle(outcome);
    }

    fn await_completion(&mut self) {
        let cancel_requested = self.run.as_ref().is_some_and(|r| r.cancel_requested);
        if cancel_requested {
            self.renderer.cancel();
            self.settle(RenderOutcome::Cancelled);
            return;
        }
        if let Some(outcome) = self.renderer.poll() {
            self.settle(outcome);
        }
    }

    /// Apply a renderer outcome to the in-flight frame
    fn settle(&mut self, outcome: RenderOutcome) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        match outcome {
            RenderOutcome::Pending => {}
            RenderOutcome::Completed => {
                if let Some(frame) = run.current.take() {
                    run.rendered.push(frame);
                }
                self.state = SchedulerState::Advancing;
            }
            RenderOutcome::Cancelled => {
                if let Some(frame) = run.current.take() {
                    warn!("Frame {} cancelled", frame);
                }
                run.error = Some(ScheduleError::Cancelled);
                self.state = SchedulerState::Cancelled;
            }
            RenderOutcome::Failed(reason) => {
                let frame = run.current.take().unwrap_or(FrameValue::Whole(0));
                let e = ScheduleError::RenderFailure { frame, reason };
                error!("{}", e);
                run.error = Some(e);
                self.state = SchedulerState::Cancelled;
            }
        }
    }

    fn advance(&mut self) {
        let remaining = self.run.as_ref().map_or(0, |r| r.pending.len());
        self.state = if remaining > 0 {
            SchedulerState::RenderingFrame
        } else {
            SchedulerState::Draining
        };
    }

    fn drain(&mut self) {
        if let Some(run) = &self.run {
            info!(
                "Queue drained: {} rendered, {} skipped",
                run.rendered.len(),
                run.skipped.len()
            );
        }
        self.state = SchedulerState::Restoring;
    }

    fn restore(&mut self) {
        if let Some(run) = self.run.take() {
            self.targets.restore(&run.saved);
            debug!("Output paths restored to {}", self.targets.main_path);
            let report = RunReport {
                rendered: run.rendered,
                skipped: run.skipped,
                total: run.total,
                folder: run.folder,
                error: run.error,
            };
            report.log_summary();
            self.report = Some(report);
        }
        self.state = SchedulerState::Done;
    }
}

/// Point main and auxiliary targets at `frame`; returns the main file path
fn repath<G: GlobalsResolver>(
    targets: &mut OutputTargets,
    run: &mut ScheduleState,
    frame: FrameValue,
    globals: &G,
) -> Result<PathBuf, ScheduleError> {
    let folder = globals.resolve(&run.template.folder);
    ensure_folder(&folder)?;
    let base = globals.resolve(&run.template.base_name);
    let path = run.template.path(&folder, &base, frame);

    targets.main_path = path.to_string_lossy().to_string();
    for (live, original) in targets.file_outputs.iter_mut().zip(&run.saved.file_outputs) {
        live.repath_from(
            original,
            frame,
            run.template.digits,
            run.template.subframe_digits,
            globals,
        );
    }
    run.folder = folder;
    Ok(path)
}

fn ensure_folder(folder: &str) -> Result<(), ScheduleError> {
    if folder.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(folder).map_err(|e| ScheduleError::PathUnwritable {
        path: PathBuf::from(folder),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::globals::{GlobalVars, NoGlobals};
    use crate::core::outputs::FileOutput;
    use std::path::Path;

    struct MockRenderer {
        jobs: Vec<RenderJob>,
        respond: fn(&RenderJob) -> RenderOutcome,
        cancelled: bool,
    }

    impl MockRenderer {
        fn new(respond: fn(&RenderJob) -> RenderOutcome) -> Self {
            Self {
                jobs: Vec::new(),
                respond,
                cancelled: false,
            }
        }

        fn paths(&self) -> Vec<PathBuf> {
            self.jobs.iter().map(|j| j.path.clone()).collect()
        }
    }

    impl Renderer for MockRenderer {
        fn render(&mut self, job: &RenderJob) -> RenderOutcome {
            self.jobs.push(job.clone());
            (self.respond)(job)
        }

        fn cancel(&mut self) {
            self.cancelled = true;
        }
    }

    /// Reports completion on the second poll after each render
    #[derive(Default)]
    struct PollingRenderer {
        polls: usize,
        started: Vec<FrameValue>,
    }

    impl Renderer for PollingRenderer {
        fn render(&mut self, job: &RenderJob) -> RenderOutcome {
            self.started.push(job.frame);
            self.polls = 0;
            RenderOutcome::Pending
        }

        fn poll(&mut self) -> Option<RenderOutcome> {
            self.polls += 1;
            (self.polls >= 2).then_some(RenderOutcome::Completed)
        }
    }

    fn completing() -> MockRenderer {
        MockRenderer::new(|_| RenderOutcome::Completed)
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seqrender_sched_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn main_path(dir: &Path, name: &str) -> String {
        format!("{}/{}", dir.display(), name)
    }

    fn tick_until_done<R: Renderer, G: GlobalsResolver>(s: &mut RenderScheduler<R, G>) {
        for _ in 0..100 {
            if s.tick() == SchedulerState::Done {
                return;
            }
        }
        panic!("scheduler did not finish, stuck in {:?}", s.state());
    }

    #[test]
    fn test_skip_existing_frame() {
        let dir = temp_dir();
        fs::write(dir.join("shot_0002.png"), b"x").unwrap();
        let main = main_path(&dir, "shot_####");

        let mut s = RenderScheduler::new(
            completing(),
            NoGlobals,
            OutputTargets::new(main.clone(), "png"),
            ScheduleOptions::default(),
        );
        let report = s.run_blocking(&FrameSet::Whole(vec![1, 2, 3])).unwrap();

        assert_eq!(report.rendered, vec![FrameValue::Whole(1), FrameValue::Whole(3)]);
        assert_eq!(report.skipped, vec![FrameValue::Whole(2)]);
        assert!(report.is_complete());
        assert_eq!(s.outputs().main_path, main);
        assert_eq!(
            s.renderer().paths(),
            vec![dir.join("shot_0001.png"), dir.join("shot_0003.png")]
        );
        assert_eq!(report.rendered_message().unwrap(), "Frames: 1,3 rendered.");
        assert_eq!(
            report.skipped_message().unwrap(),
            "2 skipped (would overwrite existing file(s))"
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_overwrite_renders_existing() {
        let dir = temp_dir();
        fs::write(dir.join("shot_0002.png"), b"x").unwrap();
        let options = ScheduleOptions {
            overwrite: true,
            ..Default::default()
        };
        let mut s = RenderScheduler::new(
            completing(),
            NoGlobals,
            OutputTargets::new(main_path(&dir, "shot_####"), "png"),
            options,
        );
        let report = s.run_blocking(&FrameSet::Whole(vec![1, 2, 3])).unwrap();
        assert_eq!(report.rendered.len(), 3);
        assert!(report.skipped.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cancel_while_awaiting_completion() {
        let dir = temp_dir();
        let main = main_path(&dir, "shot_####");
        let aux = FileOutput::layered("passes", main_path(&dir, "passes_"));
        let targets = OutputTargets::new(main.clone(), "png").with_file_output(aux.clone());

        let mut s = RenderScheduler::new(
            MockRenderer::new(|_| RenderOutcome::Pending),
            NoGlobals,
            targets.clone(),
            ScheduleOptions::default(),
        );
        s.start(&FrameSet::Whole(vec![1, 2, 3])).unwrap();

        assert_eq!(s.tick(), SchedulerState::RenderingFrame);
        assert_eq!(s.tick(), SchedulerState::AwaitingCompletion);
        assert_eq!(s.current_frame(), Some(FrameValue::Whole(1)));
        s.notify_render_complete();
        assert_eq!(s.state(), SchedulerState::Advancing);
        assert_eq!(s.tick(), SchedulerState::RenderingFrame);
        assert_eq!(s.tick(), SchedulerState::AwaitingCompletion);
        assert_eq!(s.outputs().main_path, dir.join("shot_0002.png").to_string_lossy());

        s.cancel();
        assert_eq!(s.tick(), SchedulerState::Cancelled);
        assert_eq!(s.tick(), SchedulerState::Restoring);
        assert_eq!(s.tick(), SchedulerState::Done);

        let report = s.report().unwrap();
        assert_eq!(report.rendered, vec![FrameValue::Whole(1)]);
        assert!(report.skipped.is_empty());
        assert_eq!(report.error, Some(ScheduleError::Cancelled));
        assert!(s.renderer().cancelled);
        assert_eq!(s.outputs(), &targets);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_host_cancel_signal() {
        let dir = temp_dir();
        let mut s = RenderScheduler::new(
            MockRenderer::new(|_| RenderOutcome::Pending),
            NoGlobals,
            OutputTargets::new(main_path(&dir, "a_"), "png"),
            ScheduleOptions::default(),
        );
        s.start(&FrameSet::Whole(vec![5, 6])).unwrap();
        s.tick();
        s.tick();
        s.notify_render_cancelled();
        assert_eq!(s.state(), SchedulerState::Cancelled);
        tick_until_done(&mut s);
        let report = s.report().unwrap();
        assert!(report.rendered.is_empty());
        assert_eq!(report.error, Some(ScheduleError::Cancelled));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_subframe_batch_names() {
        let dir = temp_dir();
        let aux = FileOutput::slotted("aovs", main_path(&dir, "aov"), vec!["diffuse_".to_string()]);
        let targets = OutputTargets::new(main_path(&dir, "s_####"), "exr").with_file_output(aux);

        let mut s = RenderScheduler::new(completing(), NoGlobals, targets.clone(), ScheduleOptions::default());
        let report = s.run_blocking(&FrameSet::Sub(vec![1.0, 1.25, 2.5])).unwrap();

        assert_eq!(
            s.renderer().paths(),
            vec![
                dir.join("s_000100.exr"),
                dir.join("s_000125.exr"),
                dir.join("s_000250.exr")
            ]
        );
        let slots: Vec<Option<Vec<String>>> = s
            .renderer()
            .jobs
            .iter()
            .map(|j| j.file_outputs[0].slots.clone())
            .collect();
        assert_eq!(slots[1], Some(vec!["diffuse_000125_".to_string()]));
        assert_eq!(report.rendered_message().unwrap(), "Frames: 1.0, 1.25, 2.5 rendered.");
        assert_eq!(s.outputs(), &targets);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unwritable_folder_restores() {
        let dir = temp_dir();
        let blocker = dir.join("blocker");
        fs::write(&blocker, b"file, not a folder").unwrap();
        let main = format!("{}/sub/shot_####", blocker.display());

        let mut s = RenderScheduler::new(
            completing(),
            NoGlobals,
            OutputTargets::new(main.clone(), "png"),
            ScheduleOptions::default(),
        );
        let report = s.run_blocking(&FrameSet::Whole(vec![1, 2])).unwrap();

        assert!(matches!(report.error, Some(ScheduleError::PathUnwritable { .. })));
        assert!(report.rendered.is_empty());
        assert!(s.renderer().jobs.is_empty());
        assert_eq!(s.outputs().main_path, main);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_render_failure_restores() {
        let dir = temp_dir();
        let targets = OutputTargets::new(main_path(&dir, "f_##"), "png")
            .with_file_output(FileOutput::layered("n", main_path(&dir, "n_")));
        let mut s = RenderScheduler::new(
            MockRenderer::new(|job| {
                if job.frame == FrameValue::Whole(2) {
                    RenderOutcome::Failed("boom".to_string())
                } else {
                    RenderOutcome::Completed
                }
            }),
            NoGlobals,
            targets.clone(),
            ScheduleOptions::default(),
        );
        let report = s.run_blocking(&FrameSet::Whole(vec![1, 2, 3])).unwrap();

        assert_eq!(report.rendered, vec![FrameValue::Whole(1)]);
        assert_eq!(
            report.error,
            Some(ScheduleError::RenderFailure {
                frame: FrameValue::Whole(2),
                reason: "boom".to_string()
            })
        );
        assert_eq!(s.outputs(), &targets);
        assert_eq!(s.renderer().jobs.len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_globals_resolved_per_frame() {
        let dir = temp_dir();
        let mut globals = GlobalVars::new();
        globals.insert("shot", "sh010");
        let main = main_path(&dir, "$shot/f$frame_####");

        let mut s = RenderScheduler::new(
            completing(),
            globals,
            OutputTargets::new(main.clone(), "png"),
            ScheduleOptions::default(),
        );
        s.run_blocking(&FrameSet::Whole(vec![7, 8])).unwrap();

        assert_eq!(
            s.renderer().paths(),
            vec![
                dir.join("sh010").join("f7_0007.png"),
                dir.join("sh010").join("f8_0008.png")
            ]
        );
        assert!(dir.join("sh010").is_dir());
        assert_eq!(s.outputs().main_path, main);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_start_errors() {
        let dir = temp_dir();
        let mut s = RenderScheduler::new(
            MockRenderer::new(|_| RenderOutcome::Pending),
            NoGlobals,
            OutputTargets::new(main_path(&dir, "x_"), "png"),
            ScheduleOptions::default(),
        );
        assert_eq!(s.start(&FrameSet::default()), Err(ScheduleError::NothingToRender));
        s.start(&FrameSet::Whole(vec![1])).unwrap();
        assert_eq!(s.start(&FrameSet::Whole(vec![1])), Err(ScheduleError::AlreadyRunning));

        s.tick();
        s.tick();
        s.abort();
        assert!(s.is_done());
        assert!(s.renderer().cancelled);
        assert_eq!(s.report().unwrap().error, Some(ScheduleError::Cancelled));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_synchronous_completion_passes_through() {
        let dir = temp_dir();
        let mut s = RenderScheduler::new(
            completing(),
            NoGlobals,
            OutputTargets::new(main_path(&dir, "x_"), "png"),
            ScheduleOptions::default(),
        );
        s.start(&FrameSet::Whole(vec![1])).unwrap();
        s.tick();
        assert_eq!(s.tick(), SchedulerState::Advancing);
        assert_eq!(s.progress(), (1, 1));
        assert_eq!(s.tick(), SchedulerState::Draining);
        assert_eq!(s.tick(), SchedulerState::Restoring);
        assert_eq!(s.tick(), SchedulerState::Done);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_completion_through_poll() {
        let dir = temp_dir();
        let main = main_path(&dir, "p_####");
        let mut s = RenderScheduler::new(
            PollingRenderer::default(),
            NoGlobals,
            OutputTargets::new(main.clone(), "png"),
            ScheduleOptions::default(),
        );
        s.start(&FrameSet::Whole(vec![1, 2])).unwrap();

        assert_eq!(s.tick(), SchedulerState::RenderingFrame);
        assert_eq!(s.tick(), SchedulerState::AwaitingCompletion);
        // First poll has no news
        assert_eq!(s.tick(), SchedulerState::AwaitingCompletion);
        assert_eq!(s.current_frame(), Some(FrameValue::Whole(1)));
        assert_eq!(s.progress(), (0, 2));
        assert_eq!(s.tick(), SchedulerState::Advancing);
        assert_eq!(s.progress(), (1, 2));

        tick_until_done(&mut s);
        let report = s.report().unwrap();
        assert_eq!(report.rendered, vec![FrameValue::Whole(1), FrameValue::Whole(2)]);
        assert_eq!(report.error, None);
        assert_eq!(s.renderer().started, vec![FrameValue::Whole(1), FrameValue::Whole(2)]);
        assert_eq!(s.outputs().main_path, main);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_run_blocking_waits_for_poll() {
        let dir = temp_dir();
        let mut s = RenderScheduler::new(
            PollingRenderer::default(),
            NoGlobals,
            OutputTargets::new(main_path(&dir, "q_"), "png"),
            ScheduleOptions::default(),
        );
        let report = s.run_blocking(&FrameSet::Whole(vec![3, 4, 5])).unwrap();
        assert_eq!(report.rendered.len(), 3);
        assert!(report.is_complete());

        let _ = fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn test_interactive_command_renders_through_poll() {
        use crate::core::renderer::CommandRenderer;

        let dir = temp_dir();
        let options = ScheduleOptions {
            mode: RenderMode::Interactive,
            ..Default::default()
        };
        let mut s = RenderScheduler::new(
            CommandRenderer::new("sleep 0.05 && touch {path}"),
            NoGlobals,
            OutputTargets::new(main_path(&dir, "c_####"), "png"),
            options,
        );
        let report = s.run_blocking(&FrameSet::Whole(vec![1, 2])).unwrap();
        assert_eq!(report.rendered, vec![FrameValue::Whole(1), FrameValue::Whole(2)]);
        assert!(dir.join("c_0001.png").is_file());
        assert!(dir.join("c_0002.png").is_file());

        let _ = fs::remove_dir_all(&dir);
    }
}
