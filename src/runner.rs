//! Application runner - dispatches CLI subcommands.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, trace, warn};

use crate::cli::{Args, Command};
use crate::config::{self, PathConfig};
use crate::core::compact::{compact, verify_report};
use crate::core::frame_spec::{parse_verbose, ExclusionScope, FrameSet};
use crate::core::globals::GlobalVars;
use crate::core::guess::{guess_frames, SceneRange};
use crate::core::outputs::{FileOutput, OutputTargets};
use crate::core::renderer::{CommandRenderer, DryRunRenderer, RenderMode, Renderer};
use crate::core::scheduler::{RenderScheduler, RunReport, SchedulerState};
use crate::core::sequence::{Renumber, SequenceMap, SequencePattern};
use crate::core::template::{subframe_width, version_path, OutputTemplate};
use crate::history::{RenderLog, RenderLogEntry};
use crate::progress::RenderProgress;
use crate::settings::AppSettings;

/// Tick interval for interactive renders
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Run the application with given arguments.
///
/// Logging and application directories must already be set up by the caller.
pub fn run(args: Args, path_config: &PathConfig) -> Result<()> {
    let settings_path = config::config_file(config::SETTINGS_FILE, path_config);
    info!("Config path: {}", settings_path.display());
    trace!("Command-line args: {:?}", args);
    let settings = match AppSettings::load_or_create(&settings_path) {
        Ok(settings) => settings,
        Err(e) if !settings_path.exists() => {
            warn!("Using default settings: {:#}", e);
            AppSettings::default()
        }
        Err(e) => return Err(e),
    };

    match args.command {
        Command::Frames {
            expr,
            step,
            isolate,
            individual,
        } => {
            let frames = parse_frames(&expr, step, isolate, &settings)?;
            println!("{}", verify_report(&frames, individual));
        }
        Command::Compact { frames } => {
            let frames = FrameSet::from_frames(frames);
            println!("{}", frames);
        }
        Command::Scan { path, pattern, range } => {
            let map = scan_sequence(&path, pattern.as_deref(), &settings)?;
            let missing = match range_pair(range.as_deref())? {
                Some((start, end)) => map.missing_extended(start, end),
                None => map.missing(),
            };
            if let Some((first, last)) = map.range() {
                println!(
                    "{}: {} frames ({}-{}) in {}",
                    map.pattern(),
                    map.len(),
                    first,
                    last,
                    map.dir().display()
                );
            }
            if missing.is_empty() {
                println!("No missing frames");
            } else {
                println!("{} missing: {}", missing.len(), compact(&missing));
            }
        }
        Command::Fill {
            path,
            pattern,
            range,
            dry_run,
        } => {
            let mut map = scan_sequence(&path, pattern.as_deref(), &settings)?;
            let range = range_pair(range.as_deref())?;
            if dry_run {
                let plan = map.plan_gap_fill(range);
                for fill in &plan {
                    println!("{} -> {}", fill.source.display(), fill.target.display());
                }
                println!("{} frame(s) would be filled", plan.len());
            } else {
                let filled = map.fill_gaps(range)?;
                if filled == 0 {
                    println!("No gaps to fill");
                } else {
                    println!("Filled {} frame(s) in {}", filled, map.dir().display());
                }
            }
        }
        Command::Rename {
            path,
            pattern,
            new_name,
            start,
            keep_numbers,
            dry_run,
        } => {
            let mut map = scan_sequence(&path, pattern.as_deref(), &settings)?;
            let target = map.rename_pattern(&new_name);
            let renumber = if keep_numbers { Renumber::Keep } else { Renumber::From(start) };
            if dry_run {
                let plan = map.plan_rename(&target, renumber)?;
                for r in &plan.renames {
                    println!("{} -> {}", r.source.display(), r.target.display());
                }
                println!("{} file(s) would be renamed to {}", plan.renames.len(), target);
            } else {
                let renamed = map
                    .rename(&target, renumber)
                    .with_context(|| format!("Renaming {} in {}", map.pattern(), map.dir().display()))?;
                println!("{} file(s) renamed to {}", renamed, target);
            }
        }
        Command::Guess {
            output,
            extension,
            range,
            step,
            no_detect,
        } => {
            let (start, end) = range_pair(Some(range.as_slice()))?.ok_or_else(|| anyhow!("--range needs START END"))?;
            let guess = guess_frames(
                &output,
                &extension,
                SceneRange::new(start, end, step),
                !no_detect,
                &settings.fallback_name,
                &settings.global_vars(),
            );
            if let Some(msg) = &guess.message {
                eprintln!("{}", msg);
            }
            println!("{}", guess.frames);
        }
        Command::Render {
            expr,
            output,
            extension,
            command,
            aux,
            globals,
            step,
            isolate,
            overwrite,
            silent,
            dry_run,
        } => {
            let frames = parse_frames(&expr, step, isolate, &settings)?;
            if frames.is_empty() {
                bail!("No frames to render");
            }

            let mut targets = OutputTargets::new(output, extension);
            for spec in &aux {
                targets = targets.with_file_output(parse_aux(spec)?);
            }

            let mut vars = settings.global_vars();
            for spec in &globals {
                let (key, value) = spec
                    .split_once('=')
                    .ok_or_else(|| anyhow!("Invalid global \"{}\", expected KEY=VALUE", spec))?;
                vars.insert(key, value);
            }

            let renderer: Box<dyn Renderer> = if dry_run {
                Box::new(DryRunRenderer::default())
            } else {
                let cmd = command
                    .or_else(|| settings.render_command.clone())
                    .ok_or_else(|| anyhow!("No render command, use --command or set render_command in settings"))?;
                Box::new(CommandRenderer::new(cmd))
            };

            let mut options = settings.schedule_options();
            options.overwrite |= overwrite;
            if silent {
                options.mode = RenderMode::Silent;
            }

            if settings.log_render {
                let log_path = config::data_file(config::RENDER_LOG_FILE, path_config);
                if let Err(e) = log_render(&log_path, &frames, &targets, &settings) {
                    warn!("Render log not written: {:#}", e);
                }
            }

            let report = render(renderer, vars, targets, options, &frames)?;
            print_report(&report);
            if let Some(e) = report.error {
                return Err(anyhow::Error::new(e).context("Render stopped"));
            }
        }
        Command::VersionPath { path, number } => {
            println!("{}", version_path(&path, number));
        }
    }

    Ok(())
}

fn parse_frames(expr: &str, step: Option<f64>, isolate: bool, settings: &AppSettings) -> Result<FrameSet> {
    let scope = if isolate {
        ExclusionScope::Isolate
    } else {
        settings.exclusion_scope()
    };
    let outcome = parse_verbose(expr, step.unwrap_or(settings.default_step), scope)?;
    for w in &outcome.warnings {
        eprintln!("Ignored: {}", w);
    }
    Ok(outcome.frames)
}

fn range_pair(range: Option<&[i64]>) -> Result<Option<(i64, i64)>> {
    match range {
        None => Ok(None),
        Some([start, end]) => Ok(Some((*start.min(end), *start.max(end)))),
        Some(other) => bail!("Expected START END, got {} value(s)", other.len()),
    }
}

/// Directory + template, or a sample file of the sequence
fn scan_sequence(path: &Path, template: Option<&str>, settings: &AppSettings) -> Result<SequenceMap> {
    let (dir, pattern) = match template {
        Some(template) => (
            path.to_path_buf(),
            SequencePattern::from_template(template, settings.default_digits, ""),
        ),
        None if path.is_file() => {
            let (dir, pattern, frame) = SequencePattern::from_sample(path)
                .ok_or_else(|| anyhow!("No frame number in {}", path.display()))?;
            debug!("Sample {} is frame {} of {}", path.display(), frame, pattern);
            (dir, pattern)
        }
        None => bail!("{} is a directory, use --pattern to name the sequence", path.display()),
    };
    SequenceMap::scan(&dir, &pattern).with_context(|| format!("Scanning {}", dir.display()))
}

/// `NAME=PATH` (multi-layer) or `NAME=FOLDER=slot1,slot2`
fn parse_aux(spec: &str) -> Result<FileOutput> {
    let mut parts = spec.splitn(3, '=');
    let (Some(name), Some(path)) = (parts.next(), parts.next()) else {
        bail!("Invalid file output \"{}\", expected NAME=PATH", spec);
    };
    Ok(match parts.next() {
        Some(slots) => FileOutput::slotted(name, path, slots.split(',').map(str::to_string).collect()),
        None => FileOutput::layered(name, path),
    })
}

fn log_render(path: &Path, frames: &FrameSet, targets: &OutputTargets, settings: &AppSettings) -> Result<()> {
    let template = OutputTemplate::from_output_path(
        &targets.main_path,
        &targets.extension,
        settings.default_digits,
        &settings.fallback_name,
    )
    .with_subframe_digits(subframe_width(&frames.values()));

    let mut log = RenderLog::load(path)?;
    log.push(RenderLogEntry::new(frames, &template, &targets.main_path), settings.log_render_limit);
    log.save(path)?;
    debug!("Render logged to {} ({} entries)", path.display(), log.len());
    Ok(())
}

fn render(
    renderer: Box<dyn Renderer>,
    globals: GlobalVars,
    targets: OutputTargets,
    options: crate::core::scheduler::ScheduleOptions,
    frames: &FrameSet,
) -> Result<RunReport> {
    let mode = options.mode;
    let mut scheduler = RenderScheduler::new(renderer, globals, targets, options);

    if mode == RenderMode::Silent {
        return Ok(scheduler.run_blocking(frames)?);
    }

    scheduler.start(frames)?;
    let progress = RenderProgress::new(frames.len());
    while !scheduler.is_done() {
        let before = scheduler.state();
        let state = scheduler.tick();
        progress.frame(scheduler.current_frame());
        progress.update(scheduler.progress().0);
        if state == SchedulerState::AwaitingCompletion && before == SchedulerState::AwaitingCompletion {
            thread::sleep(TICK_INTERVAL);
        }
    }

    let report = scheduler.report().cloned().unwrap_or_default();
    progress.finish(if report.is_complete() { "Done" } else { "Stopped" });
    Ok(report)
}

fn print_report(report: &RunReport) {
    for msg in [report.rendered_message(), report.saved_message(), report.skipped_message()]
        .into_iter()
        .flatten()
    {
        println!("{}", msg);
    }
}
