//! Frame specification parsing
//!
//! **Why**: Artists type frame lists by hand ("1-10, 20, ^5", "1-3x0.25", "10-1").
//! This module turns that free-form text into a sorted, deduplicated [`FrameSet`].
//!
//! **Used by**: CLI `frames`/`render` commands, frame guessing, [`RenderScheduler`] input
//!
//! # Grammar
//!
//! Items are separated by whitespace and/or commas. Each item is one of:
//!
//! - `12`, `-3`, `1.5`, `.25` - single frame
//! - `1-10`, `10-1`, `-3--1` - inclusive range (direction normalized)
//! - `1-10x2`, `0-1%0.25` - range with increment (default: caller's step)
//! - `^5`, `!1-3` - exclusion of any of the above
//!
//! Fragments that match no item are dropped with a [`ParseWarning`].
//! Only input without a single recognizable item fails ([`FrameSpecError::NoFrames`]).
//!
//! # Exclusion scope
//!
//! - [`ExclusionScope::Global`]: everything from the first excluded item onward is excluded
//! - [`ExclusionScope::Isolate`]: markers apply to their own item only; positive items
//!   after the first exclusion win over earlier exclusions
//!
//! [`RenderScheduler`]: crate::core::scheduler::RenderScheduler

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::compact::compact;

/// One frame-spec item: a number, an optional sign, or a range with optional increment
static ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        [\^!]? \s*?
        [-+]?
        (?:
            (?: \d*\.?\d+ \s? - \s? \d*\.?\d+ \s? [x%] \s? [-+]? \d*\.?\d+ )
            |
            (?: \d*\.?\d+ \s? - \s? [-+]? \d*\.?\d+ )
            |
            (?: \d*\.\d+ )
            |
            (?: \d+\.? )
        )",
    )
    .expect("frame item regex")
});

/// Range body: start, separator, end, optional increment
static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ([-+]? \d*? \.? [0-9]+ \b)
        (\s*? - \s*?)
        ([-+]? \d* \.? [0-9]+)
        ( (\s*? [x%] \s*?) ([-+]? \d* \.? [0-9]+ \b) )?",
    )
    .expect("frame range regex")
});

/// Excluded single value: `^5`, `! -3`
static EXCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\^!]\s*?([-+]?\d*\.?\d+)$").expect("frame exclude regex")
});

/// Decimal places kept when expanding ranges
const RANGE_DECIMALS: i32 = 5;

/// Upper bound for a single range expansion
pub const MAX_RANGE_FRAMES: usize = 10_000_000;

/// Frames must stay strictly below 2^53 to survive the float data model exactly
pub const MAX_FRAME_MAGNITUDE: f64 = 9_007_199_254_740_992.0;

/// Parse errors
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSpecError {
    /// Input contains no recognizable frame item
    NoFrames(String),
}

impl fmt::Display for FrameSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameSpecError::NoFrames(input) => write!(f, "No frames specified in \"{}\"", input),
        }
    }
}

impl std::error::Error for FrameSpecError {}

/// Non-fatal problems found while parsing; the offending fragment is dropped
#[derive(Debug, Clone, PartialEq)]
pub enum ParseWarning {
    /// Text between items that is not a separator
    Unrecognized(String),
    /// Item matched the tokenizer but not the range/exclude grammar
    Malformed(String),
    /// Range with zero or non-finite increment
    InvalidStep(String),
    /// Range expanding to more than [`MAX_RANGE_FRAMES`] values
    RangeTooLarge(String),
    /// Frame at or beyond [`MAX_FRAME_MAGNITUDE`]
    OutOfRange(String),
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::Unrecognized(s) => write!(f, "ignored unrecognized input \"{}\"", s),
            ParseWarning::Malformed(s) => write!(f, "ignored malformed item \"{}\"", s),
            ParseWarning::InvalidStep(s) => write!(f, "ignored range with invalid increment \"{}\"", s),
            ParseWarning::RangeTooLarge(s) => {
                write!(f, "ignored range \"{}\" (more than {} frames)", s, MAX_RANGE_FRAMES)
            }
            ParseWarning::OutOfRange(s) => write!(f, "ignored out of range frame \"{}\"", s),
        }
    }
}

/// Parsed grammar unit
#[derive(Debug, Clone, PartialEq)]
pub enum FrameToken {
    Single(f64),
    /// Always `start <= end` and `step > 0`
    Range { start: f64, end: f64, step: f64 },
    Exclude(Box<FrameToken>),
}

impl FrameToken {
    /// Build a direction-normalized range
    pub fn range(a: f64, b: f64, step: f64) -> Self {
        FrameToken::Range {
            start: a.min(b),
            end: a.max(b),
            step: step.abs(),
        }
    }

    /// `A-A` ranges behave like single frames but never count as conforming
    fn is_degenerate(&self) -> bool {
        matches!(self, FrameToken::Range { start, end, .. } if start == end)
    }

    fn excluded(self) -> Self {
        match self {
            FrameToken::Exclude(_) => self,
            other => FrameToken::Exclude(Box::new(other)),
        }
    }

    /// All frame values covered by this token (exclusion marker ignored)
    pub fn expand(&self) -> Vec<f64> {
        match self {
            FrameToken::Single(v) => vec![*v],
            FrameToken::Range { start, end, step } => expand_range(*start, *end, *step),
            FrameToken::Exclude(inner) => inner.expand(),
        }
    }
}

fn round_decimals(v: f64) -> f64 {
    let scale = 10f64.powi(RANGE_DECIMALS);
    (v * scale).round_ties_even() / scale
}

/// `|a - b| <= atol + rtol * |b|`
fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

fn range_len(start: f64, end: f64, step: f64) -> usize {
    if end <= start {
        return 1;
    }
    ((end - start) / step).ceil() as usize
}

fn is_whole(v: f64) -> bool {
    v.fract() == 0.0
}

fn in_bounds(v: f64) -> bool {
    v.abs() < MAX_FRAME_MAGNITUDE
}

/// Expand `start..end` by `step`, appending `end` when the last step lands on it
///
/// Whole-number ranges step in `i64` so large frame numbers stay exact.
fn expand_range(start: f64, end: f64, step: f64) -> Vec<f64> {
    if start == end {
        return vec![start];
    }
    let count = range_len(start, end, step);
    let mut values: Vec<f64> = if is_whole(start) && is_whole(step) {
        let (first, inc) = (start as i64, step as i64);
        (0..count as i64).map(|i| (first + i * inc) as f64).collect()
    } else {
        (0..count)
            .map(|i| round_decimals(start + i as f64 * step))
            .collect()
    };
    if let Some(&last) = values.last() {
        if is_close(step, end - last) {
            values.push(end);
        }
    }
    values
}

fn is_exclude_marked(item: &str) -> bool {
    item.starts_with(['^', '!'])
}

/// Turn one raw item into a token
fn tokenize_item(item: &str, default_step: f64) -> Result<FrameToken, ParseWarning> {
    let out_of_range = || ParseWarning::OutOfRange(item.to_string());

    if let Ok(value) = item.parse::<f64>() {
        if !in_bounds(value) {
            return Err(out_of_range());
        }
        return Ok(FrameToken::Single(value));
    }

    let marked = is_exclude_marked(item);
    if marked {
        if let Some(caps) = EXCLUDE_RE.captures(item) {
            if let Ok(value) = caps[1].parse::<f64>() {
                if !in_bounds(value) {
                    return Err(out_of_range());
                }
                return Ok(FrameToken::Single(value).excluded());
            }
        }
    }

    let caps = RANGE_RE
        .captures(item)
        .ok_or_else(|| ParseWarning::Malformed(item.to_string()))?;
    let a = caps[1].parse::<f64>().map_err(|_| ParseWarning::Malformed(item.to_string()))?;
    let b = caps[3].parse::<f64>().map_err(|_| ParseWarning::Malformed(item.to_string()))?;
    let step = match caps.get(6) {
        Some(m) => m.as_str().parse::<f64>().map_err(|_| ParseWarning::Malformed(item.to_string()))?,
        None => default_step,
    };
    if step == 0.0 || !step.is_finite() {
        return Err(ParseWarning::InvalidStep(item.to_string()));
    }
    if !in_bounds(a) || !in_bounds(b) {
        return Err(out_of_range());
    }

    let token = FrameToken::range(a, b, step);
    if let FrameToken::Range { start, end, step } = token {
        if range_len(start, end, step) > MAX_RANGE_FRAMES {
            return Err(ParseWarning::RangeTooLarge(item.to_string()));
        }
    }

    Ok(if marked { token.excluded() } else { token })
}

/// Report non-separator text that sits between recognized items
fn push_gap(gap: &str, warnings: &mut Vec<ParseWarning>) {
    let gap = gap.trim_matches(|c: char| c.is_whitespace() || c == ',');
    if !gap.is_empty() {
        warnings.push(ParseWarning::Unrecognized(gap.to_string()));
    }
}

/// Split input into tokens, collecting warnings for every dropped fragment
///
/// Returns `None` when the input contains no grammar item at all.
pub fn tokenize(input: &str, default_step: f64) -> Option<(Vec<FrameToken>, Vec<ParseWarning>)> {
    let mut tokens = Vec::new();
    let mut warnings = Vec::new();
    let mut matched_any = false;
    let mut cursor = 0;

    for m in ITEM_RE.find_iter(input) {
        matched_any = true;
        push_gap(&input[cursor..m.start()], &mut warnings);
        cursor = m.end();

        match tokenize_item(m.as_str().trim(), default_step) {
            Ok(token) => tokens.push(token),
            Err(w) => warnings.push(w),
        }
    }
    push_gap(&input[cursor..], &mut warnings);

    if !matched_any {
        return None;
    }
    Some((tokens, warnings))
}

/// How exclusion markers propagate through the item list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExclusionScope {
    /// First exclusion applies to every following item
    #[default]
    Global,
    /// Exclusions apply to their own item; later positives re-include
    Isolate,
}

impl ExclusionScope {
    pub fn from_isolate(isolate: bool) -> Self {
        if isolate {
            ExclusionScope::Isolate
        } else {
            ExclusionScope::Global
        }
    }

    /// Evaluate tokens into `(candidates, exclusions)`
    fn evaluate(self, tokens: Vec<FrameToken>) -> (Vec<f64>, Vec<f64>) {
        match self {
            ExclusionScope::Global => evaluate_global(tokens),
            ExclusionScope::Isolate => evaluate_isolate(tokens),
        }
    }
}

fn evaluate_global(tokens: Vec<FrameToken>) -> (Vec<f64>, Vec<f64>) {
    let mut candidates = Vec::new();
    let mut exclusions = Vec::new();
    let mut excluding = false;

    for token in tokens {
        let token = if excluding { token.excluded() } else { token };
        match token {
            FrameToken::Exclude(inner) => {
                excluding = true;
                exclusions.extend(inner.expand());
            }
            other => candidates.extend(other.expand()),
        }
    }
    (candidates, exclusions)
}

fn evaluate_isolate(tokens: Vec<FrameToken>) -> (Vec<f64>, Vec<f64>) {
    let mut candidates = Vec::new();
    let mut exclusions = Vec::new();
    let mut conformed = Vec::new();
    let mut conforming = false;

    for token in tokens {
        match token {
            FrameToken::Exclude(inner) => {
                exclusions.extend(inner.expand());
                if !inner.is_degenerate() {
                    conforming = true;
                }
            }
            ref t if t.is_degenerate() => candidates.extend(t.expand()),
            other => {
                let values = other.expand();
                if conforming {
                    conformed.extend(values.iter().copied());
                }
                candidates.extend(values);
            }
        }
    }

    let conformed = sorted_unique(conformed);
    exclusions.retain(|v| !contains(&conformed, *v));
    (candidates, exclusions)
}

/// Fold `-0.0` into `0.0` so set membership behaves numerically
fn canonical(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

fn sorted_unique(values: Vec<f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.into_iter().map(canonical).collect();
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

fn contains(sorted: &[f64], v: f64) -> bool {
    sorted.binary_search_by(|probe| probe.total_cmp(&canonical(v))).is_ok()
}

/// Single frame value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FrameValue {
    Whole(i64),
    Sub(f64),
}

impl FrameValue {
    /// Main frame and fractional digits as written (`1.25` -> `(1, "25")`, `2.0` -> `(2, "0")`)
    pub fn split(self) -> (i64, String) {
        match self {
            FrameValue::Whole(f) => (f, "0".to_string()),
            FrameValue::Sub(v) => {
                let repr = format!("{}", canonical(v));
                match repr.split_once('.') {
                    Some((main, frac)) => (main.parse::<i64>().unwrap_or(v.trunc() as i64), frac.to_string()),
                    None => (v.trunc() as i64, "0".to_string()),
                }
            }
        }
    }

    /// Frame as float (for hosts that set sub-frame time)
    pub fn as_f64(self) -> f64 {
        match self {
            FrameValue::Whole(f) => f as f64,
            FrameValue::Sub(v) => v,
        }
    }
}

impl fmt::Display for FrameValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameValue::Whole(v) => write!(f, "{}", v),
            FrameValue::Sub(_) => {
                let (main, frac) = self.split();
                write!(f, "{}.{}", main, frac)
            }
        }
    }
}

/// Ordered, duplicate-free frame list
///
/// Integers whenever every value is integral ("subframe mode" otherwise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameSet {
    Whole(Vec<i64>),
    Sub(Vec<f64>),
}

impl Default for FrameSet {
    fn default() -> Self {
        FrameSet::Whole(Vec::new())
    }
}

impl FrameSet {
    /// Build from arbitrary values: sorts, dedups, picks integer form when possible
    pub fn from_values(values: Vec<f64>) -> Self {
        let values = sorted_unique(values);
        if values.iter().all(|v| is_whole(*v)) {
            FrameSet::Whole(values.into_iter().map(|v| v as i64).collect())
        } else {
            FrameSet::Sub(values)
        }
    }

    /// Build from integer frames (sorted, deduplicated)
    pub fn from_frames(mut frames: Vec<i64>) -> Self {
        frames.sort_unstable();
        frames.dedup();
        FrameSet::Whole(frames)
    }

    pub fn len(&self) -> usize {
        match self {
            FrameSet::Whole(v) => v.len(),
            FrameSet::Sub(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_subframe(&self) -> bool {
        matches!(self, FrameSet::Sub(_))
    }

    /// Frames in ascending order
    pub fn values(&self) -> Vec<FrameValue> {
        match self {
            FrameSet::Whole(v) => v.iter().map(|f| FrameValue::Whole(*f)).collect(),
            FrameSet::Sub(v) => v.iter().map(|f| FrameValue::Sub(*f)).collect(),
        }
    }

    /// Integer frames, `None` in subframe mode
    pub fn as_whole(&self) -> Option<&[i64]> {
        match self {
            FrameSet::Whole(v) => Some(v),
            FrameSet::Sub(_) => None,
        }
    }

    pub fn first(&self) -> Option<FrameValue> {
        self.values().first().copied()
    }

    pub fn last(&self) -> Option<FrameValue> {
        self.values().last().copied()
    }
}

impl fmt::Display for FrameSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameSet::Whole(frames) => write!(f, "{}", compact(frames)),
            FrameSet::Sub(_) => {
                let items: Vec<String> = self.values().iter().map(|v| v.to_string()).collect();
                write!(f, "{}", items.join(", "))
            }
        }
    }
}

/// Full parse result including dropped-fragment warnings
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub frames: FrameSet,
    pub tokens: Vec<FrameToken>,
    pub warnings: Vec<ParseWarning>,
}

/// Parse and keep warnings/tokens for reporting
pub fn parse_verbose(
    input: &str,
    default_step: f64,
    scope: ExclusionScope,
) -> Result<ParseOutcome, FrameSpecError> {
    let (tokens, warnings) =
        tokenize(input, default_step).ok_or_else(|| FrameSpecError::NoFrames(input.to_string()))?;

    for w in &warnings {
        warn!("Frame input: {}", w);
    }

    let (candidates, exclusions) = scope.evaluate(tokens.clone());
    let exclusions = sorted_unique(exclusions);
    let kept: Vec<f64> = candidates
        .into_iter()
        .filter(|v| !contains(&exclusions, *v))
        .collect();
    let frames = FrameSet::from_values(kept);

    debug!(
        "Parsed \"{}\" ({:?}): {} tokens, {} frames",
        input,
        scope,
        tokens.len(),
        frames.len()
    );

    Ok(ParseOutcome { frames, tokens, warnings })
}

/// Parse a frame specification
///
/// # Arguments
///
/// - `input`: free-form text, e.g. `"1-10x2, 15, ^3"`
/// - `default_step`: increment for ranges without `x`/`%` (usually the scene frame step)
/// - `isolate`: use [`ExclusionScope::Isolate`] instead of [`ExclusionScope::Global`]
///
/// # Examples
///
/// ```rust
/// # use seqrender::core::frame_spec::{parse, FrameSet};
/// assert_eq!(parse("5-1", 1.0, false)?, FrameSet::Whole(vec![1, 2, 3, 4, 5]));
/// assert_eq!(parse("1-3,^2", 1.0, false)?, FrameSet::Whole(vec![1, 3]));
/// # Ok::<(), seqrender::core::frame_spec::FrameSpecError>(())
/// ```
pub fn parse(input: &str, default_step: f64, isolate: bool) -> Result<FrameSet, FrameSpecError> {
    parse_verbose(input, default_step, ExclusionScope::from_isolate(isolate)).map(|o| o.frames)
}
