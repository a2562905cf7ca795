//! `$`-placeholder resolution for output paths
//!
//! Output folders and file names may contain user-defined globals such as
//! `$shot` or `$frame`. Resolution happens once per path per frame, never cached,
//! because values may depend on the current frame.

use indexmap::IndexMap;
use log::trace;
use serde::{Deserialize, Serialize};

use super::frame_spec::FrameValue;

/// Resolves placeholder tokens inside path strings
pub trait GlobalsResolver {
    /// Replace every known placeholder in `template`
    fn resolve(&self, template: &str) -> String;

    /// Called before paths of a frame are resolved (host "current frame" changed)
    fn frame_changed(&mut self, _frame: FrameValue) {}
}

/// Identity resolver for hosts without globals
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGlobals;

impl GlobalsResolver for NoGlobals {
    fn resolve(&self, template: &str) -> String {
        template.to_string()
    }
}

/// User-defined `$name -> value` table plus built-in frame placeholders
///
/// Built-ins: `$frame` (current frame as written, e.g. `12` or `1.25`) and
/// `$frame_int` (integer part). At every `$` the longest matching key wins, and
/// user entries shadow built-ins of the same name. Substituted values are not rescanned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalVars {
    vars: IndexMap<String, String>,
    #[serde(skip)]
    current_frame: Option<FrameValue>,
}

impl GlobalVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(vars: IndexMap<String, String>) -> Self {
        let mut globals = Self::new();
        for (k, v) in vars {
            globals.insert(&k, v);
        }
        globals
    }

    /// Add a variable; a missing `$` prefix is added, blank keys are ignored
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let key = key.trim();
        if key.is_empty() || key == "$" {
            return;
        }
        let key = if key.starts_with('$') { key.to_string() } else { format!("${}", key) };
        self.vars.insert(key, value.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl GlobalsResolver for GlobalVars {
    fn resolve(&self, template: &str) -> String {
        if !template.contains('$') {
            return template.to_string();
        }
        let mut table: Vec<(&str, String)> = self.vars.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        if let Some(frame) = self.current_frame {
            let (main, _) = frame.split();
            table.push(("$frame_int", main.to_string()));
            table.push(("$frame", frame.to_string()));
        }
        // Stable: equal lengths keep user entries ahead of built-ins
        table.sort_by_key(|(key, _)| std::cmp::Reverse(key.len()));

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            match table.iter().find(|(key, _)| tail.starts_with(*key)) {
                Some((key, value)) => {
                    out.push_str(value);
                    rest = &tail[key.len()..];
                }
                None => {
                    out.push('$');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        trace!("Resolved globals: {} -> {}", template, out);
        out
    }

    fn frame_changed(&mut self, frame: FrameValue) {
        self.current_frame = Some(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_vars() {
        let mut g = GlobalVars::new();
        g.insert("shot", "sh010");
        g.insert("$seq", "sq01");
        g.insert("  ", "ignored");
        assert_eq!(g.len(), 2);
        assert_eq!(g.resolve("/r/$seq/$shot/img_"), "/r/sq01/sh010/img_");
        assert_eq!(g.resolve("/plain/path"), "/plain/path");
        assert_eq!(g.resolve("$unknown/$shot"), "$unknown/sh010");
    }

    #[test]
    fn test_prefix_keys_do_not_clobber_longer_ones() {
        let mut g = GlobalVars::new();
        g.insert("fr", "X");
        g.insert("sh", "A");
        g.insert("shot", "sh010");
        g.frame_changed(FrameValue::Whole(7));
        assert_eq!(g.resolve("$fr/$frame/$frame_int/$shot/$sh"), "X/7/7/sh010/A");
    }

    #[test]
    fn test_user_var_shadows_builtin() {
        let mut g = GlobalVars::new();
        g.insert("frame", "hold");
        g.frame_changed(FrameValue::Whole(3));
        assert_eq!(g.resolve("$frame_$frame_int"), "hold_3");
    }

    #[test]
    fn test_frame_placeholders_follow_current_frame() {
        let mut g = GlobalVars::new();
        assert_eq!(g.resolve("f$frame"), "f$frame");
        g.frame_changed(FrameValue::Whole(12));
        assert_eq!(g.resolve("f$frame/$frame_int"), "f12/12");
        g.frame_changed(FrameValue::Sub(1.25));
        assert_eq!(g.resolve("f$frame/$frame_int"), "f1.25/1");
    }

    #[test]
    fn test_no_globals() {
        assert_eq!(NoGlobals.resolve("$shot"), "$shot");
    }
}
