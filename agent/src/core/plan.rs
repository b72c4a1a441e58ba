//! Best-effort parsing of free-text edit plans.
//!
//! Model output is never trusted to be structured. Lines of the form
//! `STEP n: action - file - description` become steps; everything else is
//! skipped. Callers substitute a deterministic plan when nothing parses.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:[-*]\s*)?\**STEP\s+(\d+)\**\s*:(.*)$").expect("step pattern is valid")
});

/// One planned action against a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditStep {
    pub action: String,
    pub target_file: String,
    pub description: String,
}

impl EditStep {
    pub fn new(
        action: impl Into<String>,
        target_file: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            target_file: target_file.into(),
            description: description.into(),
        }
    }
}

/// What to do when the model yields no usable steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPlan {
    /// One edit step per target file, else one generic analyze step.
    #[default]
    Constructed,
    /// Degrade to an empty plan.
    NoSteps,
}

/// Extract steps from free text. Malformed lines are logged and skipped.
pub fn parse_plan(text: &str) -> Vec<EditStep> {
    let mut steps = Vec::new();
    for line in text.lines() {
        let Some(caps) = STEP_RE.captures(line) else {
            continue;
        };
        let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        match split_step(rest) {
            Some(step) => steps.push(step),
            None => debug!(line = line.trim(), "skipping malformed plan line"),
        }
    }
    steps
}

/// Split `action - file - description`. Prefers ` - ` separators so hyphenated
/// file names survive, then falls back to bare `-`.
fn split_step(rest: &str) -> Option<EditStep> {
    let spaced: Vec<&str> = rest.splitn(3, " - ").collect();
    let parts = if spaced.len() == 3 {
        spaced
    } else {
        rest.splitn(3, '-').collect()
    };
    let [action, file, description] = parts.as_slice() else {
        return None;
    };
    let action = action.trim();
    if action.is_empty() {
        return None;
    }
    Some(EditStep::new(
        action.to_lowercase(),
        file.trim(),
        description.trim(),
    ))
}

/// Deterministic plan used when the model call fails or nothing parses.
pub fn fallback_plan(mode: FallbackPlan, description: &str, target_files: &[String]) -> Vec<EditStep> {
    if mode == FallbackPlan::NoSteps {
        return Vec::new();
    }
    if target_files.is_empty() {
        return vec![EditStep::new(
            "analyze",
            "",
            format!("Analyze the project and apply: {description}"),
        )];
    }
    target_files
        .iter()
        .map(|file| EditStep::new("edit", file.clone(), description))
        .collect()
}

/// Parsed steps, or the fallback when parsing produced nothing.
pub fn plan_or_fallback(
    parsed: Vec<EditStep>,
    mode: FallbackPlan,
    description: &str,
    target_files: &[String],
) -> Vec<EditStep> {
    if !parsed.is_empty() {
        return parsed;
    }
    debug!(?mode, "no usable plan steps, using fallback");
    fallback_plan(mode, description, target_files)
}
