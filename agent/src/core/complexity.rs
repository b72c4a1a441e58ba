//! Heuristic turn estimate derived from the task text.
//!
//! The estimate is advisory metadata shown to observers; it never gates the
//! turn loop.

use std::sync::LazyLock;

use regex::Regex;

/// Upper bound for any estimate.
pub const MAX_ESTIMATE: u32 = 15;
const BASE_SCORE: u32 = 1;
const MAX_FILE_OP_BONUS: u32 = 5;

/// Keyword families (case-insensitive substring match) and their increments.
const KEYWORD_FAMILIES: &[(&[&str], u32)] = &[
    (&["project", "项目"], 3),
    (&["complete", "完整"], 2),
    (&["multiple", "多个"], 2),
    (&["full-stack", "全栈"], 4),
    (&["website", "网站"], 2),
    (&["api", "接口"], 2),
];

static FILE_OP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)create|write|edit|file|directory").expect("file operation pattern is valid")
});

/// Estimate how many turns `task_text` should need. Always in `[1, MAX_ESTIMATE]`.
pub fn estimate(task_text: &str) -> u32 {
    let lower = task_text.to_lowercase();
    let keyword_score: u32 = KEYWORD_FAMILIES
        .iter()
        .filter(|(words, _)| words.iter().any(|word| lower.contains(word)))
        .map(|(_, weight)| weight)
        .sum();

    let file_ops = FILE_OP_RE.find_iter(&lower).count() as u32;
    let bonus = (file_ops / 2).min(MAX_FILE_OP_BONUS);

    (BASE_SCORE + keyword_score + bonus).min(MAX_ESTIMATE)
}
