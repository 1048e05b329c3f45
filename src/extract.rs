//! Plan extraction from free-form assistant text.
//!
//! The text comes from a generative model whose formatting is not
//! guaranteed, so extraction never fails: a degraded single-step plan is
//! preferable to blocking goal creation.

use crate::model::{ExtractedPlan, ExtractedStep};

pub const DEFAULT_GOAL_TITLE: &str = "New Goal";
pub const DEFAULT_STEP_TITLE: &str = "Start working on your goal";

const GOAL_LABELS: &[&str] = &["goal"];
const DESCRIPTION_LABELS: &[&str] = &["description"];
const STEP_LABELS: &[&str] = &["daily steps", "steps"];

/// Extracts a goal title, optional description and ordered step list from
/// raw text. Pure and deterministic; always returns a usable plan.
pub fn extract(text: &str) -> ExtractedPlan {
    let lines: Vec<&str> = text.lines().collect();

    let goal_title = lines
        .iter()
        .find_map(|line| label_value(line, GOAL_LABELS))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_GOAL_TITLE.to_string());

    // The steps section starts at a bare `Steps:` / `Daily Steps:` label
    // line; everything after it is the candidate block. Without a label the
    // whole text is scanned.
    let steps_label_idx = lines
        .iter()
        .position(|line| matches!(label_value(line, STEP_LABELS), Some(rest) if rest.is_empty()));

    let description = extract_description(&lines, steps_label_idx);

    let block: &[&str] = match steps_label_idx {
        Some(idx) => &lines[idx + 1..],
        None => &lines[..],
    };

    let title_lower = goal_title.to_lowercase();
    let description_lower = description.as_deref().map(str::to_lowercase);

    let mut steps = Vec::new();
    for line in block {
        let Some(title) = list_item(line) else {
            continue;
        };
        if echoes(&title, &title_lower) {
            continue;
        }
        if let Some(description) = description_lower.as_deref() {
            if echoes(&title, description) {
                continue;
            }
        }
        steps.push(ExtractedStep { title });
    }

    if steps.is_empty() {
        steps.push(ExtractedStep {
            title: DEFAULT_STEP_TITLE.to_string(),
        });
    }

    ExtractedPlan {
        goal_title,
        description,
        steps,
    }
}

fn extract_description(lines: &[&str], steps_label_idx: Option<usize>) -> Option<String> {
    let idx = lines
        .iter()
        .position(|line| label_value(line, DESCRIPTION_LABELS).is_some())?;

    let mut parts = Vec::new();
    if let Some(inline) = label_value(lines[idx], DESCRIPTION_LABELS) {
        if !inline.is_empty() {
            parts.push(inline);
        }
    }
    let end = steps_label_idx
        .filter(|end| *end > idx)
        .unwrap_or(lines.len());
    for line in &lines[idx + 1..end] {
        parts.push(line.trim().to_string());
    }

    let description = parts.join("\n").trim().to_string();
    if description.is_empty() {
        None
    } else {
        Some(description)
    }
}

/// Matches a `Label: value` line. The label may be wrapped in emphasis
/// markers (`**Goal:**`, `*Steps*:`) and is case-insensitive. Returns the
/// trimmed text after the colon.
fn label_value(line: &str, labels: &[&str]) -> Option<String> {
    let stripped = line.trim().trim_start_matches(['*', '_']);
    for label in labels {
        let Some(prefix) = stripped.get(..label.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(label) {
            continue;
        }
        let rest = stripped[label.len()..].trim_start_matches(['*', '_']);
        let Some(after_colon) = rest.strip_prefix(':') else {
            continue;
        };
        let value = after_colon
            .trim()
            .trim_start_matches(['*', '_'])
            .trim_end_matches(['*', '_'])
            .trim();
        return Some(value.to_string());
    }
    None
}

/// Matches a numbered (`1. text`) or bulleted (`- text` / `* text`) list
/// line and returns the trimmed text after the marker.
fn list_item(line: &str) -> Option<String> {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix('-').or_else(|| trimmed.strip_prefix('*')) {
        if rest.starts_with(char::is_whitespace) {
            let rest = rest.trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
        return None;
    }

    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = trimmed[digits..].strip_prefix('.')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

/// True when a candidate step line merely repeats the goal title or
/// description: an exact case-insensitive match, or a containment when the
/// echoed text is longer than 5 characters. Guards against re-capturing the
/// goal or description as a spurious step when no label boundary existed.
fn echoes(candidate: &str, reference_lower: &str) -> bool {
    let candidate_lower = candidate.to_lowercase();
    if candidate_lower == reference_lower {
        return true;
    }
    reference_lower.len() > 5 && candidate_lower.contains(reference_lower)
}
