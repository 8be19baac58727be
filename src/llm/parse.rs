//! Recovering a report wrapper from raw model text
//!
//! The model is asked for `{"json": {...}}` but sometimes fences it in
//! markdown, adds prose, returns the bare report, emits several drafts, or
//! runs out of output tokens mid-object. [`recover_wrapper`] tries
//! progressively looser strategies and stops at the first one that yields a
//! wrapper.
//!
//! Brace matching here counts `{` and `}` without tracking string
//! literals, so braces inside quoted values can shift span boundaries.

use super::repair::repair_truncated_json;
use crate::report::{Wrapper, REPORT_FIELDS, WRAPPER_KEY};
use crate::util::truncate;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Strip markdown code fences from a response
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if trimmed.starts_with("```json") {
        trimmed.strip_prefix("```json").unwrap_or(trimmed)
    } else if trimmed.starts_with("```") {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    } else {
        trimmed
    };
    let clean = if clean.ends_with("```") {
        clean.strip_suffix("```").unwrap_or(clean)
    } else {
        clean
    };
    clean.trim()
}

/// First top-level brace-balanced block in `text`, fences removed.
///
/// When no block closes (truncated output) the fence-stripped text is
/// returned as-is; it will not parse and needs [`repair_truncated_json`].
pub fn extract_first_json(text: &str) -> &str {
    let clean = strip_markdown_fences(text);
    let Some(start) = clean.find('{') else {
        return clean;
    };

    let mut depth: usize = 0;
    for (i, c) in clean[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return &clean[start..=start + i];
                }
            }
            _ => {}
        }
    }
    clean
}

/// Every complete top-level brace-balanced block, in order of appearance.
///
/// Fence markers anywhere in the text are removed first. Stray `}` at depth
/// zero are ignored.
pub fn extract_all_json(text: &str) -> Vec<String> {
    let clean = text.trim().replace("```json", "").replace("```", "");

    let mut blocks = Vec::new();
    let mut depth: usize = 0;
    let mut start = None;

    for (i, c) in clean.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        blocks.push(clean[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    blocks
}

/// Wrap a bare report (all report fields, no `json` key) as `{"json": ...}`.
/// Anything else is returned unchanged.
pub fn wrap_if_needed(value: Value) -> Value {
    match value {
        Value::Object(obj)
            if !obj.contains_key(WRAPPER_KEY)
                && REPORT_FIELDS.iter().all(|k| obj.contains_key(*k)) =>
        {
            let mut wrapper = Map::new();
            wrapper.insert(WRAPPER_KEY.to_string(), Value::Object(obj));
            Value::Object(wrapper)
        }
        other => other,
    }
}

/// 2 points for a `json` key, plus 1 per report field on the report root.
pub fn score_candidate(value: &Value) -> u32 {
    let Some(obj) = value.as_object() else {
        return 0;
    };

    let mut score = 0;
    let root = match obj.get(WRAPPER_KEY) {
        Some(inner) => {
            score += 2;
            inner
        }
        None => value,
    };
    if let Some(root) = root.as_object() {
        score += REPORT_FIELDS
            .iter()
            .filter(|k| root.contains_key(**k))
            .count() as u32;
    }
    score
}

/// Parse each candidate, normalize it and return the highest scoring one.
/// Ties keep the earliest candidate; unparseable candidates are skipped.
pub fn pick_best_candidate(candidates: &[String]) -> Option<Value> {
    let mut best: Option<(u32, Value)> = None;

    for candidate in candidates {
        let Ok(parsed) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        let normalized = wrap_if_needed(parsed);
        let score = score_candidate(&normalized);
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, normalized));
        }
    }

    best.map(|(_, value)| value)
}

// ═══════════════════════════════════════════════════════════════════════════
//  RECOVERY LADDER
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    /// The whole response parsed as-is
    Direct,
    /// First balanced block after fence stripping
    FirstBlock,
    /// Best scoring of all balanced blocks
    Candidates,
    /// Quote/bracket/brace balancing of the first block
    Repair,
}

impl RecoveryStage {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryStage::Direct => "direct",
            RecoveryStage::FirstBlock => "first-block",
            RecoveryStage::Candidates => "candidates",
            RecoveryStage::Repair => "repair",
        }
    }
}

impl fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: RecoveryStage,
    pub reason: String,
}

/// Every stage of the ladder failed for one response.
#[derive(Debug, Error)]
#[error("no recovery stage produced a report wrapper ({})", summarize(.failures))]
pub struct RecoveryFailure {
    pub failures: Vec<StageFailure>,
}

fn summarize(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.stage, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A wrapper plus the stage that produced it
#[derive(Debug, Clone)]
pub struct Recovered {
    pub wrapper: Wrapper,
    pub stage: RecoveryStage,
}

fn accept(value: Value) -> Result<Wrapper, String> {
    Wrapper::from_value(wrap_if_needed(value))
        .ok_or_else(|| format!("no `{}` object at the top level", WRAPPER_KEY))
}

fn parse_and_accept(text: &str) -> Result<Wrapper, String> {
    let value = serde_json::from_str::<Value>(text).map_err(|e| e.to_string())?;
    accept(value)
}

fn run_stage(raw: &str, stage: RecoveryStage) -> Result<Wrapper, String> {
    match stage {
        RecoveryStage::Direct => parse_and_accept(raw),
        RecoveryStage::FirstBlock => parse_and_accept(extract_first_json(raw)),
        RecoveryStage::Candidates => {
            let candidates = extract_all_json(raw);
            if candidates.is_empty() {
                return Err("no balanced blocks".to_string());
            }
            let best = pick_best_candidate(&candidates)
                .ok_or_else(|| format!("none of {} blocks parsed", candidates.len()))?;
            accept(best)
        }
        RecoveryStage::Repair => {
            let value =
                repair_truncated_json(extract_first_json(raw)).map_err(|e| e.to_string())?;
            accept(value)
        }
    }
}

/// Run the recovery ladder over one raw model response.
///
/// Stages run in order (direct parse, first block, candidate scoring,
/// repair) and the first that yields a `{"json": {...}}` wrapper wins.
pub fn recover_wrapper(raw: &str) -> Result<Recovered, RecoveryFailure> {
    const LADDER: [RecoveryStage; 4] = [
        RecoveryStage::Direct,
        RecoveryStage::FirstBlock,
        RecoveryStage::Candidates,
        RecoveryStage::Repair,
    ];

    let mut failures = Vec::new();
    for stage in LADDER {
        match run_stage(raw, stage) {
            Ok(wrapper) => {
                info!(stage = stage.name(), "recovered report wrapper");
                return Ok(Recovered { wrapper, stage });
            }
            Err(reason) => {
                debug!(stage = stage.name(), reason = %truncate(&reason, 200), "recovery stage failed");
                failures.push(StageFailure { stage, reason });
            }
        }
    }
    Err(RecoveryFailure { failures })
}
