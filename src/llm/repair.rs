//! Best-effort healing of JSON cut off by the output-token limit
//!
//! Counts quotes, brackets and braces without tracking string context, so a
//! `{` inside a string value is treated as structural. This is a heuristic
//! for machine-generated JSON, not a grammar-aware repair.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("nothing to repair")]
    Empty,
    #[error("no closing order produced valid JSON: {0}")]
    Unrepairable(#[source] serde_json::Error),
}

/// Count of `close` characters needed to balance `open` characters.
fn missing_closers(text: &str, open: char, close: char) -> usize {
    let opens = text.matches(open).count();
    let closes = text.matches(close).count();
    opens.saturating_sub(closes)
}

/// Close an unterminated string, then append missing `]` and `}`.
///
/// Tries brackets before braces first (cut off inside an array nested in an
/// object), then braces before brackets.
pub fn repair_truncated_json(fragment: &str) -> Result<Value, RepairError> {
    let mut candidate = fragment.trim().to_string();
    if candidate.is_empty() {
        return Err(RepairError::Empty);
    }

    // Escaped quotes are counted too
    if candidate.matches('"').count() % 2 == 1 {
        candidate.push('"');
    }

    let close_braces = "}".repeat(missing_closers(&candidate, '{', '}'));
    let close_brackets = "]".repeat(missing_closers(&candidate, '[', ']'));

    let brackets_first = format!("{candidate}{close_brackets}{close_braces}");
    if let Ok(value) = serde_json::from_str(&brackets_first) {
        return Ok(value);
    }

    let braces_first = format!("{candidate}{close_braces}{close_brackets}");
    serde_json::from_str(&braces_first).map_err(RepairError::Unrepairable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repairs_two_missing_braces() {
        let full = r#"{"json": {"story": "Close game", "metrics": {"kills": 4}}}"#;
        let truncated = &full[..full.len() - 2];
        let repaired = repair_truncated_json(truncated).unwrap();
        assert_eq!(repaired, serde_json::from_str::<Value>(full).unwrap());
    }

    #[test]
    fn test_repairs_cut_inside_array() {
        let repaired = repair_truncated_json(r#"{"checklist": ["Trade", "Save""#).unwrap();
        assert_eq!(repaired, json!({"checklist": ["Trade", "Save"]}));
    }

    #[test]
    fn test_closes_unterminated_string() {
        let repaired = repair_truncated_json(r#"{"json": {"story": "Round one was"#).unwrap();
        assert_eq!(repaired, json!({"json": {"story": "Round one was"}}));
    }

    #[test]
    fn test_falls_back_to_braces_first() {
        let repaired = repair_truncated_json(r#"[{"label": "Ace""#).unwrap();
        assert_eq!(repaired, json!([{"label": "Ace"}]));
    }

    #[test]
    fn test_balanced_input_parses_unchanged() {
        let repaired = repair_truncated_json(r#"  {"a": [1, 2]}  "#).unwrap();
        assert_eq!(repaired, json!({"a": [1, 2]}));
    }

    #[test]
    fn test_trailing_comma_is_not_repaired() {
        let err = repair_truncated_json(r#"{"a": 1,"#).unwrap_err();
        assert!(matches!(err, RepairError::Unrepairable(_)));
    }

    #[test]
    fn test_empty_fragment() {
        assert!(matches!(
            repair_truncated_json("   "),
            Err(RepairError::Empty)
        ));
    }
}
