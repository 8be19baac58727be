//! Structured coaching report returned by the model
//!
//! The model must answer with a wrapper object `{"json": <report>}`.
//! [`Wrapper`] holds that envelope after recovery; [`Report`] is the typed
//! form that gets written out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level key the model must nest the report under
pub const WRAPPER_KEY: &str = "json";

/// Fields every bare report carries
pub const REPORT_FIELDS: [&str; 4] = ["story", "coaching", "highlights", "metrics"];

pub const EXPECTED_STRENGTHS: usize = 2;
pub const EXPECTED_MISTAKES: usize = 2;
pub const EXPECTED_CHECKLIST: usize = 3;
pub const MAX_HIGHLIGHTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub story: String,
    pub coaching: Coaching,
    pub highlights: Vec<Highlight>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coaching {
    pub strengths: Vec<String>,
    pub mistakes: Vec<Mistake>,
    pub checklist: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mistake {
    pub issue: String,
    pub fix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub ts: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_num: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub kills: u32,
    pub plants: u32,
    pub defuses: u32,
    pub rounds: u32,
}

impl Report {
    /// Deviations from the field counts the prompt asks for.
    ///
    /// These are prompt guidance, so callers log them instead of rejecting
    /// the report.
    pub fn shape_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let c = &self.coaching;
        if c.strengths.len() != EXPECTED_STRENGTHS {
            warnings.push(format!(
                "expected {} strengths, got {}",
                EXPECTED_STRENGTHS,
                c.strengths.len()
            ));
        }
        if c.mistakes.len() != EXPECTED_MISTAKES {
            warnings.push(format!(
                "expected {} mistakes, got {}",
                EXPECTED_MISTAKES,
                c.mistakes.len()
            ));
        }
        if c.checklist.len() != EXPECTED_CHECKLIST {
            warnings.push(format!(
                "expected {} checklist items, got {}",
                EXPECTED_CHECKLIST,
                c.checklist.len()
            ));
        }
        if self.highlights.len() > MAX_HIGHLIGHTS {
            warnings.push(format!(
                "expected at most {} highlights, got {}",
                MAX_HIGHLIGHTS,
                self.highlights.len()
            ));
        }
        warnings
    }
}

/// A recovered `{"json": {...}}` envelope whose inner value is an object.
#[derive(Debug, Clone, PartialEq)]
pub struct Wrapper {
    body: Map<String, Value>,
}

impl Wrapper {
    /// Accepts only objects whose `json` member is itself an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(mut root) => match root.remove(WRAPPER_KEY) {
                Some(Value::Object(body)) => Some(Self { body }),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_report(self) -> Result<Report, serde_json::Error> {
        serde_json::from_value(Value::Object(self.body))
    }
}
