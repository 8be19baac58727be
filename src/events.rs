//! Match event log: loading, ordering, and downsampling for the prompt

use crate::error::InputError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Read;

/// Source argument that selects standard input instead of a file
pub const STDIN_SOURCE: &str = "-";

/// Actions that survive downsampling regardless of position
pub const PROTECTED_ACTIONS: [&str; 4] = ["match_start", "match_end", "plant", "defuse"];

/// One timestamped occurrence in a match log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// ISO-8601 timestamp; `None` for synthetic markers such as separators
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    pub fn new(
        ts: Option<&str>,
        actor: impl Into<String>,
        action: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            ts: ts.map(str::to_string),
            actor: actor.into(),
            action: action.into(),
            target: target.into(),
            meta: serde_json::Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Parsed timestamp. Missing or unparseable values yield `None`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.ts.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        // Offset-less timestamps are read as UTC
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Ascending order with absent timestamps last
    fn sort_key(&self) -> (bool, Option<DateTime<Utc>>) {
        let ts = self.timestamp();
        (ts.is_none(), ts)
    }

    pub fn is_protected(&self) -> bool {
        PROTECTED_ACTIONS.contains(&self.action.as_str())
    }

    fn identity(&self) -> (Option<&str>, &str, &str, &str) {
        (
            self.ts.as_deref(),
            self.actor.as_str(),
            self.action.as_str(),
            self.target.as_str(),
        )
    }
}

/// Stable sort by timestamp; events without a usable timestamp go last.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_cached_key(Event::sort_key);
}

/// Read a JSON event array from a file, or from stdin when `source` is `-`,
/// and return it in chronological order.
pub fn load_events(source: &str) -> Result<Vec<Event>, InputError> {
    let raw = if source == STDIN_SOURCE {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|error| InputError::Read {
                source_name: "<stdin>".to_string(),
                error,
            })?;
        buf
    } else {
        fs::read_to_string(source).map_err(|error| InputError::Read {
            source_name: source.to_string(),
            error,
        })?
    };
    parse_events(&raw, source)
}

/// Decode and sort an event array already held in memory.
pub fn parse_events(raw: &str, source_name: &str) -> Result<Vec<Event>, InputError> {
    let mut events: Vec<Event> =
        serde_json::from_str(raw).map_err(|error| InputError::Parse {
            source_name: source_name.to_string(),
            error,
        })?;
    sort_events(&mut events);
    Ok(events)
}

/// Reduce an event log to at most `max_items` entries.
///
/// Keeps the first and last `max_items / 2` events plus every protected
/// action, drops duplicates by `(ts, actor, action, target)` keeping the
/// first occurrence, re-sorts chronologically and truncates to `max_items`.
/// The final truncation can drop protected events when there are more of
/// them than fit; the size ceiling wins.
pub fn shrink_events(events: &[Event], max_items: usize) -> Vec<Event> {
    if events.len() <= max_items {
        return events.to_vec();
    }

    let half = max_items / 2;
    let head = &events[..half];
    let tail = &events[events.len() - half..];
    let protected = events.iter().filter(|e| e.is_protected());

    let mut seen = HashSet::new();
    let mut merged: Vec<Event> = head
        .iter()
        .chain(protected)
        .chain(tail.iter())
        .filter(|&e| seen.insert(e.identity()))
        .cloned()
        .collect();

    sort_events(&mut merged);
    merged.truncate(max_items);
    merged
}
