use crate::events::Event;

pub const ANALYST_SYSTEM: &str = r#"You are a VALORANT match log analyst and coach.
The input is a chronological array of events, each shaped as {ts, actor, action, target, meta}.
Give concise, practical advice in {language}.
Output ONLY a JSON object with a single top-level key "json". No other text."#;

/// Appended to the system prompt on the compact retry
pub const NO_FENCES_RULE: &str =
    "Return exactly one JSON object. Do not use code fences or add any explanation.";

const OUTPUT_SHAPE: &str = r#"{
  "json": {
    "story": "<paragraphs>",
    "coaching": {
      "strengths": ["...", "..."],
      "mistakes": [{"issue":"...","fix":"..."}, {"issue":"...","fix":"..."}],
      "checklist": ["...", "...", "..."]
    },
    "highlights": [{"ts":"...","label":"...","roundNum":1}],
    "metrics": {"kills":0,"plants":0,"defuses":0,"rounds":0}
  }
}"#;

/// Prompt variant. `Compact` asks for less text after a response could not
/// be recovered, which usually means it was cut off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptProfile {
    Full,
    Compact,
}

struct Limits {
    story: &'static str,
    strengths: &'static str,
    mistakes: &'static str,
    checklist: &'static str,
    highlights: &'static str,
}

impl PromptProfile {
    fn limits(&self) -> Limits {
        match self {
            PromptProfile::Full => Limits {
                story: "2-3 paragraphs",
                strengths: "2 items",
                mistakes: "2 items (cause and alternative, one sentence each)",
                checklist: "3 items (short imperative, a few words)",
                highlights: "at most 2",
            },
            PromptProfile::Compact => Limits {
                story: "2 paragraphs",
                strengths: "2 items (about 3 words each)",
                mistakes: "2 items (one sentence each, under 8 words)",
                checklist: "3 items (about 3 words each)",
                highlights: "at most 1",
            },
        }
    }
}

pub fn system_prompt(profile: PromptProfile, language: &str) -> String {
    let base = ANALYST_SYSTEM.replace("{language}", language);
    match profile {
        PromptProfile::Full => base,
        PromptProfile::Compact => format!("{}\n\n{}", base, NO_FENCES_RULE),
    }
}

pub fn user_prompt(
    events: &[Event],
    profile: PromptProfile,
) -> Result<String, serde_json::Error> {
    let limits = profile.limits();
    let events_json = serde_json::to_string_pretty(events)?;

    Ok(format!(
        r#"Below is a VALORANT match event log.

Event schema:
- ts: ISO8601 timestamp or null
- actor: who acted (player name or SYSTEM)
- action: one of match_start, match_end, plant, defuse, kill, separator, ...
- target: what was acted on (a player, the Spike, ...)
- meta: extra details (weapon, roundNum, mapId, ...)

Requirements:
1) story: {story} narrative summary (calm tone, no exaggeration, avoid assumptions not in the log)
2) coaching:
   - strengths: {strengths}
   - mistakes: {mistakes}
   - checklist: {checklist}
3) highlights: key moments, {highlights} [{{ts, label, roundNum?, actor?, target?}}]
4) metrics: simple estimates of kills/plants/defuses/rounds

Output format (strict):
{shape}

Events:
{events_json}
"#,
        story = limits.story,
        strengths = limits.strengths,
        mistakes = limits.mistakes,
        checklist = limits.checklist,
        highlights = limits.highlights,
        shape = OUTPUT_SHAPE,
    ))
}
