//! Synthetic match logs for exercising the analyzer without live data

use crate::events::{sort_events, Event};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

const WEAPONS: [&str; 10] = [
    "Vandal", "Phantom", "Operator", "Spectre", "Bulldog", "Sheriff", "Ghost", "Classic", "Judge",
    "Marshal",
];
const ATTACKERS: [&str; 5] = ["You", "Teammate1", "Teammate2", "Teammate3", "Teammate4"];
const DEFENDERS: [&str; 5] = ["Enemy1", "Enemy2", "Enemy3", "Enemy4", "Enemy5"];
const MAPS: [&str; 10] = [
    "Ascent", "Bind", "Haven", "Split", "Icebox", "Breeze", "Fracture", "Lotus", "Sunset", "Abyss",
];
const QUEUES: [&str; 4] = ["unrated", "competitive", "swiftplay", "spikerush"];

const PLANT_CHANCE: f64 = 0.7;
const DEFUSE_CHANCE: f64 = 0.35;

pub const DEFAULT_ROUNDS: u32 = 8;

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    // Every pool here is a non-empty const array
    items.choose(rng).copied().unwrap_or_default()
}

/// Generate a match of `rounds` rounds ending near the current time.
///
/// The same `seed` always yields the same events apart from the base
/// timestamp.
pub fn generate(rounds: u32, seed: Option<u64>) -> Vec<Event> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    generate_with(rounds, rng, Utc::now())
}

/// Generate a match whose start lies 20 to 35 minutes before `now`.
pub fn generate_with(rounds: u32, mut rng: StdRng, now: DateTime<Utc>) -> Vec<Event> {
    let start = now - Duration::minutes(rng.gen_range(20..=35));
    let map_id = pick(&mut rng, &MAPS);
    let queue_id = pick(&mut rng, &QUEUES);
    let match_id = format!("FAKE-{}", rng.gen_range(100_000..=999_999));

    let mut events = vec![Event::new(
        Some(iso(start).as_str()),
        "SYSTEM",
        "match_start",
        queue_id,
    )
    .with_meta("mapId", map_id)
    .with_meta("matchId", match_id.as_str())];

    let mut t = start;
    let mut attack_score = 0u32;
    let mut defense_score = 0u32;

    for round in 1..=rounds {
        t += Duration::seconds(rng.gen_range(10..=20));

        let planted = rng.gen_bool(PLANT_CHANCE);
        if planted {
            t += Duration::seconds(rng.gen_range(12..=30));
            events.push(
                Event::new(Some(iso(t).as_str()), pick(&mut rng, &ATTACKERS), "plant", "Spike")
                    .with_meta("roundNum", round),
            );
        }

        for _ in 0..rng.gen_range(1..=4) {
            t += Duration::seconds(rng.gen_range(4..=12));
            let (killers, victims) = if rng.gen_bool(0.5) {
                (&ATTACKERS, &DEFENDERS)
            } else {
                (&DEFENDERS, &ATTACKERS)
            };
            let killer = pick(&mut rng, killers);
            let victim = pick(&mut rng, victims);
            let weapon = pick(&mut rng, &WEAPONS);
            events.push(
                Event::new(Some(iso(t).as_str()), killer, "kill", victim)
                    .with_meta("weapon", weapon)
                    .with_meta("roundNum", round),
            );
        }

        let defused = planted && rng.gen_bool(DEFUSE_CHANCE);
        if defused {
            t += Duration::seconds(rng.gen_range(5..=12));
            events.push(
                Event::new(Some(iso(t).as_str()), pick(&mut rng, &DEFENDERS), "defuse", "Spike")
                    .with_meta("roundNum", round),
            );
        }

        // A plant that stands wins for attackers; no plant is a coin flip
        let attackers_win = match (planted, defused) {
            (true, false) => true,
            (_, true) => false,
            (false, false) => rng.gen_bool(0.5),
        };
        if attackers_win {
            attack_score += 1;
        } else {
            defense_score += 1;
        }

        t += Duration::seconds(rng.gen_range(6..=15));
    }

    t += Duration::seconds(5);
    events.push(
        Event::new(Some(iso(t).as_str()), "SYSTEM", "match_end", match_id).with_meta(
            "teams",
            json!([
                {"teamId": "Attackers", "score": attack_score},
                {"teamId": "Defenders", "score": defense_score}
            ]),
        ),
    );

    sort_events(&mut events);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::shrink_events;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn sample(rounds: u32, seed: u64) -> Vec<Event> {
        generate_with(rounds, StdRng::seed_from_u64(seed), fixed_now())
    }

    #[test]
    fn test_same_seed_same_log() {
        let a = serde_json::to_string(&sample(8, 42)).unwrap();
        let b = serde_json::to_string(&sample(8, 42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bracketed_by_match_start_and_end() {
        let events = sample(8, 7);
        let first = events.first().unwrap();
        let last = events.last().unwrap();
        assert_eq!(first.action, "match_start");
        assert_eq!(first.actor, "SYSTEM");
        assert!(first.meta.contains_key("mapId"));
        assert_eq!(last.action, "match_end");
        assert_eq!(last.target, first.meta["matchId"].as_str().unwrap());
    }

    #[test]
    fn test_scores_sum_to_rounds() {
        let events = sample(12, 3);
        let teams = events.last().unwrap().meta["teams"].as_array().unwrap().clone();
        let total: u64 = teams.iter().map(|t| t["score"].as_u64().unwrap()).sum();
        assert_eq!(total, 12);
    }

    #[test]
    fn test_rounds_are_well_formed() {
        let events = sample(10, 99);
        for round in 1..=10u64 {
            let in_round: Vec<&Event> = events
                .iter()
                .filter(|e| e.meta.get("roundNum").and_then(|v| v.as_u64()) == Some(round))
                .collect();
            let kills = in_round.iter().filter(|e| e.action == "kill").count();
            let plants = in_round.iter().filter(|e| e.action == "plant").count();
            let defuses = in_round.iter().filter(|e| e.action == "defuse").count();
            assert!((1..=4).contains(&kills));
            assert!(plants <= 1);
            assert!(defuses <= plants);
        }
        assert!(events
            .iter()
            .filter(|e| e.action == "kill")
            .all(|e| e.meta.contains_key("weapon")));
    }

    #[test]
    fn test_timestamps_increase_and_start_before_now() {
        let events = sample(8, 5);
        let stamps: Vec<DateTime<Utc>> = events.iter().map(|e| e.timestamp().unwrap()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        let lead = fixed_now() - stamps[0];
        assert!(lead >= Duration::minutes(20) && lead <= Duration::minutes(35));
    }

    #[test]
    fn test_zero_rounds_is_start_and_end_only() {
        let events = sample(0, 1);
        let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["match_start", "match_end"]);
    }

    #[test]
    fn test_long_match_shrinks_with_protected_events() {
        let events = sample(40, 11);
        let shrunk = shrink_events(&events, 40);
        assert_eq!(shrunk.len(), 40);
        assert_eq!(shrunk[0].action, "match_start");
    }
}
