//! Feed payload → [`MatchSnapshot`].
//!
//! Live feeds disagree on almost every field name. All alias lists live here
//! so the rest of the crate only ever sees the strict internal schema.

use serde_json::Value;

use crate::db::models::{MatchSnapshot, OddsPair, PlayerRecord};
use crate::engine::score::{parse_game_count, MAX_SETS};

const ID_KEYS: &[&str] = &["id", "matchId", "match_id", "event_id", "eventId"];
const PLAYER_PAIRS: &[(&str, &str)] = &[
    ("home", "away"),
    ("player1", "player2"),
    ("p1", "p2"),
    ("playerA", "playerB"),
];
const NAME_KEYS: &[&str] = &["name", "fullName", "player", "shortName"];
const SERVE_KEYS: &[&str] = &["serve", "serving", "isServing", "server"];
const POINT_KEYS: &[&str] = &["point", "points", "pointScore", "currentPoint", "game_score"];
const PLAYER_POINT_KEYS: &[&str] = &["point", "points"];
const HOLD_KEYS: &[&str] = &["holdPct", "hold_pct", "serviceHold"];
const FORM_KEYS: &[&str] = &["form", "recentForm"];
const STATUS_KEYS: &[&str] = &["status", "statusText", "state", "matchStatus"];
const SURFACE_KEYS: &[&str] = &["surface", "ground", "court"];
const CATEGORY_KEYS: &[&str] = &["category", "tier", "tournamentCategory", "level"];
const DATE_KEYS: &[&str] = &["date", "startDate"];
const TIME_KEYS: &[&str] = &["time", "startTime"];
const BATCH_KEYS: &[&str] = &["matches", "events", "data", "results"];

/// First key whose value is present and not null.
fn first<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| obj.get(*k)).find(|v| !v.is_null())
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(v: &Value) -> Option<f64> {
    let x: Option<f64> = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    x.filter(|f| f.is_finite())
}

fn flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Some(true),
            "false" | "0" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Rates arrive either as 0–1 or as a percentage.
fn unit_rate(v: &Value) -> Option<f64> {
    let x = number(v)?;
    let x = if x > 1.0 { x / 100.0 } else { x };
    Some(x.clamp(0.0, 1.0))
}

fn text_field(obj: &Value, keys: &[&str]) -> String {
    first(obj, keys).and_then(text).unwrap_or_default()
}

fn player_name(p: &Value) -> Option<String> {
    match p {
        Value::String(_) => text(p),
        Value::Object(_) => first(p, NAME_KEYS).and_then(text),
        _ => None,
    }
}

fn player_sets(p: &Value) -> [Option<u32>; MAX_SETS] {
    let mut sets = [None; MAX_SETS];
    if let Some(arr) = p.get("sets").and_then(Value::as_array) {
        for (slot, raw) in sets.iter_mut().zip(arr.iter()) {
            *slot = parse_game_count(raw);
        }
        return sets;
    }
    for (i, slot) in sets.iter_mut().enumerate() {
        let n = i + 1;
        let keys = [format!("s{}", n), format!("set{}", n), format!("score_set{}", n)];
        *slot = keys
            .iter()
            .filter_map(|k| p.get(k.as_str()))
            .find(|v| !v.is_null())
            .and_then(parse_game_count);
    }
    sets
}

fn player_record(p: &Value) -> Option<PlayerRecord> {
    let name = player_name(p)?;
    if !p.is_object() {
        return Some(PlayerRecord {
            name,
            ..Default::default()
        });
    }
    Some(PlayerRecord {
        name,
        sets: player_sets(p),
        serving: first(p, SERVE_KEYS).and_then(flag),
        hold_pct: first(p, HOLD_KEYS).and_then(unit_rate),
        form: first(p, FORM_KEYS).and_then(unit_rate),
    })
}

fn odds(m: &Value) -> Option<OddsPair> {
    let pair = |a: Option<&Value>, b: Option<&Value>| -> Option<OddsPair> {
        OddsPair::new(number(a?)?, number(b?)?)
    };
    match m.get("odds") {
        Some(Value::Array(arr)) if arr.len() >= 2 => return pair(arr.first(), arr.get(1)),
        Some(obj @ Value::Object(_)) => {
            for (ka, kb) in [("home", "away"), ("p1", "p2"), ("a", "b"), ("player1", "player2")] {
                if let Some(o) = pair(obj.get(ka), obj.get(kb)) {
                    return Some(o);
                }
            }
            return None;
        }
        _ => {}
    }
    pair(m.get("odds1"), m.get("odds2")).or_else(|| pair(m.get("oddsA"), m.get("oddsB")))
}

fn point_score(m: &Value, pa: &Value, pb: &Value) -> String {
    if let Some(s) = first(m, POINT_KEYS).and_then(text) {
        return s;
    }
    match (first(pa, PLAYER_POINT_KEYS).and_then(text), first(pb, PLAYER_POINT_KEYS).and_then(text)) {
        (Some(a), Some(b)) => format!("{}-{}", a, b),
        _ => String::new(),
    }
}

/// Normalize one raw match object. Returns `None` unless two player names
/// can be found.
pub fn normalize_match(m: &Value) -> Option<MatchSnapshot> {
    let (raw_a, raw_b) = PLAYER_PAIRS
        .iter()
        .find_map(|(ka, kb)| Some((m.get(*ka)?, m.get(*kb)?)))?;
    let mut a = player_record(raw_a)?;
    let mut b = player_record(raw_b)?;

    // match-level server indicator: 1 / 2
    if a.serving.is_none() && b.serving.is_none() {
        if let Some(server) = m.get("server").and_then(number) {
            if server == 1.0 || server == 2.0 {
                a.serving = Some(server == 1.0);
                b.serving = Some(server == 2.0);
            }
        }
    }

    let id = first(m, ID_KEYS).and_then(text).unwrap_or_else(|| {
        format!(
            "{}|{}|{}|{}",
            a.name,
            b.name,
            text_field(m, DATE_KEYS),
            text_field(m, TIME_KEYS)
        )
        .to_lowercase()
    });

    Some(MatchSnapshot {
        id,
        point_score: point_score(m, raw_a, raw_b),
        status: text_field(m, STATUS_KEYS),
        surface: text_field(m, SURFACE_KEYS),
        category: text_field(m, CATEGORY_KEYS),
        odds: odds(m),
        players: [a, b],
    })
}

/// Normalize a whole feed response: either a bare array or an object
/// wrapping one under a common key. Unusable entries are dropped.
pub fn normalize_batch(raw: &Value) -> Vec<MatchSnapshot> {
    let items = match raw {
        Value::Array(arr) => arr.as_slice(),
        Value::Object(_) => match first(raw, BATCH_KEYS).and_then(Value::as_array) {
            Some(arr) => arr.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items.iter().filter_map(normalize_match).collect()
}
