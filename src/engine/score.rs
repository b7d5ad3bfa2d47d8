//! Score parsing: per-set game counts, active set and set wins.
//!
//! Everything here fails soft. A field that cannot be read becomes 0 or
//! "absent"; nothing returns an error.

use serde_json::Value;

use crate::db::models::{MatchSnapshot, Side};

pub const MAX_SETS: usize = 5;

/// Parse a single per-set game count as delivered by a feed.
///
/// * `null`, missing or empty string → `None` (set not reached)
/// * numbers → their integer value (negative / non-finite → 0)
/// * strings → the leading digit run (`"7(5)"` → 7), non-numeric → 0
pub fn parse_game_count(raw: &Value) -> Option<u32> {
    match raw {
        Value::Null => None,
        Value::Number(n) => {
            let v = n
                .as_u64()
                .map(|u| u.min(u32::MAX as u64) as u32)
                .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f as u32))
                .unwrap_or(0);
            Some(v)
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == "-" {
                return None;
            }
            let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
            Some(digits.parse().unwrap_or(0))
        }
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => Some(0),
    }
}

/// Parse a "Set N" style token out of a status string.
/// Accepts "Set 2", "set2", "2nd set", "3rd Set", "S2". Returns 1..=5.
pub fn parse_set_token(status: &str) -> Option<u8> {
    let lower = status.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_' || c == ',')
        .filter(|w| !w.is_empty())
        .collect();

    let in_range = |n: u32| (1..=MAX_SETS as u32).contains(&n).then_some(n as u8);
    let leading_number = |w: &str| -> Option<u32> {
        let digits: String = w.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    };

    for (i, word) in words.iter().enumerate() {
        // "set 2" / "set2" / "s2"
        if let Some(rest) = word.strip_prefix("set") {
            if let Some(n) = leading_number(rest).and_then(in_range) {
                return Some(n);
            }
            if rest.is_empty() {
                if let Some(n) = words.get(i + 1).and_then(|w| leading_number(w)).and_then(in_range) {
                    return Some(n);
                }
                // "2nd set"
                if i > 0 {
                    if let Some(n) = leading_number(words[i - 1]).and_then(in_range) {
                        return Some(n);
                    }
                }
            }
        } else if let Some(rest) = word.strip_prefix('s') {
            if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                if let Some(n) = leading_number(rest).and_then(in_range) {
                    return Some(n);
                }
            }
        }
    }
    None
}

const LIVE_MARKERS: [&str; 8] = [
    "live",
    "in progress",
    "inprogress",
    "set",
    "playing",
    "tiebreak",
    "tie-break",
    "break",
];

const CLOSED_MARKERS: [&str; 11] = [
    "not started",
    "scheduled",
    "finished",
    "ended",
    "retired",
    "walkover",
    "cancelled",
    "canceled",
    "suspended",
    "interrupted",
    "postponed",
];

/// Whether a status string describes a match currently in play.
pub fn is_live(status: &str) -> bool {
    let s = status.trim().to_lowercase();
    if s.is_empty() || CLOSED_MARKERS.iter().any(|m| s.contains(m)) {
        return false;
    }
    LIVE_MARKERS.iter().any(|m| s.contains(m))
}

/// Structured integer view of the match score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreLine {
    /// 1-based active set, 0 = unknown / not started
    pub current_set: u8,
    /// Games per set as (A, B); unplayed sets are (0, 0)
    pub games: [(u32, u32); MAX_SETS],
    /// Completed sets won as (A, B)
    pub set_wins: (u32, u32),
}

impl ScoreLine {
    pub fn parse(snapshot: &MatchSnapshot) -> Self {
        let a = &snapshot.player(Side::A).sets;
        let b = &snapshot.player(Side::B).sets;

        let mut games = [(0u32, 0u32); MAX_SETS];
        let mut highest = 0u8;
        for i in 0..MAX_SETS {
            if a[i].is_some() || b[i].is_some() {
                highest = (i + 1) as u8;
            }
            games[i] = (a[i].unwrap_or(0), b[i].unwrap_or(0));
        }

        let current_set = if highest > 0 {
            highest
        } else {
            parse_set_token(&snapshot.status).unwrap_or(0)
        };

        let mut set_wins = (0u32, 0u32);
        let completed = (current_set as usize).saturating_sub(1).min(MAX_SETS);
        for &(ga, gb) in games.iter().take(completed) {
            if ga > gb {
                set_wins.0 += 1;
            } else if gb > ga {
                set_wins.1 += 1;
            }
        }

        ScoreLine {
            current_set,
            games,
            set_wins,
        }
    }

    /// Games in the active set as (A, B); (0, 0) when the set is unknown.
    pub fn current_games(&self) -> (u32, u32) {
        match self.current_set {
            0 => (0, 0),
            n => self.games[(n as usize - 1).min(MAX_SETS - 1)],
        }
    }

    pub fn total_games_in_set(&self) -> u32 {
        let (a, b) = self.current_games();
        a + b
    }

    /// A − B in the active set
    pub fn game_differential(&self) -> i32 {
        let (a, b) = self.current_games();
        a as i32 - b as i32
    }

    /// A − B in completed sets
    pub fn set_differential(&self) -> i32 {
        self.set_wins.0 as i32 - self.set_wins.1 as i32
    }
}
