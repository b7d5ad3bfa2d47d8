use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One side of a two-way tennis market. `A` is the first player listed by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

/// Two-way decimal odds. Both prices are finite and strictly above 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsPair {
    pub a: f64,
    pub b: f64,
}

impl OddsPair {
    /// Returns `None` unless both prices are usable decimal odds.
    pub fn new(a: f64, b: f64) -> Option<Self> {
        let valid = |x: f64| x.is_finite() && x > 1.0;
        if valid(a) && valid(b) {
            Some(OddsPair { a, b })
        } else {
            None
        }
    }

    pub fn get(&self, side: Side) -> f64 {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }

    /// Market favourite (shorter price); ties go to side A.
    pub fn favourite(&self) -> Side {
        if self.b < self.a {
            Side::B
        } else {
            Side::A
        }
    }
}

/// Per-player slice of a live snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    /// Games won in sets 1–5. `None` = set not reached / no score published.
    pub sets: [Option<u32>; 5],
    /// Explicit serve indicator from the feed, when available
    pub serving: Option<bool>,
    /// Service-hold rate in [0, 1]
    pub hold_pct: Option<f64>,
    /// Recent-results win rate in [0, 1]
    pub form: Option<f64>,
}

/// Normalized live match state as produced by the feed adapter.
/// Immutable per poll; a newer snapshot with the same id supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub id: String,
    pub players: [PlayerRecord; 2],
    pub status: String,
    /// Current point score, e.g. "30-40" or "AD-40"
    pub point_score: String,
    pub surface: String,
    pub category: String,
    pub odds: Option<OddsPair>,
}

impl MatchSnapshot {
    pub fn player(&self, side: Side) -> &PlayerRecord {
        &self.players[side.index()]
    }

    pub fn display_name(&self) -> String {
        format!("{} vs {}", self.players[0].name, self.players[1].name)
    }
}

/// Advisory label. The first four are informational badges for matches
/// that are not live; the last three are the trading outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Pending,
    Set1,
    Set2,
    Set3Plus,
    Avoid,
    Risky,
    Safe,
}

impl Label {
    /// Labels that carry a stake recommendation
    pub fn is_actionable(self) -> bool {
        matches!(self, Label::Safe | Label::Risky)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Pending => "PENDING",
            Label::Set1 => "SET1",
            Label::Set2 => "SET2",
            Label::Set3Plus => "SET3_PLUS",
            Label::Avoid => "AVOID",
            Label::Risky => "RISKY",
            Label::Safe => "SAFE",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Label::Pending),
            "SET1" => Ok(Label::Set1),
            "SET2" => Ok(Label::Set2),
            "SET3_PLUS" => Ok(Label::Set3Plus),
            "AVOID" => Ok(Label::Avoid),
            "RISKY" => Ok(Label::Risky),
            "SAFE" => Ok(Label::Safe),
            other => Err(format!("unknown label '{}'", other)),
        }
    }
}

/// Where the baseline probabilities came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbabilitySource {
    Market,
    Fallback,
}

/// Advisory output for one match in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub match_id: String,
    pub event_name: String,
    pub label: Label,
    /// Favoured side, `None` for informational badges
    pub pick: Option<Side>,
    pub confidence: f64,
    pub expected_value: f64,
    /// Dampened Kelly fraction before the adaptive cap
    pub fraction: f64,
    /// Final stake as a fraction of bankroll
    pub stake_pct: f64,
    pub prob_a: f64,
    pub prob_b: f64,
    pub volatility: f64,
    pub source: ProbabilitySource,
    pub in_window: bool,
    pub rationale: String,
    pub generated_at: DateTime<Utc>,
}

/// Settled result of a recorded advisory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeResult {
    Win,
    Loss,
    Unknown,
}

impl OutcomeResult {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeResult::Win => "win",
            OutcomeResult::Loss => "loss",
            OutcomeResult::Unknown => "unknown",
        }
    }
}

impl FromStr for OutcomeResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" | "won" | "w" => Ok(OutcomeResult::Win),
            "loss" | "lost" | "lose" | "l" => Ok(OutcomeResult::Loss),
            "unknown" | "void" | "" => Ok(OutcomeResult::Unknown),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// One row of the rolling outcome log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackLogEntry {
    pub timestamp: DateTime<Utc>,
    pub label: Label,
    pub result: OutcomeResult,
    pub confidence: f64,
    pub expected_value: f64,
    pub match_id: String,
}
