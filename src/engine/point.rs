//! Point-level context: deuce / advantage / tie-break / break-point flags and
//! the trading-window gate.

use serde::Serialize;

use crate::db::models::{MatchSnapshot, Side};

use super::score::ScoreLine;

/// Maximum absolute confidence nudge from point pressure.
pub const MAX_NUDGE: f64 = 0.05;
const BREAK_POINT_NUDGE: f64 = 0.05;
const GAME_POINT_NUDGE: f64 = 0.02;

/// The set in which actionable labels may be issued.
pub const WINDOW_SET: u8 = 2;
/// Inclusive range of total games in the window set.
pub const WINDOW_GAMES: (u32, u32) = (3, 6);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointState {
    Normal,
    Deuce,
    AdvA,
    AdvB,
}

/// Map a single point token onto the 0/15/30/40/Ad ladder (0..=4).
/// Unknown tokens count as 0.
pub fn ladder_value(token: &str) -> u8 {
    match token.trim().to_uppercase().as_str() {
        "0" | "00" | "LOVE" => 0,
        "15" => 1,
        "30" => 2,
        "40" => 3,
        "A" | "AD" | "ADV" | "AV" => 4,
        _ => 0,
    }
}

/// Parse a point score string such as `"30-40"`, `"AD:40"` or `"deuce"`.
pub fn parse_point_score(raw: &str) -> (u8, u8) {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("deuce") {
        return (3, 3);
    }
    let mut parts = trimmed
        .split(|c: char| c == '-' || c == ':' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty());
    let a = parts.next().map(ladder_value).unwrap_or(0);
    let b = parts.next().map(ladder_value).unwrap_or(0);
    (a, b)
}

/// Best-effort server detection: explicit feed flag first, then game parity
/// in the active set assuming side A served the opening game.
pub fn server_side(snapshot: &MatchSnapshot, total_games_in_set: u32) -> Side {
    match (
        snapshot.player(Side::A).serving,
        snapshot.player(Side::B).serving,
    ) {
        (Some(true), _) => Side::A,
        (_, Some(true)) => Side::B,
        (Some(false), None) => Side::B,
        (None, Some(false)) => Side::A,
        _ => {
            if total_games_in_set % 2 == 0 {
                Side::A
            } else {
                Side::B
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointContext {
    pub points: (u8, u8),
    pub state: PointState,
    pub server: Side,
    pub tie_break: bool,
    /// Break point held by side A (receiving) / side B (receiving)
    pub break_point_a: bool,
    pub break_point_b: bool,
    /// Server holds a game point
    pub server_game_point: bool,
    pub in_window: bool,
    /// Confidence shift toward side A in [-0.05, 0.05]
    pub nudge: f64,
}

impl PointContext {
    pub fn analyze(snapshot: &MatchSnapshot, score: &ScoreLine) -> Self {
        let (ga, gb) = score.current_games();
        let total_in_set = ga + gb;
        let tie_break = score.current_set > 0 && ga >= 6 && gb >= 6;

        let points = if tie_break {
            // tie-break counts are not on the 0/15/30/40 ladder
            (0, 0)
        } else {
            parse_point_score(&snapshot.point_score)
        };
        let (pa, pb) = points;

        let state = match (pa, pb) {
            (3, 3) | (4, 4) => PointState::Deuce,
            (4, 3) => PointState::AdvA,
            (3, 4) => PointState::AdvB,
            _ => PointState::Normal,
        };

        let server = server_side(snapshot, total_in_set);
        let game_point = |mine: u8, theirs: u8| mine >= 3 && mine > theirs;
        let a_gp = game_point(pa, pb);
        let b_gp = game_point(pb, pa);
        let (break_point_a, break_point_b, server_game_point) = match server {
            Side::A => (false, b_gp, a_gp),
            Side::B => (a_gp, false, b_gp),
        };

        let mut nudge = 0.0;
        if break_point_a {
            nudge += BREAK_POINT_NUDGE;
        }
        if break_point_b {
            nudge -= BREAK_POINT_NUDGE;
        }
        if server_game_point {
            nudge += match server {
                Side::A => GAME_POINT_NUDGE,
                Side::B => -GAME_POINT_NUDGE,
            };
        }
        let nudge = nudge.clamp(-MAX_NUDGE, MAX_NUDGE);

        let in_window = score.current_set == WINDOW_SET
            && (WINDOW_GAMES.0..=WINDOW_GAMES.1).contains(&total_in_set)
            && !tie_break;

        PointContext {
            points,
            state,
            server,
            tie_break,
            break_point_a,
            break_point_b,
            server_game_point,
            in_window,
            nudge,
        }
    }

    pub fn is_break_point(&self) -> bool {
        self.break_point_a || self.break_point_b
    }

    pub fn is_deuce_or_advantage(&self) -> bool {
        self.state != PointState::Normal
    }
}
