//! Composite match-instability score in [0, 1].
//!
//! Seven sub-signals are each clamped to [0, 1] and combined with fixed
//! weights that sum to 1. The blend is then scaled by surface, serve
//! stability and a late-set multiplier, and clamped again. All multipliers
//! are positive, so the score is non-decreasing in every sub-signal.

use serde::Serialize;
use std::collections::BTreeMap;

use super::drift::DriftReading;
use super::point::PointContext;
use super::score::ScoreLine;

const W_PRESSURE: f64 = 0.22;
const W_LATE_SET: f64 = 0.12;
const W_TIE_BREAK: f64 = 0.12;
const W_BREAK_DENSITY: f64 = 0.14;
const W_SWING: f64 = 0.14;
const W_DRIFT: f64 = 0.14;
const W_LEVERAGE: f64 = 0.12;

/// Games in a set at which the late-set signal saturates.
const LATE_SET_GAMES: f64 = 12.0;
/// Estimated breaks at which break density saturates.
const BREAK_DENSITY_SCALE: f64 = 3.0;
/// Game-differential swing between polls at which the swing signal saturates.
const SWING_SCALE: f64 = 3.0;
/// Relative line move at which the drift signal saturates.
const DRIFT_SCALE: f64 = 0.25;

/// Tour-average service hold rate and its spread.
const HOLD_MEAN: f64 = 0.78;
const HOLD_STD: f64 = 0.08;

const CONFIDENCE_DAMPING: f64 = 0.30;
const STAKE_DAMPING: f64 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Clay,
    IndoorHard,
    Hard,
    Grass,
    Unknown,
}

impl Surface {
    pub fn parse(raw: &str) -> Surface {
        let s = raw.trim().to_lowercase();
        if s.contains("clay") {
            Surface::Clay
        } else if s.contains("grass") {
            Surface::Grass
        } else if s.contains("indoor") || s.contains("carpet") {
            Surface::IndoorHard
        } else if s.contains("hard") {
            Surface::Hard
        } else {
            Surface::Unknown
        }
    }

    /// Base volatility factor; faster courts break less predictably.
    pub fn factor(self) -> f64 {
        match self {
            Surface::Clay => 0.30,
            Surface::IndoorHard => 0.35,
            Surface::Hard => 0.40,
            Surface::Grass => 0.45,
            Surface::Unknown => 0.38,
        }
    }
}

/// Midpoint of the surface factors; deviations from it are what the surface
/// weight scales.
const SURFACE_PIVOT: f64 = 0.375;
const SURFACE_BASE: f64 = 0.70;

/// Signed surface deviation scaled by the adaptive surface weight.
pub fn surface_adjustment(surface: Surface, weight: f64) -> f64 {
    (surface.factor() - SURFACE_PIVOT) * weight
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityInputs {
    /// Point pressure in [0, 1]
    pub pressure: f64,
    pub games_in_set: u32,
    pub tie_break: bool,
    /// Estimated service breaks so far
    pub breaks: f64,
    pub swing: u32,
    pub drift_magnitude: f64,
    pub game_differential: i32,
    pub current_set: u8,
    /// Output of [`surface_adjustment`]
    pub surface_adjustment: f64,
    /// Average service hold rate of both players, when known
    pub avg_hold: Option<f64>,
}

impl VolatilityInputs {
    pub fn from_context(
        score: &ScoreLine,
        point: &PointContext,
        drift: &DriftReading,
        surface_adjustment: f64,
        avg_hold: Option<f64>,
    ) -> Self {
        VolatilityInputs {
            pressure: point_pressure(point),
            games_in_set: score.total_games_in_set(),
            tie_break: point.tie_break,
            breaks: estimated_breaks(score),
            swing: drift.swing,
            drift_magnitude: drift.magnitude(),
            game_differential: score.game_differential(),
            current_set: score.current_set,
            surface_adjustment,
            avg_hold,
        }
    }
}

/// Pressure of the current point: break point > deuce/advantage > game point.
pub fn point_pressure(point: &PointContext) -> f64 {
    if point.is_break_point() {
        1.0
    } else if point.is_deuce_or_advantage() {
        0.7
    } else if point.server_game_point {
        0.4
    } else {
        let (a, b) = point.points;
        ((a as f64 + b as f64) / 6.0).clamp(0.0, 1.0)
    }
}

/// Each game of gap beyond one in a set implies at least one break.
pub fn estimated_breaks(score: &ScoreLine) -> f64 {
    score
        .games
        .iter()
        .map(|&(a, b)| a.abs_diff(b).saturating_sub(1) as f64)
        .sum()
}

/// Serve-stability multiplier: weak holding (negative z) raises volatility.
pub fn serve_stability_multiplier(avg_hold: Option<f64>) -> f64 {
    match avg_hold.filter(|h| h.is_finite()) {
        Some(hold) => {
            let z = (hold - HOLD_MEAN) / HOLD_STD;
            (1.0 - 0.05 * z).clamp(0.85, 1.15)
        }
        None => 1.0,
    }
}

pub fn late_set_multiplier(current_set: u8) -> f64 {
    (1.0 + 0.05 * (current_set as f64 - 1.0).max(0.0)).min(1.20)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolatilityResult {
    pub value: f64,
    pub confidence_multiplier: f64,
    /// Reported alongside the Kelly damper; not applied a second time
    pub stake_multiplier: f64,
    pub breakdown: BTreeMap<&'static str, f64>,
}

pub fn score(inputs: &VolatilityInputs) -> VolatilityResult {
    let unit = |x: f64| if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 };

    let pressure = unit(inputs.pressure);
    let late_set = unit(inputs.games_in_set as f64 / LATE_SET_GAMES);
    let tie_break = if inputs.tie_break { 1.0 } else { 0.0 };
    let break_density = unit(inputs.breaks / BREAK_DENSITY_SCALE);
    let swing = unit(inputs.swing as f64 / SWING_SCALE);
    let drift = unit(inputs.drift_magnitude / DRIFT_SCALE);
    let leverage = unit(1.0 / (1.0 + inputs.game_differential.unsigned_abs() as f64));

    let blended = W_PRESSURE * pressure
        + W_LATE_SET * late_set
        + W_TIE_BREAK * tie_break
        + W_BREAK_DENSITY * break_density
        + W_SWING * swing
        + W_DRIFT * drift
        + W_LEVERAGE * leverage;

    let surface_mult = (SURFACE_BASE + SURFACE_PIVOT + inputs.surface_adjustment).max(SURFACE_BASE);
    let serve_mult = serve_stability_multiplier(inputs.avg_hold);
    let late_mult = late_set_multiplier(inputs.current_set);

    let value = unit(blended * surface_mult * serve_mult * late_mult);

    let mut breakdown = BTreeMap::new();
    breakdown.insert("pressure", pressure);
    breakdown.insert("late_set", late_set);
    breakdown.insert("tie_break", tie_break);
    breakdown.insert("break_density", break_density);
    breakdown.insert("swing", swing);
    breakdown.insert("drift", drift);
    breakdown.insert("leverage", leverage);
    breakdown.insert("surface_mult", surface_mult);
    breakdown.insert("serve_mult", serve_mult);
    breakdown.insert("late_set_mult", late_mult);

    VolatilityResult {
        value,
        confidence_multiplier: (1.0 - CONFIDENCE_DAMPING * value).max(0.0),
        stake_multiplier: (1.0 - STAKE_DAMPING * value).max(0.0),
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn base() -> VolatilityInputs {
        VolatilityInputs {
            pressure: 0.2,
            games_in_set: 5,
            tie_break: false,
            breaks: 1.0,
            swing: 0,
            drift_magnitude: 0.02,
            game_differential: 1,
            current_set: 2,
            surface_adjustment: surface_adjustment(Surface::Hard, 1.0),
            avg_hold: None,
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let sum = W_PRESSURE + W_LATE_SET + W_TIE_BREAK + W_BREAK_DENSITY + W_SWING + W_DRIFT + W_LEVERAGE;
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn monotone_in_pressure_breaks_and_drift() {
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 / 10.0).collect();
        let mut prev = (f64::MIN, f64::MIN, f64::MIN);
        for &x in &steps {
            let p = score(&VolatilityInputs { pressure: x, ..base() }).value;
            let b = score(&VolatilityInputs { breaks: x * 3.0, ..base() }).value;
            let d = score(&VolatilityInputs { drift_magnitude: x / 4.0, ..base() }).value;
            assert!(p >= prev.0 && b >= prev.1 && d >= prev.2);
            prev = (p, b, d);
        }
    }

    #[test]
    fn value_and_multipliers_stay_in_range() {
        let extreme = VolatilityInputs {
            pressure: 5.0,
            games_in_set: 13,
            tie_break: true,
            breaks: 10.0,
            swing: 9,
            drift_magnitude: 1.0,
            game_differential: 0,
            current_set: 5,
            surface_adjustment: surface_adjustment(Surface::Grass, 2.0),
            avg_hold: Some(0.40),
        };
        let r = score(&extreme);
        assert_relative_eq!(r.value, 1.0);
        assert_relative_eq!(r.confidence_multiplier, 0.70);
        assert_relative_eq!(r.stake_multiplier, 0.55);

        let calm = score(&VolatilityInputs {
            pressure: 0.0,
            games_in_set: 0,
            breaks: 0.0,
            drift_magnitude: 0.0,
            game_differential: 6,
            current_set: 1,
            ..base()
        });
        assert!(calm.value >= 0.0 && calm.value < 0.1);
        assert!(calm.confidence_multiplier <= 1.0);
        assert!(calm.stake_multiplier > r.stake_multiplier);
    }

    #[test]
    fn surface_ordering() {
        let v = |s: Surface| {
            score(&VolatilityInputs {
                surface_adjustment: surface_adjustment(s, 1.0),
                ..base()
            })
            .value
        };
        assert!(v(Surface::Clay) < v(Surface::IndoorHard));
        assert!(v(Surface::IndoorHard) < v(Surface::Hard));
        assert!(v(Surface::Hard) < v(Surface::Grass));
    }

    #[test]
    fn weak_serving_raises_volatility() {
        let weak = score(&VolatilityInputs { avg_hold: Some(0.62), ..base() }).value;
        let strong = score(&VolatilityInputs { avg_hold: Some(0.90), ..base() }).value;
        let unknown = score(&base()).value;
        assert!(weak > unknown && unknown > strong);
    }

    #[test]
    fn surface_parsing() {
        assert_eq!(Surface::parse("Clay"), Surface::Clay);
        assert_eq!(Surface::parse("Indoor Hard"), Surface::IndoorHard);
        assert_eq!(Surface::parse("hardcourt"), Surface::Hard);
        assert_eq!(Surface::parse("Grass"), Surface::Grass);
        assert_eq!(Surface::parse(""), Surface::Unknown);
    }

    #[test]
    fn late_set_multiplier_grows_and_caps() {
        assert_relative_eq!(late_set_multiplier(1), 1.0);
        assert!(late_set_multiplier(3) > late_set_multiplier(2));
        assert_relative_eq!(late_set_multiplier(5), 1.20);
    }
}
