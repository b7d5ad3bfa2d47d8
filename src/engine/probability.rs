//! In-play win probability for a two-way tennis market.
//!
//! The market line is the prior: implied probabilities are read from the
//! decimal odds and normalised to remove the overround. Score dynamics then
//! shift that prior in log-odds space:
//!
//! - **Sets** dominate: a completed set is worth far more than a game.
//! - **Games** in the active set move the needle a little.
//! - **Late sets** amplify whoever is ahead, since fewer games remain to recover.
//! - **Momentum** in the active set adds a small, bounded tanh bump.
//!
//! Every adjustment is applied symmetrically (side B gets the opposite sign)
//! and the pair is renormalised to sum to 1.

use serde::Serialize;

use crate::db::models::{OddsPair, ProbabilitySource, Side};

/// Log-odds shift per completed set of advantage.
const SET_COEF: f64 = 0.45;
/// Log-odds shift per game of advantage in the active set.
const GAME_COEF: f64 = 0.12;
/// Log-odds bonus per set beyond the second, toward the overall leader.
const LATE_SET_COEF: f64 = 0.08;
/// Log-odds shift per unit of form difference (form in [0, 1]).
const FORM_COEF: f64 = 0.30;
/// Peak momentum bump in probability points.
const MOMENTUM_MAX: f64 = 0.04;
/// Game differential at which the momentum tanh reaches ~76% of its peak.
const MOMENTUM_SCALE: f64 = 3.0;

const P_MIN: f64 = 0.01;
const P_MAX: f64 = 0.99;

/// Probability pair for (A, B), always summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilityPair {
    pub a: f64,
    pub b: f64,
    pub source: ProbabilitySource,
}

impl ProbabilityPair {
    pub fn fallback() -> Self {
        ProbabilityPair {
            a: 0.5,
            b: 0.5,
            source: ProbabilitySource::Fallback,
        }
    }

    pub fn get(&self, side: Side) -> f64 {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }

    /// |p_A − p_B|
    pub fn spread(&self) -> f64 {
        (self.a - self.b).abs()
    }

    /// Side with the higher probability; exact ties go to the market
    /// favourite (lower decimal odds), or side A without odds.
    pub fn leader(&self, odds: Option<&OddsPair>) -> Side {
        if self.a > self.b {
            Side::A
        } else if self.b > self.a {
            Side::B
        } else {
            odds.map(OddsPair::favourite).unwrap_or(Side::A)
        }
    }

    fn with(self, a: f64, b: f64) -> Self {
        let (a, b) = normalize(a, b);
        ProbabilityPair { a, b, ..self }
    }
}

/// Baseline implied probabilities from two-way decimal odds.
/// Missing or unusable odds fall back to 50/50 tagged `Fallback`.
pub fn implied_probabilities(odds: Option<&OddsPair>) -> ProbabilityPair {
    let Some(o) = odds else {
        return ProbabilityPair::fallback();
    };
    if !(o.a.is_finite() && o.b.is_finite() && o.a > 0.0 && o.b > 0.0) {
        return ProbabilityPair::fallback();
    }
    let (a, b) = normalize(1.0 / o.a, 1.0 / o.b);
    ProbabilityPair {
        a,
        b,
        source: ProbabilitySource::Market,
    }
}

/// Score inputs for the in-play update, all from side A's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreDynamics {
    pub set_differential: i32,
    pub game_differential: i32,
    pub current_set: u8,
    /// formA − formB in [-1, 1]; 0 when unknown
    pub form_differential: f64,
}

/// Adjust the baseline with set / game differentials, the late-set bonus and
/// form. `form_weight` scales the form term.
pub fn score_adjusted(base: ProbabilityPair, dyns: &ScoreDynamics, form_weight: f64) -> ProbabilityPair {
    let lead = dyns.set_differential + dyns.game_differential;
    let late_sets = (dyns.current_set as f64 - 2.0).max(0.0);
    let late_bonus = LATE_SET_COEF * late_sets * (lead.signum() as f64);

    let delta = SET_COEF * dyns.set_differential as f64
        + GAME_COEF * dyns.game_differential as f64
        + late_bonus
        + FORM_COEF * dyns.form_differential.clamp(-1.0, 1.0) * form_weight;

    let a = sigmoid(logit(base.a) + delta);
    let b = sigmoid(logit(base.b) - delta);
    base.with(a, b)
}

/// Bounded momentum signal in [-1, 1] from the active-set game differential.
pub fn momentum_signal(game_differential: i32) -> f64 {
    (game_differential as f64 / MOMENTUM_SCALE).tanh()
}

/// Apply the tanh momentum bump (scaled by `momentum_weight`) toward side A.
pub fn momentum_adjusted(p: ProbabilityPair, game_differential: i32, momentum_weight: f64) -> ProbabilityPair {
    let bump = MOMENTUM_MAX * momentum_signal(game_differential) * momentum_weight;
    p.with(p.a + bump, p.b - bump)
}

/// Shift probability toward side A by `nudge` (negative favours B).
pub fn nudged(p: ProbabilityPair, nudge: f64) -> ProbabilityPair {
    p.with(p.a + nudge, p.b - nudge)
}

/// Clamp both sides into [0.01, 0.99] and rescale to sum to 1.
/// A non-positive or non-finite sum collapses to 50/50.
fn normalize(a: f64, b: f64) -> (f64, f64) {
    let a = if a.is_finite() { a.clamp(P_MIN, P_MAX) } else { 0.5 };
    let b = if b.is_finite() { b.clamp(P_MIN, P_MAX) } else { 0.5 };
    let sum = a + b;
    if !(sum.is_finite() && sum > 0.0) {
        return (0.5, 0.5);
    }
    (a / sum, b / sum)
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

/// Standard logistic sigmoid function.
fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn market(a: f64, b: f64) -> ProbabilityPair {
        implied_probabilities(OddsPair::new(a, b).as_ref())
    }

    #[test]
    fn implied_pairs_sum_to_one() {
        let prices = [1.01, 1.05, 1.2, 1.5, 1.91, 2.0, 2.5, 3.75, 8.0, 21.0, 101.0];
        for &a in &prices {
            for &b in &prices {
                let p = market(a, b);
                assert_relative_eq!(p.a + p.b, 1.0, epsilon = 1e-9);
                assert_eq!(p.source, ProbabilitySource::Market);
            }
        }
    }

    #[test]
    fn overround_is_removed() {
        let p = market(1.5, 2.5);
        // 0.6667 / (0.6667 + 0.4) = 0.625
        assert_relative_eq!(p.a, 0.625, epsilon = 1e-9);
        assert_relative_eq!(p.b, 0.375, epsilon = 1e-9);
    }

    #[test]
    fn missing_odds_fall_back() {
        let p = implied_probabilities(None);
        assert_eq!(p.source, ProbabilitySource::Fallback);
        assert_relative_eq!(p.a, 0.5);
        let bad = OddsPair {
            a: f64::NAN,
            b: 2.0,
        };
        assert_eq!(implied_probabilities(Some(&bad)).source, ProbabilitySource::Fallback);
    }

    #[test]
    fn set_lead_outweighs_game_lead() {
        let base = market(2.0, 2.0);
        let set_up = score_adjusted(
            base,
            &ScoreDynamics {
                set_differential: 1,
                current_set: 2,
                ..Default::default()
            },
            1.0,
        );
        let game_up = score_adjusted(
            base,
            &ScoreDynamics {
                game_differential: 1,
                current_set: 2,
                ..Default::default()
            },
            1.0,
        );
        assert!(set_up.a > game_up.a);
        assert!(game_up.a > 0.5);
        assert_relative_eq!(set_up.a + set_up.b, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn late_sets_amplify_the_leader() {
        let base = market(2.0, 2.0);
        let dyns = |set| ScoreDynamics {
            set_differential: 1,
            game_differential: 1,
            current_set: set,
            ..Default::default()
        };
        let set2 = score_adjusted(base, &dyns(2), 1.0);
        let set4 = score_adjusted(base, &dyns(4), 1.0);
        assert!(set4.a > set2.a);
    }

    #[test]
    fn adjustment_is_symmetric() {
        let base = market(2.0, 2.0);
        let up = score_adjusted(
            base,
            &ScoreDynamics {
                set_differential: 1,
                game_differential: 2,
                current_set: 3,
                ..Default::default()
            },
            1.0,
        );
        let down = score_adjusted(
            base,
            &ScoreDynamics {
                set_differential: -1,
                game_differential: -2,
                current_set: 3,
                ..Default::default()
            },
            1.0,
        );
        assert_relative_eq!(up.a, down.b, epsilon = 1e-9);
    }

    #[test]
    fn momentum_is_bounded_and_renormalized() {
        let base = market(1.5, 2.5);
        for diff in -6..=6 {
            let p = momentum_adjusted(base, diff, 1.0);
            assert_relative_eq!(p.a + p.b, 1.0, epsilon = 1e-9);
            assert!((p.a - base.a).abs() <= MOMENTUM_MAX + 1e-9);
        }
        assert!(momentum_adjusted(base, 2, 1.0).a > base.a);
        assert_relative_eq!(momentum_adjusted(base, 2, 0.0).a, base.a, epsilon = 1e-12);
    }

    #[test]
    fn extreme_inputs_stay_finite() {
        let base = market(1.01, 101.0);
        let p = score_adjusted(
            base,
            &ScoreDynamics {
                set_differential: 2,
                game_differential: 6,
                current_set: 5,
                form_differential: 1.0,
            },
            2.0,
        );
        assert!(p.a.is_finite() && p.b.is_finite());
        assert_relative_eq!(p.a + p.b, 1.0, epsilon = 1e-9);
        assert!(p.b > 0.0);
    }

    #[test]
    fn ties_pick_the_market_favourite() {
        let even = ProbabilityPair::fallback();
        let odds = OddsPair::new(2.1, 1.8).unwrap();
        assert_eq!(even.leader(Some(&odds)), Side::B);
        assert_eq!(even.leader(None), Side::A);
    }
}
