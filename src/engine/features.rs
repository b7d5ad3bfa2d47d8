use serde::Serialize;

use crate::db::models::{MatchSnapshot, Side};

use super::drift::DriftReading;
use super::point::{PointContext, PointState};
use super::probability::{implied_probabilities, momentum_signal, ProbabilityPair};
use super::score::ScoreLine;
use super::state::FeatureWeights;
use super::volatility::{surface_adjustment, Surface};

/// Everything the scorer needs about one match in one cycle.
/// Derived fresh from the snapshot every poll and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    pub current_set: u8,
    pub games_won: (u32, u32),
    pub game_differential: i32,
    pub set_differential: i32,
    pub point_state: PointState,
    pub break_point: (bool, bool),
    pub tie_break: bool,
    pub in_window: bool,
    pub implied: ProbabilityPair,
    /// Drift in [-1, 1] from side A's perspective; positive = A shortening
    pub drift_signal_a: f64,
    /// tanh momentum in [-1, 1] from side A's perspective
    pub momentum_signal_a: f64,
    pub surface: Surface,
    pub surface_adjustment: f64,
    /// formA − formB, 0 when either is unknown
    pub form_differential: f64,
    pub avg_hold: Option<f64>,
    #[serde(skip)]
    pub score: ScoreLine,
    #[serde(skip)]
    pub point: PointContext,
    #[serde(skip)]
    pub drift: DriftReading,
}

impl Features {
    pub fn extract(
        snapshot: &MatchSnapshot,
        score: ScoreLine,
        drift: DriftReading,
        weights: &FeatureWeights,
    ) -> Self {
        let point = PointContext::analyze(snapshot, &score);
        let surface = Surface::parse(&snapshot.surface);
        let a = snapshot.player(Side::A);
        let b = snapshot.player(Side::B);

        let form_differential = match (a.form, b.form) {
            (Some(fa), Some(fb)) if fa.is_finite() && fb.is_finite() => (fa - fb).clamp(-1.0, 1.0),
            _ => 0.0,
        };
        let avg_hold = match (a.hold_pct, b.hold_pct) {
            (Some(ha), Some(hb)) => Some((ha + hb) / 2.0),
            (Some(h), None) | (None, Some(h)) => Some(h),
            (None, None) => None,
        };

        // In a two-way line one side shortening means the other drifts out;
        // average the two views into one signed signal.
        let drift_signal_a =
            (((drift.move_a - drift.move_b) / 2.0) * weights.drift).clamp(-1.0, 1.0);

        Features {
            current_set: score.current_set,
            games_won: score.current_games(),
            game_differential: score.game_differential(),
            set_differential: score.set_differential(),
            point_state: point.state,
            break_point: (point.break_point_a, point.break_point_b),
            tie_break: point.tie_break,
            in_window: point.in_window,
            implied: implied_probabilities(snapshot.odds.as_ref()),
            drift_signal_a,
            momentum_signal_a: momentum_signal(score.game_differential()),
            surface,
            surface_adjustment: surface_adjustment(surface, weights.surface),
            form_differential,
            avg_hold,
            score,
            point,
            drift,
        }
    }

    pub fn drift_signal(&self, side: Side) -> f64 {
        match side {
            Side::A => self.drift_signal_a,
            Side::B => -self.drift_signal_a,
        }
    }

    pub fn momentum_signal(&self, side: Side) -> f64 {
        match side {
            Side::A => self.momentum_signal_a,
            Side::B => -self.momentum_signal_a,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{OddsPair, PlayerRecord, ProbabilitySource};
    use approx::assert_relative_eq;

    fn snapshot() -> MatchSnapshot {
        MatchSnapshot {
            id: "m".into(),
            players: [
                PlayerRecord {
                    name: "Alpha".into(),
                    sets: [Some(6), Some(3), None, None, None],
                    hold_pct: Some(0.80),
                    form: Some(0.7),
                    ..Default::default()
                },
                PlayerRecord {
                    name: "Bravo".into(),
                    sets: [Some(4), Some(1), None, None, None],
                    hold_pct: Some(0.70),
                    form: Some(0.4),
                    ..Default::default()
                },
            ],
            status: "Live".into(),
            point_score: "15-15".into(),
            surface: "Clay".into(),
            category: "ATP 250".into(),
            odds: OddsPair::new(1.5, 2.5),
        }
    }

    #[test]
    fn extracts_score_and_player_features() {
        let s = snapshot();
        let f = Features::extract(
            &s,
            ScoreLine::parse(&s),
            DriftReading::default(),
            &FeatureWeights::default(),
        );
        assert_eq!(f.current_set, 2);
        assert_eq!(f.games_won, (3, 1));
        assert_eq!(f.game_differential, 2);
        assert_eq!(f.set_differential, 1);
        assert!(f.in_window);
        assert_eq!(f.surface, Surface::Clay);
        assert!(f.surface_adjustment < 0.0);
        assert_relative_eq!(f.form_differential, 0.3, epsilon = 1e-12);
        assert_relative_eq!(f.avg_hold.unwrap(), 0.75, epsilon = 1e-12);
        assert_eq!(f.implied.source, ProbabilitySource::Market);
        assert!(f.momentum_signal(Side::A) > 0.0);
        assert_relative_eq!(f.momentum_signal(Side::B), -f.momentum_signal_a);
    }

    #[test]
    fn drift_signal_is_bounded_and_weighted() {
        let s = snapshot();
        let drift = DriftReading {
            move_a: 0.4,
            move_b: -0.9,
            swing: 0,
            has_previous: true,
        };
        let mut w = FeatureWeights::default();
        w.drift = 2.0;
        let f = Features::extract(&s, ScoreLine::parse(&s), drift, &w);
        assert_relative_eq!(f.drift_signal(Side::A), 1.0);
        assert_relative_eq!(f.drift_signal(Side::B), -1.0);

        w.drift = 0.0;
        let f = Features::extract(&s, ScoreLine::parse(&s), drift, &w);
        assert_relative_eq!(f.drift_signal(Side::A), 0.0);
    }
}
