use chrono::{DateTime, Utc};
use tracing::debug;

use crate::db::models::{MatchSnapshot, Prediction, Side};

use super::classifier::{classify, ClassifierInput};
use super::drift::OddsSnapshotStore;
use super::features::Features;
use super::kelly::{size_stake, StakeInputs, StakeParams, StakeRecommendation};
use super::probability::{momentum_adjusted, nudged, score_adjusted, ScoreDynamics};
use super::score::{is_live, ScoreLine};
use super::state::EngineConfig;
use super::volatility::{self, VolatilityInputs};

/// The scoring pipeline. Owns the per-match odds history; everything else it
/// needs arrives through the [`EngineConfig`] passed to each call.
///
/// One cycle = parse → drift → features → probability update → volatility →
/// classify → size stake, for every snapshot in the batch.
pub struct Engine {
    drift: OddsSnapshotStore,
    stake: StakeParams,
}

impl Engine {
    pub fn new(drift_store_cap: usize, stake: StakeParams) -> Self {
        Engine {
            drift: OddsSnapshotStore::new(drift_store_cap),
            stake,
        }
    }

    pub fn tracked_matches(&self) -> usize {
        self.drift.len()
    }

    /// Score every snapshot in the batch against one config snapshot.
    pub fn score_batch(
        &mut self,
        snapshots: &[MatchSnapshot],
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Vec<Prediction> {
        snapshots
            .iter()
            .map(|s| self.evaluate(s, config, now))
            .collect()
    }

    pub fn evaluate(
        &mut self,
        snapshot: &MatchSnapshot,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Prediction {
        let weights = &config.weights;
        let score = ScoreLine::parse(snapshot);
        let live = is_live(&snapshot.status);
        let drift = self
            .drift
            .observe(&snapshot.id, snapshot.odds, score.game_differential(), now);
        let f = Features::extract(snapshot, score, drift, weights);

        let dyns = ScoreDynamics {
            set_differential: f.set_differential,
            game_differential: f.game_differential,
            current_set: f.current_set,
            form_differential: f.form_differential,
        };
        let probs = score_adjusted(f.implied, &dyns, weights.form);
        let probs = momentum_adjusted(probs, f.game_differential, weights.momentum);
        let probs = nudged(probs, f.point.nudge);

        let vol = volatility::score(&VolatilityInputs::from_context(
            &f.score,
            &f.point,
            &f.drift,
            f.surface_adjustment,
            f.avg_hold,
        ));

        let assessment = classify(
            &ClassifierInput {
                live,
                current_set: f.current_set,
                in_window: f.in_window,
                probabilities: probs,
                confidence_multiplier: vol.confidence_multiplier,
                odds: snapshot.odds.as_ref(),
            },
            &config.effective_gates(),
        );

        let stake = match (assessment.label.is_actionable(), assessment.pick, snapshot.odds) {
            (true, Some(pick), Some(odds)) => size_stake(
                &StakeInputs {
                    win_prob: assessment.pick_probability,
                    decimal_odds: odds.get(pick),
                    volatility: vol.value,
                    drift: f.drift_signal(pick),
                    momentum: f.momentum_signal(pick),
                },
                &self.stake,
            ),
            _ => StakeRecommendation::default(),
        };

        let (ga, gb) = f.games_won;
        let (pa, pb) = f.point.points;
        let pick_name = assessment
            .pick
            .map(|s| snapshot.player(s).name.as_str())
            .unwrap_or("-");
        let rationale = format!(
            "{} {} | set {} {}-{} pts {}-{}{} | p={:.3}/{:.3} ({:?}) conf={:.3} ev={:+.3} | vol={:.2} (x{:.2}) drift={:+.3} mom={:+.2} | {}",
            assessment.label,
            pick_name,
            f.current_set,
            ga,
            gb,
            pa,
            pb,
            if f.tie_break { " TB" } else { "" },
            probs.a,
            probs.b,
            probs.source,
            assessment.confidence,
            assessment.expected_value,
            vol.value,
            vol.stake_multiplier,
            assessment.pick.map(|s| f.drift_signal(s)).unwrap_or(0.0),
            assessment.pick.map(|s| f.momentum_signal(s)).unwrap_or(0.0),
            assessment.note,
        );
        debug!("{} [{}]: {}", snapshot.display_name(), snapshot.id, rationale);

        Prediction {
            match_id: snapshot.id.clone(),
            event_name: snapshot.display_name(),
            label: assessment.label,
            pick: assessment.pick,
            confidence: assessment.confidence,
            expected_value: assessment.expected_value,
            fraction: stake.fraction,
            stake_pct: stake.stake_pct,
            prob_a: probs.get(Side::A),
            prob_b: probs.get(Side::B),
            volatility: vol.value,
            source: probs.source,
            in_window: f.in_window,
            rationale,
            generated_at: now,
        }
    }
}
