//! Adaptive threshold tuner.
//!
//! A one-directional relief valve: when batch after batch produces no SAFE
//! label and a pile of AVOIDs, the cutoffs are eased by small fixed steps,
//! never below their floors. Tightening is left to the operator.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::models::Label;

use super::state::{Cutoffs, EngineConfig};

/// AVOID labels a batch needs before it counts toward the streak.
pub const MIN_AVOID_PER_BATCH: usize = 8;
pub const STREAK_THRESHOLD: u32 = 4;
pub const COOLDOWN_SECS: i64 = 180;

const STEP_MIN_EV: f64 = 0.005;
const STEP_THR_SAFE: f64 = 0.02;
const STEP_THR_RISKY: f64 = 0.01;

/// Label histogram of one processed batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts(BTreeMap<Label, usize>);

impl LabelCounts {
    pub fn from_labels<I: IntoIterator<Item = Label>>(labels: I) -> Self {
        let mut counts = LabelCounts::default();
        for label in labels {
            counts.add(label);
        }
        counts
    }

    pub fn add(&mut self, label: Label) {
        *self.0.entry(label).or_insert(0) += 1;
    }

    pub fn get(&self, label: Label) -> usize {
        self.0.get(&label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }
}

impl std::fmt::Display for LabelCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(l, n)| format!("{}={}", l, n)).collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TunerDecision {
    /// Batch had a SAFE label or too few AVOIDs
    StreakReset,
    /// Streak grew but no adjustment yet
    Holding { streak: u32 },
    /// Streak is due but the last adjustment is too recent
    CoolingDown { streak: u32 },
    Relaxed { streak: u32, from: Cutoffs, to: Cutoffs },
    /// Due, but every cutoff already sits on its floor
    AtFloor { streak: u32 },
}

/// Observe one batch. Returns the next config and what the tuner did.
pub fn observe(config: &EngineConfig, counts: &LabelCounts, now: DateTime<Utc>) -> (EngineConfig, TunerDecision) {
    let mut next = config.clone();
    let qualifies = counts.get(Label::Safe) == 0 && counts.get(Label::Avoid) >= MIN_AVOID_PER_BATCH;
    if !qualifies {
        next.adaptive.no_safe_streak = 0;
        return (next, TunerDecision::StreakReset);
    }

    let streak = config.adaptive.no_safe_streak.saturating_add(1);
    next.adaptive.no_safe_streak = streak;
    if streak < STREAK_THRESHOLD {
        return (next, TunerDecision::Holding { streak });
    }

    let cooled = config
        .adaptive
        .last_adjustment
        .map_or(true, |at| now - at >= Duration::seconds(COOLDOWN_SECS));
    if !cooled {
        return (next, TunerDecision::CoolingDown { streak });
    }

    let from = config.cutoffs;
    let floors = &config.floors;
    let stepped = Cutoffs {
        min_ev: (from.min_ev - STEP_MIN_EV).max(floors.min_ev),
        thr_safe: (from.thr_safe - STEP_THR_SAFE).max(floors.thr_safe),
        thr_risky: (from.thr_risky - STEP_THR_RISKY).max(floors.thr_risky),
    };
    let (to, _) = stepped.repaired(floors);
    if to == from {
        return (next, TunerDecision::AtFloor { streak });
    }

    next.cutoffs = to;
    next.adaptive.last_adjustment = Some(now);
    (next, TunerDecision::Relaxed { streak, from, to })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drought() -> LabelCounts {
        let mut labels = vec![Label::Avoid; 9];
        labels.push(Label::Risky);
        LabelCounts::from_labels(labels)
    }

    #[test]
    fn counts_histogram() {
        let c = drought();
        assert_eq!(c.get(Label::Avoid), 9);
        assert_eq!(c.get(Label::Safe), 0);
        assert_eq!(c.total(), 10);
        assert_eq!(c.to_string(), "AVOID=9 RISKY=1");
    }

    #[test]
    fn safe_label_resets_streak() {
        let mut cfg = EngineConfig::default();
        cfg.adaptive.no_safe_streak = 3;
        let mut counts = drought();
        counts.add(Label::Safe);
        let (next, decision) = observe(&cfg, &counts, Utc::now());
        assert_eq!(decision, TunerDecision::StreakReset);
        assert_eq!(next.adaptive.no_safe_streak, 0);
    }

    #[test]
    fn too_few_avoids_resets_streak() {
        let mut cfg = EngineConfig::default();
        cfg.adaptive.no_safe_streak = 2;
        let counts = LabelCounts::from_labels(vec![Label::Avoid; 7]);
        let (next, _) = observe(&cfg, &counts, Utc::now());
        assert_eq!(next.adaptive.no_safe_streak, 0);
    }

    #[test]
    fn relaxes_after_streak_threshold() {
        let t0 = Utc::now();
        let mut cfg = EngineConfig::default();
        let mut decisions = Vec::new();
        for i in 0..4 {
            let (next, d) = observe(&cfg, &drought(), t0 + Duration::seconds(15 * i));
            cfg = next;
            decisions.push(d);
        }
        assert!(matches!(decisions[2], TunerDecision::Holding { streak: 3 }));
        assert!(matches!(decisions[3], TunerDecision::Relaxed { streak: 4, .. }));
        assert!(cfg.cutoffs.min_ev < Cutoffs::default().min_ev);
        assert!(cfg.cutoffs.thr_safe < Cutoffs::default().thr_safe);
        assert!(cfg.adaptive.last_adjustment.is_some());
    }

    #[test]
    fn cooldown_blocks_back_to_back_relief() {
        let t0 = Utc::now();
        let mut cfg = EngineConfig::default();
        cfg.adaptive.no_safe_streak = 10;
        cfg.adaptive.last_adjustment = Some(t0);
        let (_, d) = observe(&cfg, &drought(), t0 + Duration::seconds(60));
        assert!(matches!(d, TunerDecision::CoolingDown { .. }));
        let (_, d) = observe(&cfg, &drought(), t0 + Duration::seconds(COOLDOWN_SECS));
        assert!(matches!(d, TunerDecision::Relaxed { .. }));
    }

    #[test]
    fn twenty_drought_cycles_decrease_but_respect_floors() {
        let start = EngineConfig::default();
        let floors = start.floors;
        let mut cfg = start.clone();
        let t0 = Utc::now();
        let mut relaxed = 0;
        for i in 0..20 {
            // cooldown respected: one cycle every cooldown period
            let now = t0 + Duration::seconds(COOLDOWN_SECS * i);
            let (next, d) = observe(&cfg, &drought(), now);
            if matches!(d, TunerDecision::Relaxed { .. }) {
                relaxed += 1;
            }
            cfg = next;
            assert!(cfg.cutoffs.min_ev >= floors.min_ev);
            assert!(cfg.cutoffs.thr_safe >= floors.thr_safe);
            assert!(cfg.cutoffs.thr_risky >= floors.thr_risky);
            assert!(cfg.cutoffs.thr_safe >= cfg.cutoffs.thr_risky);
        }
        assert!(relaxed >= 1);
        assert!(cfg.cutoffs.min_ev < start.cutoffs.min_ev);
        assert!(cfg.cutoffs.thr_safe < start.cutoffs.thr_safe);
        assert!(cfg.cutoffs.thr_risky < start.cutoffs.thr_risky);
    }

    #[test]
    fn never_raises_thresholds() {
        let mut cfg = EngineConfig::default();
        cfg.cutoffs = cfg.floors;
        cfg.adaptive.no_safe_streak = 9;
        let (next, d) = observe(&cfg, &drought(), Utc::now());
        assert!(matches!(d, TunerDecision::AtFloor { .. }));
        assert_eq!(next.cutoffs, cfg.floors);
    }
}
