//! Rolling outcome log and the weight adapter that learns from it.

use serde::Serialize;
use std::collections::VecDeque;

use crate::db::models::{FeedbackLogEntry, Label, OutcomeResult};

use super::state::{FeatureWeights, WeightKey};

pub const DEFAULT_LOG_CAP: usize = 200;

/// Resolved samples a class needs before it may move any weight.
pub const MIN_SAMPLES: usize = 5;
pub const WEIGHT_STEP: f64 = 0.05;

const SAFE_TARGET: (f64, f64) = (0.60, 0.75);
const RISKY_TARGET: (f64, f64) = (0.50, 0.62);

/// Fixed-capacity ring buffer of settled advisories; oldest entries drop first.
#[derive(Debug, Clone)]
pub struct FeedbackLog {
    entries: VecDeque<FeedbackLogEntry>,
    cap: usize,
}

impl Default for FeedbackLog {
    fn default() -> Self {
        FeedbackLog::new(DEFAULT_LOG_CAP)
    }
}

impl FeedbackLog {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        FeedbackLog {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Rebuild from stored rows (oldest first), keeping only the newest `cap`.
    pub fn from_entries(cap: usize, entries: Vec<FeedbackLogEntry>) -> Self {
        let mut log = FeedbackLog::new(cap);
        for e in entries {
            log.push(e);
        }
        log
    }

    pub fn push(&mut self, entry: FeedbackLogEntry) {
        while self.entries.len() >= self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<FeedbackLogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn hit_rates(&self) -> HitRates {
        let mut rates = HitRates::default();
        for e in &self.entries {
            let class = match e.label {
                Label::Safe => &mut rates.safe,
                Label::Risky => &mut rates.risky,
                Label::Avoid => &mut rates.avoid,
                _ => continue,
            };
            match e.result {
                OutcomeResult::Win => class.wins += 1,
                OutcomeResult::Loss => class.losses += 1,
                OutcomeResult::Unknown => {}
            }
        }
        rates
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassTally {
    pub wins: usize,
    pub losses: usize,
}

impl ClassTally {
    pub fn resolved(&self) -> usize {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Option<f64> {
        match self.resolved() {
            0 => None,
            n => Some(self.wins as f64 / n as f64),
        }
    }
}

/// Per-class tallies. For AVOID a "loss" of the pick is a correct skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitRates {
    pub safe: ClassTally,
    pub risky: ClassTally,
    pub avoid: ClassTally,
}

impl HitRates {
    pub fn safe_hit_rate(&self) -> Option<f64> {
        self.safe.win_rate()
    }

    pub fn risky_hit_rate(&self) -> Option<f64> {
        self.risky.win_rate()
    }

    pub fn avoid_correct_skip_rate(&self) -> Option<f64> {
        self.avoid.win_rate().map(|w| 1.0 - w)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightChange {
    pub key: &'static str,
    pub from: f64,
    pub to: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationReport {
    pub safe_hit_rate: Option<f64>,
    pub risky_hit_rate: Option<f64>,
    pub avoid_correct_skip_rate: Option<f64>,
    pub samples: usize,
    pub changes: Vec<WeightChange>,
}

fn nudge(weights: &mut FeatureWeights, changes: &mut Vec<WeightChange>, key: WeightKey, delta: f64) {
    let from = weights.get(key);
    weights.set(key, from + delta);
    let to = weights.get(key);
    if (to - from).abs() > f64::EPSILON {
        changes.push(WeightChange {
            key: key.as_str(),
            from,
            to,
        });
    }
}

/// Move weights one step toward the hit-rate targets.
///
/// SAFE below target: trust confidence more (tighter gate) and momentum
/// less; above target the reverse. RISKY drives the EV weight the same way.
pub fn adapt_weights(weights: &FeatureWeights, rates: &HitRates) -> (FeatureWeights, AdaptationReport) {
    let mut next = *weights;
    let mut changes = Vec::new();

    if rates.safe.resolved() >= MIN_SAMPLES {
        if let Some(hit) = rates.safe_hit_rate() {
            if hit < SAFE_TARGET.0 {
                nudge(&mut next, &mut changes, WeightKey::Confidence, WEIGHT_STEP);
                nudge(&mut next, &mut changes, WeightKey::Momentum, -WEIGHT_STEP);
            } else if hit > SAFE_TARGET.1 {
                nudge(&mut next, &mut changes, WeightKey::Confidence, -WEIGHT_STEP);
                nudge(&mut next, &mut changes, WeightKey::Momentum, WEIGHT_STEP);
            }
        }
    }

    if rates.risky.resolved() >= MIN_SAMPLES {
        if let Some(hit) = rates.risky_hit_rate() {
            if hit < RISKY_TARGET.0 {
                nudge(&mut next, &mut changes, WeightKey::Ev, WEIGHT_STEP);
            } else if hit > RISKY_TARGET.1 {
                nudge(&mut next, &mut changes, WeightKey::Ev, -WEIGHT_STEP);
            }
        }
    }

    let report = AdaptationReport {
        safe_hit_rate: rates.safe_hit_rate(),
        risky_hit_rate: rates.risky_hit_rate(),
        avoid_correct_skip_rate: rates.avoid_correct_skip_rate(),
        samples: rates.safe.resolved() + rates.risky.resolved() + rates.avoid.resolved(),
        changes,
    };
    (next, report)
}
