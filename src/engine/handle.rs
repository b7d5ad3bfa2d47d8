use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::db::models::{FeedbackLogEntry, MatchSnapshot, OutcomeResult, Prediction};
use crate::db::Database;
use crate::error::{AdvisorError, Result};

use super::feedback::{self, AdaptationReport, FeedbackLog, HitRates};
use super::pipeline::Engine;
use super::state::{AdaptiveState, ConfigPatch, ConfigStore, Cutoffs, EngineConfig};
use super::tuner::{self, LabelCounts, TunerDecision};

/// How long a prediction stays available for outcome recording.
const PREDICTION_RETENTION_HOURS: i64 = 24;

/// Summary of one scoring cycle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub generated_at: DateTime<Utc>,
    pub matches: usize,
    pub counts: LabelCounts,
    pub tuner: TunerDecision,
    pub config_version: u64,
}

/// Shared coordinator between the scoring loop, the periodic tasks and the
/// operator API. It is the single owner that persists every new config
/// version.
#[derive(Clone)]
pub struct EngineHandle {
    config: ConfigStore,
    feedback: Arc<Mutex<FeedbackLog>>,
    predictions: Arc<RwLock<HashMap<String, Prediction>>>,
    last_report: Arc<RwLock<Option<CycleReport>>>,
    db: Option<Database>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig, feedback: FeedbackLog, db: Option<Database>) -> Self {
        EngineHandle {
            config: ConfigStore::new(config),
            feedback: Arc::new(Mutex::new(feedback)),
            predictions: Arc::new(RwLock::new(HashMap::new())),
            last_report: Arc::new(RwLock::new(None)),
            db,
        }
    }

    pub async fn config(&self) -> Arc<EngineConfig> {
        self.config.snapshot().await
    }

    /// Score one batch, let the tuner observe it, and publish the results.
    pub async fn run_cycle(
        &self,
        engine: &mut Engine,
        snapshots: &[MatchSnapshot],
        now: DateTime<Utc>,
    ) -> CycleReport {
        let config = self.config.snapshot().await;
        let predictions = engine.score_batch(snapshots, &config, now);
        let counts = LabelCounts::from_labels(predictions.iter().map(|p| p.label));

        let (next, decision) = self
            .config
            .update(|c| tuner::observe(c, &counts, now))
            .await;
        if let TunerDecision::Relaxed { streak, from, to } = decision {
            info!(
                "Tuner relaxed cutoffs after {} dry batches: minEV {:.4}→{:.4} thrSafe {:.3}→{:.3} thrRisky {:.3}→{:.3}",
                streak, from.min_ev, to.min_ev, from.thr_safe, to.thr_safe, from.thr_risky, to.thr_risky
            );
        }
        if next.version != config.version {
            self.persist_config(&next);
        }

        for p in predictions.iter().filter(|p| p.label.is_actionable()) {
            info!(
                "{} {} | conf={:.3} ev={:+.3} stake={:.2}%",
                p.label,
                p.event_name,
                p.confidence,
                p.expected_value,
                p.stake_pct * 100.0
            );
        }

        {
            let mut map = self.predictions.write().await;
            let horizon = now - Duration::hours(PREDICTION_RETENTION_HOURS);
            map.retain(|_, p| p.generated_at >= horizon);
            for p in &predictions {
                map.insert(p.match_id.clone(), p.clone());
            }
        }
        if let Some(db) = &self.db {
            for p in &predictions {
                if let Err(e) = db.upsert_prediction(p) {
                    warn!("Failed to store prediction for {}: {}", p.match_id, e);
                }
            }
        }

        info!(
            "Cycle: {} matches [{}] tuner={:?} config v{} ({} tracked)",
            predictions.len(),
            counts,
            decision,
            next.version,
            engine.tracked_matches()
        );

        let report = CycleReport {
            generated_at: now,
            matches: predictions.len(),
            counts,
            tuner: decision,
            config_version: next.version,
        };
        *self.last_report.write().await = Some(report.clone());
        report
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// Latest prediction per match, highest stake first
    pub async fn predictions(&self) -> Vec<Prediction> {
        let mut list: Vec<Prediction> = self.predictions.read().await.values().cloned().collect();
        list.sort_by(|a, b| {
            b.stake_pct
                .total_cmp(&a.stake_pct)
                .then_with(|| a.match_id.cmp(&b.match_id))
        });
        list
    }

    async fn last_prediction(&self, match_id: &str) -> Result<Prediction> {
        if let Some(p) = self.predictions.read().await.get(match_id) {
            return Ok(p.clone());
        }
        if let Some(db) = &self.db {
            if let Some(p) = db.get_prediction(match_id)? {
                return Ok(p);
            }
        }
        Err(AdvisorError::UnknownMatch(match_id.to_string()))
    }

    /// Log the settled result of the last advisory issued for `match_id`.
    pub async fn record_outcome(&self, match_id: &str, result: OutcomeResult) -> Result<FeedbackLogEntry> {
        let p = self.last_prediction(match_id).await?;
        let entry = FeedbackLogEntry {
            timestamp: Utc::now(),
            label: p.label,
            result,
            confidence: p.confidence,
            expected_value: p.expected_value,
            match_id: p.match_id,
        };
        let cap = {
            let mut log = self.feedback.lock().await;
            log.push(entry.clone());
            log.cap()
        };
        if let Some(db) = &self.db {
            if let Err(e) = db.insert_feedback(&entry, cap) {
                warn!("Failed to store outcome for {}: {}", entry.match_id, e);
            }
        }
        info!("Outcome {} for {} ({})", result.as_str(), entry.match_id, entry.label);
        Ok(entry)
    }

    pub async fn feedback(&self, limit: usize) -> (Vec<FeedbackLogEntry>, HitRates) {
        let log = self.feedback.lock().await;
        (log.recent(limit), log.hit_rates())
    }

    /// Run the weight adapter over the current outcome log.
    pub async fn adapt_weights(&self) -> AdaptationReport {
        let rates = self.feedback.lock().await.hit_rates();
        let (next, report) = self
            .config
            .update(|c| {
                let (weights, report) = feedback::adapt_weights(&c.weights, &rates);
                let mut next = c.clone();
                next.weights = weights;
                (next, report)
            })
            .await;
        for change in &report.changes {
            info!("Weight {}: {:.2} → {:.2}", change.key, change.from, change.to);
        }
        if !report.changes.is_empty() {
            self.persist_config(&next);
        }
        report
    }

    /// Merge a remote config payload over the current values.
    pub async fn apply_remote(&self, patch: &ConfigPatch) -> Arc<EngineConfig> {
        let before = self.config.snapshot().await.version;
        let (next, _) = self.config.update(|c| (c.merged_with(patch), ())).await;
        if next.version != before {
            info!(
                "Remote config merged: minEV={:.4} thrSafe={:.3} thrRisky={:.3} (v{})",
                next.cutoffs.min_ev, next.cutoffs.thr_safe, next.cutoffs.thr_risky, next.version
            );
            self.persist_config(&next);
        }
        next
    }

    /// Operator override of the cutoffs. Rejected when any value is under
    /// its floor or the safe/risky pair is inverted.
    pub async fn set_cutoffs(&self, cutoffs: Cutoffs) -> Result<Arc<EngineConfig>> {
        let next = self
            .config
            .try_update(|c| {
                cutoffs.validate(&c.floors)?;
                let mut next = c.clone();
                next.cutoffs = cutoffs;
                Ok(next)
            })
            .await?;
        info!(
            "Operator set cutoffs: minEV={:.4} thrSafe={:.3} thrRisky={:.3} (v{})",
            cutoffs.min_ev, cutoffs.thr_safe, cutoffs.thr_risky, next.version
        );
        self.persist_config(&next);
        Ok(next)
    }

    /// Clear the tuner streak and cooldown.
    pub async fn reset_adaptive(&self) -> Arc<EngineConfig> {
        let (next, _) = self
            .config
            .update(|c| {
                let mut next = c.clone();
                next.adaptive = AdaptiveState::default();
                (next, ())
            })
            .await;
        info!("Adaptive state reset (v{})", next.version);
        self.persist_config(&next);
        next
    }

    fn persist_config(&self, config: &EngineConfig) {
        if let Some(db) = &self.db {
            if let Err(e) = db.save_engine_config(config) {
                warn!("Failed to persist engine config v{}: {}", config.version, e);
            }
        }
    }
}
