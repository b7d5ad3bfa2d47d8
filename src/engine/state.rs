//! Versioned, explicitly passed engine configuration.
//!
//! Cutoffs, feature weights and the tuner state are bundled into one
//! [`EngineConfig`] value. Components receive it by reference and return an
//! updated copy; [`ConfigStore`] is the single owner that swaps in new
//! versions so a reader never observes a half-written config.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{AdvisorError, Result};

pub const DEFAULT_MIN_EV: f64 = 0.02;
pub const DEFAULT_THR_SAFE: f64 = 0.30;
pub const DEFAULT_THR_RISKY: f64 = 0.15;

pub const DEFAULT_MIN_EV_FLOOR: f64 = 0.0;
pub const DEFAULT_THR_SAFE_FLOOR: f64 = 0.18;
pub const DEFAULT_THR_RISKY_FLOOR: f64 = 0.08;

/// Confidence / EV threshold triple gating SAFE / RISKY / AVOID.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cutoffs {
    #[serde(rename = "minEV")]
    pub min_ev: f64,
    #[serde(rename = "thrSafe")]
    pub thr_safe: f64,
    #[serde(rename = "thrRisky")]
    pub thr_risky: f64,
}

impl Default for Cutoffs {
    fn default() -> Self {
        Cutoffs {
            min_ev: DEFAULT_MIN_EV,
            thr_safe: DEFAULT_THR_SAFE,
            thr_risky: DEFAULT_THR_RISKY,
        }
    }
}

impl Cutoffs {
    pub fn default_floors() -> Self {
        Cutoffs {
            min_ev: DEFAULT_MIN_EV_FLOOR,
            thr_safe: DEFAULT_THR_SAFE_FLOOR,
            thr_risky: DEFAULT_THR_RISKY_FLOOR,
        }
    }

    /// Strict check used for operator-supplied values.
    pub fn validate(&self, floors: &Cutoffs) -> Result<()> {
        for (field, value, floor) in [
            ("minEV", self.min_ev, floors.min_ev),
            ("thrSafe", self.thr_safe, floors.thr_safe),
            ("thrRisky", self.thr_risky, floors.thr_risky),
        ] {
            if !value.is_finite() || value < floor {
                return Err(AdvisorError::CutoffBelowFloor {
                    field,
                    value,
                    floor,
                });
            }
        }
        if self.thr_safe < self.thr_risky {
            return Err(AdvisorError::InvalidCutoffs {
                thr_safe: self.thr_safe,
                thr_risky: self.thr_risky,
            });
        }
        Ok(())
    }

    /// Lenient repair used on automatic paths: raise anything under its floor
    /// and swap an inverted safe/risky pair. The inversion, if any, is
    /// returned so the caller can surface it.
    pub fn repaired(self, floors: &Cutoffs) -> (Cutoffs, Option<AdvisorError>) {
        let mut c = Cutoffs {
            min_ev: self.min_ev.max(floors.min_ev),
            thr_safe: self.thr_safe.max(floors.thr_safe),
            thr_risky: self.thr_risky.max(floors.thr_risky),
        };
        let mut violation = None;
        if c.thr_safe < c.thr_risky {
            violation = Some(AdvisorError::InvalidCutoffs {
                thr_safe: c.thr_safe,
                thr_risky: c.thr_risky,
            });
            std::mem::swap(&mut c.thr_safe, &mut c.thr_risky);
        }
        (c, violation)
    }
}

/// Names of the adaptive feature weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightKey {
    Ev,
    Confidence,
    Momentum,
    Drift,
    Surface,
    Form,
}

impl WeightKey {
    pub const ALL: [WeightKey; 6] = [
        WeightKey::Ev,
        WeightKey::Confidence,
        WeightKey::Momentum,
        WeightKey::Drift,
        WeightKey::Surface,
        WeightKey::Form,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WeightKey::Ev => "ev",
            WeightKey::Confidence => "confidence",
            WeightKey::Momentum => "momentum",
            WeightKey::Drift => "drift",
            WeightKey::Surface => "surface",
            WeightKey::Form => "form",
        }
    }

    /// Inclusive bounds per key. EV and confidence weights scale the gate
    /// thresholds, so they may only tighten (>= 1.0).
    pub fn bounds(self) -> (f64, f64) {
        match self {
            WeightKey::Ev | WeightKey::Confidence => (1.0, 2.0),
            _ => (0.0, 2.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    pub ev: f64,
    pub confidence: f64,
    pub momentum: f64,
    pub drift: f64,
    pub surface: f64,
    pub form: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        FeatureWeights {
            ev: 1.0,
            confidence: 1.0,
            momentum: 1.0,
            drift: 1.0,
            surface: 1.0,
            form: 1.0,
        }
    }
}

impl FeatureWeights {
    pub fn get(&self, key: WeightKey) -> f64 {
        match key {
            WeightKey::Ev => self.ev,
            WeightKey::Confidence => self.confidence,
            WeightKey::Momentum => self.momentum,
            WeightKey::Drift => self.drift,
            WeightKey::Surface => self.surface,
            WeightKey::Form => self.form,
        }
    }

    /// Set a weight, clamped into the key's bounds.
    pub fn set(&mut self, key: WeightKey, value: f64) {
        let (lo, hi) = key.bounds();
        let v = value.clamp(lo, hi);
        match key {
            WeightKey::Ev => self.ev = v,
            WeightKey::Confidence => self.confidence = v,
            WeightKey::Momentum => self.momentum = v,
            WeightKey::Drift => self.drift = v,
            WeightKey::Surface => self.surface = v,
            WeightKey::Form => self.form = v,
        }
    }
}

/// Relief-valve bookkeeping for the threshold tuner
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveState {
    pub no_safe_streak: u32,
    pub last_adjustment: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub version: u64,
    pub cutoffs: Cutoffs,
    pub floors: Cutoffs,
    pub weights: FeatureWeights,
    pub adaptive: AdaptiveState,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::new(Cutoffs::default(), Cutoffs::default_floors())
    }
}

/// Partial config as delivered by the remote endpoint. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    pub min_ev: Option<f64>,
    pub thr_safe: Option<f64>,
    pub thr_risky: Option<f64>,
    pub weights: Vec<(WeightKey, f64)>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.min_ev.is_none()
            && self.thr_safe.is_none()
            && self.thr_risky.is_none()
            && self.weights.is_empty()
    }
}

impl EngineConfig {
    pub fn new(cutoffs: Cutoffs, floors: Cutoffs) -> Self {
        let (cutoffs, _) = cutoffs.repaired(&floors);
        EngineConfig {
            version: 1,
            cutoffs,
            floors,
            weights: FeatureWeights::default(),
            adaptive: AdaptiveState::default(),
        }
    }

    /// Effective gates after weight scaling: (minEV, thrSafe, thrRisky).
    pub fn effective_gates(&self) -> Cutoffs {
        Cutoffs {
            min_ev: self.cutoffs.min_ev * self.weights.ev,
            thr_safe: self.cutoffs.thr_safe * self.weights.confidence,
            thr_risky: self.cutoffs.thr_risky * self.weights.confidence,
        }
    }

    /// Merge a remote patch over the current values. Non-finite or
    /// negative numbers are dropped; floors and the safe >= risky ordering
    /// are repaired, with a warning when the inversion came from the patch.
    pub fn merged_with(&self, patch: &ConfigPatch) -> EngineConfig {
        let mut next = self.clone();
        let usable = |v: Option<f64>| v.filter(|x| x.is_finite() && *x >= 0.0);

        let proposed = Cutoffs {
            min_ev: usable(patch.min_ev).unwrap_or(self.cutoffs.min_ev),
            thr_safe: usable(patch.thr_safe).unwrap_or(self.cutoffs.thr_safe),
            thr_risky: usable(patch.thr_risky).unwrap_or(self.cutoffs.thr_risky),
        };
        let (cutoffs, violation) = proposed.repaired(&self.floors);
        if let Some(err) = violation {
            warn!("Remote cutoffs auto-repaired: {}", err);
        }
        next.cutoffs = cutoffs;

        for (key, value) in &patch.weights {
            if !value.is_finite() || *value < 0.0 {
                warn!(
                    "Ignoring remote weight: {}",
                    AdvisorError::InvalidWeight {
                        key: key.as_str().to_string(),
                        value: *value,
                    }
                );
                continue;
            }
            next.weights.set(*key, *value);
        }
        next
    }
}

/// Shared owner of the current [`EngineConfig`].
///
/// Readers clone an `Arc` snapshot and keep it for a whole cycle; writers
/// run a pure update under the write lock and the version is bumped only
/// when something actually changed.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<Arc<EngineConfig>>>,
}

impl ConfigStore {
    pub fn new(config: EngineConfig) -> Self {
        ConfigStore {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub async fn snapshot(&self) -> Arc<EngineConfig> {
        self.inner.read().await.clone()
    }

    /// Apply `f` to the current config and swap in its result.
    /// Returns the config now in place plus whatever `f` reported.
    pub async fn update<F, T>(&self, f: F) -> (Arc<EngineConfig>, T)
    where
        F: FnOnce(&EngineConfig) -> (EngineConfig, T),
    {
        let mut guard = self.inner.write().await;
        let (mut next, out) = f(&guard);
        next.version = guard.version;
        if next != **guard {
            next.version = guard.version + 1;
            *guard = Arc::new(next);
        }
        (guard.clone(), out)
    }

    /// Try an update that may be rejected; nothing is written on error.
    pub async fn try_update<F>(&self, f: F) -> Result<Arc<EngineConfig>>
    where
        F: FnOnce(&EngineConfig) -> Result<EngineConfig>,
    {
        let mut guard = self.inner.write().await;
        let mut next = f(&guard)?;
        next.version = guard.version;
        if next != **guard {
            next.version = guard.version + 1;
            *guard = Arc::new(next);
        }
        Ok(guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn repaired_swaps_inverted_pair_and_reports_it() {
        let c = Cutoffs {
            min_ev: 0.02,
            thr_safe: 0.20,
            thr_risky: 0.25,
        };
        let (fixed, violation) = c.repaired(&Cutoffs::default_floors());
        assert_relative_eq!(fixed.thr_safe, 0.25);
        assert_relative_eq!(fixed.thr_risky, 0.20);
        assert!(matches!(violation, Some(AdvisorError::InvalidCutoffs { .. })));
    }

    #[test]
    fn repaired_raises_values_to_floors() {
        let c = Cutoffs {
            min_ev: -0.5,
            thr_safe: 0.01,
            thr_risky: 0.01,
        };
        let floors = Cutoffs::default_floors();
        let (fixed, _) = c.repaired(&floors);
        assert!(fixed.min_ev >= floors.min_ev);
        assert!(fixed.thr_safe >= floors.thr_safe);
        assert!(fixed.thr_risky >= floors.thr_risky);
        assert!(fixed.thr_safe >= fixed.thr_risky);
    }

    #[test]
    fn validate_rejects_inversion_and_floor_breach() {
        let floors = Cutoffs::default_floors();
        let inverted = Cutoffs {
            min_ev: 0.02,
            thr_safe: 0.20,
            thr_risky: 0.25,
        };
        assert!(matches!(
            inverted.validate(&floors),
            Err(AdvisorError::InvalidCutoffs { .. })
        ));
        let low = Cutoffs {
            min_ev: 0.02,
            thr_safe: 0.10,
            thr_risky: 0.09,
        };
        assert!(matches!(
            low.validate(&floors),
            Err(AdvisorError::CutoffBelowFloor { field: "thrSafe", .. })
        ));
        assert!(Cutoffs::default().validate(&floors).is_ok());
    }

    #[test]
    fn weights_are_clamped_to_bounds() {
        let mut w = FeatureWeights::default();
        w.set(WeightKey::Momentum, -3.0);
        w.set(WeightKey::Confidence, 0.2);
        w.set(WeightKey::Ev, 9.0);
        assert_relative_eq!(w.momentum, 0.0);
        assert_relative_eq!(w.confidence, 1.0);
        assert_relative_eq!(w.ev, 2.0);
    }

    #[test]
    fn merge_ignores_bad_values_and_keeps_the_rest() {
        let cfg = EngineConfig::default();
        let patch = ConfigPatch {
            min_ev: Some(f64::NAN),
            thr_safe: Some(0.40),
            thr_risky: None,
            weights: vec![(WeightKey::Momentum, -1.0), (WeightKey::Drift, 0.5)],
        };
        let merged = cfg.merged_with(&patch);
        assert_relative_eq!(merged.cutoffs.min_ev, DEFAULT_MIN_EV);
        assert_relative_eq!(merged.cutoffs.thr_safe, 0.40);
        assert_relative_eq!(merged.weights.momentum, 1.0);
        assert_relative_eq!(merged.weights.drift, 0.5);
    }

    #[tokio::test]
    async fn store_bumps_version_only_on_change() {
        let store = ConfigStore::new(EngineConfig::default());
        let (same, _) = store.update(|c| (c.clone(), ())).await;
        assert_eq!(same.version, 1);

        let (changed, _) = store
            .update(|c| {
                let mut next = c.clone();
                next.adaptive.no_safe_streak = 3;
                (next, ())
            })
            .await;
        assert_eq!(changed.version, 2);
        assert_eq!(store.snapshot().await.adaptive.no_safe_streak, 3);
    }

    #[tokio::test]
    async fn rejected_update_leaves_store_untouched() {
        let store = ConfigStore::new(EngineConfig::default());
        let res = store
            .try_update(|_| {
                Err(AdvisorError::InvalidCutoffs {
                    thr_safe: 0.1,
                    thr_risky: 0.2,
                })
            })
            .await;
        assert!(res.is_err());
        assert_eq!(store.snapshot().await.version, 1);
    }
}
