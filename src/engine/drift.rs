//! Odds drift tracking between polls.
//!
//! Keeps the last observed odds (and game differential) per match so the
//! next poll can measure line movement and score swings. The store is
//! bounded: entries expire after 24h without an update, and when the cap is
//! reached the oldest 30% are dropped before inserting.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::db::models::OddsPair;

pub const DEFAULT_STORE_CAP: usize = 800;
pub const DEFAULT_TTL_HOURS: i64 = 24;
const EVICT_FRACTION: f64 = 0.30;

/// Relative move of a decimal price between two observations.
/// Positive = the price shortened (market moved toward that side).
/// Bounded to [-1, 1]; 0 for non-positive or non-finite inputs.
pub fn relative_move(previous: f64, current: f64) -> f64 {
    let ok = |x: f64| x.is_finite() && x > 0.0;
    if !ok(previous) || !ok(current) {
        return 0.0;
    }
    ((previous - current) / previous).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OddsObservation {
    observed_at: DateTime<Utc>,
    odds: Option<OddsPair>,
    game_differential: i32,
}

/// Movement since the previous poll of the same match
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReading {
    pub move_a: f64,
    pub move_b: f64,
    /// Absolute change in the active-set game differential
    pub swing: u32,
    pub has_previous: bool,
}

impl DriftReading {
    pub fn magnitude(&self) -> f64 {
        self.move_a.abs().max(self.move_b.abs())
    }
}

pub struct OddsSnapshotStore {
    entries: HashMap<String, OddsObservation>,
    cap: usize,
    ttl: Duration,
}

impl OddsSnapshotStore {
    pub fn new(cap: usize) -> Self {
        OddsSnapshotStore {
            entries: HashMap::new(),
            cap: cap.max(1),
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn contains(&self, match_id: &str) -> bool {
        self.entries.contains_key(match_id)
    }

    /// Record this poll's odds for `match_id` and return the movement
    /// relative to the previous poll. No previous entry → neutral reading.
    pub fn observe(
        &mut self,
        match_id: &str,
        odds: Option<OddsPair>,
        game_differential: i32,
        now: DateTime<Utc>,
    ) -> DriftReading {
        self.evict(match_id, now);

        let previous = self.entries.get(match_id).copied();
        let reading = match previous {
            Some(prev) => {
                let (move_a, move_b) = match (prev.odds, odds) {
                    (Some(p), Some(c)) => (relative_move(p.a, c.a), relative_move(p.b, c.b)),
                    _ => (0.0, 0.0),
                };
                DriftReading {
                    move_a,
                    move_b,
                    swing: game_differential.abs_diff(prev.game_differential),
                    has_previous: true,
                }
            }
            None => DriftReading::default(),
        };

        self.entries.insert(
            match_id.to_string(),
            OddsObservation {
                observed_at: now,
                // keep the last known line when this poll carried no odds
                odds: odds.or(previous.and_then(|p| p.odds)),
                game_differential,
            },
        );
        reading
    }

    fn evict(&mut self, incoming: &str, now: DateTime<Utc>) {
        let cutoff = now - self.ttl;
        self.entries.retain(|_, obs| obs.observed_at >= cutoff);

        if self.entries.len() < self.cap || self.entries.contains_key(incoming) {
            return;
        }
        let drop_count = ((self.entries.len() as f64 * EVICT_FRACTION).ceil() as usize).max(1);
        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|(id, obs)| (obs.observed_at, id.clone()))
            .collect();
        by_age.sort();
        for (_, id) in by_age.into_iter().take(drop_count) {
            self.entries.remove(&id);
        }
        debug!(
            "OddsSnapshotStore evicted {} oldest entries ({} remain)",
            drop_count,
            self.entries.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn odds(a: f64, b: f64) -> Option<OddsPair> {
        OddsPair::new(a, b)
    }

    #[test]
    fn first_observation_is_neutral() {
        let mut store = OddsSnapshotStore::new(10);
        let r = store.observe("m1", odds(1.5, 2.5), 0, Utc::now());
        assert!(!r.has_previous);
        assert_relative_eq!(r.move_a, 0.0);
        assert_relative_eq!(r.move_b, 0.0);
    }

    #[test]
    fn identical_odds_twice_yield_zero_move() {
        let mut store = OddsSnapshotStore::new(10);
        let now = Utc::now();
        store.observe("m1", odds(1.5, 2.5), 1, now);
        let r = store.observe("m1", odds(1.5, 2.5), 1, now + Duration::seconds(15));
        assert!(r.has_previous);
        assert_relative_eq!(r.move_a, 0.0);
        assert_relative_eq!(r.move_b, 0.0);
        assert_eq!(r.swing, 0);
    }

    #[test]
    fn shortening_is_positive() {
        let mut store = OddsSnapshotStore::new(10);
        let now = Utc::now();
        store.observe("m1", odds(2.0, 1.8), 0, now);
        let r = store.observe("m1", odds(1.6, 2.3), 2, now + Duration::seconds(15));
        assert_relative_eq!(r.move_a, 0.2, epsilon = 1e-12);
        assert!(r.move_b < 0.0);
        assert_eq!(r.swing, 2);
    }

    #[test]
    fn relative_move_is_bounded() {
        for (p, c) in [(1.01, 50.0), (50.0, 1.01), (2.0, 2.0), (1.5, 900.0)] {
            let m = relative_move(p, c);
            assert!((-1.0..=1.0).contains(&m), "{} -> {} gave {}", p, c, m);
        }
        assert_relative_eq!(relative_move(0.0, 2.0), 0.0);
        assert_relative_eq!(relative_move(2.0, f64::NAN), 0.0);
    }

    #[test]
    fn missing_odds_keep_previous_line() {
        let mut store = OddsSnapshotStore::new(10);
        let now = Utc::now();
        store.observe("m1", odds(2.0, 1.8), 0, now);
        let r = store.observe("m1", None, 0, now + Duration::seconds(15));
        assert_relative_eq!(r.move_a, 0.0);
        let r = store.observe("m1", odds(1.8, 2.0), 0, now + Duration::seconds(30));
        assert_relative_eq!(r.move_a, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let mut store = OddsSnapshotStore::new(10);
        let start = Utc::now();
        store.observe("old", odds(2.0, 1.8), 0, start);
        store.observe("new", odds(2.0, 1.8), 0, start + Duration::hours(23));
        let r = store.observe("old", odds(1.5, 2.5), 0, start + Duration::hours(25));
        assert!(!r.has_previous);
        assert!(store.contains("new"));
    }

    #[test]
    fn cap_evicts_oldest_thirty_percent() {
        let mut store = OddsSnapshotStore::new(10);
        let start = Utc::now();
        for i in 0..10 {
            store.observe(&format!("m{}", i), odds(2.0, 1.8), 0, start + Duration::seconds(i));
        }
        assert_eq!(store.len(), 10);
        store.observe("m10", odds(2.0, 1.8), 0, start + Duration::seconds(20));
        // 3 oldest gone, newcomer inserted
        assert_eq!(store.len(), 8);
        assert!(!store.contains("m0"));
        assert!(!store.contains("m2"));
        assert!(store.contains("m3"));
        assert!(store.contains("m10"));
    }

    #[test]
    fn updating_a_known_match_never_evicts() {
        let mut store = OddsSnapshotStore::new(3);
        let start = Utc::now();
        for i in 0..3 {
            store.observe(&format!("m{}", i), odds(2.0, 1.8), 0, start + Duration::seconds(i));
        }
        store.observe("m1", odds(1.9, 1.9), 0, start + Duration::seconds(5));
        assert_eq!(store.len(), 3);
    }
}
