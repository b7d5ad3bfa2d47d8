pub mod normalize;
pub mod provider;
pub mod remote_config;
pub mod rest;

pub use provider::MatchFeed;
pub use rest::RestFeed;

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::db::models::MatchSnapshot;

/// Merge per-feed results by match id; earlier feeds win on conflicts.
/// Returns `None` when every feed failed, so the caller can skip the cycle.
pub fn merge_results(results: Vec<(String, Result<Vec<MatchSnapshot>>)>) -> Option<Vec<MatchSnapshot>> {
    let mut any_ok = false;
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for (feed_name, result) in results {
        match result {
            Ok(matches) => {
                any_ok = true;
                for m in matches {
                    if seen.insert(m.id.clone()) {
                        merged.push(m);
                    }
                }
            }
            Err(e) => warn!("Feed '{}' failed: {}", feed_name, e),
        }
    }
    any_ok.then_some(merged)
}

/// Poll every feed concurrently, each bounded by `timeout`.
pub async fn poll_once(feeds: &[Arc<dyn MatchFeed>], timeout: Duration) -> Option<Vec<MatchSnapshot>> {
    let fetch_futures: Vec<_> = feeds
        .iter()
        .map(|f| {
            let f = Arc::clone(f);
            async move {
                let out = match tokio::time::timeout(timeout, f.fetch_matches()).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("timed out after {:?}", timeout)),
                };
                (f.name().to_string(), out)
            }
        })
        .collect();
    let results = futures_util::future::join_all(fetch_futures).await;
    merge_results(results)
}

/// Spawns a background task that polls all feeds at `poll_interval` and
/// sends each merged batch through the returned channel.
///
/// A poll where every feed failed or timed out sends nothing: the scoring
/// loop simply sees no cycle and all shared stores keep their last state.
pub fn start_feed_monitor(
    feeds: Vec<Arc<dyn MatchFeed>>,
    poll_interval: Duration,
    fetch_timeout: Duration,
) -> mpsc::Receiver<Vec<MatchSnapshot>> {
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        let names: Vec<&str> = feeds.iter().map(|f| f.name()).collect();
        info!(
            "Feed monitor started ({} feeds: {:?}, interval={:?}, timeout={:?})",
            feeds.len(),
            names,
            poll_interval,
            fetch_timeout
        );

        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let Some(batch) = poll_once(&feeds, fetch_timeout).await else {
                warn!("All feeds failed; skipping cycle");
                continue;
            };
            if let Err(e) = tx.try_send(batch) {
                match e {
                    mpsc::error::TrySendError::Full(_) => {
                        error!("Scoring loop is behind, batch DROPPED");
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        info!("Feed monitor stopping: receiver closed");
                        break;
                    }
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PlayerRecord;
    use async_trait::async_trait;

    struct StaticFeed {
        name: &'static str,
        ids: Vec<&'static str>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl MatchFeed for StaticFeed {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_matches(&self) -> Result<Vec<MatchSnapshot>> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(self
                .ids
                .iter()
                .map(|id| MatchSnapshot {
                    id: id.to_string(),
                    players: [
                        PlayerRecord {
                            name: format!("{}-a", self.name),
                            ..Default::default()
                        },
                        PlayerRecord {
                            name: format!("{}-b", self.name),
                            ..Default::default()
                        },
                    ],
                    status: "Live".into(),
                    point_score: String::new(),
                    surface: String::new(),
                    category: String::new(),
                    odds: None,
                })
                .collect())
        }
    }

    fn feed(name: &'static str, ids: Vec<&'static str>, delay_ms: u64, fail: bool) -> Arc<dyn MatchFeed> {
        Arc::new(StaticFeed {
            name,
            ids,
            delay: Duration::from_millis(delay_ms),
            fail,
        })
    }

    #[tokio::test]
    async fn first_feed_wins_on_duplicate_ids() {
        let feeds = vec![feed("primary", vec!["m1", "m2"], 0, false), feed("backup", vec!["m2", "m3"], 0, false)];
        let batch = poll_once(&feeds, Duration::from_secs(1)).await.unwrap();
        assert_eq!(batch.len(), 3);
        let m2 = batch.iter().find(|m| m.id == "m2").unwrap();
        assert_eq!(m2.players[0].name, "primary-a");
    }

    #[tokio::test]
    async fn slow_feed_is_cut_off_but_others_survive() {
        let feeds = vec![feed("slow", vec!["m1"], 500, false), feed("fast", vec!["m2"], 0, false)];
        let batch = poll_once(&feeds, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "m2");
    }

    #[tokio::test]
    async fn all_feeds_failing_skips_the_cycle() {
        let feeds = vec![feed("slow", vec!["m1"], 500, false), feed("broken", vec![], 0, true)];
        assert!(poll_once(&feeds, Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn empty_but_healthy_feed_still_runs_a_cycle() {
        let feeds = vec![feed("quiet", vec![], 0, false)];
        assert_eq!(poll_once(&feeds, Duration::from_secs(1)).await, Some(vec![]));
    }

    #[tokio::test]
    async fn monitor_delivers_batches() {
        let feeds = vec![feed("primary", vec!["m1"], 0, false)];
        let mut rx = start_feed_monitor(feeds, Duration::from_millis(10), Duration::from_secs(1));
        let batch = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch[0].id, "m1");
    }
}
