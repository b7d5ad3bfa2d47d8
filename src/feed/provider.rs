use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::MatchSnapshot;

/// Trait that every live tennis feed must implement.
#[async_trait]
pub trait MatchFeed: Send + Sync {
    /// Return a normalized snapshot of all matches the feed currently lists.
    async fn fetch_matches(&self) -> Result<Vec<MatchSnapshot>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
