use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::engine::kelly::StakeParams;
use crate::engine::state::Cutoffs;

/// Live tennis advisory engine
#[derive(Parser, Debug, Clone)]
#[command(name = "tennis-advisor", version, about)]
pub struct Config {
    /// Live match feed URL (JSON)
    #[arg(long, env = "FEED_URL", default_value = "http://127.0.0.1:9000/live/tennis")]
    pub feed_url: String,

    /// Optional second feed; on duplicate match ids the primary wins
    #[arg(long, env = "BACKUP_FEED_URL")]
    pub backup_feed_url: Option<String>,

    /// Optional remote cutoffs / weights endpoint
    #[arg(long, env = "REMOTE_CONFIG_URL")]
    pub remote_config_url: Option<String>,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "advisor.db")]
    pub database_path: String,

    /// Operator API listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// Scoring cycle interval in seconds
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "15")]
    pub poll_interval_secs: u64,

    /// Remote config refresh interval in seconds
    #[arg(long, env = "CONFIG_REFRESH_SECS", default_value = "900")]
    pub config_refresh_secs: u64,

    /// Feedback weight adaptation interval in seconds
    #[arg(long, env = "WEIGHT_ADAPT_SECS", default_value = "1800")]
    pub weight_adapt_secs: u64,

    /// Timeout for every outbound fetch, in milliseconds
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value = "8500")]
    pub fetch_timeout_ms: u64,

    /// Fraction of full Kelly to stake (0.0–1.0)
    #[arg(long, env = "KELLY_FRACTION", default_value = "0.25")]
    pub kelly_fraction: f64,

    /// Base stake cap as a fraction of bankroll
    #[arg(long, env = "BASE_STAKE_CAP", default_value = "0.02")]
    pub base_stake_cap: f64,

    /// Soft floor for strictly positive stakes
    #[arg(long, env = "STAKE_FLOOR", default_value = "0.003")]
    pub stake_floor: f64,

    /// Minimum expected value for an actionable label
    #[arg(long, env = "MIN_EV", default_value = "0.02")]
    pub min_ev: f64,

    /// Confidence required for SAFE
    #[arg(long, env = "THR_SAFE", default_value = "0.30")]
    pub thr_safe: f64,

    /// Confidence required for RISKY
    #[arg(long, env = "THR_RISKY", default_value = "0.15")]
    pub thr_risky: f64,

    #[arg(long, env = "MIN_EV_FLOOR", default_value = "0.0")]
    pub min_ev_floor: f64,

    #[arg(long, env = "THR_SAFE_FLOOR", default_value = "0.18")]
    pub thr_safe_floor: f64,

    #[arg(long, env = "THR_RISKY_FLOOR", default_value = "0.08")]
    pub thr_risky_floor: f64,

    /// Matches kept in the odds drift store
    #[arg(long, env = "DRIFT_STORE_CAP", default_value = "800")]
    pub drift_store_cap: usize,

    /// Outcomes kept in the feedback log
    #[arg(long, env = "FEEDBACK_LOG_CAP", default_value = "200")]
    pub feedback_log_cap: usize,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.kelly_fraction) {
            anyhow::bail!("kelly_fraction must be between 0.0 and 1.0");
        }
        if !(self.base_stake_cap > 0.0 && self.base_stake_cap <= 1.0) {
            anyhow::bail!("base_stake_cap must be in (0.0, 1.0]");
        }
        if !(0.0..=self.base_stake_cap).contains(&self.stake_floor) {
            anyhow::bail!("stake_floor must be between 0.0 and base_stake_cap");
        }
        for (name, secs) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("config_refresh_secs", self.config_refresh_secs),
            ("weight_adapt_secs", self.weight_adapt_secs),
            ("fetch_timeout_ms", self.fetch_timeout_ms),
        ] {
            if secs == 0 {
                anyhow::bail!("{} must be positive", name);
            }
        }
        if self.drift_store_cap == 0 || self.feedback_log_cap == 0 {
            anyhow::bail!("drift_store_cap and feedback_log_cap must be positive");
        }
        for url in std::iter::once(&self.feed_url)
            .chain(self.backup_feed_url.iter())
            .chain(self.remote_config_url.iter())
        {
            url::Url::parse(url).map_err(|e| anyhow::anyhow!("invalid URL '{}': {}", url, e))?;
        }
        self.dashboard_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid dashboard_addr '{}': {}", self.dashboard_addr, e))?;
        self.cutoffs()
            .validate(&self.floors())
            .map_err(|e| anyhow::anyhow!("starting cutoffs rejected: {}", e))?;
        Ok(())
    }

    pub fn cutoffs(&self) -> Cutoffs {
        Cutoffs {
            min_ev: self.min_ev,
            thr_safe: self.thr_safe,
            thr_risky: self.thr_risky,
        }
    }

    pub fn floors(&self) -> Cutoffs {
        Cutoffs {
            min_ev: self.min_ev_floor,
            thr_safe: self.thr_safe_floor,
            thr_risky: self.thr_risky_floor,
        }
    }

    pub fn stake_params(&self) -> StakeParams {
        StakeParams {
            kelly_multiplier: self.kelly_fraction,
            base_cap: self.base_stake_cap,
            floor: self.stake_floor,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
