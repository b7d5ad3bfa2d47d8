use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod config;
mod dashboard;
mod db;
mod engine;
mod error;
mod feed;

use config::Config;
use dashboard::AppState;
use db::Database;
use engine::feedback::FeedbackLog;
use engine::state::EngineConfig;
use engine::{Engine, EngineHandle};
use feed::remote_config::RemoteConfigClient;
use feed::{start_feed_monitor, MatchFeed, RestFeed};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    // Restore the last persisted config, keeping this run's floors
    let engine_config = match db.load_engine_config()? {
        Some(mut stored) => {
            stored.floors = config.floors();
            let (cutoffs, violation) = stored.cutoffs.repaired(&stored.floors);
            if let Some(e) = violation {
                warn!("Stored cutoffs auto-repaired: {}", e);
            }
            stored.cutoffs = cutoffs;
            info!(
                "Restored engine config v{} (minEV={:.4} thrSafe={:.3} thrRisky={:.3})",
                stored.version, stored.cutoffs.min_ev, stored.cutoffs.thr_safe, stored.cutoffs.thr_risky
            );
            stored
        }
        None => EngineConfig::new(config.cutoffs(), config.floors()),
    };

    let feedback = FeedbackLog::from_entries(
        config.feedback_log_cap,
        db.list_feedback(config.feedback_log_cap)?,
    );
    info!("Loaded {} outcome(s) into the feedback log", feedback.len());

    let handle = EngineHandle::new(engine_config, feedback, Some(db.clone()));

    // Build feeds; the primary is listed first so it wins on duplicate ids
    let fetch_timeout = config.fetch_timeout();
    let mut feeds: Vec<Arc<dyn MatchFeed>> = Vec::new();
    feeds.push(Arc::new(RestFeed::new("primary", &config.feed_url, fetch_timeout)?));
    if let Some(url) = &config.backup_feed_url {
        feeds.push(Arc::new(RestFeed::new("backup", url, fetch_timeout)?));
    }
    info!("Configured {} feed(s)", feeds.len());

    // Scoring loop: one full pipeline cycle per delivered batch
    {
        let handle = handle.clone();
        let mut engine = Engine::new(config.drift_store_cap, config.stake_params());
        let poll_interval = Duration::from_secs(config.poll_interval_secs);
        let mut rx = start_feed_monitor(feeds, poll_interval, fetch_timeout);
        tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                handle.run_cycle(&mut engine, &batch, Utc::now()).await;
            }
            warn!("Feed channel closed; scoring loop stopped");
        });
    }

    // Remote config refresh
    match &config.remote_config_url {
        Some(url) => {
            let client = RemoteConfigClient::new(url, fetch_timeout)?;
            let handle = handle.clone();
            let every = Duration::from_secs(config.config_refresh_secs);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(every);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    match tokio::time::timeout(fetch_timeout, client.fetch()).await {
                        Ok(Ok(patch)) if patch.is_empty() => {
                            warn!("Remote config at {} had no usable fields", client.url());
                        }
                        Ok(Ok(patch)) => {
                            handle.apply_remote(&patch).await;
                        }
                        Ok(Err(e)) => warn!("Remote config fetch failed, keeping current: {}", e),
                        Err(_) => warn!("Remote config fetch timed out after {:?}, keeping current", fetch_timeout),
                    }
                }
            });
        }
        None => info!("No remote config URL; using local cutoffs"),
    }

    // Feedback weight adaptation
    {
        let handle = handle.clone();
        let every = Duration::from_secs(config.weight_adapt_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick fires immediately; wait a full period before adapting
            interval.tick().await;
            loop {
                interval.tick().await;
                let report = handle.adapt_weights().await;
                info!(
                    "Weight adaptation: {} samples, {} change(s), SAFE hit={:?} RISKY hit={:?}",
                    report.samples,
                    report.changes.len(),
                    report.safe_hit_rate,
                    report.risky_hit_rate
                );
            }
        });
    }

    // Start the operator API
    let app = dashboard::router(AppState { engine: handle });
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("Operator API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run API server (blocks until shutdown)
    axum::serve(listener, app).await?;

    Ok(())
}
