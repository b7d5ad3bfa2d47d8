use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

use crate::engine::state::EngineConfig;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Engine state ──────────────────────────────────────────────────────────

    /// Persist the current versioned config (single row, overwritten)
    pub fn save_engine_config(&self, config: &EngineConfig) -> Result<()> {
        let json = serde_json::to_string(config)?;
        self.conn()?.execute(
            "INSERT INTO engine_state (id, version, config_json, updated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                version=excluded.version,
                config_json=excluded.config_json,
                updated_at=excluded.updated_at",
            params![config.version as i64, json, Utc::now()],
        )?;
        Ok(())
    }

    pub fn load_engine_config(&self) -> Result<Option<EngineConfig>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row("SELECT config_json FROM engine_state WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    // ── Feedback log ──────────────────────────────────────────────────────────

    /// Append an outcome and trim the table to the newest `cap` rows
    pub fn insert_feedback(&self, entry: &FeedbackLogEntry, cap: usize) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO feedback_log (match_id, label, result, confidence, expected_value, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.match_id,
                entry.label.as_str(),
                entry.result.as_str(),
                entry.confidence,
                entry.expected_value,
                entry.timestamp,
            ],
        )?;
        conn.execute(
            "DELETE FROM feedback_log WHERE id NOT IN (
                SELECT id FROM feedback_log ORDER BY id DESC LIMIT ?1
             )",
            params![cap as i64],
        )?;
        Ok(())
    }

    /// Newest `limit` outcomes, returned oldest first
    pub fn list_feedback(&self, limit: usize) -> Result<Vec<FeedbackLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT match_id, label, result, confidence, expected_value, recorded_at
             FROM feedback_log ORDER BY id DESC LIMIT ?1",
        )?;
        let mut entries = stmt
            .query_map(params![limit as i64], map_feedback)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    /// Upsert the latest prediction per match
    pub fn upsert_prediction(&self, p: &Prediction) -> Result<()> {
        let pick = p.pick.map(|s| match s {
            Side::A => "A",
            Side::B => "B",
        });
        let source = match p.source {
            ProbabilitySource::Market => "market",
            ProbabilitySource::Fallback => "fallback",
        };
        self.conn()?.execute(
            "INSERT INTO predictions (
                match_id, event_name, label, pick, confidence, expected_value,
                fraction, stake_pct, prob_a, prob_b, volatility, source,
                in_window, rationale, generated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
             ON CONFLICT(match_id) DO UPDATE SET
                event_name=excluded.event_name,
                label=excluded.label,
                pick=excluded.pick,
                confidence=excluded.confidence,
                expected_value=excluded.expected_value,
                fraction=excluded.fraction,
                stake_pct=excluded.stake_pct,
                prob_a=excluded.prob_a,
                prob_b=excluded.prob_b,
                volatility=excluded.volatility,
                source=excluded.source,
                in_window=excluded.in_window,
                rationale=excluded.rationale,
                generated_at=excluded.generated_at",
            params![
                p.match_id,
                p.event_name,
                p.label.as_str(),
                pick,
                p.confidence,
                p.expected_value,
                p.fraction,
                p.stake_pct,
                p.prob_a,
                p.prob_b,
                p.volatility,
                source,
                p.in_window,
                p.rationale,
                p.generated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_prediction(&self, match_id: &str) -> Result<Option<Prediction>> {
        let conn = self.conn()?;
        let p = conn
            .query_row(
                &format!("{} WHERE match_id = ?1", PREDICTION_SELECT),
                params![match_id],
                map_prediction,
            )
            .optional()?;
        Ok(p)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const PREDICTION_SELECT: &str = "SELECT match_id, event_name, label, pick, confidence, expected_value,
        fraction, stake_pct, prob_a, prob_b, volatility, source,
        in_window, rationale, generated_at
 FROM predictions";

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn map_feedback(row: &rusqlite::Row) -> rusqlite::Result<FeedbackLogEntry> {
    let label: String = row.get(1)?;
    let result: String = row.get(2)?;
    Ok(FeedbackLogEntry {
        match_id: row.get(0)?,
        label: label.parse().map_err(|e| conversion_err(1, e))?,
        result: result.parse().map_err(|e| conversion_err(2, e))?,
        confidence: row.get(3)?,
        expected_value: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    let label: String = row.get(2)?;
    let pick: Option<String> = row.get(3)?;
    let source: String = row.get(11)?;
    Ok(Prediction {
        match_id: row.get(0)?,
        event_name: row.get(1)?,
        label: label.parse().map_err(|e| conversion_err(2, e))?,
        pick: match pick.as_deref() {
            Some("A") => Some(Side::A),
            Some("B") => Some(Side::B),
            _ => None,
        },
        confidence: row.get(4)?,
        expected_value: row.get(5)?,
        fraction: row.get(6)?,
        stake_pct: row.get(7)?,
        prob_a: row.get(8)?,
        prob_b: row.get(9)?,
        volatility: row.get(10)?,
        source: if source == "market" {
            ProbabilitySource::Market
        } else {
            ProbabilitySource::Fallback
        },
        in_window: row.get(12)?,
        rationale: row.get(13)?,
        generated_at: row.get(14)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS engine_state (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    version     INTEGER NOT NULL,
    config_json TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS feedback_log (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id       TEXT    NOT NULL,
    label          TEXT    NOT NULL,
    result         TEXT    NOT NULL,
    confidence     REAL    NOT NULL,
    expected_value REAL    NOT NULL,
    recorded_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS predictions (
    match_id       TEXT    PRIMARY KEY,
    event_name     TEXT    NOT NULL,
    label          TEXT    NOT NULL,
    pick           TEXT,
    confidence     REAL    NOT NULL,
    expected_value REAL    NOT NULL,
    fraction       REAL    NOT NULL,
    stake_pct      REAL    NOT NULL,
    prob_a         REAL    NOT NULL,
    prob_b         REAL    NOT NULL,
    volatility     REAL    NOT NULL,
    source         TEXT    NOT NULL,
    in_window      INTEGER NOT NULL,
    rationale      TEXT    NOT NULL,
    generated_at   TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feedback_match ON feedback_log(match_id);
CREATE INDEX IF NOT EXISTS idx_predictions_label ON predictions(label);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(id: &str, label: Label) -> Prediction {
        Prediction {
            match_id: id.into(),
            event_name: "Alpha vs Bravo".into(),
            label,
            pick: Some(Side::B),
            confidence: 0.31,
            expected_value: 0.04,
            fraction: 0.05,
            stake_pct: 0.02,
            prob_a: 0.35,
            prob_b: 0.65,
            volatility: 0.4,
            source: ProbabilitySource::Market,
            in_window: true,
            rationale: "test".into(),
            generated_at: Utc::now(),
        }
    }

    fn feedback(id: usize, result: OutcomeResult) -> FeedbackLogEntry {
        FeedbackLogEntry {
            timestamp: Utc::now(),
            label: Label::Safe,
            result,
            confidence: 0.3,
            expected_value: 0.03,
            match_id: format!("m{}", id),
        }
    }

    #[test]
    fn engine_config_round_trips() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_engine_config().unwrap().is_none());

        let mut cfg = EngineConfig::default();
        cfg.version = 7;
        cfg.adaptive.no_safe_streak = 2;
        db.save_engine_config(&cfg).unwrap();
        cfg.version = 8;
        db.save_engine_config(&cfg).unwrap();

        let loaded = db.load_engine_config().unwrap().unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn feedback_table_is_bounded() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..7 {
            db.insert_feedback(&feedback(i, OutcomeResult::Win), 5).unwrap();
        }
        let rows = db.list_feedback(100).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].match_id, "m2");
        assert_eq!(rows[4].match_id, "m6");
        assert_eq!(rows[4].result, OutcomeResult::Win);
    }

    #[test]
    fn prediction_upsert_replaces_previous() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_prediction(&prediction("m1", Label::Risky)).unwrap();
        db.upsert_prediction(&prediction("m1", Label::Safe)).unwrap();
        db.upsert_prediction(&prediction("m2", Label::Avoid)).unwrap();

        let p = db.get_prediction("m1").unwrap().unwrap();
        assert_eq!(p.label, Label::Safe);
        assert_eq!(p.pick, Some(Side::B));
        assert_eq!(db.get_prediction("m2").unwrap().unwrap().label, Label::Avoid);
        assert!(db.get_prediction("nope").unwrap().is_none());
    }
}
