use thiserror::Error;

/// Typed failures surfaced to operators and API callers.
///
/// The scoring core itself never fails: missing odds, malformed scores and
/// out-of-window states all resolve to numeric defaults. These variants only
/// cover the operator-facing edges around it.
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("no prediction recorded for match '{0}'")]
    UnknownMatch(String),

    #[error("invalid cutoffs: thrSafe ({thr_safe:.4}) must be >= thrRisky ({thr_risky:.4})")]
    InvalidCutoffs { thr_safe: f64, thr_risky: f64 },

    #[error("cutoff {field} = {value:.4} is below its floor {floor:.4}")]
    CutoffBelowFloor {
        field: &'static str,
        value: f64,
        floor: f64,
    },

    #[error("invalid value {value} for '{key}'")]
    InvalidWeight { key: String, value: f64 },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AdvisorError>;
