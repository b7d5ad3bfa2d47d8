use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::db::models::{FeedbackLogEntry, OutcomeResult};
use crate::engine::feedback::HitRates;
use crate::engine::state::Cutoffs;
use crate::engine::EngineHandle;
use crate::error::AdvisorError;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

/// Build the Axum router for the operator API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/predictions", get(predictions_handler))
        .route("/api/config", get(config_handler))
        .route("/api/status", get(status_handler))
        .route("/api/feedback", get(feedback_handler))
        .route("/api/outcome", post(outcome_handler))
        .route("/api/cutoffs", post(cutoffs_handler))
        .route("/api/adaptive/reset", post(reset_adaptive_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn error_response(e: AdvisorError) -> (StatusCode, String) {
    let status = match e {
        AdvisorError::UnknownMatch(_) => StatusCode::NOT_FOUND,
        AdvisorError::InvalidCutoffs { .. }
        | AdvisorError::CutoffBelowFloor { .. }
        | AdvisorError::InvalidWeight { .. } => StatusCode::BAD_REQUEST,
        AdvisorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// GET /api/predictions
async fn predictions_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.predictions().await)
}

/// GET /api/config
async fn config_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json((*state.engine.config().await).clone())
}

/// GET /api/status: the last cycle report, `null` before the first cycle
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.last_report().await)
}

#[derive(Debug, Deserialize)]
struct FeedbackQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackResponse {
    entries: Vec<FeedbackLogEntry>,
    hit_rates: HitRates,
    safe_hit_rate: Option<f64>,
    risky_hit_rate: Option<f64>,
    avoid_correct_skip_rate: Option<f64>,
}

/// GET /api/feedback?limit=50
async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FeedbackQuery>,
) -> impl IntoResponse {
    let (entries, rates) = state.engine.feedback(q.limit.unwrap_or(50)).await;
    Json(FeedbackResponse {
        entries,
        hit_rates: rates,
        safe_hit_rate: rates.safe_hit_rate(),
        risky_hit_rate: rates.risky_hit_rate(),
        avoid_correct_skip_rate: rates.avoid_correct_skip_rate(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeRequest {
    match_id: String,
    result: String,
}

/// POST /api/outcome {matchId, result}
async fn outcome_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OutcomeRequest>,
) -> Result<Json<FeedbackLogEntry>, (StatusCode, String)> {
    let result: OutcomeResult = req
        .result
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;
    state
        .engine
        .record_outcome(&req.match_id, result)
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /api/cutoffs {minEV, thrSafe, thrRisky}
async fn cutoffs_handler(
    State(state): State<Arc<AppState>>,
    Json(cutoffs): Json<Cutoffs>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .engine
        .set_cutoffs(cutoffs)
        .await
        .map(|c| Json((*c).clone()))
        .map_err(error_response)
}

/// POST /api/adaptive/reset
async fn reset_adaptive_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json((*state.engine.reset_adaptive().await).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::feedback::FeedbackLog;
    use crate::engine::state::EngineConfig;

    fn state() -> State<Arc<AppState>> {
        State(Arc::new(AppState {
            engine: EngineHandle::new(EngineConfig::default(), FeedbackLog::default(), None),
        }))
    }

    #[tokio::test]
    async fn unknown_match_is_404() {
        let err = outcome_handler(
            state(),
            Json(OutcomeRequest {
                match_id: "ghost".into(),
                result: "win".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_result_is_400() {
        let err = outcome_handler(
            state(),
            Json(OutcomeRequest {
                match_id: "m1".into(),
                result: "maybe".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn inverted_cutoffs_are_400() {
        let res = cutoffs_handler(
            state(),
            Json(Cutoffs {
                min_ev: 0.02,
                thr_safe: 0.2,
                thr_risky: 0.3,
            }),
        )
        .await;
        assert_eq!(res.err().map(|e| e.0), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn cutoffs_payload_uses_wire_names() {
        let c: Cutoffs = serde_json::from_str(r#"{"minEV":0.03,"thrSafe":0.4,"thrRisky":0.2}"#).unwrap();
        assert_eq!(c.thr_safe, 0.4);
    }
}
