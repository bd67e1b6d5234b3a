//! Case list handlers
//!
//! GET /cases/:user_id, POST /cases/:user_id/refresh

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::{error::ApiResult, models::CaseSet, AppState};

/// GET /cases/:user_id
///
/// Cached cases for the user; the first request runs an aggregation pass.
/// A failed reports fetch still answers 200 with `error` set.
pub async fn get_cases(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<CaseSet>> {
    let set = state.cases.get_cases_for_user(&user_id).await?;
    respond(&state, set).await
}

/// POST /cases/:user_id/refresh
///
/// Re-run the aggregation pass. On failure the previous cases are returned
/// with `error` set.
pub async fn refresh_cases(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<CaseSet>> {
    let set = state.cases.refresh(&user_id).await?;
    respond(&state, set).await
}

async fn respond(state: &AppState, set: Arc<CaseSet>) -> ApiResult<Json<CaseSet>> {
    if let Some(error) = &set.error {
        *state.last_error.write().await = Some(error.clone());
    }

    tracing::debug!(
        user_id = %set.user_id,
        cases = set.cases.len(),
        warnings = set.warnings.len(),
        "Case list served"
    );

    Ok(Json(CaseSet::clone(&set)))
}

/// Build case routes
pub fn case_routes() -> Router<AppState> {
    Router::new()
        .route("/cases/:user_id", get(get_cases))
        .route("/cases/:user_id/refresh", post(refresh_cases))
}
