//! Analysis job handlers
//!
//! POST /analysis/:report_id/start, GET /analysis/:report_id/progress

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{error::ApiResult, models::AnalysisJob, AppState};

/// POST /analysis/:report_id/start request body (optional)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisRequest {
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

/// POST /analysis/:report_id/start
///
/// Registers a pending job and returns 202 Accepted with it; the remote
/// analyze call runs in the background. 409 if a job is already active.
pub async fn start_analysis(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    body: Option<Json<StartAnalysisRequest>>,
) -> ApiResult<(StatusCode, Json<AnalysisJob>)> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let custom_prompt = request.custom_prompt.filter(|p| !p.trim().is_empty());

    let job = state.tracker.begin(&report_id).await?;

    let tracker = state.tracker.clone();
    let last_error = state.last_error.clone();
    let background_job = job.clone();
    tokio::spawn(async move {
        let report_id = background_job.report_id.clone();
        let job_id = background_job.job_id;
        tracing::info!(report_id = %report_id, job_id = %job_id, "Background analysis task started");

        if let Err(e) = tracker.run(background_job, custom_prompt).await {
            tracing::error!(
                report_id = %report_id,
                job_id = %job_id,
                error = %e,
                "Background analysis task failed"
            );
            *last_error.write().await = Some(e.to_string());
        }
    });

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /analysis/:report_id/progress
///
/// Polls the remote progress endpoint and returns the tracked job.
pub async fn get_analysis_progress(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> ApiResult<Json<AnalysisJob>> {
    let job = state.tracker.poll(&report_id).await?;
    tracing::debug!(report_id = %job.report_id, status = job.status.as_str(), progress = job.progress, "Progress query");
    Ok(Json(job))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/:report_id/start", post(start_analysis))
        .route("/analysis/:report_id/progress", get(get_analysis_progress))
}
