//! # Job Status and Cancellation Handlers
//!
//! ## Available Endpoints:
//! - `GET /api/v1/status/{job_id}` - Current snapshot of one job
//! - `POST /api/v1/cancel/{job_id}` - Request cancellation

use crate::error::{AppError, AppResult};
use crate::jobs::orchestrator::CancelOutcome;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use uuid::Uuid;

/// Return the last known state of a job.
///
/// Status queries never fail because of the job's own fate; a failed job
/// still answers with its record, including the stored error message.
pub async fn get_job_status(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job_id = path.into_inner();
    match state.registry.snapshot(job_id).await {
        Some(record) => Ok(HttpResponse::Ok().json(record)),
        None => Err(AppError::NotFound(format!("Job {} not found", job_id))),
    }
}

/// Request cancellation of a job. Idempotent on finished jobs.
pub async fn cancel_job(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job_id = path.into_inner();
    match state.orchestrator.request_cancel(job_id).await {
        CancelOutcome::NotFound => Err(AppError::NotFound(format!("Job {} not found", job_id))),
        CancelOutcome::AlreadyTerminal(status) => Ok(HttpResponse::Ok().json(json!({
            "job_id": job_id,
            "message": format!("Job already in terminal state: {}", status)
        }))),
        CancelOutcome::Accepted => Ok(HttpResponse::Ok().json(json!({
            "job_id": job_id,
            "message": "Cancellation requested"
        }))),
    }
}
