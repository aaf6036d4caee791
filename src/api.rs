// src/api.rs
//! HTTP edge: webhook intake, health, and optional debug routes.
//!
//! The webhook handler validates and folds the trigger into the job table, then
//! answers immediately. Downstream failures are never reported here.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::executor::JobExecutor;
use crate::jobs::{Admission, JobState, PendingJob};
use crate::metrics::TRIGGERS_TOTAL;
use crate::trigger::{TriggerError, TriggerValidator};

/// Path the microCMS webhook is registered under.
pub const WEBHOOK_PATH: &str = "/microcms_webhook";

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<JobExecutor>,
    pub validator: Arc<TriggerValidator>,
    /// Expose `/debug/jobs`.
    pub debug_routes: bool,
}

pub fn router(state: AppState) -> Router {
    let mut r = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(WEBHOOK_PATH, post(webhook).fallback(wrong_method));

    if state.debug_routes {
        r = r
            .route("/debug/jobs", get(debug_jobs))
            .route("/debug/jobs/{id}", get(debug_job));
    }

    r.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Acknowledgement body for accepted triggers.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
    pub id: String,
    pub state: JobState,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl From<&Admission> for Ack {
    fn from(a: &Admission) -> Self {
        let job = a.job();
        let scheduled_at = match a {
            Admission::Duplicate(_) => None,
            _ => Some(job.scheduled_at),
        };
        Self {
            status: a.outcome(),
            id: job.content_id.clone(),
            state: job.state,
            scheduled_at,
        }
    }
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Ack>), TriggerError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    let trigger = match state.validator.validate(content_type, &body, Utc::now()) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(target: "webhook", error = %e, "webhook rejected");
            counter!(TRIGGERS_TOTAL, "outcome" => "rejected").increment(1);
            return Err(e);
        }
    };

    let admission = state.executor.submit(&trigger);
    Ok((StatusCode::ACCEPTED, Json(Ack::from(&admission))))
}

async fn wrong_method() -> Response {
    tracing::warn!(target: "webhook", "invalid request method");
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": "webhook accepts POST only" })),
    )
        .into_response()
}

async fn debug_jobs(State(state): State<AppState>) -> Json<Vec<PendingJob>> {
    Json(state.executor.table().snapshot())
}

async fn debug_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.executor.table().get(&id) {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
