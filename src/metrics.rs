// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const TRIGGERS_TOTAL: &str = "announcer_triggers_total";
pub const JOBS_TOTAL: &str = "announcer_jobs_total";
pub const JOBS_ACTIVE: &str = "announcer_jobs_active";
pub const JOBS_PRUNED_TOTAL: &str = "announcer_jobs_pruned_total";
pub const FETCH_ATTEMPTS_TOTAL: &str = "announcer_fetch_attempts_total";
pub const PUBLISH_ATTEMPTS_TOTAL: &str = "announcer_publish_attempts_total";
pub const JOB_DURATION_MS: &str = "announcer_job_duration_ms";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            TRIGGERS_TOTAL,
            "Webhook triggers by outcome (scheduled, rescheduled, duplicate, rejected)."
        );
        describe_counter!(JOBS_TOTAL, "Jobs that reached a terminal state, by state.");
        describe_gauge!(JOBS_ACTIVE, "Jobs currently scheduled or running.");
        describe_counter!(
            JOBS_PRUNED_TOTAL,
            "Terminal jobs dropped after their cool-down window."
        );
        describe_counter!(FETCH_ATTEMPTS_TOTAL, "Content API fetch attempts.");
        describe_counter!(PUBLISH_ATTEMPTS_TOTAL, "Announcement publish attempts.");
        describe_histogram!(
            JOB_DURATION_MS,
            "Time from job start (after deploy wait) to terminal state, in milliseconds."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if a recorder is already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
