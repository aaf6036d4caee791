// src/executor.rs
//! Deferred pipeline: wait out the deploy delay, fetch, compose, publish.
//!
//! The webhook handler only calls [`JobExecutor::submit`], which consults the
//! [`JobTable`] and spawns one driver task per newly scheduled content id.
//! Re-triggers move the table's deadline; the driver notices and sleeps again,
//! so there is never a second timer for the same id.
//!
//! Retries live inside the fetch and publish steps. A job that fails is never
//! re-entered, so publish runs at most once per job.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::cms::{ContentSource, FetchError};
use crate::compose::{ComposeError, Composer};
use crate::jobs::{Admission, Begin, Finish, JobState, JobTable, PendingJob};
use crate::metrics::{
    FETCH_ATTEMPTS_TOTAL, JOBS_ACTIVE, JOBS_PRUNED_TOTAL, JOBS_TOTAL, JOB_DURATION_MS,
    PUBLISH_ATTEMPTS_TOTAL, TRIGGERS_TOTAL,
};
use crate::publish::{AnnouncementSink, PostId, PublishError};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::trigger::Trigger;

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub deploy_wait: Duration,
    pub max_concurrent: usize,
    pub fetch_retry: RetryConfig,
    pub publish_retry: RetryConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            deploy_wait: Duration::from_secs(300),
            max_concurrent: 4,
            fetch_retry: RetryConfig::DEFAULT,
            publish_retry: RetryConfig::DEFAULT,
        }
    }
}

/// Terminal report for one job, broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub content_id: String,
    pub state: JobState,
    pub post_id: Option<PostId>,
    pub error: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("compose failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

pub struct JobExecutor {
    table: Arc<JobTable>,
    source: Arc<dyn ContentSource>,
    sink: Arc<dyn AnnouncementSink>,
    composer: Composer,
    cfg: ExecutorConfig,
    permits: Arc<Semaphore>,
    outcomes: broadcast::Sender<JobOutcome>,
}

impl JobExecutor {
    pub fn new(
        table: Arc<JobTable>,
        source: Arc<dyn ContentSource>,
        sink: Arc<dyn AnnouncementSink>,
        composer: Composer,
        cfg: ExecutorConfig,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(cfg.max_concurrent.max(1)));
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Arc::new(Self {
            table,
            source,
            sink,
            composer,
            cfg,
            permits,
            outcomes,
        })
    }

    pub fn table(&self) -> &Arc<JobTable> {
        &self.table
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Receives every terminal [`JobOutcome`] produced after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobOutcome> {
        self.outcomes.subscribe()
    }

    /// Fold a validated trigger into the table. Never waits; must be called
    /// from within a tokio runtime because a new job spawns its driver task.
    pub fn submit(self: &Arc<Self>, trigger: &Trigger) -> Admission {
        let admission = self
            .table
            .admit(trigger, self.cfg.deploy_wait, Instant::now());
        counter!(TRIGGERS_TOTAL, "outcome" => admission.outcome()).increment(1);

        match &admission {
            Admission::Scheduled(job) => {
                info!(
                    target: "executor",
                    content_id = %job.content_id,
                    api = %job.api,
                    scheduled_at = %job.scheduled_at,
                    "job scheduled"
                );
                let this = Arc::clone(self);
                let content_id = job.content_id.clone();
                let span = info_span!("job", content_id = %content_id);
                tokio::spawn(async move { this.drive(content_id).await }.instrument(span));
            }
            Admission::Rescheduled(job) => {
                debug!(
                    target: "executor",
                    content_id = %job.content_id,
                    triggers = job.triggers,
                    scheduled_at = %job.scheduled_at,
                    "job rescheduled"
                );
            }
            Admission::Duplicate(job) => {
                info!(
                    target: "executor",
                    content_id = %job.content_id,
                    state = job.state.as_str(),
                    "duplicate trigger dropped"
                );
            }
        }
        gauge!(JOBS_ACTIVE).set(self.table.active_count() as f64);
        admission
    }

    /// Wait until the job is due and a worker slot is free, then run it once.
    async fn drive(self: Arc<Self>, content_id: String) {
        loop {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            match self.table.begin(&content_id, Instant::now()) {
                Begin::Started(job) => {
                    self.run(job).await;
                    drop(permit);
                    return;
                }
                Begin::NotYet(deadline) => {
                    drop(permit);
                    tokio::time::sleep_until(deadline).await;
                }
                Begin::Gone => return,
            }
        }
    }

    async fn run(&self, job: PendingJob) {
        let started = Instant::now();
        info!(target: "executor", content_id = %job.content_id, "job running");

        let mut attempts = 0u32;
        let result = self.pipeline(&job, &mut attempts).await;

        let finish = match &result {
            Ok(post_id) => Finish::Succeeded {
                post_id: post_id.clone(),
            },
            Err(e) => Finish::Failed {
                error: e.to_string(),
            },
        };
        let recorded = self
            .table
            .finish(&job.content_id, finish, attempts, Instant::now());
        if recorded.is_none() {
            warn!(target: "executor", content_id = %job.content_id, "job vanished before it finished");
        }

        let outcome = match result {
            Ok(post_id) => {
                info!(
                    target: "executor",
                    content_id = %job.content_id,
                    post_id = %post_id,
                    attempts,
                    "job succeeded"
                );
                JobOutcome {
                    content_id: job.content_id,
                    state: JobState::Succeeded,
                    post_id: Some(post_id),
                    error: None,
                    attempts,
                }
            }
            Err(e) => {
                warn!(
                    target: "executor",
                    content_id = %job.content_id,
                    attempts,
                    error = %e,
                    "job failed"
                );
                JobOutcome {
                    content_id: job.content_id,
                    state: JobState::Failed,
                    post_id: None,
                    error: Some(e.to_string()),
                    attempts,
                }
            }
        };

        counter!(JOBS_TOTAL, "state" => outcome.state.as_str()).increment(1);
        histogram!(JOB_DURATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        gauge!(JOBS_ACTIVE).set(self.table.active_count() as f64);

        // No subscribers is fine.
        let _ = self.outcomes.send(outcome);
    }

    async fn pipeline(&self, job: &PendingJob, attempts: &mut u32) -> Result<PostId, JobError> {
        let source: &dyn ContentSource = self.source.as_ref();
        let api = job.api.as_str();
        let content_id = job.content_id.as_str();

        let fetched = retry_with_backoff(self.cfg.fetch_retry, "fetch", move |attempt| {
            counter!(FETCH_ATTEMPTS_TOTAL).increment(1);
            debug!(target: "executor", content_id, attempt, "fetching article");
            source.fetch(api, content_id)
        })
        .await;
        *attempts += fetched.attempts;
        let record = fetched.result?;

        let announcement = self.composer.compose(&record)?;
        debug!(
            target: "executor",
            content_id,
            weighted_len = announcement.weighted_len,
            "announcement composed"
        );

        let sink: &dyn AnnouncementSink = self.sink.as_ref();
        let text = announcement.text.as_str();
        let published = retry_with_backoff(self.cfg.publish_retry, "publish", move |attempt| {
            counter!(PUBLISH_ATTEMPTS_TOTAL).increment(1);
            debug!(target: "executor", content_id, attempt, sink = sink.name(), "publishing");
            sink.publish(text, content_id)
        })
        .await;
        *attempts += published.attempts;
        Ok(published.result?)
    }

    /// Periodically drop terminal jobs whose cool-down has passed.
    pub fn spawn_sweeper(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let table = Arc::clone(&self.table);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let pruned = table.prune(Instant::now());
                        if pruned > 0 {
                            counter!(JOBS_PRUNED_TOTAL).increment(pruned as u64);
                            debug!(target: "executor", pruned, "expired jobs pruned");
                        }
                        gauge!(JOBS_ACTIVE).set(table.active_count() as f64);
                    }
                }
            }
        })
    }
}
