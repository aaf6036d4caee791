// src/jobs.rs
//! Per-article job table: collapses bursts of triggers for the same content id
//! and keeps finished jobs around for a cool-down window so late duplicates are dropped.
//!
//! Every decision takes the table lock once, so check-and-set per content id is atomic.
//! Callers pass `now` explicitly, which keeps the table deterministic under test.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::trigger::Trigger;

/// Upper bound on any deadline offset (about 30 years).
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Scheduled,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Scheduled | JobState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Scheduled => "scheduled",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

/// Deferred announcement work for one content id.
#[derive(Debug, Clone, Serialize)]
pub struct PendingJob {
    pub content_id: String,
    /// microCMS endpoint the article lives under (taken from the latest trigger).
    pub api: String,
    pub scheduled_at: DateTime<Utc>,
    pub state: JobState,
    /// Number of triggers folded into this job.
    pub triggers: u32,
    /// External calls made by the pipeline (fetch + publish attempts).
    pub attempt: u32,
    pub last_error: Option<String>,
    pub post_id: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of offering a trigger to the table.
#[derive(Debug, Clone)]
pub enum Admission {
    /// No active job existed; a new one was created and needs a driver task.
    Scheduled(PendingJob),
    /// An existing scheduled job had its deadline pushed back.
    Rescheduled(PendingJob),
    /// A job is running or cooling down; the trigger was dropped.
    Duplicate(PendingJob),
}

impl Admission {
    pub fn job(&self) -> &PendingJob {
        match self {
            Admission::Scheduled(j) | Admission::Rescheduled(j) | Admission::Duplicate(j) => j,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Admission::Scheduled(_) => "scheduled",
            Admission::Rescheduled(_) => "rescheduled",
            Admission::Duplicate(_) => "duplicate",
        }
    }
}

/// Answer to "may the pipeline start now?".
#[derive(Debug, Clone)]
pub enum Begin {
    /// Transitioned to `Running`.
    Started(PendingJob),
    /// Still scheduled; the deadline moved to this instant.
    NotYet(Instant),
    /// Nothing scheduled under this id any more.
    Gone,
}

/// Terminal result recorded by the executor.
#[derive(Debug, Clone)]
pub enum Finish {
    Succeeded { post_id: String },
    Failed { error: String },
}

#[derive(Debug)]
struct Entry {
    job: PendingJob,
    deadline: Instant,
    finished: Option<Instant>,
}

#[derive(Debug)]
pub struct JobTable {
    inner: Mutex<HashMap<String, Entry>>,
    cooldown: Duration,
}

impl JobTable {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Fold `trigger` into the table. The deadline becomes `now + deploy_wait`
    /// for new and rescheduled jobs, capped at [`FAR_FUTURE`] past `now`.
    pub fn admit(&self, trigger: &Trigger, deploy_wait: Duration, now: Instant) -> Admission {
        let wait = deploy_wait.min(FAR_FUTURE);
        let deadline = now.checked_add(wait).unwrap_or(now);
        let scheduled_at = utc_after(trigger.received_at, wait);

        let mut map = self.inner.lock().expect("job table mutex poisoned");
        if let Some(entry) = map.get_mut(&trigger.content_id) {
            match entry.job.state {
                JobState::Scheduled => {
                    entry.deadline = deadline;
                    entry.job.scheduled_at = scheduled_at;
                    entry.job.api = trigger.api.clone();
                    entry.job.triggers += 1;
                    return Admission::Rescheduled(entry.job.clone());
                }
                JobState::Running => return Admission::Duplicate(entry.job.clone()),
                JobState::Succeeded | JobState::Failed => {
                    if !self.expired(entry, now) {
                        return Admission::Duplicate(entry.job.clone());
                    }
                }
            }
        }

        let job = PendingJob {
            content_id: trigger.content_id.clone(),
            api: trigger.api.clone(),
            scheduled_at,
            state: JobState::Scheduled,
            triggers: 1,
            attempt: 0,
            last_error: None,
            post_id: None,
            finished_at: None,
        };
        map.insert(
            trigger.content_id.clone(),
            Entry {
                job: job.clone(),
                deadline,
                finished: None,
            },
        );
        Admission::Scheduled(job)
    }

    /// Move a due `Scheduled` job to `Running`.
    pub fn begin(&self, content_id: &str, now: Instant) -> Begin {
        let mut map = self.inner.lock().expect("job table mutex poisoned");
        match map.get_mut(content_id) {
            Some(entry) if entry.job.state == JobState::Scheduled => {
                if entry.deadline > now {
                    return Begin::NotYet(entry.deadline);
                }
                entry.job.state = JobState::Running;
                Begin::Started(entry.job.clone())
            }
            _ => Begin::Gone,
        }
    }

    /// Record the terminal state of a running job. Returns `None` if the job was
    /// not running (nothing is changed in that case).
    pub fn finish(
        &self,
        content_id: &str,
        finish: Finish,
        attempts: u32,
        now: Instant,
    ) -> Option<PendingJob> {
        let mut map = self.inner.lock().expect("job table mutex poisoned");
        let entry = map.get_mut(content_id)?;
        if entry.job.state != JobState::Running {
            return None;
        }
        match finish {
            Finish::Succeeded { post_id } => {
                entry.job.state = JobState::Succeeded;
                entry.job.post_id = Some(post_id);
            }
            Finish::Failed { error } => {
                entry.job.state = JobState::Failed;
                entry.job.last_error = Some(error);
            }
        }
        entry.job.attempt = attempts;
        entry.job.finished_at = Some(Utc::now());
        entry.finished = Some(now);
        Some(entry.job.clone())
    }

    /// Drop terminal jobs whose cool-down has elapsed. Returns how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let mut map = self.inner.lock().expect("job table mutex poisoned");
        let before = map.len();
        map.retain(|_, entry| !self.expired(entry, now));
        before - map.len()
    }

    pub fn get(&self, content_id: &str) -> Option<PendingJob> {
        let map = self.inner.lock().expect("job table mutex poisoned");
        map.get(content_id).map(|e| e.job.clone())
    }

    /// All jobs, ordered by content id.
    pub fn snapshot(&self) -> Vec<PendingJob> {
        let map = self.inner.lock().expect("job table mutex poisoned");
        let mut jobs: Vec<PendingJob> = map.values().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| a.content_id.cmp(&b.content_id));
        jobs
    }

    pub fn active_count(&self) -> usize {
        let map = self.inner.lock().expect("job table mutex poisoned");
        map.values().filter(|e| e.job.state.is_active()).count()
    }

    fn expired(&self, entry: &Entry, now: Instant) -> bool {
        match entry.finished {
            Some(at) => now.saturating_duration_since(at) >= self.cooldown,
            None => false,
        }
    }
}

fn utc_after(at: DateTime<Utc>, wait: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(at)
}
