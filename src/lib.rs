// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod bootstrap;
pub mod cms;
pub mod compose;
pub mod config;
pub mod executor;
pub mod jobs;
pub mod metrics;
pub mod publish;
pub mod retry;
pub mod shutdown;
pub mod telemetry;
pub mod trigger;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::cms::{ArticleRecord, ContentSource, FetchError};
pub use crate::compose::{Announcement, Composer};
pub use crate::executor::{ExecutorConfig, JobExecutor, JobOutcome};
pub use crate::jobs::{Admission, JobState, JobTable, PendingJob};
pub use crate::publish::{AnnouncementSink, PublishError};
pub use crate::trigger::{Trigger, TriggerValidator};
