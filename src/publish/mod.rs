// src/publish/mod.rs
//! Announcement sinks. The executor depends only on [`AnnouncementSink`].

pub mod oauth;
pub mod twitter;

use async_trait::async_trait;
use thiserror::Error;

use crate::retry::Retryable;

pub use twitter::TwitterClient;

/// Identifier of the created post, as returned by the sink.
pub type PostId = String;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("transient publish failure: {0}")]
    Transient(String),

    #[error("announcement rejected: {0}")]
    Rejected(String),

    #[error("publish credentials refused: {0}")]
    AuthFailure(String),
}

impl Retryable for PublishError {
    fn is_transient(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }
}

#[async_trait]
pub trait AnnouncementSink: Send + Sync {
    /// Submit `text`. `idempotency_key` is the content id of the job doing the submit.
    async fn publish(&self, text: &str, idempotency_key: &str) -> Result<PostId, PublishError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Logs the announcement instead of posting it. Used when credentials are absent
/// or `DRY_RUN` is set.
#[derive(Debug, Clone, Default)]
pub struct DryRunSink;

#[async_trait]
impl AnnouncementSink for DryRunSink {
    async fn publish(&self, text: &str, idempotency_key: &str) -> Result<PostId, PublishError> {
        tracing::info!(
            target: "publish",
            content_id = idempotency_key,
            text,
            "dry run: announcement not posted"
        );
        Ok(format!("dry-run-{idempotency_key}"))
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_returns_synthetic_id() {
        let id = DryRunSink.publish("hello", "abc123").await.unwrap();
        assert_eq!(id, "dry-run-abc123");
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(PublishError::Transient("503".into()).is_transient());
        assert!(!PublishError::Rejected("dup".into()).is_transient());
        assert!(!PublishError::AuthFailure("401".into()).is_transient());
    }
}
