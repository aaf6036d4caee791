// src/publish/twitter.rs
//! Posts announcements through the Twitter v2 `POST /2/tweets` endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::oauth::{self, OAuthCredentials};
use super::{AnnouncementSink, PostId, PublishError};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

#[derive(Clone)]
pub struct TwitterClient {
    http: reqwest::Client,
    endpoint: Url,
    creds: OAuthCredentials,
}

impl std::fmt::Debug for TwitterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("creds", &self.creds)
            .finish()
    }
}

#[derive(Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Deserialize)]
struct CreatedTweet {
    id: String,
}

impl TwitterClient {
    pub fn new(api_base: &str, creds: OAuthCredentials, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(api_base)
            .and_then(|base| base.join("/2/tweets"))
            .with_context(|| format!("invalid publish API url {api_base}"))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("blog-announcer/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("build publish API http client")?;
        Ok(Self {
            http,
            endpoint,
            creds,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AnnouncementSink for TwitterClient {
    async fn publish(&self, text: &str, idempotency_key: &str) -> Result<PostId, PublishError> {
        let timestamp = chrono::Utc::now().timestamp().max(0) as u64;
        let auth = oauth::authorization_header(
            &self.creds,
            "POST",
            self.endpoint.as_str(),
            &[],
            &oauth::nonce(),
            timestamp,
        );

        let resp = self
            .http
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, auth)
            .json(&CreateTweet { text })
            .send()
            .await
            .map_err(|e| PublishError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            // The body only refines the classification; a failed read leaves it empty.
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_response(status, &body));
        }

        // Past this point the post may exist, so nothing below may be retried.
        let body = resp.text().await.map_err(|e| {
            PublishError::Rejected(format!(
                "HTTP {}: unreadable create response: {e}",
                status.as_u16()
            ))
        })?;
        let created: CreateTweetResponse = serde_json::from_str(&body).map_err(|e| {
            PublishError::Rejected(format!("unreadable create response ({e}): {body}"))
        })?;
        tracing::debug!(
            target: "publish",
            content_id = idempotency_key,
            post_id = %created.data.id,
            "tweet created"
        );
        Ok(created.data.id)
    }

    fn name(&self) -> &'static str {
        "twitter"
    }
}

/// Map a non-2xx response onto the publish error taxonomy.
pub fn classify_response(status: StatusCode, body: &str) -> PublishError {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
    match status {
        StatusCode::UNAUTHORIZED => PublishError::AuthFailure(detail),
        StatusCode::FORBIDDEN if body.to_ascii_lowercase().contains("duplicate") => {
            PublishError::Rejected(detail)
        }
        StatusCode::FORBIDDEN => PublishError::AuthFailure(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            PublishError::Transient(detail)
        }
        s if s.is_server_error() => PublishError::Transient(detail),
        _ => PublishError::Rejected(detail),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_statuses() {
        assert!(matches!(
            classify_response(StatusCode::UNAUTHORIZED, "{}"),
            PublishError::AuthFailure(_)
        ));
        assert!(matches!(
            classify_response(
                StatusCode::FORBIDDEN,
                r#"{"detail":"You are not allowed to create a Tweet with duplicate content."}"#
            ),
            PublishError::Rejected(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::FORBIDDEN, r#"{"detail":"forbidden"}"#),
            PublishError::AuthFailure(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::TOO_MANY_REQUESTS, ""),
            PublishError::Transient(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::SERVICE_UNAVAILABLE, ""),
            PublishError::Transient(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, ""),
            PublishError::Rejected(_)
        ));
    }

    #[test]
    fn endpoint_is_joined_onto_base() {
        let creds = OAuthCredentials {
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            access_token: "at".into(),
            access_token_secret: "as".into(),
        };
        let c = TwitterClient::new("http://127.0.0.1:9999/", creds, Duration::from_secs(1)).unwrap();
        assert_eq!(c.endpoint().as_str(), "http://127.0.0.1:9999/2/tweets");
    }
}
