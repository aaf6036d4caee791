// src/cms.rs
//! microCMS content API client.
//!
//! The executor only sees [`ContentSource`]; [`MicroCmsClient`] is the production impl.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::Retryable;

const API_KEY_HEADER: &str = "X-MICROCMS-API-KEY";

/// Authoritative article payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    #[serde(default, alias = "sentence")]
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("article {0} not found")]
    NotFound(String),

    #[error("transient content API failure: {0}")]
    Transient(String),

    #[error("malformed article: {0}")]
    Malformed(String),

    #[error("content API rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("content API refused the request (HTTP {0})")]
    Rejected(u16),
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Read one article from the `api` endpoint.
    async fn fetch(&self, api: &str, content_id: &str) -> Result<ArticleRecord, FetchError>;
}

#[derive(Clone)]
pub struct MicroCmsClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl std::fmt::Debug for MicroCmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicroCmsClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MicroCmsClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid content API url {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("content API url {base_url} cannot be a base");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("blog-announcer/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("build content API http client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// `https://{service}.microcms.io/api/v1`
    pub fn base_url_for_service(service_domain: &str) -> String {
        format!("https://{service_domain}.microcms.io/api/v1")
    }

    fn article_url(&self, api: &str, content_id: &str) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Malformed("content API url cannot be a base".into()))?
            .pop_if_empty()
            .push(api)
            .push(content_id);
        Ok(url)
    }
}

#[async_trait]
impl ContentSource for MicroCmsClient {
    async fn fetch(&self, api: &str, content_id: &str) -> Result<ArticleRecord, FetchError> {
        let url = self.article_url(api, content_id)?;
        let mut req = self.http.get(url);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        let resp = req.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, content_id));
        }

        let body = resp.text().await.map_err(from_reqwest)?;
        parse_article(&body, content_id)
    }
}

fn from_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_decode() {
        FetchError::Malformed(e.to_string())
    } else {
        FetchError::Transient(e.to_string())
    }
}

fn classify_status(status: StatusCode, content_id: &str) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound(content_id.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::Unauthorized(status.as_u16())
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            FetchError::Transient(format!("HTTP {status}"))
        }
        s if s.is_server_error() => FetchError::Transient(format!("HTTP {s}")),
        s => FetchError::Rejected(s.as_u16()),
    }
}

/// Parse and sanity-check a content API response body.
pub fn parse_article(body: &str, content_id: &str) -> Result<ArticleRecord, FetchError> {
    let record: ArticleRecord =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    if record.title.trim().is_empty() {
        return Err(FetchError::Malformed("title is empty".into()));
    }
    if record.id != content_id {
        return Err(FetchError::Malformed(format!(
            "expected article {content_id}, got {}",
            record.id
        )));
    }
    Ok(record)
}
