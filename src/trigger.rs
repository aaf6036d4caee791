// src/trigger.rs
//! Inbound webhook validation: turns a raw microCMS notification into a [`Trigger`]
//! or rejects it before any job is created.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const JSON_MEDIA_TYPE: &str = "application/json";

/// microCMS event kind. Only [`EventType::New`] is announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    New,
    Edit,
    Delete,
    #[serde(other)]
    Other,
}

/// Wire shape of the webhook body. Extra fields (e.g. `contents`) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBody {
    pub service: String,
    pub api: String,
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
}

/// One validated inbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub service: String,
    pub api: String,
    pub content_id: String,
    pub event_type: EventType,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("unsupported content type: {0:?}")]
    UnsupportedContentType(Option<String>),

    #[error("malformed body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("missing content id")]
    MissingId,

    #[error("event type {0:?} is not announced")]
    NotApplicable(EventType),

    #[error("unknown service {0:?}")]
    UnknownService(String),

    #[error("api {0:?} is not announced")]
    UnknownApi(String),
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Relevance rules applied after the body parses.
/// An empty `allowed_apis` accepts every api; `None` service accepts every service.
#[derive(Debug, Clone, Default)]
pub struct TriggerValidator {
    expected_service: Option<String>,
    allowed_apis: Vec<String>,
}

impl TriggerValidator {
    pub fn new(expected_service: Option<String>, allowed_apis: Vec<String>) -> Self {
        Self {
            expected_service,
            allowed_apis,
        }
    }

    /// Validate the declared content type and body. Performs no I/O.
    pub fn validate(
        &self,
        content_type: Option<&str>,
        body: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<Trigger, TriggerError> {
        if !is_json_content_type(content_type) {
            return Err(TriggerError::UnsupportedContentType(
                content_type.map(str::to_string),
            ));
        }

        let parsed: WebhookBody = serde_json::from_slice(body)?;

        let content_id = parsed.id.trim();
        if content_id.is_empty() {
            return Err(TriggerError::MissingId);
        }
        if parsed.event_type != EventType::New {
            return Err(TriggerError::NotApplicable(parsed.event_type));
        }
        if let Some(expected) = &self.expected_service {
            if !expected.eq_ignore_ascii_case(parsed.service.trim()) {
                return Err(TriggerError::UnknownService(parsed.service));
            }
        }
        if !self.allowed_apis.is_empty() && !is_listed(parsed.api.trim(), &self.allowed_apis) {
            return Err(TriggerError::UnknownApi(parsed.api));
        }

        Ok(Trigger {
            service: parsed.service.trim().to_string(),
            api: parsed.api.trim().to_string(),
            content_id: content_id.to_string(),
            event_type: parsed.event_type,
            received_at,
        })
    }
}

fn is_listed(api: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|a| a.eq_ignore_ascii_case(api))
}

/// `application/json`, optionally followed by parameters such as `; charset=utf-8`.
fn is_json_content_type(value: Option<&str>) -> bool {
    value
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}
