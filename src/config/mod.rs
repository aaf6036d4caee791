// src/config/mod.rs
//! Runtime configuration: optional TOML file, then environment overrides.
//!
//! Lookup order for the file:
//! 1) $ANNOUNCER_CONFIG_PATH (must exist)
//! 2) config/announcer.toml (optional)

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::compose::{DEFAULT_LINK_TEMPLATE, DEFAULT_PREFIX};
use crate::publish::oauth::OAuthCredentials;
use crate::publish::twitter::DEFAULT_API_BASE;
use crate::retry::RetryConfig;

pub const ENV_CONFIG_PATH: &str = "ANNOUNCER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/announcer.toml";

/// One day.
pub const MAX_DEPLOY_WAIT_SECS: u64 = 86_400;

/// String that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" | "" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StepSettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CmsSettings {
    /// microCMS service id; also the expected `service` field of webhooks.
    pub service_domain: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<Secret>,
    /// Empty accepts every api.
    pub allowed_apis: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnnounceSettings {
    pub prefix: String,
    pub link_template: String,
}

impl Default for AnnounceSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            link_template: DEFAULT_LINK_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TwitterSettings {
    pub api_base: String,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<Secret>,
    pub access_token: Option<Secret>,
    pub access_token_secret: Option<Secret>,
}

impl Default for TwitterSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            consumer_key: None,
            consumer_secret: None,
            access_token: None,
            access_token_secret: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub deploy_wait_secs: u64,
    pub cooldown_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_concurrent_jobs: usize,
    pub backoff_max_ms: u64,
    pub fetch: StepSettings,
    pub publish: StepSettings,
    pub cms: CmsSettings,
    pub announce: AnnounceSettings,
    pub twitter: TwitterSettings,
    pub dry_run: bool,
    pub debug_routes: bool,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            // Articles take about three minutes to deploy.
            deploy_wait_secs: 300,
            cooldown_secs: 3600,
            sweep_interval_secs: 60,
            max_concurrent_jobs: 4,
            backoff_max_ms: 30_000,
            fetch: StepSettings::default(),
            publish: StepSettings {
                backoff_ms: 1000,
                ..StepSettings::default()
            },
            cms: CmsSettings::default(),
            announce: AnnounceSettings::default(),
            twitter: TwitterSettings::default(),
            dry_run: false,
            debug_routes: false,
            log_format: LogFormat::Compact,
        }
    }
}

impl AppConfig {
    /// File (if any) plus process environment.
    pub fn load() -> Result<Self> {
        let mut cfg = match config_path()? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Overlay values from `get` (normally `std::env::var`). Unset keys keep their value.
    pub fn apply_env<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        set_parsed(&mut self.port, var("PORT"), "PORT")?;
        set_parsed(&mut self.deploy_wait_secs, var("DEPLOY_WAIT_SECS"), "DEPLOY_WAIT_SECS")?;
        set_parsed(&mut self.cooldown_secs, var("COOLDOWN_SECS"), "COOLDOWN_SECS")?;
        set_parsed(
            &mut self.sweep_interval_secs,
            var("SWEEP_INTERVAL_SECS"),
            "SWEEP_INTERVAL_SECS",
        )?;
        set_parsed(
            &mut self.max_concurrent_jobs,
            var("MAX_CONCURRENT_JOBS"),
            "MAX_CONCURRENT_JOBS",
        )?;
        set_parsed(&mut self.backoff_max_ms, var("BACKOFF_MAX_MS"), "BACKOFF_MAX_MS")?;

        set_parsed(&mut self.fetch.max_attempts, var("FETCH_MAX_ATTEMPTS"), "FETCH_MAX_ATTEMPTS")?;
        set_parsed(&mut self.fetch.backoff_ms, var("FETCH_BACKOFF_MS"), "FETCH_BACKOFF_MS")?;
        set_parsed(&mut self.fetch.timeout_secs, var("FETCH_TIMEOUT_SECS"), "FETCH_TIMEOUT_SECS")?;
        set_parsed(
            &mut self.publish.max_attempts,
            var("PUBLISH_MAX_ATTEMPTS"),
            "PUBLISH_MAX_ATTEMPTS",
        )?;
        set_parsed(&mut self.publish.backoff_ms, var("PUBLISH_BACKOFF_MS"), "PUBLISH_BACKOFF_MS")?;
        set_parsed(
            &mut self.publish.timeout_secs,
            var("PUBLISH_TIMEOUT_SECS"),
            "PUBLISH_TIMEOUT_SECS",
        )?;

        if let Some(v) = var("MICROCMS_SERVICE_DOMAIN") {
            self.cms.service_domain = Some(v.trim().to_string());
        }
        if let Some(v) = var("MICROCMS_BASE_URL") {
            self.cms.base_url = Some(v.trim().to_string());
        }
        if let Some(v) = var("MICROCMS_API_KEY") {
            self.cms.api_key = Some(Secret::new(v));
        }
        if let Some(v) = var("ALLOWED_APIS") {
            self.cms.allowed_apis = split_list(&v);
        }

        if let Some(v) = var("ANNOUNCE_PREFIX") {
            self.announce.prefix = v;
        }
        if let Some(v) = var("ANNOUNCE_LINK_TEMPLATE") {
            self.announce.link_template = v.trim().to_string();
        }

        if let Some(v) = var("TWITTER_API_BASE") {
            self.twitter.api_base = v.trim().to_string();
        }
        if let Some(v) = var("TWITTER_CONSUMER_KEY") {
            self.twitter.consumer_key = Some(v);
        }
        if let Some(v) = var("TWITTER_CONSUMER_SECRET") {
            self.twitter.consumer_secret = Some(Secret::new(v));
        }
        if let Some(v) = var("TWITTER_ACCESS_TOKEN") {
            self.twitter.access_token = Some(Secret::new(v));
        }
        if let Some(v) = var("TWITTER_ACCESS_TOKEN_SECRET") {
            self.twitter.access_token_secret = Some(Secret::new(v));
        }

        if let Some(v) = var("DRY_RUN") {
            self.dry_run = parse_bool(&v).context("DRY_RUN")?;
        }
        if let Some(v) = var("DEBUG_ROUTES") {
            self.debug_routes = parse_bool(&v).context("DEBUG_ROUTES")?;
        }
        if let Some(v) = var("LOG_FORMAT") {
            self.log_format = v.parse().context("LOG_FORMAT")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            bail!("max_concurrent_jobs must be at least 1");
        }
        if !self.announce.link_template.contains("{id}") {
            bail!("announce link template must contain {{id}}");
        }
        if self.deploy_wait_secs > MAX_DEPLOY_WAIT_SECS {
            bail!(
                "deploy_wait_secs {} exceeds the {MAX_DEPLOY_WAIT_SECS}s limit",
                self.deploy_wait_secs
            );
        }
        Ok(())
    }

    pub fn deploy_wait(&self) -> Duration {
        Duration::from_secs(self.deploy_wait_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Never zero; `tokio::time::interval` rejects a zero period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn fetch_retry(&self) -> RetryConfig {
        self.retry_for(&self.fetch)
    }

    pub fn publish_retry(&self) -> RetryConfig {
        self.retry_for(&self.publish)
    }

    fn retry_for(&self, step: &StepSettings) -> RetryConfig {
        RetryConfig::new(
            step.max_attempts,
            Duration::from_millis(step.backoff_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    /// Explicit base URL, else derived from the service domain.
    pub fn cms_base_url(&self) -> Option<String> {
        self.cms.base_url.clone().or_else(|| {
            self.cms
                .service_domain
                .as_deref()
                .map(crate::cms::MicroCmsClient::base_url_for_service)
        })
    }

    /// All four credentials, or `None` if any is missing.
    pub fn twitter_credentials(&self) -> Option<OAuthCredentials> {
        let t = &self.twitter;
        Some(OAuthCredentials {
            consumer_key: t.consumer_key.clone()?,
            consumer_secret: t.consumer_secret.as_ref()?.expose().to_string(),
            access_token: t.access_token.as_ref()?.expose().to_string(),
            access_token_secret: t.access_token_secret.as_ref()?.expose().to_string(),
        })
    }
}

fn config_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(default.exists().then_some(default))
}

fn set_parsed<T>(slot: &mut T, raw: Option<String>, key: &str) -> Result<()>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(raw) = raw {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid value {raw:?} for {key}: {e}"))?;
    }
    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("not a boolean: {other:?}")),
    }
}

fn split_list(s: &str) -> Vec<String> {
    use std::collections::BTreeSet;
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
