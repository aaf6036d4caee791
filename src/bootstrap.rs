// src/bootstrap.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api::AppState;
use crate::cms::{ContentSource, MicroCmsClient};
use crate::compose::Composer;
use crate::config::AppConfig;
use crate::executor::{ExecutorConfig, JobExecutor};
use crate::jobs::JobTable;
use crate::publish::{AnnouncementSink, DryRunSink, TwitterClient};
use crate::trigger::TriggerValidator;

/// Build clients, job table and executor from configuration.
pub fn build_state(cfg: &AppConfig) -> Result<AppState> {
    let base_url = cfg.cms_base_url().context(
        "content API is not configured: set MICROCMS_SERVICE_DOMAIN or MICROCMS_BASE_URL",
    )?;
    let api_key = cfg.cms.api_key.as_ref().map(|k| k.expose().to_string());
    // Safe diagnostics: only url + key length
    info!(
        "content API: url={}, key_len={}",
        base_url,
        api_key.as_deref().map(str::len).unwrap_or(0)
    );
    let source: Arc<dyn ContentSource> = Arc::new(MicroCmsClient::new(
        &base_url,
        api_key,
        Duration::from_secs(cfg.fetch.timeout_secs),
    )?);

    let sink = build_sink(cfg)?;
    info!("announcement sink: {}", sink.name());

    let executor = JobExecutor::new(
        Arc::new(JobTable::new(cfg.cooldown())),
        source,
        sink,
        Composer::new(cfg.announce.prefix.clone(), cfg.announce.link_template.clone()),
        ExecutorConfig {
            deploy_wait: cfg.deploy_wait(),
            max_concurrent: cfg.max_concurrent_jobs,
            fetch_retry: cfg.fetch_retry(),
            publish_retry: cfg.publish_retry(),
        },
    );

    let validator = TriggerValidator::new(cfg.cms.service_domain.clone(), cfg.cms.allowed_apis.clone());

    Ok(AppState {
        executor,
        validator: Arc::new(validator),
        debug_routes: cfg.debug_routes,
    })
}

fn build_sink(cfg: &AppConfig) -> Result<Arc<dyn AnnouncementSink>> {
    if cfg.dry_run {
        return Ok(Arc::new(DryRunSink));
    }
    match cfg.twitter_credentials() {
        Some(creds) => Ok(Arc::new(TwitterClient::new(
            &cfg.twitter.api_base,
            creds,
            Duration::from_secs(cfg.publish.timeout_secs),
        )?)),
        None => {
            warn!("Twitter credentials incomplete; announcements will only be logged");
            Ok(Arc::new(DryRunSink))
        }
    }
}
