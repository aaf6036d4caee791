//! Renders an article JSON (file path argument or stdin) the way it would be announced.
//!
//! `ANNOUNCE_PREFIX` / `ANNOUNCE_LINK_TEMPLATE` are honoured, as in the server.

use std::io::Read;

use anyhow::{Context, Result};
use blog_announcer::cms::ArticleRecord;
use blog_announcer::config::AppConfig;
use blog_announcer::compose::{Composer, MAX_WEIGHTED_LEN};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("read {path}"))?,
        None => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .context("read stdin")?;
            s
        }
    };
    let record: ArticleRecord = serde_json::from_str(&raw).context("parse article JSON")?;

    let mut cfg = AppConfig::default();
    cfg.apply_env(|k| std::env::var(k).ok())?;
    let composer = Composer::new(cfg.announce.prefix, cfg.announce.link_template);

    let announcement = composer.compose(&record)?;
    println!("{}", announcement.text);
    println!("---");
    println!("weighted length: {}/{}", announcement.weighted_len, MAX_WEIGHTED_LEN);
    Ok(())
}
