// src/compose.rs
//! Renders an [`ArticleRecord`] into announcement text.
//!
//! Pure and deterministic. Length is measured the way the Twitter API counts it:
//! most CJK and emoji code points weigh 2, a link always weighs 23.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::cms::ArticleRecord;

pub const MAX_WEIGHTED_LEN: usize = 280;
pub const URL_WEIGHT: usize = 23;

pub const DEFAULT_PREFIX: &str = "New post: ";
pub const DEFAULT_LINK_TEMPLATE: &str = "https://example.com/blogs/{id}";

/// Code point ranges that count as a single unit.
const LIGHT_RANGES: [(u32, u32); 4] = [
    (0x0000, 0x10FF),
    (0x2000, 0x200D),
    (0x2010, 0x201F),
    (0x2032, 0x2037),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub text: String,
    pub weighted_len: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("article {0} has an empty title")]
    EmptyTitle(String),

    #[error("announcement is {len} weighted chars, limit is {max}")]
    TooLong { len: usize, max: usize },
}

#[derive(Debug, Clone)]
pub struct Composer {
    prefix: String,
    link_template: String,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_LINK_TEMPLATE)
    }
}

impl Composer {
    /// `link_template` must contain `{id}`, which is replaced by the article id.
    pub fn new(prefix: impl Into<String>, link_template: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            link_template: link_template.into(),
        }
    }

    pub fn link_for(&self, content_id: &str) -> String {
        self.link_template.replace("{id}", content_id)
    }

    pub fn compose(&self, record: &ArticleRecord) -> Result<Announcement, ComposeError> {
        let title = normalize_title(&record.title);
        if title.is_empty() {
            return Err(ComposeError::EmptyTitle(record.id.clone()));
        }

        let head = format!("{}{}\n", self.prefix, title);
        let weighted_len = weighted_len(&head) + URL_WEIGHT;
        if weighted_len > MAX_WEIGHTED_LEN {
            return Err(ComposeError::TooLong {
                len: weighted_len,
                max: MAX_WEIGHTED_LEN,
            });
        }

        Ok(Announcement {
            text: format!("{head}{}", self.link_for(&record.id)),
            weighted_len,
        })
    }
}

/// Collapse internal whitespace (including newlines) to single spaces and trim.
pub fn normalize_title(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Weighted character count of plain text (no URL detection).
pub fn weighted_len(s: &str) -> usize {
    s.chars()
        .map(|c| {
            let cp = c as u32;
            if LIGHT_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp)) {
                1
            } else {
                2
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, title: &str) -> ArticleRecord {
        let t = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
        ArticleRecord {
            id: id.into(),
            created_at: t,
            updated_at: t,
            title: title.into(),
            body: "<p>body</p>".into(),
        }
    }

    #[test]
    fn golden_output() {
        let a = Composer::default()
            .compose(&record("abc123", "Hello World"))
            .unwrap();
        assert_eq!(
            a.text,
            "New post: Hello World\nhttps://example.com/blogs/abc123"
        );
        assert_eq!(a.weighted_len, 22 + URL_WEIGHT);
    }

    #[test]
    fn identical_input_gives_identical_bytes() {
        let c = Composer::new("更新: ", "https://blog.example.jp/posts/{id}");
        let r = record("xyz", "Rust で  Webhook\nを受ける");
        let a = c.compose(&r).unwrap();
        let b = c.compose(&r.clone()).unwrap();
        assert_eq!(a.text.as_bytes(), b.text.as_bytes());
        assert_eq!(a.text, "更新: Rust で Webhook を受ける\nhttps://blog.example.jp/posts/xyz");
    }

    #[test]
    fn cjk_counts_double() {
        assert_eq!(weighted_len("abc"), 3);
        assert_eq!(weighted_len("こんにちは"), 10);
        assert_eq!(weighted_len("\u{2014}"), 1);
    }

    #[test]
    fn over_limit_is_rejected_before_publish() {
        let long = "a".repeat(260);
        let err = Composer::default()
            .compose(&record("id", &long))
            .unwrap_err();
        assert!(matches!(err, ComposeError::TooLong { max: 280, .. }));

        // 130 CJK chars = 260 weight, plus prefix/newline/url is over.
        let cjk = "語".repeat(130);
        assert!(Composer::default().compose(&record("id", &cjk)).is_err());
    }

    #[test]
    fn limit_is_inclusive() {
        // prefix(10) + title + newline(1) + url(23) == 280
        let title = "a".repeat(280 - 10 - 1 - URL_WEIGHT);
        let a = Composer::default().compose(&record("id", &title)).unwrap();
        assert_eq!(a.weighted_len, 280);
    }

    #[test]
    fn blank_title_is_an_error() {
        assert_eq!(
            Composer::default().compose(&record("id", " \n\t ")),
            Err(ComposeError::EmptyTitle("id".into()))
        );
    }
}
