//! Next-URL generation for paginated listings
//!
//! A [`UrlPattern`] is detected once from a campaign's seed URL and then
//! reused for every iteration. Detection priority:
//!
//! 1. `page=<n>` query parameter
//! 2. `offset=<n>` query parameter (fixed page-size step)
//! 3. `/page/<n>/` path segment
//! 4. fallback: append `page=<n>` to the query string
//!
//! Rewrites touch only the matched number; every other byte of the URL is
//! preserved. When a pattern no longer matches the reference URL the URL is
//! returned unchanged, which callers read as "pagination exhausted".

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from URL pattern handling
#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("stored pattern regex is invalid: {0}")]
    BadPattern(#[from] regex::Error),

    #[error("page number must be at least 1, got {0}")]
    InvalidPage(u32),
}

pub type Result<T> = std::result::Result<T, PaginationError>;

/// How a listing encodes its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    QueryPage,
    QueryOffset,
    PathPage,
    /// No pagination marker in the seed; `page=` is appended
    Appended,
}

impl PatternKind {
    /// Regex locating the position number in capture group `n`
    fn regex_source(&self) -> &'static str {
        match self {
            Self::QueryPage | Self::Appended => r"[?&]page=(?P<n>\d+)",
            Self::QueryOffset => r"[?&]offset=(?P<n>\d+)",
            Self::PathPage => r"/page/(?P<n>\d+)(?:/|$|[?#])",
        }
    }

    fn placeholder(&self) -> &'static str {
        match self {
            Self::QueryPage | Self::Appended => "page={page}",
            Self::QueryOffset => "offset={offset}",
            Self::PathPage => "/page/{page}/",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::QueryPage => "query_page",
            Self::QueryOffset => "query_offset",
            Self::PathPage => "path_page",
            Self::Appended => "appended",
        };
        f.write_str(s)
    }
}

/// Pagination pattern detected from a seed URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPattern {
    pub kind: PatternKind,
    pub original_url: String,
    pub regex: String,
    pub placeholder: String,
    /// Items per page; only meaningful for offset paging
    pub page_size: u32,
}

impl UrlPattern {
    /// Detect the pagination pattern of `seed_url`.
    pub fn detect(seed_url: &str, page_size: u32) -> Result<Self> {
        validate_absolute(seed_url)?;

        let kind = [PatternKind::QueryPage, PatternKind::QueryOffset, PatternKind::PathPage]
            .into_iter()
            .find_map(|kind| match Regex::new(kind.regex_source()) {
                Ok(re) if re.is_match(seed_url) => Some(Ok(kind)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .transpose()?
            .unwrap_or(PatternKind::Appended);

        Ok(Self {
            kind,
            original_url: seed_url.to_string(),
            regex: kind.regex_source().to_string(),
            placeholder: kind.placeholder().to_string(),
            page_size: page_size.max(1),
        })
    }

    /// URL of the page following `reference`.
    ///
    /// Returns `reference` unchanged when the pattern does not match it.
    pub fn next_url(&self, reference: &str) -> Result<String> {
        validate_absolute(reference)?;
        let re = Regex::new(&self.regex)?;

        let next = match re.captures(reference).and_then(|c| c.name("n")) {
            Some(m) => {
                let current: u64 = m.as_str().parse().unwrap_or(0);
                let step = match self.kind {
                    PatternKind::QueryOffset => u64::from(self.page_size),
                    _ => 1,
                };
                splice(reference, m.start(), m.end(), current.saturating_add(step))
            }
            None if self.kind == PatternKind::Appended => append_param(reference, "page", 2),
            None => reference.to_string(),
        };

        validate_absolute(&next)?;
        Ok(next)
    }

    /// Absolute URL for page `page` (1-based), derived from `reference`.
    pub fn url_for_page(&self, reference: &str, page: u32) -> Result<String> {
        if page == 0 {
            return Err(PaginationError::InvalidPage(page));
        }
        validate_absolute(reference)?;
        let re = Regex::new(&self.regex)?;

        let value = match self.kind {
            PatternKind::QueryOffset => u64::from(page - 1) * u64::from(self.page_size),
            _ => u64::from(page),
        };

        let url = match re.captures(reference).and_then(|c| c.name("n")) {
            Some(m) => splice(reference, m.start(), m.end(), value),
            None if self.kind == PatternKind::Appended && page == 1 => reference.to_string(),
            None if self.kind == PatternKind::Appended => append_param(reference, "page", value),
            None => reference.to_string(),
        };

        validate_absolute(&url)?;
        Ok(url)
    }
}

/// Require an absolute http(s) URL
pub fn validate_absolute(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url).map_err(|e| PaginationError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(PaginationError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn splice(url: &str, start: usize, end: usize, value: u64) -> String {
    let mut out = String::with_capacity(url.len() + 2);
    out.push_str(&url[..start]);
    out.push_str(&value.to_string());
    out.push_str(&url[end..]);
    out
}

/// Append `name=value` before any fragment, using `?` or `&` as needed
fn append_param(url: &str, name: &str, value: u64) -> String {
    let (base, fragment) = match url.find('#') {
        Some(i) => (&url[..i], &url[i..]),
        None => (url, ""),
    };
    let sep = if base.contains('?') {
        if base.ends_with('?') || base.ends_with('&') {
            ""
        } else {
            "&"
        }
    } else {
        "?"
    };
    format!("{}{}{}={}{}", base, sep, name, value, fragment)
}
