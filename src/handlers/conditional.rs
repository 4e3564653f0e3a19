//! Conditional request evaluation (`If-Match`, `If-None-Match`,
//! `If-Modified-Since`, `If-Unmodified-Since`).
//!
//! Evaluation is an ordered rule table; the first rule that fires decides the
//! outcome.  Only GET and HEAD use it, so a matching `If-None-Match` always
//! means "not modified".

use std::time::SystemTime;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

use crate::errors::S3Error;

/// Conditional headers of a read request.  Unparseable dates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalArgs {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl ConditionalArgs {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let date = |name: &str| {
            text(name)
                .and_then(|v| httpdate::parse_http_date(v).ok())
                .map(DateTime::<Utc>::from)
        };

        Self {
            if_match: text("if-match").map(str::to_string),
            if_none_match: text("if-none-match").map(str::to_string),
            if_modified_since: date("if-modified-since"),
            if_unmodified_since: date("if-unmodified-since"),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of evaluating [`ConditionalArgs`] against an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    PreconditionFailed,
    NotModified,
}

struct Subject<'a> {
    etag: &'a str,
    last_modified: DateTime<Utc>,
    args: &'a ConditionalArgs,
}

struct Rule {
    fires: fn(&Subject<'_>) -> bool,
    verdict: Verdict,
}

const RULES: &[Rule] = &[
    Rule {
        fires: |s| matches!(&s.args.if_match, Some(m) if !etag_matches(m, s.etag)),
        verdict: Verdict::PreconditionFailed,
    },
    // A satisfied If-Match overrides If-Unmodified-Since.
    Rule {
        fires: |s| {
            s.args.if_match.is_none()
                && matches!(s.args.if_unmodified_since, Some(t) if s.last_modified > t)
        },
        verdict: Verdict::PreconditionFailed,
    },
    Rule {
        fires: |s| matches!(&s.args.if_none_match, Some(m) if etag_matches(m, s.etag)),
        verdict: Verdict::NotModified,
    },
    Rule {
        fires: |s| matches!(s.args.if_modified_since, Some(t) if s.last_modified <= t),
        verdict: Verdict::NotModified,
    },
];

/// Evaluate the conditional headers against an object's entity tag and
/// modification time.
pub fn evaluate(etag: &str, last_modified: DateTime<Utc>, args: &ConditionalArgs) -> Verdict {
    let subject = Subject {
        etag,
        last_modified: truncate_to_seconds(last_modified),
        args,
    };
    RULES
        .iter()
        .find(|rule| (rule.fires)(&subject))
        .map_or(Verdict::Pass, |rule| rule.verdict)
}

/// [`evaluate`] as a handler result: 412 and 304 become errors.
pub fn check_preconditions(
    etag: &str,
    last_modified: DateTime<Utc>,
    args: &ConditionalArgs,
) -> Result<(), S3Error> {
    match evaluate(etag, last_modified, args) {
        Verdict::Pass => Ok(()),
        Verdict::PreconditionFailed => Err(S3Error::PreconditionFailed),
        Verdict::NotModified => Err(S3Error::NotModified),
    }
}

/// Whether an `If-Match` / `If-None-Match` value matches `etag`.
///
/// The header may list several tags separated by commas; quotes and weak
/// `W/` prefixes are ignored, and `*` matches anything.
fn etag_matches(header: &str, etag: &str) -> bool {
    let etag = normalize_etag(etag);
    header
        .split(',')
        .map(normalize_etag)
        .any(|candidate| candidate == "*" || candidate == etag)
}

fn normalize_etag(tag: &str) -> &str {
    let tag = tag.trim();
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    tag.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag)
}

// HTTP dates have no sub-second part.
fn truncate_to_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}

/// Format a timestamp as an HTTP date for `Last-Modified`.
pub fn http_date(t: DateTime<Utc>) -> String {
    httpdate::fmt_http_date(SystemTime::from(t))
}
