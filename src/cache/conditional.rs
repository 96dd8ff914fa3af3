//! Conditional GET evaluation (`If-None-Match`, `If-Modified-Since`).
//!
//! Malformed conditional headers never fail a request: a validator that
//! cannot be understood is ignored and the request proceeds as if it were
//! unconditional.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::http::headers::{IF_MODIFIED_SINCE, IF_NONE_MATCH};
use crate::http::{Method, Request};

/// An entity tag (RFC 9110 §8.8.3).
///
/// # Examples
///
/// ```
/// use pipewright::cache::EntityTag;
///
/// let tag = EntityTag::parse("W/\"v1\"").unwrap();
/// assert!(tag.is_weak());
/// assert!(tag.weak_eq(&EntityTag::strong("v1")));
/// assert_eq!(tag.to_string(), "W/\"v1\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityTag {
    weak: bool,
    opaque: String,
}

impl EntityTag {
    pub fn strong(opaque: impl Into<String>) -> Self {
        Self {
            weak: false,
            opaque: opaque.into(),
        }
    }

    pub fn weak(opaque: impl Into<String>) -> Self {
        Self {
            weak: true,
            opaque: opaque.into(),
        }
    }

    /// Parses `"opaque"` or `W/"opaque"`. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (weak, quoted) = match raw.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let opaque = quoted.strip_prefix('"')?.strip_suffix('"')?;
        if opaque.contains('"') {
            return None;
        }
        Some(Self {
            weak,
            opaque: opaque.to_owned(),
        })
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    pub fn opaque(&self) -> &str {
        &self.opaque
    }

    /// Weak comparison: opaque values match, weakness ignored.
    pub fn weak_eq(&self, other: &Self) -> bool {
        self.opaque == other.opaque
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            f.write_str("W/")?;
        }
        write!(f, "\"{}\"", self.opaque)
    }
}

/// The validators a resource exposes for the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub last_modified: Option<SystemTime>,
    pub etag: Option<EntityTag>,
}

/// What a conditional request resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOutcome {
    /// Process the request normally.
    Proceed,
    /// Answer `304 Not Modified` without a body.
    NotModified,
}

/// Decides whether `request` can be answered with `304 Not Modified`.
///
/// Rules, in order:
///
/// 1. Only `GET` and `HEAD` are eligible.
/// 2. If `If-None-Match` is present it alone decides: `*`, or any listed tag
///    weakly matching the resource's tag, yields `NotModified`.
///    `If-Modified-Since` is then ignored.
/// 3. `If-Modified-Since` is honored only when it parses as an HTTP-date that
///    is not later than `now` and the resource has a modification time; a
///    resource modified at or before that date (second precision) yields
///    `NotModified`.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, SystemTime};
/// use pipewright::cache::{ConditionalOutcome, Validators, evaluate_conditionals};
/// use pipewright::http::Request;
///
/// let now = SystemTime::now();
/// let validators = Validators {
///     last_modified: Some(now - Duration::from_secs(60)),
///     etag: None,
/// };
/// let request = Request::get("/TestResource").with_header("if-modified-since", "not-a-date");
///
/// assert_eq!(
///     evaluate_conditionals(&request, &validators, now),
///     ConditionalOutcome::Proceed
/// );
/// ```
pub fn evaluate_conditionals(
    request: &Request,
    validators: &Validators,
    now: SystemTime,
) -> ConditionalOutcome {
    if !matches!(request.method(), Method::Get | Method::Head) {
        return ConditionalOutcome::Proceed;
    }

    let headers = request.headers();

    if headers.contains(IF_NONE_MATCH) {
        let matched = headers
            .get_all(IF_NONE_MATCH)
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .any(|candidate| {
                candidate == "*"
                    || match (EntityTag::parse(candidate), &validators.etag) {
                        (Some(tag), Some(current)) => tag.weak_eq(current),
                        _ => false,
                    }
            });
        return if matched {
            ConditionalOutcome::NotModified
        } else {
            ConditionalOutcome::Proceed
        };
    }

    let (Some(raw), Some(last_modified)) = (headers.get(IF_MODIFIED_SINCE), validators.last_modified)
    else {
        return ConditionalOutcome::Proceed;
    };

    let since = match httpdate::parse_http_date(raw.trim()) {
        Ok(since) => since,
        Err(_) => {
            debug!(value = raw, "ignoring unparseable if-modified-since");
            return ConditionalOutcome::Proceed;
        }
    };

    if since > now {
        debug!(value = raw, "ignoring if-modified-since in the future");
        return ConditionalOutcome::Proceed;
    }

    if unix_seconds(last_modified) <= unix_seconds(since) {
        ConditionalOutcome::NotModified
    } else {
        ConditionalOutcome::Proceed
    }
}

// HTTP-dates carry whole seconds; sub-second modification times must not
// make a resource look newer than the date a client echoed back.
fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
