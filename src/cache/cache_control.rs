//! Declarative `Cache-Control` policies.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Who may store the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// A response caching policy attached to a resource.
///
/// Rendering via [`Display`](fmt::Display) produces the `cache-control`
/// header value: directives joined by `", "` in a fixed order (visibility,
/// `no-cache`, `no-store`, `must-revalidate`, `max-age`, `s-maxage`).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pipewright::cache::CacheControl;
///
/// let policy = CacheControl::private().max_age(Duration::from_secs(3600));
/// assert_eq!(policy.to_string(), "private, max-age=3600");
///
/// let from_config: CacheControl =
///     serde_json::from_str(r#"{ "visibility": "private", "max-age": 3600 }"#).unwrap();
/// assert_eq!(from_config, policy);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheControl {
    visibility: Option<Visibility>,
    no_cache: bool,
    no_store: bool,
    must_revalidate: bool,
    /// Seconds.
    max_age: Option<u64>,
    /// Seconds.
    s_maxage: Option<u64>,
}

impl CacheControl {
    /// An empty policy; renders as an empty string.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy starting with the `private` directive (browser caches only).
    pub fn private() -> Self {
        Self {
            visibility: Some(Visibility::Private),
            ..Self::default()
        }
    }

    /// A policy starting with the `public` directive (shared caches allowed).
    pub fn public() -> Self {
        Self {
            visibility: Some(Visibility::Public),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    #[must_use]
    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    #[must_use]
    pub fn must_revalidate(mut self) -> Self {
        self.must_revalidate = true;
        self
    }

    /// Sets `max-age`, truncated to whole seconds.
    #[must_use]
    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age.as_secs());
        self
    }

    /// Sets `s-maxage`, truncated to whole seconds.
    #[must_use]
    pub fn shared_max_age(mut self, age: Duration) -> Self {
        self.s_maxage = Some(age.as_secs());
        self
    }

    pub fn visibility(&self) -> Option<Visibility> {
        self.visibility
    }

    pub fn max_age_duration(&self) -> Option<Duration> {
        self.max_age.map(Duration::from_secs)
    }

    /// `true` when no directive is set.
    pub fn is_empty(&self) -> bool {
        self.directives().next().is_none()
    }

    fn directives(&self) -> impl Iterator<Item = String> + '_ {
        let flags = [
            (self.no_cache, "no-cache"),
            (self.no_store, "no-store"),
            (self.must_revalidate, "must-revalidate"),
        ];

        self.visibility
            .map(|v| v.as_str().to_owned())
            .into_iter()
            .chain(
                flags
                    .into_iter()
                    .filter(|(on, _)| *on)
                    .map(|(_, d)| d.to_owned()),
            )
            .chain(self.max_age.map(|s| format!("max-age={s}")))
            .chain(self.s_maxage.map(|s| format!("s-maxage={s}")))
    }
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, directive) in self.directives().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&directive)?;
        }
        Ok(())
    }
}
