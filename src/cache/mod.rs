//! HTTP caching plugin — conditional requests and `Cache-Control` synthesis.
//!
//! - [`evaluate_conditionals`] decides between a normal response and
//!   `304 Not Modified` from `If-None-Match` / `If-Modified-Since`.
//! - [`CacheControl`] is the declarative policy a resource carries; it renders
//!   to the `cache-control` response header.
//! - [`ConditionalRequestContributor`] and [`CacheHeadersContributor`] plug
//!   both into the middleware pipeline.

mod cache_control;
mod conditional;
mod contributors;

pub use cache_control::{CacheControl, Visibility};
pub use conditional::{ConditionalOutcome, EntityTag, Validators, evaluate_conditionals};
pub use contributors::{CacheHeadersContributor, ConditionalRequestContributor};
