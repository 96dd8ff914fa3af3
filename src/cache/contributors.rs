//! Pipeline contributors that apply a resource's caching metadata.

use std::sync::Arc;

use tracing::debug;

use crate::context::{CommunicationContext, PipelineContinuation};
use crate::error::PipelineError;
use crate::http::headers::{CACHE_CONTROL, ETAG, LAST_MODIFIED};
use crate::http::{Response, StatusCode};
use crate::middleware::{BoxFuture, Contributor};
use crate::resource::Resource;

use super::conditional::{ConditionalOutcome, Validators, evaluate_conditionals};

/// Answers conditional GETs with `304 Not Modified` when the selected
/// resource's validators allow it.
///
/// Runs after resource selection and before handler invocation. On a match
/// it writes the caching headers itself and returns
/// [`PipelineContinuation::RenderNow`], so the handler never runs.
/// The computed [`Validators`] are left in the context extensions for
/// [`CacheHeadersContributor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalRequestContributor;

impl ConditionalRequestContributor {
    pub const KIND: &'static str = "caching.conditional";
}

impl Contributor for ConditionalRequestContributor {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<PipelineContinuation, PipelineError>> {
        Box::pin(async move {
            let Some(resource) = ctx.resource().cloned() else {
                return Ok(PipelineContinuation::Continue);
            };

            let validators = resource.validators(ctx);
            let outcome = evaluate_conditionals(ctx.request(), &validators, ctx.now());
            ctx.extensions_mut().insert(validators.clone());

            match outcome {
                ConditionalOutcome::Proceed => Ok(PipelineContinuation::Continue),
                ConditionalOutcome::NotModified => {
                    debug!(path = ctx.request().path(), "answering 304 not modified");
                    let response = ctx.response_mut();
                    response.set_status(StatusCode::NotModified);
                    response.set_body(Vec::new());
                    write_cache_headers(response, &resource, &validators);
                    Ok(PipelineContinuation::RenderNow)
                }
            }
        })
    }
}

/// Decorates successful responses with `cache-control`, `last-modified`,
/// and `etag` derived from the selected resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheHeadersContributor;

impl CacheHeadersContributor {
    pub const KIND: &'static str = "caching.headers";
}

impl Contributor for CacheHeadersContributor {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<PipelineContinuation, PipelineError>> {
        Box::pin(async move {
            let Some(resource) = ctx.resource().cloned() else {
                return Ok(PipelineContinuation::Continue);
            };
            if !ctx.response().status().is_success() {
                return Ok(PipelineContinuation::Continue);
            }

            let validators = match ctx.extensions().get::<Validators>() {
                Some(validators) => validators.clone(),
                None => resource.validators(ctx),
            };
            write_cache_headers(ctx.response_mut(), &resource, &validators);

            Ok(PipelineContinuation::Continue)
        })
    }
}

fn write_cache_headers(response: &mut Response, resource: &Arc<Resource>, validators: &Validators) {
    let headers = response.headers_mut();

    if let Some(policy) = resource.cache_policy().filter(|p| !p.is_empty()) {
        headers.set(CACHE_CONTROL, policy.to_string());
    }
    if let Some(modified) = validators.last_modified {
        headers.set(LAST_MODIFIED, httpdate::fmt_http_date(modified));
    }
    if let Some(tag) = &validators.etag {
        headers.set(ETAG, tag.to_string());
    }
}
