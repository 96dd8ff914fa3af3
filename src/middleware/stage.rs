//! Invocable links of a composed chain.

use std::sync::Arc;

use crate::context::CommunicationContext;
use crate::error::PipelineError;

use super::BoxFuture;

/// One link of a composed chain.
///
/// A stage owns its `next` link (handed to it by a [`MiddlewareFactory`]) and
/// decides whether, when, and how many times to invoke it.
///
/// # Contract
///
/// - A stage must eventually invoke `next` unless it deliberately ends the run.
/// - Errors from `next` must be returned unchanged.
/// - Stages are shared by every request that runs through the chain, so they
///   must keep per-request state on the context, not on `self`.
///
/// [`MiddlewareFactory`]: super::MiddlewareFactory
pub trait MiddlewareStage: Send + Sync {
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<(), PipelineError>>;
}

/// The end of every chain. Completes immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminal;

impl Terminal {
    pub fn shared() -> Arc<dyn MiddlewareStage> {
        Arc::new(Self)
    }
}

impl MiddlewareStage for Terminal {
    fn invoke<'a>(
        &'a self,
        _ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(async { Ok(()) })
    }
}

/// A stage backed by a closure. Built with [`stage_fn`].
pub struct FnStage<F> {
    f: F,
}

/// Wraps a closure as a [`MiddlewareStage`].
///
/// Closure stages usually capture the `next` link they were composed with:
///
/// ```
/// use std::sync::Arc;
/// use pipewright::middleware::{MiddlewareStage, Terminal, stage_fn};
///
/// let next = Terminal::shared();
/// let stage = stage_fn(move |ctx| {
///     let next = Arc::clone(&next);
///     Box::pin(async move { next.invoke(ctx).await })
/// });
/// # let _ = stage;
/// ```
pub fn stage_fn<F>(f: F) -> FnStage<F>
where
    F: for<'a> Fn(&'a mut CommunicationContext) -> BoxFuture<'a, Result<(), PipelineError>>
        + Send
        + Sync,
{
    FnStage { f }
}

impl<F> MiddlewareStage for FnStage<F>
where
    F: for<'a> Fn(&'a mut CommunicationContext) -> BoxFuture<'a, Result<(), PipelineError>>
        + Send
        + Sync,
{
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        (self.f)(ctx)
    }
}
