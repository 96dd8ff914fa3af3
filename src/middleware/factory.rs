//! Middleware factories: `next -> stage` composition units.

use std::sync::Arc;

use tracing::debug;

use crate::context::CommunicationContext;
use crate::error::PipelineError;

use super::contributor::{ContributorDescriptor, ContributorId, InvocationMode};
use super::stage::MiddlewareStage;
use super::BoxFuture;

/// Produces a stage given the stage that should run after it.
///
/// The chain builder emits factories; [`compose`](super::compose) folds them
/// right-to-left into one linked chain.
pub trait MiddlewareFactory: Send + Sync {
    /// Diagnostic name, e.g. `"pre-execute"`.
    fn name(&self) -> &str;

    fn compose(&self, next: Arc<dyn MiddlewareStage>) -> Arc<dyn MiddlewareStage>;
}

/// The default factory emitted for every contributor descriptor.
#[derive(Debug, Clone)]
pub struct PreExecuteFactory {
    id: ContributorId,
    descriptor: ContributorDescriptor,
}

impl PreExecuteFactory {
    pub const NAME: &'static str = "pre-execute";

    pub fn new(id: ContributorId, descriptor: ContributorDescriptor) -> Self {
        Self { id, descriptor }
    }

    pub fn descriptor(&self) -> &ContributorDescriptor {
        &self.descriptor
    }
}

impl MiddlewareFactory for PreExecuteFactory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compose(&self, next: Arc<dyn MiddlewareStage>) -> Arc<dyn MiddlewareStage> {
        Arc::new(PreExecuteStage {
            id: self.id,
            descriptor: self.descriptor.clone(),
            next,
        })
    }
}

/// Runs its contributor (when the run is still in `Continue` and the
/// invocation mode allows it), then always invokes `next`.
struct PreExecuteStage {
    id: ContributorId,
    descriptor: ContributorDescriptor,
    next: Arc<dyn MiddlewareStage>,
}

impl PreExecuteStage {
    fn eligible(&self, ctx: &mut CommunicationContext) -> bool {
        if !ctx.state().should_continue() {
            return false;
        }
        match self.descriptor.mode() {
            InvocationMode::MultiTap => true,
            InvocationMode::SingleTap => ctx.state_mut().record_tap(self.id),
        }
    }
}

impl MiddlewareStage for PreExecuteStage {
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(async move {
            if ctx.is_cancelled() {
                debug!(contributor = self.descriptor.label(), "run cancelled");
                return Err(PipelineError::Cancelled);
            }

            if self.eligible(ctx) {
                let continuation = self.descriptor.target().invoke(ctx).await?;
                debug!(
                    contributor = self.descriptor.label(),
                    ?continuation,
                    "contributor executed"
                );
                ctx.state_mut().set_continuation(continuation);
            }

            self.next.invoke(ctx).await
        })
    }
}

/// A factory backed by a closure. Built with [`factory_fn`].
pub struct FnFactory<F> {
    name: String,
    f: F,
}

/// Wraps a `next -> stage` closure as a named [`MiddlewareFactory`].
///
/// # Examples
///
/// ```
/// use pipewright::middleware::{MiddlewareFactory, factory_fn};
///
/// // A factory that adds nothing: the composed stage is `next` itself.
/// let passthrough = factory_fn("passthrough", |next| next);
/// assert_eq!(passthrough.name(), "passthrough");
/// ```
pub fn factory_fn<F>(name: impl Into<String>, f: F) -> FnFactory<F>
where
    F: Fn(Arc<dyn MiddlewareStage>) -> Arc<dyn MiddlewareStage> + Send + Sync,
{
    FnFactory {
        name: name.into(),
        f,
    }
}

impl<F> MiddlewareFactory for FnFactory<F>
where
    F: Fn(Arc<dyn MiddlewareStage>) -> Arc<dyn MiddlewareStage> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn compose(&self, next: Arc<dyn MiddlewareStage>) -> Arc<dyn MiddlewareStage> {
        (self.f)(next)
    }
}
