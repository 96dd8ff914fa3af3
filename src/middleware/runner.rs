//! Pipeline runner: drives a composed chain for one request at a time.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::{CommunicationContext, PipelineContinuation};
use crate::error::PipelineError;

use super::builder::{OverrideRules, build_chain, compose};
use super::contributor::ContributorDescriptor;
use super::factory::MiddlewareFactory;
use super::stage::{MiddlewareStage, Terminal};

/// Invokes `head` with `ctx` and awaits completion.
///
/// Errors raised anywhere in the chain are returned exactly as the failing
/// stage produced them.
pub async fn run(
    head: &dyn MiddlewareStage,
    ctx: &mut CommunicationContext,
) -> Result<(), PipelineError> {
    head.invoke(ctx).await
}

/// A composed, immutable chain that can be run for any number of requests,
/// concurrently.
///
/// Cloning is cheap: clones share the same stage graph.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use pipewright::context::CommunicationContext;
/// use pipewright::http::Request;
/// use pipewright::middleware::{
///     ContributorDescriptor, DoNothingContributor, OverrideRules, Pipeline,
/// };
///
/// # #[tokio::main]
/// # async fn main() {
/// let calls = [ContributorDescriptor::single_tap(Arc::new(DoNothingContributor))];
/// let pipeline = Pipeline::build(&calls, &OverrideRules::new()).unwrap();
///
/// let mut ctx = CommunicationContext::new(Request::get("/"));
/// pipeline.run(&mut ctx).await.unwrap();
/// assert_eq!(pipeline.factory_names(), ["pre-execute"]);
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    head: Arc<dyn MiddlewareStage>,
    factory_names: Arc<[String]>,
}

impl Pipeline {
    /// Wraps an already composed head stage.
    pub fn new(head: Arc<dyn MiddlewareStage>) -> Self {
        Self {
            head,
            factory_names: Arc::from(Vec::new()),
        }
    }

    /// Composes `factories` in front of a [`Terminal`] stage.
    pub fn from_factories(factories: &[Arc<dyn MiddlewareFactory>]) -> Self {
        Self {
            head: compose(factories, Terminal::shared()),
            factory_names: factories.iter().map(|f| f.name().to_owned()).collect(),
        }
    }

    /// Builds the factory list from `descriptors` and composes it.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineError::InvalidConfiguration`] from [`build_chain`].
    pub fn build(
        descriptors: &[ContributorDescriptor],
        overrides: &OverrideRules,
    ) -> Result<Self, PipelineError> {
        let factories = build_chain(descriptors, overrides)?;
        Ok(Self::from_factories(&factories))
    }

    /// Names of the factories this pipeline was composed from, in chain order.
    ///
    /// Empty when the pipeline was created from a bare head with [`Pipeline::new`].
    pub fn factory_names(&self) -> &[String] {
        &self.factory_names
    }

    /// Runs the chain for one request.
    ///
    /// # Errors
    ///
    /// Any error raised by a stage, unchanged, or [`PipelineError::Aborted`]
    /// when a contributor finished the run with [`PipelineContinuation::Abort`].
    pub async fn run(&self, ctx: &mut CommunicationContext) -> Result<(), PipelineError> {
        debug!(
            method = %ctx.request().method(),
            path = ctx.request().path(),
            "pipeline run started"
        );

        let result = run(self.head.as_ref(), ctx).await.and_then(|()| {
            match ctx.state().continuation() {
                PipelineContinuation::Abort => Err(PipelineError::Aborted),
                _ => Ok(()),
            }
        });

        match &result {
            Ok(()) => debug!(
                status = ctx.response().status().as_u16(),
                continuation = ?ctx.state().continuation(),
                "pipeline run completed"
            ),
            Err(e) => warn!(error = %e, "pipeline run failed"),
        }

        result
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("factories", &self.factory_names)
            .finish_non_exhaustive()
    }
}
