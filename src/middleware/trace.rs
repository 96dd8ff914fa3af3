//! Diagnostic interception stage.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::context::CommunicationContext;
use crate::error::PipelineError;

use super::BoxFuture;
use super::factory::MiddlewareFactory;
use super::stage::MiddlewareStage;

/// Override factory that wraps `next` with timing and outcome logging.
///
/// The timed span is everything downstream of the stage: attach the rule to
/// the contributor that runs just before the work to be measured.
///
/// ```
/// use std::sync::Arc;
/// use pipewright::middleware::{OverrideRules, TraceFactory};
///
/// let rules = OverrideRules::new()
///     .for_kind("caching.conditional", || Arc::new(TraceFactory::new("handler")));
/// assert_eq!(rules.len(), 1);
/// ```
///
/// The stage emits one `tracing::info!` record after `next` completes:
///
/// ```text
/// METHOD /path - STATUS (duration) [label]
/// ```
///
/// Failures from `next` are logged at `warn` and returned unchanged. Either
/// way the measurement is left on the context as a [`TraceRecord`].
#[derive(Debug, Clone)]
pub struct TraceFactory {
    label: String,
}

impl TraceFactory {
    pub const NAME: &'static str = "trace";

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl MiddlewareFactory for TraceFactory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compose(&self, next: Arc<dyn MiddlewareStage>) -> Arc<dyn MiddlewareStage> {
        Arc::new(TraceStage {
            label: self.label.clone(),
            next,
        })
    }
}

/// The last measurement taken by a [`TraceFactory`] stage, stored in the
/// context extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub label: String,
    pub elapsed: Duration,
    pub failed: bool,
}

struct TraceStage {
    label: String,
    next: Arc<dyn MiddlewareStage>,
}

impl MiddlewareStage for TraceStage {
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_owned();
            let path = ctx.request().path().to_owned();

            let result = self.next.invoke(ctx).await;
            let duration = start.elapsed();

            match &result {
                Ok(()) => tracing::info!(
                    "{} {} - {} ({:?}) [{}]",
                    method,
                    path,
                    ctx.response().status().as_u16(),
                    duration,
                    self.label
                ),
                Err(e) => tracing::warn!(
                    label = %self.label,
                    error = %e,
                    "{} {} failed after {:?}",
                    method,
                    path,
                    duration
                ),
            }

            ctx.extensions_mut().insert(TraceRecord {
                label: self.label.clone(),
                elapsed: duration,
                failed: result.is_err(),
            });

            result
        })
    }
}
