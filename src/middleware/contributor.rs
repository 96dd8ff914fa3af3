//! Contributors and the descriptors the chain builder consumes.

use std::fmt;
use std::sync::Arc;

use crate::context::{CommunicationContext, PipelineContinuation};
use crate::error::PipelineError;

use super::BoxFuture;

/// A unit of request-handling behavior: resource selection, conditional
/// caching, handler invocation, and so on.
///
/// Contributors never see the chain. They do their work against the
/// context and report a [`PipelineContinuation`]; the pre-execute stage
/// wrapping them decides what runs next.
///
/// # Contract
///
/// - `kind` must be stable for the lifetime of the contributor. Override
///   rules match on it, so it acts as the contributor's identity tag.
/// - `invoke` must not hold references to anything outside `self` and the
///   context across an `.await`.
pub trait Contributor: Send + Sync {
    /// A short identity tag such as `"caching.conditional"`.
    fn kind(&self) -> &'static str;

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<PipelineContinuation, PipelineError>>;
}

/// How many times a contributor may run within one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvocationMode {
    /// At most once per request, even if a wrapping stage calls `next` repeatedly.
    #[default]
    SingleTap,
    /// Every time its stage is reached.
    MultiTap,
}

/// Position of a descriptor within a built chain, used to key single-tap bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContributorId(usize);

impl ContributorId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// An immutable record pairing a contributor with its invocation mode and a
/// diagnostic label.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use pipewright::middleware::{ContributorDescriptor, DoNothingContributor, InvocationMode};
///
/// let call = ContributorDescriptor::new(
///     Arc::new(DoNothingContributor),
///     InvocationMode::SingleTap,
///     "doNothing",
/// );
/// assert_eq!(call.kind(), DoNothingContributor::KIND);
/// assert_eq!(call.label(), "doNothing");
/// ```
#[derive(Clone)]
pub struct ContributorDescriptor {
    target: Arc<dyn Contributor>,
    mode: InvocationMode,
    label: String,
}

impl ContributorDescriptor {
    pub fn new(
        target: Arc<dyn Contributor>,
        mode: InvocationMode,
        label: impl Into<String>,
    ) -> Self {
        Self {
            target,
            mode,
            label: label.into(),
        }
    }

    /// A single-tap descriptor labelled with the contributor's kind.
    pub fn single_tap(target: Arc<dyn Contributor>) -> Self {
        let label = target.kind();
        Self::new(target, InvocationMode::SingleTap, label)
    }

    pub fn target(&self) -> &Arc<dyn Contributor> {
        &self.target
    }

    pub fn kind(&self) -> &'static str {
        self.target.kind()
    }

    pub fn mode(&self) -> InvocationMode {
        self.mode
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for ContributorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContributorDescriptor")
            .field("kind", &self.kind())
            .field("mode", &self.mode)
            .field("label", &self.label)
            .finish()
    }
}

/// A contributor that leaves the context untouched and continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoNothingContributor;

impl DoNothingContributor {
    pub const KIND: &'static str = "do-nothing";
}

impl Contributor for DoNothingContributor {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn invoke<'a>(
        &'a self,
        _ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<PipelineContinuation, PipelineError>> {
        Box::pin(async { Ok(PipelineContinuation::Continue) })
    }
}

/// A contributor backed by a closure.
///
/// Built with [`contributor_fn`].
pub struct FnContributor<F> {
    kind: &'static str,
    f: F,
}

/// Wraps a closure as a [`Contributor`] with the given kind tag.
///
/// # Examples
///
/// ```
/// use pipewright::context::PipelineContinuation;
/// use pipewright::middleware::{Contributor, contributor_fn};
///
/// let stamp = contributor_fn("stamp", |ctx| {
///     Box::pin(async move {
///         ctx.response_mut().headers_mut().set("x-stamped", "1");
///         Ok(PipelineContinuation::Continue)
///     })
/// });
/// assert_eq!(stamp.kind(), "stamp");
/// ```
pub fn contributor_fn<F>(kind: &'static str, f: F) -> FnContributor<F>
where
    F: for<'a> Fn(
            &'a mut CommunicationContext,
        ) -> BoxFuture<'a, Result<PipelineContinuation, PipelineError>>
        + Send
        + Sync,
{
    FnContributor { kind, f }
}

impl<F> Contributor for FnContributor<F>
where
    F: for<'a> Fn(
            &'a mut CommunicationContext,
        ) -> BoxFuture<'a, Result<PipelineContinuation, PipelineError>>
        + Send
        + Sync,
{
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<PipelineContinuation, PipelineError>> {
        (self.f)(ctx)
    }
}
