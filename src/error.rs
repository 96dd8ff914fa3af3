//! Pipeline error type shared by the builder, the stages, and the host.

use thiserror::Error;

/// Boxed error returned by contributor and handler implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while building or running a pipeline.
///
/// Configuration problems are reported by the chain builder before any
/// request is processed. Everything else is raised while a request walks
/// the chain and reaches the caller of [`Pipeline::run`] unchanged.
///
/// [`Pipeline::run`]: crate::middleware::Pipeline::run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfiguration(String),

    #[error("pipeline cancelled")]
    Cancelled,

    /// A contributor reported [`PipelineContinuation::Abort`].
    ///
    /// [`PipelineContinuation::Abort`]: crate::context::PipelineContinuation::Abort
    #[error("pipeline aborted by a contributor")]
    Aborted,

    #[error("contributor `{label}` failed: {source}")]
    Contributor {
        label: String,
        #[source]
        source: BoxError,
    },

    #[error("handler failed: {0}")]
    Handler(String),
}

impl PipelineError {
    /// Wraps an arbitrary error raised by the contributor labelled `label`.
    pub fn contributor(label: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Contributor {
            label: label.into(),
            source: source.into(),
        }
    }

    /// Returns `true` for errors detected while building the chain.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}
