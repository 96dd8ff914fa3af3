//! Per-request communication context threaded through every pipeline stage.
//!
//! One [`CommunicationContext`] exists per in-flight request. Stages borrow it
//! mutably one after another, so it needs no locking; it is never shared
//! between concurrent requests.

mod cancellation;

pub use cancellation::Cancellation;

use std::{
    any::{Any, TypeId},
    collections::{HashMap, HashSet},
    sync::Arc,
    time::SystemTime,
};

use crate::http::{Request, Response};
use crate::middleware::ContributorId;
use crate::resource::Resource;

/// Type-erased request extensions map — lets contributors hand state to each
/// other without knowing each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Outcome reported by a contributor, steering the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineContinuation {
    /// Keep executing contributors.
    #[default]
    Continue,
    /// The response is ready; skip the remaining contributors.
    RenderNow,
    /// The response has been fully written. Skips the remaining
    /// contributors exactly like `RenderNow`.
    Finished,
    /// Processing was abandoned. The remaining contributors are skipped and
    /// [`Pipeline::run`](crate::middleware::Pipeline::run) fails with
    /// [`PipelineError::Aborted`](crate::error::PipelineError::Aborted).
    Abort,
}

/// Bookkeeping the pre-execute stages keep on the context.
#[derive(Debug, Default)]
pub struct PipelineState {
    continuation: PipelineContinuation,
    tapped: HashSet<ContributorId>,
}

impl PipelineState {
    pub fn continuation(&self) -> PipelineContinuation {
        self.continuation
    }

    pub fn set_continuation(&mut self, continuation: PipelineContinuation) {
        self.continuation = continuation;
    }

    /// `true` while no contributor has asked to stop.
    pub fn should_continue(&self) -> bool {
        self.continuation == PipelineContinuation::Continue
    }

    /// Records that a single-tap contributor ran. Returns `false` if it already had.
    pub fn record_tap(&mut self, id: ContributorId) -> bool {
        self.tapped.insert(id)
    }
}

/// Mutable state for one request: the request, the response being built,
/// pipeline bookkeeping, and ambient data.
///
/// # Examples
///
/// ```
/// use pipewright::context::CommunicationContext;
/// use pipewright::http::{Request, StatusCode};
///
/// let mut ctx = CommunicationContext::new(Request::get("/"));
/// ctx.response_mut().set_status(StatusCode::NotFound);
/// assert_eq!(ctx.into_response().status(), StatusCode::NotFound);
/// ```
pub struct CommunicationContext {
    request: Request,
    response: Response,
    state: PipelineState,
    extensions: Extensions,
    cancellation: Cancellation,
    now: SystemTime,
    resource: Option<Arc<Resource>>,
}

impl CommunicationContext {
    /// Creates a context with a `200 OK` response, the system time and a fresh cancellation flag.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::default(),
            state: PipelineState::default(),
            extensions: Extensions::new(),
            cancellation: Cancellation::new(),
            now: SystemTime::now(),
            resource: None,
        }
    }

    #[must_use]
    pub fn with_now(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PipelineState {
        &mut self.state
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The instant this request is processed at.
    pub fn now(&self) -> SystemTime {
        self.now
    }

    /// The resource selected for this request, if any.
    pub fn resource(&self) -> Option<&Arc<Resource>> {
        self.resource.as_ref()
    }

    pub fn select_resource(&mut self, resource: Arc<Resource>) {
        self.resource = Some(resource);
    }

    /// Consumes the context, yielding the response built by the pipeline.
    pub fn into_response(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Negotiated(&'static str);

    #[test]
    fn extensions_round_trip_by_type() {
        let mut ext = Extensions::new();
        assert!(ext.insert(Negotiated("application/json")).is_none());
        assert_eq!(ext.get::<Negotiated>(), Some(&Negotiated("application/json")));

        let previous = ext.insert(Negotiated("text/html"));
        assert_eq!(previous, Some(Negotiated("application/json")));
        assert_eq!(ext.len(), 1);

        ext.get_mut::<Negotiated>().unwrap().0 = "text/plain";
        assert_eq!(ext.remove::<Negotiated>(), Some(Negotiated("text/plain")));
        assert!(ext.is_empty());
    }

    #[test]
    fn state_tracks_taps_once() {
        let mut state = PipelineState::default();
        let id = ContributorId::new(3);
        assert!(state.record_tap(id));
        assert!(!state.record_tap(id));
        assert!(state.record_tap(ContributorId::new(4)));
    }

    #[test]
    fn state_starts_in_continue() {
        let mut state = PipelineState::default();
        assert!(state.should_continue());
        state.set_continuation(PipelineContinuation::RenderNow);
        assert!(!state.should_continue());
    }

    #[test]
    fn context_shares_external_cancellation() {
        let handle = Cancellation::new();
        let ctx = CommunicationContext::new(Request::get("/")).with_cancellation(handle.clone());
        assert!(!ctx.is_cancelled());
        handle.cancel();
        assert!(ctx.is_cancelled());
    }
}
