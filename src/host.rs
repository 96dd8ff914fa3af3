//! Host — assembles the default contributor chain and runs it per request.
//!
//! The default chain, in order:
//!
//! 1. [`ResourceSelectionContributor`] — exact-path resource lookup (404 otherwise)
//! 2. [`ConditionalRequestContributor`] — `304 Not Modified` short-circuit
//! 3. any contributors added with [`HostBuilder::contributor`]
//!    (followed by a [`HandlerTracePoint`] when [`HostConfig::trace_handlers`] is set)
//! 4. [`HandlerInvocationContributor`] — runs the resource handler
//! 5. [`CacheHeadersContributor`] — `cache-control`, `last-modified`, `etag`
//!
//! The chain is built exactly once in [`HostBuilder::build`] and shared by
//! every request the host handles.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheHeadersContributor, ConditionalRequestContributor};
use crate::clock::{Clock, SystemClock};
use crate::context::{Cancellation, CommunicationContext, PipelineContinuation};
use crate::error::PipelineError;
use crate::http::{Request, Response};
use crate::middleware::{
    BoxFuture, Contributor, ContributorDescriptor, OverrideRules, Pipeline, TraceFactory,
};
use crate::resource::{
    HandlerInvocationContributor, Resource, ResourceRegistry, ResourceSelectionContributor,
};

/// Tunables read at startup.
///
/// # Examples
///
/// ```
/// use pipewright::host::HostConfig;
///
/// let config = HostConfig::from_json(r#"{ "trace_handlers": true }"#).unwrap();
/// assert!(config.trace_handlers);
/// assert_eq!(config.max_request_size, HostConfig::default().max_request_size);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Largest request (head + body) the TCP transport buffers, in bytes.
    pub max_request_size: usize,
    /// Time handler invocation, and the stages after it, with a [`TraceFactory`] stage.
    pub trace_handlers: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_request_size: 8 * 1024 * 1024,
            trace_handlers: false,
        }
    }
}

impl HostConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// No-op contributor placed right before handler invocation so that a
/// [`TraceFactory`] attached to it times the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerTracePoint;

impl HandlerTracePoint {
    pub const KIND: &'static str = "host.trace-point";
}

impl Contributor for HandlerTracePoint {
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

/// Builder for [`Host`].
pub struct HostBuilder {
    registry: ResourceRegistry,
    clock: Arc<dyn Clock>,
    overrides: OverrideRules,
    extra: Vec<ContributorDescriptor>,
    config: HostConfig,
    error: Option<PipelineError>,
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self {
            registry: ResourceRegistry::new(),
            clock: Arc::new(SystemClock),
            overrides: OverrideRules::new(),
            extra: Vec::new(),
            config: HostConfig::default(),
            error: None,
        }
    }
}

impl HostBuilder {
    /// Registers a resource. A URI clash is reported by [`build`](Self::build).
    #[must_use]
    pub fn resource(mut self, resource: Resource) -> Self {
        if let Err(e) = self.registry.register(resource) {
            self.error.get_or_insert(e);
        }
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn overrides(mut self, overrides: OverrideRules) -> Self {
        self.overrides = overrides;
        self
    }

    /// Adds a contributor that runs after conditional caching and before the handler.
    #[must_use]
    pub fn contributor(mut self, descriptor: ContributorDescriptor) -> Self {
        self.extra.push(descriptor);
        self
    }

    #[must_use]
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the middleware chain.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidConfiguration`] for duplicate resource URIs,
    /// empty contributor labels, or conflicting override rules.
    pub fn build(self) -> Result<Host, PipelineError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let registry = Arc::new(self.registry);
        let mut descriptors = vec![
            ContributorDescriptor::single_tap(Arc::new(ResourceSelectionContributor::new(
                Arc::clone(&registry),
            ))),
            ContributorDescriptor::single_tap(Arc::new(ConditionalRequestContributor)),
        ];
        descriptors.extend(self.extra);

        let mut overrides = self.overrides;
        if self.config.trace_handlers {
            descriptors.push(ContributorDescriptor::single_tap(Arc::new(HandlerTracePoint)));
            overrides = overrides.for_kind(HandlerTracePoint::KIND, || {
                Arc::new(TraceFactory::new("handler"))
            });
        }

        descriptors.push(ContributorDescriptor::single_tap(Arc::new(
            HandlerInvocationContributor,
        )));
        descriptors.push(ContributorDescriptor::single_tap(Arc::new(
            CacheHeadersContributor,
        )));

        let pipeline = Pipeline::build(&descriptors, &overrides)?;
        info!(
            resources = registry.len(),
            stages = pipeline.factory_names().len(),
            "host ready"
        );

        Ok(Host {
            pipeline,
            clock: self.clock,
            config: self.config,
        })
    }
}

/// A built pipeline plus the per-request services it needs.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pipewright::cache::CacheControl;
/// use pipewright::host::Host;
/// use pipewright::http::{Request, StatusCode};
/// use pipewright::resource::Resource;
///
/// # #[tokio::main]
/// # async fn main() {
/// let host = Host::builder()
///     .resource(
///         Resource::new("/", |_ctx| Box::pin(async { Ok(()) }))
///             .cache_control(CacheControl::private().max_age(Duration::from_secs(3600))),
///     )
///     .build()
///     .unwrap();
///
/// let response = host.handle(Request::get("/")).await.unwrap();
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.headers().get("cache-control"), Some("private, max-age=3600"));
/// # }
/// ```
pub struct Host {
    pipeline: Pipeline,
    clock: Arc<dyn Clock>,
    config: HostConfig,
}

impl Host {
    pub fn builder() -> HostBuilder {
        HostBuilder::default()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Runs `request` through the pipeline and returns the response.
    pub async fn handle(&self, request: Request) -> Result<Response, PipelineError> {
        self.handle_with(request, Cancellation::new()).await
    }

    /// Like [`handle`](Self::handle), with a caller-controlled cancellation flag.
    pub async fn handle_with(
        &self,
        request: Request,
        cancellation: Cancellation,
    ) -> Result<Response, PipelineError> {
        let mut ctx = CommunicationContext::new(request)
            .with_now(self.clock.now())
            .with_cancellation(cancellation);

        self.pipeline.run(&mut ctx).await?;

        debug!(
            path = ctx.request().path(),
            status = ctx.response().status().as_u16(),
            "request handled"
        );
        Ok(ctx.into_response())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::cache::{CacheControl, EntityTag};
    use crate::clock::FixedClock;
    use crate::context::PipelineContinuation;
    use crate::http::StatusCode;
    use crate::middleware::{
        DoNothingContributor, InvocationMode, PreExecuteFactory, TraceRecord, contributor_fn,
        factory_fn,
    };

    fn now() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_704_067_200)
    }

    fn test_resource(hits: &Arc<AtomicUsize>) -> Resource {
        let hits = Arc::clone(hits);
        Resource::new("/TestResource", move |ctx| {
            let hits = Arc::clone(&hits);
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                ctx.response_mut().set_body(b"test resource".to_vec());
                Ok(())
            })
        })
        .last_modified(|ctx| ctx.now() - Duration::from_secs(60))
    }

    fn caching_host(hits: &Arc<AtomicUsize>) -> Host {
        Host::builder()
            .clock(FixedClock::new(now()))
            .resource(test_resource(hits))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn unparseable_if_modified_since_is_ignored() {
        let hits = Arc::new(AtomicUsize::new(0));
        let host = caching_host(&hits);

        let request = Request::get("/TestResource").with_header("if-modified-since", "not-a-date");
        let response = host.handle(request).await.unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.body_bytes(), b"test resource");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_if_modified_since_short_circuits_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let host = caching_host(&hits);

        let request = Request::get("/TestResource")
            .with_header("if-modified-since", httpdate::fmt_http_date(now()));
        let response = host.handle(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NotModified);
        assert_eq!(
            response.headers().get("last-modified"),
            Some(httpdate::fmt_http_date(now() - Duration::from_secs(60)).as_str())
        );
        assert!(response.body_bytes().is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_if_modified_since_gets_full_response() {
        let hits = Arc::new(AtomicUsize::new(0));
        let host = caching_host(&hits);

        let earlier = now() - Duration::from_secs(3600);
        let request = Request::get("/TestResource")
            .with_header("if-modified-since", httpdate::fmt_http_date(earlier));
        let response = host.handle(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn browser_policy_with_max_age() {
        let host = Host::builder()
            .resource(
                Resource::new("/", |ctx| {
                    Box::pin(async move {
                        ctx.response_mut().set_body(b"{}".to_vec());
                        Ok(())
                    })
                })
                .named("CacheBrowser")
                .cache_control(CacheControl::private().max_age(Duration::from_secs(3600))),
            )
            .build()
            .unwrap();

        let response = host.handle(Request::get("/")).await.unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers().get("cache-control"),
            Some("private, max-age=3600")
        );
    }

    #[tokio::test]
    async fn matching_etag_returns_not_modified_with_policy() {
        let host = Host::builder()
            .resource(
                Resource::new("/doc", |_ctx| Box::pin(async { Ok(()) }))
                    .etag(|_| EntityTag::strong("rev-7"))
                    .cache_control(CacheControl::public().max_age(Duration::from_secs(60))),
            )
            .build()
            .unwrap();

        let response = host
            .handle(Request::get("/doc").with_header("If-None-Match", "\"rev-7\""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NotModified);
        assert_eq!(response.headers().get("etag"), Some("\"rev-7\""));
        assert_eq!(
            response.headers().get("cache-control"),
            Some("public, max-age=60")
        );
    }

    #[tokio::test]
    async fn unknown_path_is_404_without_cache_headers() {
        let host = Host::builder().build().unwrap();
        let response = host.handle(Request::get("/nowhere")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NotFound);
        assert!(!response.headers().contains("cache-control"));
    }

    #[tokio::test]
    async fn handler_errors_propagate_to_caller() {
        let host = Host::builder()
            .resource(Resource::new("/fail", |_ctx| {
                Box::pin(async { Err(PipelineError::Handler("database unavailable".into())) })
            }))
            .build()
            .unwrap();

        let err = host.handle(Request::get("/fail")).await.unwrap_err();
        assert_eq!(err.to_string(), "handler failed: database unavailable");
    }

    #[tokio::test]
    async fn cancelled_request_never_reaches_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let host = caching_host(&hits);
        let cancellation = Cancellation::new();
        cancellation.cancel();

        let err = host
            .handle_with(Request::get("/TestResource"), cancellation)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn extra_contributors_run_between_caching_and_handler() {
        let seen = Arc::new(Mutex::new(None));
        let observed = Arc::clone(&seen);
        let stamp = contributor_fn("stamp", move |ctx| {
            let observed = Arc::clone(&observed);
            Box::pin(async move {
                *observed.lock().unwrap() = Some(ctx.resource().map(|r| r.name().to_owned()));
                ctx.response_mut().headers_mut().set("x-stamp", "1");
                Ok(PipelineContinuation::Continue)
            })
        });

        let hits = Arc::new(AtomicUsize::new(0));
        let host = Host::builder()
            .clock(FixedClock::new(now()))
            .resource(test_resource(&hits))
            .contributor(ContributorDescriptor::new(
                Arc::new(stamp),
                InvocationMode::SingleTap,
                "stamp",
            ))
            .build()
            .unwrap();

        let response = host.handle(Request::get("/TestResource")).await.unwrap();

        assert_eq!(response.headers().get("x-stamp"), Some("1"));
        assert_eq!(
            *seen.lock().unwrap(),
            Some(Some("/TestResource".to_owned()))
        );
        assert_eq!(host.pipeline().factory_names().len(), 5);
    }

    #[tokio::test]
    async fn overrides_and_tracing_insert_stages() {
        let host = Host::builder()
            .contributor(ContributorDescriptor::single_tap(Arc::new(DoNothingContributor)))
            .overrides(OverrideRules::new().for_kind(DoNothingContributor::KIND, || {
                Arc::new(factory_fn("wrapper", |next| next))
            }))
            .config(HostConfig {
                trace_handlers: true,
                ..HostConfig::default()
            })
            .build()
            .unwrap();

        let names = host.pipeline().factory_names();
        assert_eq!(
            names,
            [
                PreExecuteFactory::NAME,
                PreExecuteFactory::NAME,
                PreExecuteFactory::NAME,
                "wrapper",
                PreExecuteFactory::NAME,
                TraceFactory::NAME,
                PreExecuteFactory::NAME,
                PreExecuteFactory::NAME,
            ]
        );

        let response = host.handle(Request::get("/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn handler_tracing_covers_handler_time_and_failures() {
        let host = Host::builder()
            .resource(Resource::new("/slow", |ctx| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    ctx.response_mut().set_body(b"done".to_vec());
                    Ok(())
                })
            }))
            .resource(Resource::new("/fail", |_ctx| {
                Box::pin(async { Err(PipelineError::Handler("upstream timeout".into())) })
            }))
            .config(HostConfig {
                trace_handlers: true,
                ..HostConfig::default()
            })
            .build()
            .unwrap();

        let mut ctx = CommunicationContext::new(Request::get("/slow"));
        host.pipeline().run(&mut ctx).await.unwrap();
        let record = ctx.extensions().get::<TraceRecord>().unwrap();
        assert_eq!(record.label, "handler");
        assert!(!record.failed);
        assert!(record.elapsed >= Duration::from_millis(50), "{record:?}");

        let mut ctx = CommunicationContext::new(Request::get("/fail"));
        let err = host.pipeline().run(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "handler failed: upstream timeout");
        assert!(ctx.extensions().get::<TraceRecord>().unwrap().failed);
    }

    #[test]
    fn duplicate_resources_fail_the_build() {
        let hits = Arc::new(AtomicUsize::new(0));
        let result = Host::builder()
            .resource(test_resource(&hits))
            .resource(test_resource(&hits))
            .build();
        assert!(matches!(result, Err(PipelineError::InvalidConfiguration(_))));
    }

    #[test]
    fn conflicting_trace_override_fails_the_build() {
        let result = Host::builder()
            .overrides(OverrideRules::new().for_kind(HandlerTracePoint::KIND, || {
                Arc::new(TraceFactory::new("mine"))
            }))
            .config(HostConfig {
                trace_handlers: true,
                ..HostConfig::default()
            })
            .build();
        assert!(matches!(result, Err(PipelineError::InvalidConfiguration(_))));
    }
}
