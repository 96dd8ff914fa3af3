//! Resources — what a request is addressed to, and how to answer it.
//!
//! A [`Resource`] bundles a handler with the caching metadata the caching
//! contributors need (modification time, entity tag, `Cache-Control` policy).
//! The [`ResourceRegistry`] maps request paths to resources by exact match;
//! trailing slashes are normalized so `/orders/` and `/orders` are the same.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use crate::cache::{CacheControl, EntityTag, Validators};
use crate::context::{CommunicationContext, PipelineContinuation};
use crate::error::PipelineError;
use crate::http::StatusCode;
use crate::middleware::{BoxFuture, Contributor};

/// Async resource handler writing into the shared response.
pub type ResourceHandler = Arc<
    dyn for<'a> Fn(&'a mut CommunicationContext) -> BoxFuture<'a, Result<(), PipelineError>>
        + Send
        + Sync,
>;

type LastModifiedFn = Arc<dyn Fn(&CommunicationContext) -> SystemTime + Send + Sync>;
type EntityTagFn = Arc<dyn Fn(&CommunicationContext) -> EntityTag + Send + Sync>;

/// A resource reachable at one URI.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pipewright::cache::CacheControl;
/// use pipewright::resource::Resource;
///
/// let resource = Resource::new("/", |ctx| {
///     Box::pin(async move {
///         ctx.response_mut().set_body(b"{}".to_vec());
///         Ok(())
///     })
/// })
/// .named("CacheBrowser")
/// .cache_control(CacheControl::private().max_age(Duration::from_secs(3600)));
///
/// assert_eq!(resource.name(), "CacheBrowser");
/// ```
pub struct Resource {
    uri: String,
    name: String,
    handler: ResourceHandler,
    last_modified: Option<LastModifiedFn>,
    etag: Option<EntityTagFn>,
    cache_policy: Option<CacheControl>,
}

impl Resource {
    pub fn new<F>(uri: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut CommunicationContext) -> BoxFuture<'a, Result<(), PipelineError>>
            + Send
            + Sync
            + 'static,
    {
        let uri = normalize(&uri.into()).to_owned();
        Self {
            name: uri.clone(),
            uri,
            handler: Arc::new(handler),
            last_modified: None,
            etag: None,
            cache_policy: None,
        }
    }

    /// Sets a diagnostic name. Defaults to the URI.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Computes the modification time for each request.
    #[must_use]
    pub fn last_modified<F>(mut self, f: F) -> Self
    where
        F: Fn(&CommunicationContext) -> SystemTime + Send + Sync + 'static,
    {
        self.last_modified = Some(Arc::new(f));
        self
    }

    /// Computes the entity tag for each request.
    #[must_use]
    pub fn etag<F>(mut self, f: F) -> Self
    where
        F: Fn(&CommunicationContext) -> EntityTag + Send + Sync + 'static,
    {
        self.etag = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn cache_control(mut self, policy: CacheControl) -> Self {
        self.cache_policy = Some(policy);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_policy(&self) -> Option<&CacheControl> {
        self.cache_policy.as_ref()
    }

    pub fn handler(&self) -> &ResourceHandler {
        &self.handler
    }

    /// Evaluates the validator callbacks against the current request.
    pub fn validators(&self, ctx: &CommunicationContext) -> Validators {
        Validators {
            last_modified: self.last_modified.as_ref().map(|f| f(ctx)),
            etag: self.etag.as_ref().map(|f| f(ctx)),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("uri", &self.uri)
            .field("name", &self.name)
            .field("cache_policy", &self.cache_policy)
            .finish_non_exhaustive()
    }
}

/// Exact-path lookup table of resources.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, Arc<Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidConfiguration`] if another resource already
    /// answers at the same URI.
    pub fn register(&mut self, resource: Resource) -> Result<(), PipelineError> {
        if let Some(existing) = self.resources.get(resource.uri()) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "resources `{}` and `{}` both registered at `{}`",
                existing.name(),
                resource.name(),
                resource.uri()
            )));
        }
        self.resources
            .insert(resource.uri().to_owned(), Arc::new(resource));
        Ok(())
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<Resource>> {
        self.resources.get(normalize(path)).cloned()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Selects the resource addressed by the request path, or answers `404`.
#[derive(Debug, Clone)]
pub struct ResourceSelectionContributor {
    registry: Arc<ResourceRegistry>,
}

impl ResourceSelectionContributor {
    pub const KIND: &'static str = "resource.select";

    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }
}

impl Contributor for ResourceSelectionContributor {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<PipelineContinuation, PipelineError>> {
        Box::pin(async move {
            match self.registry.lookup(ctx.request().path()) {
                Some(resource) => {
                    debug!(resource = resource.name(), "resource selected");
                    ctx.select_resource(resource);
                    Ok(PipelineContinuation::Continue)
                }
                None => {
                    debug!(path = ctx.request().path(), "no resource registered");
                    ctx.response_mut().set_status(StatusCode::NotFound);
                    Ok(PipelineContinuation::RenderNow)
                }
            }
        })
    }
}

/// Runs the selected resource's handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerInvocationContributor;

impl HandlerInvocationContributor {
    pub const KIND: &'static str = "resource.handler";
}

impl Contributor for HandlerInvocationContributor {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut CommunicationContext,
    ) -> BoxFuture<'a, Result<PipelineContinuation, PipelineError>> {
        Box::pin(async move {
            if let Some(resource) = ctx.resource().cloned() {
                (resource.handler())(ctx).await?;
            }
            Ok(PipelineContinuation::Continue)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;

    fn ok_resource(uri: &str) -> Resource {
        Resource::new(uri, |_ctx| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn lookup_normalizes_trailing_slash() {
        let mut registry = ResourceRegistry::new();
        registry.register(ok_resource("/orders/")).unwrap();
        assert!(registry.lookup("/orders").is_some());
        assert!(registry.lookup("/orders/").is_some());
        assert!(registry.lookup("/order").is_none());
    }

    #[test]
    fn root_is_its_own_path() {
        let mut registry = ResourceRegistry::new();
        registry.register(ok_resource("/")).unwrap();
        assert_eq!(registry.lookup("/").map(|r| r.uri().to_owned()), Some("/".to_owned()));
    }

    #[test]
    fn duplicate_uri_is_a_configuration_error() {
        let mut registry = ResourceRegistry::new();
        registry.register(ok_resource("/a").named("first")).unwrap();
        let err = registry.register(ok_resource("/a/").named("second")).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("first"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn selection_answers_404_for_unknown_paths() {
        let contributor = ResourceSelectionContributor::new(Arc::new(ResourceRegistry::new()));
        let mut ctx = CommunicationContext::new(Request::get("/missing"));
        let next = contributor.invoke(&mut ctx).await.unwrap();
        assert_eq!(next, PipelineContinuation::RenderNow);
        assert_eq!(ctx.response().status(), StatusCode::NotFound);
        assert!(ctx.resource().is_none());
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let failing = Resource::new("/boom", |_ctx| {
            Box::pin(async { Err(PipelineError::Handler("boom".into())) })
        });
        let mut ctx = CommunicationContext::new(Request::get("/boom"));
        ctx.select_resource(Arc::new(failing));

        let err = HandlerInvocationContributor.invoke(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Handler(msg) if msg == "boom"));
    }

    #[test]
    fn validators_are_computed_per_request() {
        let resource = ok_resource("/v")
            .etag(|ctx| EntityTag::strong(ctx.request().path().trim_start_matches('/')))
            .last_modified(|ctx| ctx.now());
        let ctx = CommunicationContext::new(Request::get("/v")).with_now(SystemTime::UNIX_EPOCH);
        let validators = resource.validators(&ctx);
        assert_eq!(validators.etag, Some(EntityTag::strong("v")));
        assert_eq!(validators.last_modified, Some(SystemTime::UNIX_EPOCH));
    }
}
