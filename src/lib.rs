//! # pipewright
//!
//! A contributor-based HTTP request pipeline with conditional caching.
//!
//! Request processing is assembled from *contributors*: small async steps
//! that read and write a shared [`context::CommunicationContext`]. A chain
//! builder turns the ordered contributor list into middleware factories,
//! optionally inserting extra stages through an override table, and folds
//! them into one executable [`middleware::Pipeline`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use pipewright::cache::CacheControl;
//! use pipewright::host::Host;
//! use pipewright::resource::Resource;
//! use pipewright::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = Host::builder()
//!         .resource(
//!             Resource::new("/", |ctx| {
//!                 Box::pin(async move {
//!                     ctx.response_mut().set_body(b"Hello, World!".to_vec());
//!                     Ok(())
//!                 })
//!             })
//!             .cache_control(CacheControl::private().max_age(Duration::from_secs(3600))),
//!         )
//!         .build()?;
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(Arc::new(host)).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod context;
pub mod error;
pub mod host;
pub mod http;
pub mod middleware;
pub mod resource;
pub mod server;

pub use context::{CommunicationContext, PipelineContinuation};
pub use error::PipelineError;
pub use host::{Host, HostConfig};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::Pipeline;
pub use resource::Resource;
pub use server::{Server, ServerError};
