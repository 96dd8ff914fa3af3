//! Middleware pipeline — contributors composed into an ordered chain of stages.
//!
//! Request processing is described declaratively as an ordered list of
//! [`ContributorDescriptor`]s. The chain builder turns that list into
//! [`MiddlewareFactory`]s, consulting an ordered [`OverrideRules`] table to
//! insert extra stages after selected contributors. The factories are then
//! folded right-to-left into linked [`MiddlewareStage`]s, and a [`Pipeline`]
//! drives the head stage once per request.
//!
//! ```text
//! descriptors ──build_chain──▶ factories ──compose──▶ head stage ──run──▶ context
//! ```
//!
//! ## Core types
//!
//! - [`Contributor`] — one unit of request-handling behavior, tagged with a kind.
//! - [`ContributorDescriptor`] — contributor + [`InvocationMode`] + label.
//! - [`OverrideRules`] — ordered predicate → factory table; first match wins.
//! - [`MiddlewareFactory`] — `next -> stage` composition unit.
//! - [`MiddlewareStage`] — invocable link owning its `next`.
//! - [`Pipeline`] — a composed chain, built once and run for every request.
//! - [`TraceFactory`] — built-in diagnostic interception stage.

use std::{future::Future, pin::Pin};

mod builder;
mod contributor;
mod factory;
mod runner;
mod stage;
mod trace;

pub use builder::{FactoryProducer, OverrideRule, OverrideRules, Predicate, build_chain, compose};
pub use contributor::{
    Contributor, ContributorDescriptor, ContributorId, DoNothingContributor, FnContributor,
    InvocationMode, contributor_fn,
};
pub use factory::{FnFactory, MiddlewareFactory, PreExecuteFactory, factory_fn};
pub use runner::{Pipeline, run};
pub use stage::{FnStage, MiddlewareStage, Terminal, stage_fn};
pub use trace::{TraceFactory, TraceRecord};

/// A boxed, `Send` future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
