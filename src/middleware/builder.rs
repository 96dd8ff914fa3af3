//! Chain builder: contributor descriptors in, middleware factories out.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::PipelineError;

use super::contributor::{ContributorDescriptor, ContributorId};
use super::factory::{MiddlewareFactory, PreExecuteFactory};
use super::stage::MiddlewareStage;

/// Predicate deciding whether an override applies to a descriptor.
pub type Predicate = Arc<dyn Fn(&ContributorDescriptor) -> bool + Send + Sync>;

/// Produces a fresh override factory each time its rule matches.
pub type FactoryProducer = Arc<dyn Fn() -> Arc<dyn MiddlewareFactory> + Send + Sync>;

/// One named entry of an [`OverrideRules`] table.
#[derive(Clone)]
pub struct OverrideRule {
    name: String,
    predicate: Predicate,
    produce: FactoryProducer,
}

impl OverrideRule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, descriptor: &ContributorDescriptor) -> bool {
        (self.predicate)(descriptor)
    }

    pub fn produce(&self) -> Arc<dyn MiddlewareFactory> {
        (self.produce)()
    }
}

impl fmt::Debug for OverrideRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// An ordered table of override rules. The first matching rule wins.
///
/// A matching rule does not replace the contributor's own stage: its factory
/// is inserted immediately after the contributor's pre-execute factory.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use pipewright::middleware::{
///     ContributorDescriptor, DoNothingContributor, InvocationMode, OverrideRules,
///     PreExecuteFactory, build_chain, factory_fn,
/// };
///
/// let calls = [ContributorDescriptor::new(
///     Arc::new(DoNothingContributor),
///     InvocationMode::SingleTap,
///     "doNothing",
/// )];
/// let rules = OverrideRules::new().for_kind(DoNothingContributor::KIND, || {
///     Arc::new(factory_fn("wrapper", |next| next))
/// });
///
/// let chain = build_chain(&calls, &rules).unwrap();
/// let names: Vec<_> = chain.iter().map(|f| f.name().to_owned()).collect();
/// assert_eq!(names, [PreExecuteFactory::NAME, "wrapper"]);
/// ```
#[derive(Clone, Default, Debug)]
pub struct OverrideRules {
    rules: Vec<OverrideRule>,
}

impl OverrideRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Rules are evaluated in the order they were added.
    #[must_use]
    pub fn rule<P, F>(mut self, name: impl Into<String>, predicate: P, produce: F) -> Self
    where
        P: Fn(&ContributorDescriptor) -> bool + Send + Sync + 'static,
        F: Fn() -> Arc<dyn MiddlewareFactory> + Send + Sync + 'static,
    {
        self.rules.push(OverrideRule {
            name: name.into(),
            predicate: Arc::new(predicate),
            produce: Arc::new(produce),
        });
        self
    }

    /// Appends a rule matching every descriptor whose contributor has `kind`.
    ///
    /// The rule is named after the kind.
    #[must_use]
    pub fn for_kind<F>(self, kind: &'static str, produce: F) -> Self
    where
        F: Fn() -> Arc<dyn MiddlewareFactory> + Send + Sync + 'static,
    {
        self.rule(kind, move |d: &ContributorDescriptor| d.kind() == kind, produce)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OverrideRule> {
        self.rules.iter()
    }

    /// Returns the first rule, in table order, whose predicate accepts `descriptor`.
    pub fn first_match(&self, descriptor: &ContributorDescriptor) -> Option<&OverrideRule> {
        self.rules.iter().find(|rule| rule.matches(descriptor))
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let mut seen = HashSet::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "conflicting override rules named `{}`",
                    rule.name
                )));
            }
        }
        Ok(())
    }
}

/// Converts an ordered list of contributor descriptors into an ordered list
/// of middleware factories.
///
/// Every descriptor yields a [`PreExecuteFactory`]. When an override rule
/// matches, the rule's factory is emitted immediately after it, so the output
/// is never shorter than the input and relative order is preserved.
///
/// # Errors
///
/// [`PipelineError::InvalidConfiguration`] when a descriptor has an empty
/// label or two override rules share a name. No partial chain is returned.
pub fn build_chain(
    descriptors: &[ContributorDescriptor],
    overrides: &OverrideRules,
) -> Result<Vec<Arc<dyn MiddlewareFactory>>, PipelineError> {
    overrides.validate()?;

    if let Some(index) = descriptors.iter().position(|d| d.label().trim().is_empty()) {
        return Err(PipelineError::InvalidConfiguration(format!(
            "contributor at position {index} (kind `{}`) has an empty label",
            descriptors[index].kind()
        )));
    }

    let mut factories: Vec<Arc<dyn MiddlewareFactory>> = Vec::with_capacity(descriptors.len());

    for (index, descriptor) in descriptors.iter().enumerate() {
        factories.push(Arc::new(PreExecuteFactory::new(
            ContributorId::new(index),
            descriptor.clone(),
        )));

        if let Some(rule) = overrides.first_match(descriptor) {
            let factory = rule.produce();
            debug!(
                contributor = descriptor.label(),
                rule = rule.name(),
                factory = factory.name(),
                "override inserted"
            );
            factories.push(factory);
        }
    }

    debug!(
        contributors = descriptors.len(),
        factories = factories.len(),
        "middleware chain built"
    );

    Ok(factories)
}

/// Folds factories right-to-left into a single head stage ending at `terminal`.
///
/// An empty factory list yields `terminal` itself.
pub fn compose(
    factories: &[Arc<dyn MiddlewareFactory>],
    terminal: Arc<dyn MiddlewareStage>,
) -> Arc<dyn MiddlewareStage> {
    factories
        .iter()
        .rev()
        .fold(terminal, |next, factory| factory.compose(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{DoNothingContributor, InvocationMode, TraceFactory, factory_fn};

    fn do_nothing(label: &str) -> ContributorDescriptor {
        ContributorDescriptor::new(
            Arc::new(DoNothingContributor),
            InvocationMode::SingleTap,
            label,
        )
    }

    fn names(chain: &[Arc<dyn MiddlewareFactory>]) -> Vec<String> {
        chain.iter().map(|f| f.name().to_owned()).collect()
    }

    fn wrapper() -> Arc<dyn MiddlewareFactory> {
        Arc::new(factory_fn("wrapper", |next| next))
    }

    #[test]
    fn empty_input_builds_empty_chain() {
        let chain = build_chain(&[], &OverrideRules::new()).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn one_pre_execute_per_descriptor_without_overrides() {
        let calls = [do_nothing("a"), do_nothing("b"), do_nothing("c")];
        let chain = build_chain(&calls, &OverrideRules::new()).unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain.iter().all(|f| f.name() == PreExecuteFactory::NAME));
    }

    #[test]
    fn intercepted_contributor_keeps_its_pre_execute_stage() {
        let calls = [do_nothing("doNothing")];
        let rules = OverrideRules::new().for_kind(DoNothingContributor::KIND, wrapper);
        let chain = build_chain(&calls, &rules).unwrap();
        assert_eq!(names(&chain), ["pre-execute", "wrapper"]);
    }

    #[test]
    fn override_lands_right_after_its_contributor() {
        let calls = [do_nothing("first"), do_nothing("second"), do_nothing("third")];
        let rules = OverrideRules::new().rule(
            "second-only",
            |d: &ContributorDescriptor| d.label() == "second",
            wrapper,
        );
        let chain = build_chain(&calls, &rules).unwrap();
        assert_eq!(
            names(&chain),
            ["pre-execute", "pre-execute", "wrapper", "pre-execute"]
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let calls = [do_nothing("doNothing")];
        let rules = OverrideRules::new()
            .rule("any", |_: &ContributorDescriptor| true, || {
                Arc::new(TraceFactory::new("any")) as Arc<dyn MiddlewareFactory>
            })
            .for_kind(DoNothingContributor::KIND, wrapper);
        let chain = build_chain(&calls, &rules).unwrap();
        assert_eq!(names(&chain), ["pre-execute", TraceFactory::NAME]);
    }

    #[test]
    fn duplicate_rule_names_are_rejected() {
        let rules = OverrideRules::new()
            .for_kind(DoNothingContributor::KIND, wrapper)
            .for_kind(DoNothingContributor::KIND, wrapper);
        let err = match build_chain(&[do_nothing("a")], &rules) {
            Err(e) => e,
            Ok(_) => panic!("expected a configuration error"),
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("do-nothing"));
    }

    #[test]
    fn empty_label_is_rejected() {
        let calls = [do_nothing("ok"), do_nothing("  ")];
        let err = match build_chain(&calls, &OverrideRules::new()) {
            Err(e) => e,
            Ok(_) => panic!("expected a configuration error"),
        };
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn each_match_gets_a_fresh_factory() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);
        let rules = OverrideRules::new().for_kind(DoNothingContributor::KIND, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            wrapper()
        });
        let chain = build_chain(&[do_nothing("a"), do_nothing("b")], &rules).unwrap();
        assert_eq!(chain.len(), 4);
        assert_eq!(produced.load(Ordering::SeqCst), 2);
    }
}
