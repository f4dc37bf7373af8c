use std::collections::HashMap;

use crate::domain::accounter::view::ViewToken;
use crate::domain::system::SystemView;
use crate::error::{Error, Result};

/// The scheduling policy plug-in contract.
///
/// One policy is active per run. `schedule` evaluates the system and
/// returns the token of a freshly booked candidate view; the live view is
/// never touched by a policy. An application for which no feasible entity
/// exists is not an error: it simply is not dispatched.
pub trait SchedulerPolicy: Send {
    fn name(&self) -> &'static str;

    fn schedule(&mut self, system: &SystemView) -> Result<ViewToken>;
}

type PolicyFactory = Box<dyn Fn(&SystemView) -> Box<dyn SchedulerPolicy> + Send>;

/// Policies are discovered by name; the registry maps the configured name
/// to a creator.
pub struct PolicyRegistry {
    factories: HashMap<String, PolicyFactory>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// A registry pre-loaded with the built-in policies.
    pub fn with_builtins() -> Self {
        use crate::domain::schedule::contrib::ContribConfig;
        use crate::domain::schedule::metric_policy::MetricPolicy;
        use crate::domain::schedule::random_policy::RandomPolicy;

        let mut registry = Self::new();
        registry.register("metric", |system| Box::new(MetricPolicy::new(system.accounter().clone(), ContribConfig::default())));
        registry.register("random", |_| Box::new(RandomPolicy::new()));
        registry
    }

    pub fn register(&mut self, name: &str, factory: impl Fn(&SystemView) -> Box<dyn SchedulerPolicy> + Send + 'static) {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn create(&self, name: &str, system: &SystemView) -> Result<Box<dyn SchedulerPolicy>> {
        let factory = self.factories.get(name).ok_or_else(|| Error::NotFound(format!("no scheduling policy named '{}'", name)))?;
        Ok(factory(system))
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
