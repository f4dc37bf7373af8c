use rand::seq::IndexedRandom;

use crate::domain::accounter::view::ViewToken;
use crate::domain::resource::resource_type::ResourceType;
use crate::domain::schedule::policy::SchedulerPolicy;
use crate::domain::system::SystemView;
use crate::error::Result;

/// A policy mainly useful for testing the scheduling plumbing: every
/// schedulable application is assigned one enabled working mode picked
/// uniformly at random, bound to a random binding-domain instance.
pub struct RandomPolicy {
    round: u64,
}

impl RandomPolicy {
    pub fn new() -> Self {
        Self { round: 0 }
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn schedule(&mut self, system: &SystemView) -> Result<ViewToken> {
        self.round += 1;
        let accounter = system.accounter();
        let view = accounter.get_view(&format!("random-round-{}", self.round))?;
        let mut rng = rand::rng();

        for priority in 0..=system.lowest_priority() {
            for app in system.schedulable_at_priority(priority) {
                let working_modes = app.enabled_working_modes();
                let Some(awm_handle) = working_modes.choose(&mut rng) else {
                    log::debug!("RandomPolicy: [{}] has no enabled working mode", app.uid());
                    continue;
                };

                let instances = system.tree().instances_of(ResourceType::Cpu);
                let binding = {
                    let mut wm = awm_handle.write().expect("working mode lock poisoned");
                    match instances.choose(&mut rng) {
                        Some(instance) => wm.bind_resources(system.tree(), ResourceType::Cpu, *instance),
                        None => wm.bind_as_is(system.tree()),
                    }
                };
                let Ok(binding_ref) = binding else {
                    continue;
                };

                let awm_id = awm_handle.read().expect("working mode lock poisoned").id();
                if let Err(e) = app.schedule_request(awm_id, binding_ref, accounter, view) {
                    log::debug!("RandomPolicy: [{}] awm{} rejected: {}", app.uid(), awm_id, e);
                }
            }
        }
        Ok(view)
    }
}
