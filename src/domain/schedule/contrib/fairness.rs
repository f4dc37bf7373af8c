use std::collections::HashMap;

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::resource::resource_type::ResourceType;
use crate::domain::schedule::contrib::{ContribConfig, PriorityInit, SchedContrib, exp_penalty};
use crate::domain::schedule::entity::EvalEntity;
use crate::error::Result;

/// Fairness: exponential penalty as a candidate's request deviates from
/// the per-priority fair partition of its resource type.
///
/// Initialization computes, for every resource type, the availability in
/// the evaluation view divided by the number of applications competing at
/// the current priority level.
#[derive(Debug)]
pub struct FairnessContrib {
    accounter: ResourceAccounter,
    expbase: f32,
    penalties: HashMap<ResourceType, f32>,
    fair_partitions: HashMap<ResourceType, f32>,
}

impl FairnessContrib {
    pub fn new(accounter: ResourceAccounter, config: &ContribConfig) -> Self {
        Self { accounter, expbase: config.expbase, penalties: config.penalties.clone(), fair_partitions: HashMap::new() }
    }

    pub fn fair_partition(&self, r_type: ResourceType) -> Option<f32> {
        self.fair_partitions.get(&r_type).copied()
    }
}

impl SchedContrib for FairnessContrib {
    fn name(&self) -> &'static str {
        "fairness"
    }

    fn binding_independent(&self) -> bool {
        true
    }

    fn init_priority(&mut self, init: &PriorityInit) -> Result<()> {
        self.fair_partitions.clear();
        if init.app_count == 0 {
            return Ok(());
        }
        let mut available: HashMap<ResourceType, u64> = HashMap::new();
        for (path, key) in self.accounter.tree().all() {
            let Some(r_type) = path.target_type() else {
                continue;
            };
            if let Some(handle) = self.accounter.tree().get(key) {
                *available.entry(r_type).or_insert(0) += handle.read().expect("resource lock poisoned").available(init.view);
            }
        }
        for (r_type, amount) in available {
            self.fair_partitions.insert(r_type, amount as f32 / init.app_count as f32);
        }
        log::debug!("Fairness: prio {} partitions over {} apps: {:?}", init.priority, init.app_count, self.fair_partitions);
        Ok(())
    }

    fn compute(&self, entity: &EvalEntity) -> Result<f32> {
        let awm = entity.awm.read().expect("working mode lock poisoned");
        let mut index: f32 = 1.0;
        for (path, amount) in awm.requests() {
            let Some(r_type) = path.target_type() else {
                continue;
            };
            let Some(fair) = self.fair_partitions.get(&r_type).copied() else {
                continue;
            };
            if fair <= 0.0 {
                index = 0.0;
                continue;
            }
            let distance = (*amount as f32 - fair).abs() / fair;
            let penalty = self.penalties.get(&r_type).copied().unwrap_or(5.0);
            index = index.min(exp_penalty(self.expbase, penalty, distance));
        }
        Ok(index)
    }
}
