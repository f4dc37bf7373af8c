use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::resource::resource_type::ResourceType;
use crate::domain::schedule::contrib::congestion::CongestionContrib;
use crate::domain::schedule::contrib::fairness::FairnessContrib;
use crate::domain::schedule::contrib::migration::MigrationContrib;
use crate::domain::schedule::contrib::reconfig::ReconfigContrib;
use crate::domain::schedule::contrib::value::ValueContrib;
use crate::domain::schedule::contrib::{ContribConfig, ContribType, DEFAULT_WEIGHTS, PriorityInit, SchedContrib};
use crate::domain::schedule::entity::EvalEntity;
use crate::error::Result;

struct Registered {
    c_type: ContribType,
    weight: f32,
    contrib: Box<dyn SchedContrib>,
}

/// Registry and aggregator of the scoring contributions of one policy.
///
/// Weights are normalized at load time so they sum to one; the aggregate
/// index of an entity is the weighted sum of the individual indices.
pub struct ContribManager {
    contribs: Vec<Registered>,
}

impl ContribManager {
    pub fn new(accounter: ResourceAccounter, config: ContribConfig) -> Self {
        let config = config.sanitize();
        let mut raw: Vec<(ContribType, f32)> = ContribType::ALL.iter().map(|t| (*t, config.weights.get(t).copied().unwrap_or(0.0))).collect();

        let sum: f32 = raw.iter().map(|(_, w)| w).sum();
        if sum <= 0.0 {
            log::warn!("ContribManager: all-zero weights, falling back to defaults");
            for (t, w) in raw.iter_mut() {
                *w = DEFAULT_WEIGHTS.get(t).copied().unwrap_or(0.0);
            }
        }
        let sum: f32 = raw.iter().map(|(_, w)| w).sum();

        let contribs = raw
            .into_iter()
            .map(|(c_type, w)| {
                let contrib: Box<dyn SchedContrib> = match c_type {
                    ContribType::Value => Box::new(ValueContrib),
                    ContribType::Reconfig => Box::new(ReconfigContrib::new(config.penalty(ResourceType::Cpu))),
                    ContribType::Fairness => Box::new(FairnessContrib::new(accounter.clone(), &config)),
                    ContribType::Migration => Box::new(MigrationContrib::new(config.penalty(ResourceType::Cpu))),
                    ContribType::Congestion => Box::new(CongestionContrib::new(accounter.clone(), config.clone())),
                };
                Registered { c_type, weight: w / sum, contrib }
            })
            .collect();

        let manager = Self { contribs };
        log::debug!("ContribManager: weights {:?}", manager.weights());
        manager
    }

    /// The normalized weight of each contribution.
    pub fn weights(&self) -> Vec<(ContribType, f32)> {
        self.contribs.iter().map(|r| (r.c_type, r.weight)).collect()
    }

    /// Called once per priority level before evaluation starts.
    pub fn init_priority(&mut self, init: &PriorityInit) -> Result<()> {
        for r in self.contribs.iter_mut() {
            r.contrib.init_priority(init)?;
        }
        Ok(())
    }

    /// The weighted index of one contribution.
    pub fn index_of(&self, c_type: ContribType, entity: &EvalEntity) -> Result<f32> {
        for r in &self.contribs {
            if r.c_type == c_type {
                return Ok(r.weight * r.contrib.compute(entity)?);
            }
        }
        Err(crate::error::Error::NotFound(format!("contribution '{}' not registered", c_type.as_str())))
    }

    /// The raw (unweighted) index of one contribution.
    pub fn raw_index_of(&self, c_type: ContribType, entity: &EvalEntity) -> Result<f32> {
        for r in &self.contribs {
            if r.c_type == c_type {
                return r.contrib.compute(entity);
            }
        }
        Err(crate::error::Error::NotFound(format!("contribution '{}' not registered", c_type.as_str())))
    }

    /// Weighted sum of the binding-independent contributions.
    pub fn binding_independent_index(&self, entity: &EvalEntity) -> Result<f32> {
        self.sum_where(entity, true)
    }

    /// Weighted sum of the binding-dependent contributions; the entity
    /// must carry a binding.
    pub fn binding_dependent_index(&self, entity: &EvalEntity) -> Result<f32> {
        self.sum_where(entity, false)
    }

    fn sum_where(&self, entity: &EvalEntity, independent: bool) -> Result<f32> {
        let mut sum = 0.0f32;
        for r in &self.contribs {
            if r.contrib.binding_independent() != independent {
                continue;
            }
            let index = r.contrib.compute(entity)?;
            debug_assert!((0.0..=1.0).contains(&index), "{} returned {}", r.contrib.name(), index);
            sum += r.weight * index;
        }
        Ok(sum)
    }
}
