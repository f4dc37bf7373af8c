use std::collections::BTreeSet;

use crate::domain::schedule::contrib::SchedContrib;
use crate::domain::schedule::entity::EvalEntity;
use crate::error::{Error, Result};

/// Migration cost: penalizes changing the binding-domain instances
/// relative to the committed binding, proportional to how much of the
/// previous set is left behind.
#[derive(Debug)]
pub struct MigrationContrib {
    penalty: f32,
}

impl MigrationContrib {
    pub fn new(penalty_percent: f32) -> Self {
        Self { penalty: (penalty_percent / 100.0).clamp(0.0, 1.0) }
    }
}

impl SchedContrib for MigrationContrib {
    fn name(&self) -> &'static str {
        "migration"
    }

    fn binding_independent(&self) -> bool {
        false
    }

    fn compute(&self, entity: &EvalEntity) -> Result<f32> {
        let binding = entity.binding.ok_or_else(|| Error::InvalidArgument("migration requires a bound entity".to_string()))?;

        let Some(cur_handle) = entity.app.current_awm() else {
            // Nothing to migrate from.
            return Ok(1.0);
        };
        let prev: BTreeSet<u32> = cur_handle.read().expect("working mode lock poisoned").committed_binding_set(binding.domain);
        if prev.is_empty() {
            return Ok(1.0);
        }
        let next: BTreeSet<u32> = [binding.instance].into_iter().collect();
        if prev == next {
            return Ok(1.0);
        }
        let intersection = prev.intersection(&next).count() as f32;
        let union = prev.union(&next).count() as f32;
        let moved = 1.0 - intersection / union;
        Ok((1.0 - self.penalty * moved).clamp(0.0, 1.0))
    }
}
