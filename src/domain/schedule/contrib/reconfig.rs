use crate::domain::schedule::contrib::SchedContrib;
use crate::domain::schedule::entity::EvalEntity;
use crate::error::Result;

/// Reconfiguration cost: 1.0 for staying in the current working mode,
/// decreasing with the value distance of the candidate mode.
#[derive(Debug)]
pub struct ReconfigContrib {
    penalty: f32,
}

impl ReconfigContrib {
    pub fn new(penalty_percent: f32) -> Self {
        Self { penalty: (penalty_percent / 100.0).clamp(0.0, 1.0) }
    }
}

impl SchedContrib for ReconfigContrib {
    fn name(&self) -> &'static str {
        "reconfig"
    }

    fn binding_independent(&self) -> bool {
        true
    }

    fn compute(&self, entity: &EvalEntity) -> Result<f32> {
        let Some(cur_handle) = entity.app.current_awm() else {
            // A starting application pays no reconfiguration cost.
            return Ok(1.0);
        };
        let (cur_id, cur_nv) = {
            let cur = cur_handle.read().expect("working mode lock poisoned");
            (cur.id(), cur.norm_value())
        };
        let candidate = entity.awm.read().expect("working mode lock poisoned");
        if candidate.id() == cur_id {
            return Ok(1.0);
        }
        let distance = (candidate.norm_value() - cur_nv).abs();
        Ok((1.0 - self.penalty * distance).clamp(0.0, 1.0))
    }
}
