use crate::domain::schedule::contrib::SchedContrib;
use crate::domain::schedule::entity::EvalEntity;
use crate::error::Result;

/// Monotone in the normalized working mode value, tilted upward by the
/// application's goal-gap hint: the larger the reported gap, the more a
/// high-valued mode is favoured over the current one.
#[derive(Debug, Default)]
pub struct ValueContrib;

impl SchedContrib for ValueContrib {
    fn name(&self) -> &'static str {
        "value"
    }

    fn binding_independent(&self) -> bool {
        true
    }

    fn compute(&self, entity: &EvalEntity) -> Result<f32> {
        let nv = entity.awm.read().expect("working mode lock poisoned").norm_value();
        let gap = entity.app.goal_gap().clamp(0, 100) as f32 / 100.0;
        // The tilt closes part of the remaining headroom, keeping the index
        // monotone in the normalized value and inside [0, 1].
        Ok((nv + gap * (1.0 - nv)).clamp(0.0, 1.0))
    }
}
