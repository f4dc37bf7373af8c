use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::schedule::contrib::{ContribConfig, SchedContrib, exp_penalty};
use crate::domain::schedule::entity::EvalEntity;
use crate::error::{Error, Result};

/// Congestion: piecewise index of the requested amount against the
/// remaining availability of each bound resource path.
///
/// Three regions per request, delimited by the maximum saturation level
/// (a percentage of the total):
///
/// * sub-saturation: the projected usage stays below the saturation
///   level, constant 1.0;
/// * in-saturation: the projected usage crosses the saturation level but
///   fits the total, linear descent;
/// * over-saturation: the request cannot fit, exponential tail below the
///   linear floor.
#[derive(Debug)]
pub struct CongestionContrib {
    accounter: ResourceAccounter,
    config: ContribConfig,
}

impl CongestionContrib {
    pub fn new(accounter: ResourceAccounter, config: ContribConfig) -> Self {
        Self { accounter, config }
    }
}

impl SchedContrib for CongestionContrib {
    fn name(&self) -> &'static str {
        "congestion"
    }

    fn binding_independent(&self) -> bool {
        false
    }

    fn compute(&self, entity: &EvalEntity) -> Result<f32> {
        let binding = entity.binding.ok_or_else(|| Error::InvalidArgument("congestion requires a bound entity".to_string()))?;
        let awm = entity.awm.read().expect("working mode lock poisoned");
        let map = awm.binding(binding.binding_ref).ok_or_else(|| Error::NotFound(format!("{:?} binding vanished", entity)))?;

        let mut sum = 0.0f32;
        let mut count = 0u32;
        for (path, assignment) in map {
            let Some(r_type) = path.target_type() else {
                continue;
            };
            let total = self.accounter.total(path) as f32;
            if total <= 0.0 {
                sum += 0.0;
                count += 1;
                continue;
            }
            let used = self.accounter.used(path, entity.view) as f32;
            let projected = used + assignment.amount as f32;
            let saturate = total * self.config.saturation(r_type) / 100.0;
            let penalty = self.config.penalty(r_type) / 100.0;

            let index = if projected <= saturate {
                1.0
            } else if projected <= total {
                let span = (total - saturate).max(1.0);
                1.0 - penalty * (projected - saturate) / span
            } else {
                (1.0 - penalty) * exp_penalty(self.config.expbase, 100.0, (projected - total) / total)
            };
            sum += index.clamp(0.0, 1.0);
            count += 1;
        }
        if count == 0 {
            return Ok(1.0);
        }
        Ok(sum / count as f32)
    }
}
