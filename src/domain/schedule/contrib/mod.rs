pub mod congestion;
pub mod fairness;
pub mod manager;
pub mod migration;
pub mod reconfig;
pub mod value;

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::domain::accounter::view::ViewToken;
use crate::domain::resource::resource_type::ResourceType;
use crate::domain::schedule::entity::EvalEntity;
use crate::error::Result;

/// The canonical scoring contributions, used as registry keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContribType {
    Value,
    Reconfig,
    Fairness,
    Migration,
    Congestion,
}

impl ContribType {
    pub const ALL: [ContribType; 5] = [ContribType::Value, ContribType::Reconfig, ContribType::Fairness, ContribType::Migration, ContribType::Congestion];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContribType::Value => "value",
            ContribType::Reconfig => "reconfig",
            ContribType::Fairness => "fairness",
            ContribType::Migration => "migration",
            ContribType::Congestion => "congestion",
        }
    }
}

lazy_static! {
    /// Default contribution weights, normalized by the manager at load time.
    pub static ref DEFAULT_WEIGHTS: HashMap<ContribType, f32> = {
        let mut w = HashMap::new();
        w.insert(ContribType::Value, 0.20);
        w.insert(ContribType::Reconfig, 0.05);
        w.insert(ContribType::Fairness, 0.18);
        w.insert(ContribType::Migration, 0.05);
        w.insert(ContribType::Congestion, 0.04);
        w
    };

    /// Default congestion/fairness penalties per resource type, in percent.
    pub static ref DEFAULT_PENALTIES: HashMap<ResourceType, f32> = {
        let mut p = HashMap::new();
        for r_type in ResourceType::ALL {
            p.insert(r_type, 5.0);
        }
        p
    };
}

/// Tunables shared by the contribution implementations.
#[derive(Debug, Clone)]
pub struct ContribConfig {
    /// Base of the exponential penalty kernels.
    pub expbase: f32,
    /// Maximum saturation level per resource type, percent of the total,
    /// clamped to [0, 100].
    pub msl: HashMap<ResourceType, f32>,
    /// Penalty per resource type, percent, clamped to [0, 100].
    pub penalties: HashMap<ResourceType, f32>,
    /// Raw contribution weights; normalized by the manager.
    pub weights: HashMap<ContribType, f32>,
}

impl Default for ContribConfig {
    fn default() -> Self {
        let mut msl = HashMap::new();
        for r_type in ResourceType::ALL {
            msl.insert(r_type, 90.0);
        }
        Self { expbase: 2.0, msl, penalties: DEFAULT_PENALTIES.clone(), weights: DEFAULT_WEIGHTS.clone() }
    }
}

impl ContribConfig {
    /// Clamps the percent parameters into range, warning once per
    /// out-of-range entry.
    pub fn sanitize(mut self) -> Self {
        for (r_type, v) in self.msl.iter_mut() {
            if *v < 0.0 || *v > 100.0 {
                log::warn!("Contrib config: msl.{} out of range [0,100]: {}", r_type, v);
                *v = v.clamp(0.0, 100.0);
            }
        }
        for (r_type, v) in self.penalties.iter_mut() {
            if *v < 0.0 || *v > 100.0 {
                log::warn!("Contrib config: penalty.{} out of range [0,100]: {}", r_type, v);
                *v = v.clamp(0.0, 100.0);
            }
        }
        if self.expbase <= 1.0 {
            log::warn!("Contrib config: expbase must exceed 1, found {}", self.expbase);
            self.expbase = 2.0;
        }
        self
    }

    pub fn penalty(&self, r_type: ResourceType) -> f32 {
        self.penalties.get(&r_type).copied().unwrap_or(5.0)
    }

    pub fn saturation(&self, r_type: ResourceType) -> f32 {
        self.msl.get(&r_type).copied().unwrap_or(90.0)
    }
}

/// Per-priority initialization data handed to the contributions before a
/// priority level is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct PriorityInit {
    pub priority: u8,
    /// Number of applications competing at this priority level.
    pub app_count: usize,
    /// The candidate view the policy books into.
    pub view: ViewToken,
}

/// One scalar term of a policy's aggregate scoring function.
///
/// Every implementation returns an index in [0, 1]; binding-dependent
/// contributions require the entity to carry a binding.
pub trait SchedContrib: Send {
    fn name(&self) -> &'static str;

    /// Whether the index can be computed before a binding is chosen.
    fn binding_independent(&self) -> bool;

    /// Called once per priority level before evaluation starts.
    fn init_priority(&mut self, _init: &PriorityInit) -> Result<()> {
        Ok(())
    }

    fn compute(&self, entity: &EvalEntity) -> Result<f32>;
}

/// Exponential penalty kernel shared by fairness and congestion: 1.0 at
/// zero distance, strictly decreasing, never negative.
pub fn exp_penalty(expbase: f32, penalty_percent: f32, distance: f32) -> f32 {
    debug_assert!(distance >= 0.0);
    expbase.powf(-(penalty_percent / 100.0) * distance).clamp(0.0, 1.0)
}
