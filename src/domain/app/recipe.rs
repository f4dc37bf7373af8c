use std::collections::{BTreeMap, HashMap};

use crate::domain::resource::resource_path::ResourcePath;
use crate::error::{Error, Result};

/// Template of one operating point as declared by the recipe.
#[derive(Debug, Clone)]
pub struct AwmTemplate {
    pub id: u8,
    pub name: String,
    /// Raw quality-of-service value as written in the recipe.
    pub value: f32,
    /// Abstract resource requests, amount per (possibly templated) path.
    pub requests: BTreeMap<ResourcePath, u64>,
}

/// Static bounds a recipe places on one resource path.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticConstraint {
    pub lower: Option<u64>,
    pub upper: Option<u64>,
}

/// Immutable bundle produced by the recipe loader: the working mode
/// templates, static resource constraints, the baseline priority and
/// opaque plug-in data.
///
/// Finalization normalizes every working mode value into [0, 1] relative
/// to the highest value declared.
#[derive(Debug, Clone)]
pub struct Recipe {
    name: String,
    priority: u8,
    working_modes: Vec<AwmTemplate>,
    constraints: BTreeMap<ResourcePath, StaticConstraint>,
    plugin_data: HashMap<String, serde_json::Value>,
    normalized: Vec<f32>,
}

impl Recipe {
    pub fn new(
        name: impl Into<String>,
        priority: u8,
        working_modes: Vec<AwmTemplate>,
        constraints: BTreeMap<ResourcePath, StaticConstraint>,
        plugin_data: HashMap<String, serde_json::Value>,
    ) -> Result<Self> {
        let name = name.into();
        if working_modes.is_empty() {
            return Err(Error::InvalidArgument(format!("recipe '{}' declares no working mode", name)));
        }
        for (idx, wm) in working_modes.iter().enumerate() {
            if wm.id as usize != idx {
                return Err(Error::InvalidArgument(format!("recipe '{}': working mode ids must be dense and ordered", name)));
            }
            if wm.requests.is_empty() {
                return Err(Error::InvalidArgument(format!("recipe '{}': working mode '{}' requests nothing", name, wm.name)));
            }
        }

        let max_value = working_modes.iter().map(|wm| wm.value).fold(f32::MIN, f32::max);
        let normalized = if max_value > 0.0 { working_modes.iter().map(|wm| wm.value / max_value).collect() } else { vec![0.0; working_modes.len()] };

        Ok(Self { name, priority, working_modes, constraints, plugin_data, normalized })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Baseline priority; the application manager clamps it to the
    /// platform's lowest priority.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn working_modes(&self) -> &[AwmTemplate] {
        &self.working_modes
    }

    pub fn working_mode_count(&self) -> usize {
        self.working_modes.len()
    }

    /// Normalized value of the given working mode id.
    pub fn normalized_value(&self, awm_id: u8) -> f32 {
        self.normalized.get(awm_id as usize).copied().unwrap_or(0.0)
    }

    pub fn constraints(&self) -> &BTreeMap<ResourcePath, StaticConstraint> {
        &self.constraints
    }

    pub fn plugin_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.plugin_data.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: u8, value: f32, path: &str, amount: u64) -> AwmTemplate {
        let mut requests = BTreeMap::new();
        requests.insert(ResourcePath::parse(path).unwrap(), amount);
        AwmTemplate { id, name: format!("wm{}", id), value, requests }
    }

    #[test]
    fn values_are_normalized_to_unit_range() {
        let recipe = Recipe::new(
            "demo",
            1,
            vec![template(0, 10.0, "sys0.cpu0.pe0", 50), template(1, 40.0, "sys0.cpu0.pe0", 100)],
            BTreeMap::new(),
            HashMap::new(),
        )
        .unwrap();

        assert_eq!(recipe.normalized_value(0), 0.25);
        assert_eq!(recipe.normalized_value(1), 1.0);
    }

    #[test]
    fn rejects_empty_and_sparse_recipes() {
        assert!(Recipe::new("empty", 0, vec![], BTreeMap::new(), HashMap::new()).is_err());

        let sparse = Recipe::new("sparse", 0, vec![template(1, 1.0, "sys0.cpu0.pe0", 10)], BTreeMap::new(), HashMap::new());
        assert!(sparse.is_err());
    }
}
