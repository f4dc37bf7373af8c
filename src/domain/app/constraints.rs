use std::collections::BTreeMap;

use crate::domain::resource::resource_path::ResourcePath;

/// Kind of a working mode range constraint, as asserted by the runtime
/// library or the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwmConstraintKind {
    LowerBound,
    UpperBound,
    Exact,
}

/// The enabled bitset over the working modes of one recipe, maintained
/// under lower/upper bound and exact-value assertions.
///
/// Bound updates only sweep the id range between the old and the new
/// bound value, so a bit toggled by an exact assertion is never touched
/// by a later bound change outside that range. Exact toggles themselves
/// are unconditional.
#[derive(Debug, Clone)]
pub struct AwmBitset {
    bits: Vec<bool>,
    lower: u8,
    upper: u8,
}

impl AwmBitset {
    pub fn new(awm_count: usize) -> Self {
        Self { bits: vec![true; awm_count], lower: 0, upper: awm_count.saturating_sub(1) as u8 }
    }

    pub fn is_enabled(&self, id: u8) -> bool {
        self.bits.get(id as usize).copied().unwrap_or(false)
    }

    pub fn lower(&self) -> u8 {
        self.lower
    }

    pub fn upper(&self) -> u8 {
        self.upper
    }

    fn max_id(&self) -> u8 {
        self.bits.len().saturating_sub(1) as u8
    }

    /// Disables every id below `k`; a bound lower than the previous one
    /// re-enables the ids it vacates.
    pub fn set_lower_bound(&mut self, k: u8) {
        if self.bits.is_empty() || k == self.lower {
            return;
        }
        // A lower bound crossing the upper one resets the upper bound.
        if k > self.upper {
            self.upper = self.max_id();
        }
        let sweep_top = self.lower.max(k).min(self.max_id());
        for id in 0..=sweep_top {
            self.bits[id as usize] = id >= k;
        }
        self.lower = k;
    }

    /// Re-enables the ids the lower bound had disabled.
    pub fn clear_lower_bound(&mut self) {
        for id in 0..(self.lower as usize).min(self.bits.len()) {
            self.bits[id] = true;
        }
        self.lower = 0;
    }

    /// Disables every id above `k`; a bound higher than the previous one
    /// re-enables the ids it vacates.
    pub fn set_upper_bound(&mut self, k: u8) {
        if self.bits.is_empty() || k == self.upper {
            return;
        }
        // An upper bound crossing the lower one resets the lower bound.
        if k < self.lower {
            self.lower = 0;
        }
        let sweep_bottom = self.upper.min(k);
        for id in sweep_bottom..=self.max_id() {
            self.bits[id as usize] = id <= k;
        }
        self.upper = k;
    }

    /// Re-enables the ids the upper bound had disabled.
    pub fn clear_upper_bound(&mut self) {
        for id in (self.upper as usize + 1)..self.bits.len() {
            self.bits[id] = true;
        }
        self.upper = self.max_id();
    }

    /// Sets or resets a single id, regardless of the current bounds.
    pub fn set_exact(&mut self, id: u8, enable: bool) {
        if let Some(bit) = self.bits.get_mut(id as usize) {
            *bit = enable;
        }
    }
}

/// Per-path lower/upper bounds on the amounts a working mode may request.
/// A working mode requesting an amount outside the bounds for any declared
/// path is excluded from the enabled list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceBounds {
    pub lower: Option<u64>,
    pub upper: Option<u64>,
}

impl ResourceBounds {
    pub fn admits(&self, amount: u64) -> bool {
        self.lower.is_none_or(|low| amount >= low) && self.upper.is_none_or(|up| amount <= up)
    }
}

pub type ResourceConstraintMap = BTreeMap<ResourcePath, ResourceBounds>;

/// True when the given requests violate any of the bounds. A bound on a
/// path applies to requests naming a template-equal path.
pub fn violates_resource_constraints(requests: &BTreeMap<ResourcePath, u64>, constraints: &ResourceConstraintMap) -> bool {
    for (c_path, bounds) in constraints {
        for (r_path, amount) in requests {
            if c_path.template_equals(r_path) && !bounds.admits(*amount) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_ids(bits: &AwmBitset) -> Vec<u8> {
        (0..4).filter(|id| bits.is_enabled(*id)).collect()
    }

    #[test]
    fn lower_bound_sweeps_only_the_affected_range() {
        let mut bits = AwmBitset::new(4);
        bits.set_lower_bound(2);
        assert_eq!(enabled_ids(&bits), vec![2, 3]);

        // Raising never enables an id below the bound (monotonicity).
        bits.set_lower_bound(3);
        assert_eq!(enabled_ids(&bits), vec![3]);

        // Narrowing re-enables exactly the vacated ids.
        bits.set_lower_bound(1);
        assert_eq!(enabled_ids(&bits), vec![1, 2, 3]);
    }

    #[test]
    fn clearing_lower_restores_everything_up_to_upper() {
        let mut bits = AwmBitset::new(4);
        bits.set_upper_bound(2);
        bits.set_lower_bound(1);
        assert_eq!(enabled_ids(&bits), vec![1, 2]);

        bits.clear_lower_bound();
        assert_eq!(enabled_ids(&bits), vec![0, 1, 2]);
    }

    #[test]
    fn bounds_crossing_each_other_reset_the_other_end() {
        let mut bits = AwmBitset::new(4);
        bits.set_upper_bound(1);
        bits.set_lower_bound(3);
        assert_eq!(enabled_ids(&bits), vec![3]);
        assert_eq!(bits.upper(), 3);

        let mut bits = AwmBitset::new(4);
        bits.set_lower_bound(2);
        bits.set_upper_bound(0);
        assert_eq!(enabled_ids(&bits), vec![0]);
        assert_eq!(bits.lower(), 0);
    }

    #[test]
    fn exact_toggles_are_unconditional() {
        let mut bits = AwmBitset::new(4);
        bits.set_exact(2, false);
        assert_eq!(enabled_ids(&bits), vec![0, 1, 3]);
        bits.set_exact(2, true);
        assert_eq!(enabled_ids(&bits), vec![0, 1, 2, 3]);

        // An exact enable works below an active lower bound too.
        bits.set_lower_bound(2);
        bits.set_exact(0, true);
        assert_eq!(enabled_ids(&bits), vec![0, 2, 3]);
    }

    #[test]
    fn exact_disable_survives_clearing_a_bound() {
        let mut bits = AwmBitset::new(4);
        bits.set_lower_bound(2);
        bits.set_exact(3, false);
        assert_eq!(enabled_ids(&bits), vec![2]);

        // Clearing the bound brings back the ids it had disabled and
        // nothing else: the explicit exact-disable persists.
        bits.clear_lower_bound();
        assert_eq!(enabled_ids(&bits), vec![0, 1, 2]);
    }

    #[test]
    fn resource_bounds_exclude_out_of_range_requests() {
        let mut requests = BTreeMap::new();
        requests.insert(ResourcePath::parse("sys0.cpu0.pe*").unwrap(), 120u64);

        let mut constraints = ResourceConstraintMap::new();
        constraints.insert(ResourcePath::parse("sys.cpu.pe").unwrap(), ResourceBounds { lower: None, upper: Some(100) });
        assert!(violates_resource_constraints(&requests, &constraints));

        constraints.insert(ResourcePath::parse("sys.cpu.pe").unwrap(), ResourceBounds { lower: Some(50), upper: None });
        assert!(!violates_resource_constraints(&requests, &constraints));
    }
}
