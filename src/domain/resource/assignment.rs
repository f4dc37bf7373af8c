use std::collections::BTreeMap;

use crate::domain::resource::resource::ResourceKey;
use crate::domain::resource::resource_path::ResourcePath;

/// The amount drawn from one concrete resource while satisfying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingShare {
    pub resource: ResourceKey,
    pub amount: u64,
}

/// One entry of an assignment map: a requested amount plus the ordered set
/// of concrete resources it may be satisfied from.
///
/// `candidates` is populated when the request is bound to a binding-domain
/// instance; `shares` records the per-resource draw once the entry has been
/// booked into a view.
#[derive(Debug, Clone, Default)]
pub struct ResourceAssignment {
    pub amount: u64,
    pub candidates: Vec<ResourceKey>,
    pub shares: Vec<BindingShare>,
}

impl ResourceAssignment {
    pub fn new(amount: u64) -> Self {
        Self { amount, candidates: Vec::new(), shares: Vec::new() }
    }

    pub fn with_candidates(amount: u64, candidates: Vec<ResourceKey>) -> Self {
        Self { amount, candidates, shares: Vec::new() }
    }

    /// Total amount currently drawn across all shares.
    pub fn booked(&self) -> u64 {
        self.shares.iter().map(|s| s.amount).sum()
    }

    pub fn is_booked(&self) -> bool {
        self.booked() == self.amount
    }
}

/// The unit of booking exchanged between working modes, the accounter and
/// the platform proxy: one assignment per requested path, iterated in path
/// order so that bookings are deterministic.
pub type AssignmentMap = BTreeMap<ResourcePath, ResourceAssignment>;

/// True iff the two maps resolve to different per-resource assignments,
/// even while naming the same working mode. A `true` result triggers a
/// same-AWM reconfiguration.
pub fn is_reshuffling(current: &AssignmentMap, next: &AssignmentMap) -> bool {
    if current.len() != next.len() {
        return true;
    }
    for (path, nxt) in next {
        let Some(cur) = current.get(path) else {
            return true;
        };
        if per_resource_amounts(cur) != per_resource_amounts(nxt) {
            return true;
        }
    }
    false
}

fn per_resource_amounts(assignment: &ResourceAssignment) -> BTreeMap<ResourceKey, u64> {
    let mut amounts = BTreeMap::new();
    for share in &assignment.shares {
        *amounts.entry(share.resource).or_insert(0) += share.amount;
    }
    amounts
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<ResourceKey> {
        let mut sm: SlotMap<ResourceKey, ()> = SlotMap::with_key();
        (0..n).map(|_| sm.insert(())).collect()
    }

    fn map_with_share(path: &str, resource: ResourceKey, amount: u64) -> AssignmentMap {
        let mut assignment = ResourceAssignment::new(amount);
        assignment.shares.push(BindingShare { resource, amount });
        let mut map = AssignmentMap::new();
        map.insert(ResourcePath::parse(path).unwrap(), assignment);
        map
    }

    #[test]
    fn identical_shares_are_not_reshuffling() {
        let k = keys(1);
        let a = map_with_share("sys0.cpu0.pe0", k[0], 100);
        let b = map_with_share("sys0.cpu0.pe0", k[0], 100);
        assert!(!is_reshuffling(&a, &b));
    }

    #[test]
    fn moved_share_is_reshuffling() {
        let k = keys(2);
        let a = map_with_share("sys0.cpu0.pe*", k[0], 100);
        let b = map_with_share("sys0.cpu0.pe*", k[1], 100);
        assert!(is_reshuffling(&a, &b));
    }

    #[test]
    fn changed_amount_is_reshuffling() {
        let k = keys(1);
        let a = map_with_share("sys0.cpu0.pe0", k[0], 100);
        let b = map_with_share("sys0.cpu0.pe0", k[0], 50);
        assert!(is_reshuffling(&a, &b));
    }
}
