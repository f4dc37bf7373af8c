use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::app::recipe::AwmTemplate;
use crate::domain::resource::assignment::{AssignmentMap, ResourceAssignment};
use crate::domain::resource::resource_path::ResourcePath;
use crate::domain::resource::resource_tree::ResourceTree;
use crate::domain::resource::resource_type::ResourceType;
use crate::domain::utils::id::{AppUid, BindingRef};
use crate::error::{Error, Result};

/// One operating point adopted by an application.
///
/// Created from a recipe template when the application adopts the recipe,
/// mutated only through the binding operations below, destroyed with its
/// owning application. The owner uid is identification only; it keeps
/// nothing alive.
#[derive(Debug, Clone)]
pub struct WorkingMode {
    id: u8,
    name: String,
    value: f32,
    norm_value: f32,
    owner: AppUid,
    requests: BTreeMap<ResourcePath, u64>,
    /// Working modes whose requests exceed the current platform totals are
    /// hidden from policies.
    hidden: bool,
    next_ref: u32,
    /// Sparse table of candidate bindings populated during scheduling.
    bindings: HashMap<BindingRef, AssignmentMap>,
    /// The booked map recorded by the last accepted schedule request.
    scheduled: Option<AssignmentMap>,
    /// The binding promoted to synchronization.
    committed: Option<AssignmentMap>,
}

impl WorkingMode {
    pub fn from_template(template: &AwmTemplate, norm_value: f32, owner: AppUid) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            value: template.value,
            norm_value,
            owner,
            requests: template.requests.clone(),
            hidden: false,
            next_ref: 0,
            bindings: HashMap::new(),
            scheduled: None,
            committed: None,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn norm_value(&self) -> f32 {
        self.norm_value
    }

    pub fn owner(&self) -> AppUid {
        self.owner
    }

    pub fn requests(&self) -> &BTreeMap<ResourcePath, u64> {
        &self.requests
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Re-evaluates the hidden flag against the current platform totals.
    pub fn update_hidden(&mut self, accounter: &ResourceAccounter) {
        self.hidden = self.requests.iter().any(|(path, amount)| accounter.total(path) < *amount);
    }

    // ------------------
    // --- Bindings
    // ------------------

    /// Binds the abstract requests onto one instance of a binding domain:
    /// every path carrying a `domain` segment has its instance replaced by
    /// `dst_id`, then the candidate resources are resolved against the
    /// inventory. Returns the reference of the new candidate binding.
    pub fn bind_resources(&mut self, tree: &ResourceTree, domain: ResourceType, dst_id: u32) -> Result<BindingRef> {
        let mut map = AssignmentMap::new();
        for (path, amount) in &self.requests {
            let bound_path = if path.instance_of(domain).is_some() { path.with_instance(domain, dst_id) } else { path.clone() };
            let candidates: Vec<_> = tree.find_mixed(&bound_path).into_iter().map(|(_, key)| key).collect();
            if candidates.is_empty() {
                return Err(Error::NotFound(format!("[{} awm{}] no resource matching '{}'", self.owner, self.id, bound_path)));
            }
            map.insert(bound_path, ResourceAssignment::with_candidates(*amount, candidates));
        }
        let r = BindingRef(self.next_ref);
        self.next_ref += 1;
        self.bindings.insert(r, map);
        Ok(r)
    }

    /// Resolves the abstract requests as they stand, without rewriting any
    /// binding-domain instance. Used when the platform exposes no instance
    /// of the binding domain (or by policies that do not bind).
    pub fn bind_as_is(&mut self, tree: &ResourceTree) -> Result<BindingRef> {
        let mut map = AssignmentMap::new();
        for (path, amount) in &self.requests {
            let candidates: Vec<_> = tree.find_mixed(path).into_iter().map(|(_, key)| key).collect();
            if candidates.is_empty() {
                return Err(Error::NotFound(format!("[{} awm{}] no resource matching '{}'", self.owner, self.id, path)));
            }
            map.insert(path.clone(), ResourceAssignment::with_candidates(*amount, candidates));
        }
        let r = BindingRef(self.next_ref);
        self.next_ref += 1;
        self.bindings.insert(r, map);
        Ok(r)
    }

    /// The candidate binding registered under `binding_ref`.
    pub fn binding(&self, binding_ref: BindingRef) -> Option<&AssignmentMap> {
        self.bindings.get(&binding_ref)
    }

    /// Drops the candidate table, keeping scheduled and committed maps.
    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
        self.next_ref = 0;
    }

    /// Records the booked map of an accepted schedule request.
    pub fn set_scheduled(&mut self, booked: AssignmentMap) {
        self.scheduled = Some(booked);
    }

    pub fn scheduled(&self) -> Option<&AssignmentMap> {
        self.scheduled.as_ref()
    }

    pub fn clear_scheduled(&mut self) {
        self.scheduled = None;
    }

    /// Promotes the scheduled binding to the committed one.
    pub fn commit_binding(&mut self) {
        if let Some(map) = self.scheduled.take() {
            self.committed = Some(map);
        }
        self.clear_bindings();
    }

    pub fn committed(&self) -> Option<&AssignmentMap> {
        self.committed.as_ref()
    }

    pub fn clear_committed(&mut self) {
        self.committed = None;
    }

    /// The set of `domain` instances named by the given map.
    pub fn binding_set_of(map: &AssignmentMap, domain: ResourceType) -> BTreeSet<u32> {
        let mut set = BTreeSet::new();
        for path in map.keys() {
            if let Some(crate::domain::resource::resource_path::InstanceId::Id(n)) = path.instance_of(domain) {
                set.insert(n);
            }
        }
        set
    }

    /// The `domain` instances of the committed binding.
    pub fn committed_binding_set(&self, domain: ResourceType) -> BTreeSet<u32> {
        self.committed.as_ref().map(|m| Self::binding_set_of(m, domain)).unwrap_or_default()
    }

    /// The `domain` instances of the scheduled binding.
    pub fn scheduled_binding_set(&self, domain: ResourceType) -> BTreeSet<u32> {
        self.scheduled.as_ref().map(|m| Self::binding_set_of(m, domain)).unwrap_or_default()
    }
}
