use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use slotmap::SlotMap;

use crate::domain::resource::resource::{Resource, ResourceKey};
use crate::domain::resource::resource_path::ResourcePath;
use crate::domain::resource::resource_type::ResourceType;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct TreeInner {
    resources: SlotMap<ResourceKey, Arc<RwLock<Resource>>>,
    /// Registered paths in ascending path order, so that template searches
    /// return the lowest-id candidates first.
    by_path: BTreeMap<ResourcePath, ResourceKey>,
}

/// The hierarchical resource inventory.
///
/// Resources are registered once (with a fully concrete path) and never
/// destroyed during a run. Queries walk the requested path and a registered
/// path segment by segment: a type mismatch disqualifies the query, an id
/// mismatch only skips the candidate.
#[derive(Debug, Clone, Default)]
pub struct ResourceTree {
    inner: Arc<RwLock<TreeInner>>,
}

impl ResourceTree {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(TreeInner::default())) }
    }

    /// Registers a resource under a fully concrete path.
    pub fn register(&self, path: ResourcePath, units: &str, total: u64) -> Result<ResourceKey> {
        if !path.is_concrete() {
            return Err(Error::InvalidArgument(format!("cannot register templated path '{}'", path)));
        }
        let mut guard = self.inner.write().expect("resource tree lock poisoned");
        if guard.by_path.contains_key(&path) {
            return Err(Error::AlreadyPresent(format!("resource '{}' already registered", path)));
        }
        let key = guard.resources.insert(Arc::new(RwLock::new(Resource::new(path.clone(), units, total))));
        guard.by_path.insert(path, key);
        Ok(key)
    }

    pub fn get(&self, key: ResourceKey) -> Option<Arc<RwLock<Resource>>> {
        let guard = self.inner.read().expect("resource tree lock poisoned");
        guard.resources.get(key).cloned()
    }

    /// Exact lookup of a concrete path.
    pub fn get_by_path(&self, path: &ResourcePath) -> Option<ResourceKey> {
        let guard = self.inner.read().expect("resource tree lock poisoned");
        guard.by_path.get(path).copied()
    }

    /// First resource whose type sequence matches the template, lowest ids
    /// winning among type-equal candidates.
    pub fn find_first(&self, template: &ResourcePath) -> Option<(ResourcePath, ResourceKey)> {
        let guard = self.inner.read().expect("resource tree lock poisoned");
        guard.by_path.iter().find(|(p, _)| template.template_equals(p)).map(|(p, k)| (p.clone(), *k))
    }

    /// Every resource whose type sequence matches the template.
    pub fn find_all(&self, template: &ResourcePath) -> Vec<(ResourcePath, ResourceKey)> {
        let guard = self.inner.read().expect("resource tree lock poisoned");
        guard.by_path.iter().filter(|(p, _)| template.template_equals(p)).map(|(p, k)| (p.clone(), *k)).collect()
    }

    /// Every resource matching a mixed path: concrete segments must match,
    /// `Any`/`None` segments match any instance.
    pub fn find_mixed(&self, path: &ResourcePath) -> Vec<(ResourcePath, ResourceKey)> {
        let guard = self.inner.read().expect("resource tree lock poisoned");
        guard.by_path.iter().filter(|(p, _)| path.accepts(p)).map(|(p, k)| (p.clone(), *k)).collect()
    }

    /// Distinct instance ids of the given type among the registered paths,
    /// ascending. This is the set of binding-domain instances a policy can
    /// bind onto.
    pub fn instances_of(&self, r_type: ResourceType) -> Vec<u32> {
        let guard = self.inner.read().expect("resource tree lock poisoned");
        let mut ids: Vec<u32> = Vec::new();
        for path in guard.by_path.keys() {
            for seg in path.segments() {
                if seg.r_type == r_type {
                    if let crate::domain::resource::resource_path::InstanceId::Id(n) = seg.id {
                        if !ids.contains(&n) {
                            ids.push(n);
                        }
                    }
                }
            }
        }
        ids.sort_unstable();
        ids
    }

    /// Sets the reserved amount on every resource the path matches.
    /// Idempotent with respect to identical calls.
    pub fn reserve(&self, path: &ResourcePath, amount: u64) -> Result<()> {
        let matches = self.find_mixed(path);
        if matches.is_empty() {
            return Err(Error::NotFound(format!("no resource matching '{}'", path)));
        }
        for (_, key) in matches {
            if let Some(handle) = self.get(key) {
                handle.write().expect("resource lock poisoned").reserve(amount);
            }
        }
        Ok(())
    }

    /// Takes every resource the path matches offline. Idempotent.
    pub fn offline(&self, path: &ResourcePath) -> Result<()> {
        self.for_each_match(path, |r| r.set_offline())
    }

    /// Brings every resource the path matches back online. Idempotent.
    pub fn online(&self, path: &ResourcePath) -> Result<()> {
        self.for_each_match(path, |r| r.set_online())
    }

    fn for_each_match(&self, path: &ResourcePath, f: impl Fn(&mut Resource)) -> Result<()> {
        let matches = self.find_mixed(path);
        if matches.is_empty() {
            return Err(Error::NotFound(format!("no resource matching '{}'", path)));
        }
        for (_, key) in matches {
            if let Some(handle) = self.get(key) {
                f(&mut handle.write().expect("resource lock poisoned"));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("resource tree lock poisoned").resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered resources, ascending path order.
    pub fn all(&self) -> Vec<(ResourcePath, ResourceKey)> {
        let guard = self.inner.read().expect("resource tree lock poisoned");
        guard.by_path.iter().map(|(p, k)| (p.clone(), *k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ResourceTree {
        let t = ResourceTree::new();
        for (path, amount) in [("sys0.cpu0.pe0", 100), ("sys0.cpu0.pe1", 100), ("sys0.cpu1.pe0", 100), ("sys0.mem0", 4096)] {
            t.register(ResourcePath::parse(path).unwrap(), "%", amount).unwrap();
        }
        t
    }

    #[test]
    fn register_rejects_duplicates_and_templates() {
        let t = tree();
        let dup = t.register(ResourcePath::parse("sys0.cpu0.pe0").unwrap(), "%", 100);
        assert!(matches!(dup, Err(Error::AlreadyPresent(_))));

        let tmpl = t.register(ResourcePath::parse("sys0.cpu.pe").unwrap(), "%", 100);
        assert!(matches!(tmpl, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn find_first_prefers_lowest_ids() {
        let t = tree();
        let (path, _) = t.find_first(&ResourcePath::parse("sys.cpu.pe").unwrap()).unwrap();
        assert_eq!(path.to_string(), "sys0.cpu0.pe0");
    }

    #[test]
    fn find_all_matches_type_sequence() {
        let t = tree();
        let pes = t.find_all(&ResourcePath::parse("sys.cpu.pe").unwrap());
        assert_eq!(pes.len(), 3);
        let mems = t.find_all(&ResourcePath::parse("sys.mem").unwrap());
        assert_eq!(mems.len(), 1);
    }

    #[test]
    fn find_mixed_intersects_concrete_segments() {
        let t = tree();
        let cpu0 = t.find_mixed(&ResourcePath::parse("sys0.cpu0.pe*").unwrap());
        assert_eq!(cpu0.len(), 2);
        let pe0s = t.find_mixed(&ResourcePath::parse("sys0.cpu*.pe0").unwrap());
        assert_eq!(pe0s.len(), 2);
        let none = t.find_mixed(&ResourcePath::parse("sys1.cpu*.pe*").unwrap());
        assert!(none.is_empty());
    }

    #[test]
    fn binding_domain_instances() {
        let t = tree();
        assert_eq!(t.instances_of(ResourceType::Cpu), vec![0, 1]);
        assert_eq!(t.instances_of(ResourceType::Gpu), Vec::<u32>::new());
    }
}
