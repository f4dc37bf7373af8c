use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::api::platform_dto::PlatformDto;
use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::platform::platform_proxy::PlatformProxy;
use crate::domain::resource::assignment::AssignmentMap;
use crate::domain::resource::resource_path::ResourcePath;
use crate::domain::utils::id::AppUid;
use crate::error::{Error, Result};
use crate::loader::parser::parse_json_file;

#[derive(Debug, Default)]
struct SimState {
    prepared: HashSet<AppUid>,
    mapped: HashMap<AppUid, AssignmentMap>,
    /// Applications whose next map call fails, for fault-injection tests.
    fail_map_for: HashSet<AppUid>,
}

/// Platform proxy backed by a JSON platform description instead of real
/// hardware. Tracks the per-application mappings it applied so tests can
/// assert on the enforcement calls, and supports injected map failures.
pub struct SimulatedPlatform {
    description: PlatformDto,
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    pub fn new(description: PlatformDto) -> Self {
        Self { description, state: Mutex::new(SimState::default()) }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        Ok(Self::new(parse_json_file::<PlatformDto>(path)?))
    }

    /// Makes the next `map_resources` call for `app` fail.
    pub fn inject_map_failure(&self, app: AppUid) {
        self.state.lock().expect("platform state lock poisoned").fail_map_for.insert(app);
    }

    /// The assignment currently enforced for `app`, if any.
    pub fn mapped_of(&self, app: AppUid) -> Option<AssignmentMap> {
        self.state.lock().expect("platform state lock poisoned").mapped.get(&app).cloned()
    }
}

impl PlatformProxy for SimulatedPlatform {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn load_platform_data(&self, accounter: &ResourceAccounter) -> Result<()> {
        for resource in &self.description.resources {
            let path = ResourcePath::parse(&resource.path).ok_or_else(|| Error::InvalidArgument(format!("bad platform path '{}'", resource.path)))?;
            accounter.tree().register(path, &resource.units, resource.total)?;
        }
        log::info!("Platform[{}]: registered {} resources of '{}'", self.name(), self.description.resources.len(), self.description.name);
        Ok(())
    }

    fn setup(&self, app: AppUid) -> Result<()> {
        self.state.lock().expect("platform state lock poisoned").prepared.insert(app);
        Ok(())
    }

    fn map_resources(&self, app: AppUid, map: &AssignmentMap, exclusive: bool) -> Result<()> {
        let mut state = self.state.lock().expect("platform state lock poisoned");
        if state.fail_map_for.remove(&app) {
            return Err(Error::PlatformEnforcement(format!("[{}] injected mapping failure", app)));
        }
        if !state.prepared.contains(&app) {
            return Err(Error::PlatformEnforcement(format!("[{}] not set up", app)));
        }
        state.mapped.insert(app, map.clone());
        log::debug!("Platform[{}]: mapped [{}] over {} paths (exclusive: {})", self.name(), app, map.len(), exclusive);
        Ok(())
    }

    fn reclaim_resources(&self, app: AppUid) -> Result<()> {
        self.state.lock().expect("platform state lock poisoned").mapped.remove(&app);
        Ok(())
    }

    fn release(&self, app: AppUid) -> Result<()> {
        let mut state = self.state.lock().expect("platform state lock poisoned");
        state.mapped.remove(&app);
        state.prepared.remove(&app);
        Ok(())
    }

    fn refresh(&self, accounter: &ResourceAccounter) -> Result<()> {
        for resource in &self.description.resources {
            let Some(path) = ResourcePath::parse(&resource.path) else {
                continue;
            };
            match accounter.tree().get_by_path(&path) {
                Some(key) => {
                    if let Some(handle) = accounter.tree().get(key) {
                        handle.write().expect("resource lock poisoned").set_total(resource.total);
                    }
                }
                None => {
                    accounter.tree().register(path, &resource.units, resource.total)?;
                }
            }
        }
        log::info!("Platform[{}]: availabilities refreshed", self.name());
        Ok(())
    }
}
