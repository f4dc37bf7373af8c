use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::app::application::{AppState, Application, SyncState};
use crate::domain::app::recipe::Recipe;
use crate::domain::utils::id::AppUid;
use crate::error::{Error, Result};

/// Registry of every execution context known to the resource manager.
///
/// Registration and unregistration are serialized under the inner lock;
/// iteration hands out snapshots so that callers never hold the registry
/// lock while taking per-application state locks.
#[derive(Debug)]
pub struct ApplicationManager {
    lowest_priority: u8,
    apps: RwLock<HashMap<AppUid, Arc<Application>>>,
}

impl ApplicationManager {
    pub fn new(lowest_priority: u8) -> Self {
        Self { lowest_priority, apps: RwLock::new(HashMap::new()) }
    }

    /// Lowest (numerically highest) priority an application can carry.
    pub fn lowest_priority(&self) -> u8 {
        self.lowest_priority
    }

    /// Creates an execution context from a recipe. The new application
    /// starts DISABLED; a start request enables it.
    pub fn register(
        &self,
        uid: AppUid,
        name: &str,
        recipe: Arc<Recipe>,
        language: &str,
        is_container: bool,
        accounter: &ResourceAccounter,
    ) -> Result<Arc<Application>> {
        let mut guard = self.apps.write().expect("application registry lock poisoned");
        if guard.contains_key(&uid) {
            return Err(Error::AlreadyPresent(format!("[{}] already registered", uid)));
        }
        let app = Application::new(uid, name, recipe, self.lowest_priority, language, is_container, accounter);
        guard.insert(uid, app.clone());
        log::info!("Register: [{}] '{}' prio {} ({} working modes)", uid, name, app.priority(), app.working_modes().len());
        Ok(app)
    }

    /// Terminates and forgets an execution context, returning whatever it
    /// held in the live view.
    pub fn unregister(&self, uid: AppUid, accounter: &ResourceAccounter) -> Result<()> {
        let app = {
            let mut guard = self.apps.write().expect("application registry lock poisoned");
            guard.remove(&uid).ok_or_else(|| Error::NotFound(format!("[{}] not registered", uid)))?
        };
        app.terminate();
        accounter.release_resources(uid, accounter.live_view())?;
        log::info!("Unregister: [{}] removed", uid);
        Ok(())
    }

    pub fn get(&self, uid: AppUid) -> Option<Arc<Application>> {
        self.apps.read().expect("application registry lock poisoned").get(&uid).cloned()
    }

    pub fn count(&self) -> usize {
        self.apps.read().expect("application registry lock poisoned").len()
    }

    /// Snapshot of every registered application.
    pub fn all(&self) -> Vec<Arc<Application>> {
        self.apps.read().expect("application registry lock poisoned").values().cloned().collect()
    }

    /// Applications at the given priority level.
    pub fn at_priority(&self, priority: u8) -> Vec<Arc<Application>> {
        self.all().into_iter().filter(|a| a.priority() == priority).collect()
    }

    /// Applications currently in the given schedule state.
    pub fn in_state(&self, state: AppState) -> Vec<Arc<Application>> {
        self.all().into_iter().filter(|a| a.state() == state).collect()
    }

    /// Applications synchronizing in the given sub-state.
    pub fn sync_apps(&self, sync: SyncState) -> Vec<Arc<Application>> {
        self.all().into_iter().filter(|a| a.state() == AppState::Sync && a.sync_state() == sync).collect()
    }

    /// Uids of the applications currently RUNNING, i.e. the allocations a
    /// sync session must carry over.
    pub fn running_uids(&self) -> Vec<AppUid> {
        self.in_state(AppState::Running).iter().map(|a| a.uid()).collect()
    }

    /// True when at least one application awaits synchronization.
    pub fn has_sync_apps(&self) -> bool {
        self.all().iter().any(|a| a.state() == AppState::Sync)
    }

    /// Stores a runtime profile notification: the goal gap biases the next
    /// policy run toward reallocation.
    pub fn set_runtime_profile(&self, uid: AppUid, goal_gap_percent: i32) -> Result<()> {
        let app = self.get(uid).ok_or_else(|| Error::NotFound(format!("[{}] not registered", uid)))?;
        app.set_goal_gap(goal_gap_percent);
        log::debug!("RuntimeProfile: [{}] goal gap {}%", uid, goal_gap_percent);
        Ok(())
    }
}
