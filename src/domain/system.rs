use std::sync::Arc;

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::app::application::{AppState, Application};
use crate::domain::app::application_manager::ApplicationManager;
use crate::domain::resource::resource_tree::ResourceTree;

/// Read-only facade over the managed system, handed to scheduling
/// policies: applications grouped by priority and state, plus the
/// accounter for queries and candidate views. Policies must never mutate
/// the live view through it.
#[derive(Clone)]
pub struct SystemView {
    app_manager: Arc<ApplicationManager>,
    accounter: ResourceAccounter,
}

impl SystemView {
    pub fn new(app_manager: Arc<ApplicationManager>, accounter: ResourceAccounter) -> Self {
        Self { app_manager, accounter }
    }

    pub fn accounter(&self) -> &ResourceAccounter {
        &self.accounter
    }

    pub fn tree(&self) -> &ResourceTree {
        self.accounter.tree()
    }

    pub fn app_manager(&self) -> &Arc<ApplicationManager> {
        &self.app_manager
    }

    pub fn lowest_priority(&self) -> u8 {
        self.app_manager.lowest_priority()
    }

    /// Applications a policy considers at the given priority: READY or
    /// RUNNING ones, sorted by uid for deterministic evaluation order.
    pub fn schedulable_at_priority(&self, priority: u8) -> Vec<Arc<Application>> {
        let mut apps: Vec<_> = self
            .app_manager
            .at_priority(priority)
            .into_iter()
            .filter(|a| matches!(a.state(), AppState::Ready | AppState::Running))
            .collect();
        apps.sort_by_key(|a| a.uid());
        apps
    }

    pub fn running_uids(&self) -> Vec<crate::domain::utils::id::AppUid> {
        self.app_manager.running_uids()
    }
}
