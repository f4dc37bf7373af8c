use std::fmt;
use std::sync::{Arc, RwLock};

use crate::domain::accounter::view::ViewToken;
use crate::domain::app::application::Application;
use crate::domain::app::working_mode::WorkingMode;
use crate::domain::resource::resource_type::ResourceType;
use crate::domain::utils::id::BindingRef;

/// The binding half of an evaluation entity: one instance of a binding
/// domain plus the candidate binding it produced in the working mode's
/// table.
#[derive(Debug, Clone, Copy)]
pub struct EntityBinding {
    pub domain: ResourceType,
    pub instance: u32,
    pub binding_ref: BindingRef,
}

/// One ⟨application, working mode, binding⟩ triple under evaluation by a
/// scheduling policy. Binding-independent contributions are computed with
/// `binding` unset.
#[derive(Clone)]
pub struct EvalEntity {
    pub app: Arc<Application>,
    pub awm: Arc<RwLock<WorkingMode>>,
    pub binding: Option<EntityBinding>,
    pub view: ViewToken,
}

impl EvalEntity {
    pub fn unbound(app: Arc<Application>, awm: Arc<RwLock<WorkingMode>>, view: ViewToken) -> Self {
        Self { app, awm, binding: None, view }
    }

    pub fn bound(&self, binding: EntityBinding) -> Self {
        Self { app: self.app.clone(), awm: self.awm.clone(), binding: Some(binding), view: self.view }
    }

    pub fn awm_id(&self) -> u8 {
        self.awm.read().expect("working mode lock poisoned").id()
    }
}

impl fmt::Debug for EvalEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(b) => write!(f, "[{} awm{} @{}{}]", self.app.uid(), self.awm_id(), b.domain, b.instance),
            None => write!(f, "[{} awm{}]", self.app.uid(), self.awm_id()),
        }
    }
}
