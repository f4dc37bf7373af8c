use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::domain::resource::assignment::AssignmentMap;
use crate::domain::resource::resource::ResourceKey;
use crate::domain::utils::id::AppUid;

/// Token identifying one accounting snapshot.
///
/// The distinguished system view (token 0) is the live state; every other
/// view is a candidate or in-flight snapshot derived from the hash of the
/// label passed to `get_view`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewToken(pub u64);

pub const SYSTEM_VIEW: ViewToken = ViewToken(0);

impl ViewToken {
    pub fn from_label(label: &str) -> ViewToken {
        let mut hasher = DefaultHasher::new();
        label.hash(&mut hasher);
        let mut tok = hasher.finish();
        // Token 0 is reserved for the live view.
        if tok == SYSTEM_VIEW.0 {
            tok = 1;
        }
        ViewToken(tok)
    }

    pub fn is_system(&self) -> bool {
        *self == SYSTEM_VIEW
    }
}

impl fmt::Display for ViewToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_system() { write!(f, "view(live)") } else { write!(f, "view({:x})", self.0) }
    }
}

/// One accounting snapshot: the per-application assignment maps booked in
/// it plus the set of resources it touched.
#[derive(Debug, Default)]
pub struct View {
    pub label: String,
    /// One assignment map per application; at most one booking per
    /// application per view.
    pub apps: HashMap<AppUid, AssignmentMap>,
    /// Resources carrying per-view state for this snapshot; cleared when
    /// the view is released.
    pub touched: HashSet<ResourceKey>,
}

impl View {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), apps: HashMap::new(), touched: HashSet::new() }
    }
}
