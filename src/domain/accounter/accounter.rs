use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::accounter::view::{SYSTEM_VIEW, View, ViewToken};
use crate::domain::resource::assignment::{self, AssignmentMap, BindingShare, ResourceAssignment};
use crate::domain::resource::resource_path::ResourcePath;
use crate::domain::resource::resource_tree::ResourceTree;
use crate::domain::utils::id::AppUid;
use crate::error::{Error, Result};

/// State of the currently open synchronization session, if any.
#[derive(Debug, Clone)]
pub(super) struct SyncSession {
    pub token: ViewToken,
    pub label: String,
    /// Applications whose next working mode was acquired so far.
    pub acquired: Vec<AppUid>,
}

#[derive(Debug)]
pub(super) struct AccounterInner {
    pub views: HashMap<ViewToken, View>,
    /// Token of the live view. Starts as the distinguished system token and
    /// moves forward every time a scheduled view is promoted.
    pub live: ViewToken,
    pub sync: Option<SyncSession>,
}

/// The resource accounter: one live view plus any number of candidate
/// views over the shared resource inventory.
///
/// No view ever shows more than `total - reserved` committed to
/// applications. All mutations of views and per-view resource state go
/// through the single inner lock; per-resource state is additionally
/// guarded by the resource's own lock (taken strictly after this one).
#[derive(Debug, Clone)]
pub struct ResourceAccounter {
    tree: ResourceTree,
    pub(super) inner: Arc<RwLock<AccounterInner>>,
}

impl ResourceAccounter {
    pub fn new(tree: ResourceTree) -> Self {
        let mut views = HashMap::new();
        views.insert(SYSTEM_VIEW, View::new("live"));
        let inner = AccounterInner { views, live: SYSTEM_VIEW, sync: None };
        Self { tree, inner: Arc::new(RwLock::new(inner)) }
    }

    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    /// Token of the current live view.
    pub fn live_view(&self) -> ViewToken {
        self.inner.read().expect("accounter lock poisoned").live
    }

    // ------------------
    // --- View handling
    // ------------------

    /// Allocates a new empty view identified by the hash of `label`.
    pub fn get_view(&self, label: &str) -> Result<ViewToken> {
        if label.is_empty() {
            return Err(Error::InvalidArgument("empty view label".to_string()));
        }
        let token = ViewToken::from_label(label);
        let mut guard = self.inner.write().expect("accounter lock poisoned");
        if guard.views.contains_key(&token) {
            return Err(Error::AlreadyPresent(format!("view '{}' already allocated", label)));
        }
        guard.views.insert(token, View::new(label));
        log::debug!("GetView: allocated {} for '{}'", token, label);
        Ok(token)
    }

    /// Releases a view along with each resource's per-view state. The live
    /// view cannot be released this way.
    pub fn put_view(&self, token: ViewToken) -> Result<()> {
        let mut guard = self.inner.write().expect("accounter lock poisoned");
        if token == guard.live {
            return Err(Error::InvalidArgument("cannot release the live view".to_string()));
        }
        let Some(view) = guard.views.remove(&token) else {
            return Err(Error::NotFound(format!("{} not allocated", token)));
        };
        drop(guard);
        for key in &view.touched {
            if let Some(handle) = self.tree.get(*key) {
                handle.write().expect("resource lock poisoned").clear_view(token);
            }
        }
        log::debug!("PutView: released {} ('{}')", token, view.label);
        Ok(())
    }

    /// Atomically promotes `token` to the live view and drops the previous
    /// one. Returns the prior live token.
    pub fn set_view(&self, token: ViewToken) -> Result<ViewToken> {
        let prior = {
            let mut guard = self.inner.write().expect("accounter lock poisoned");
            if !guard.views.contains_key(&token) {
                return Err(Error::NotFound(format!("{} not allocated", token)));
            }
            if token == guard.live {
                return Err(Error::InvalidArgument("view is already live".to_string()));
            }
            let prior = guard.live;
            guard.live = token;
            prior
        };
        // The previous live view is gone: release its bookkeeping.
        if let Some(view) = self.inner.write().expect("accounter lock poisoned").views.remove(&prior) {
            for key in &view.touched {
                if let Some(handle) = self.tree.get(*key) {
                    handle.write().expect("resource lock poisoned").clear_view(prior);
                }
            }
        }
        log::info!("SetView: {} is now the live view (was {})", token, prior);
        Ok(prior)
    }

    // ------------------
    // --- Queries
    // ------------------

    /// Registered amount over every resource the path matches.
    pub fn total(&self, path: &ResourcePath) -> u64 {
        self.sum_over(path, |r| r.total())
    }

    /// Amount not set aside by reservations, over every match.
    pub fn unreserved(&self, path: &ResourcePath) -> u64 {
        self.sum_over(path, |r| r.unreserved())
    }

    /// Amount assigned to applications in `view`, over every match.
    pub fn used(&self, path: &ResourcePath, view: ViewToken) -> u64 {
        self.sum_over(path, |r| r.used(view))
    }

    /// Amount still assignable in `view`. With `app` given, the amount that
    /// application could take considering only the bookings of others.
    pub fn available(&self, path: &ResourcePath, view: ViewToken, app: Option<AppUid>) -> u64 {
        match app {
            Some(uid) => self.sum_over(path, |r| r.available_for(uid, view)),
            None => self.sum_over(path, |r| r.available(view)),
        }
    }

    fn sum_over(&self, path: &ResourcePath, f: impl Fn(&crate::domain::resource::resource::Resource) -> u64) -> u64 {
        self.tree
            .find_mixed(path)
            .into_iter()
            .filter_map(|(_, key)| self.tree.get(key))
            .map(|handle| f(&handle.read().expect("resource lock poisoned")))
            .sum()
    }

    /// The assignment map `app` holds in `view`, if any.
    pub fn assignments_of(&self, app: AppUid, view: ViewToken) -> Option<AssignmentMap> {
        let guard = self.inner.read().expect("accounter lock poisoned");
        guard.views.get(&view).and_then(|v| v.apps.get(&app)).cloned()
    }

    /// True iff the two maps resolve to different per-resource assignments.
    pub fn is_reshuffling(&self, current: &AssignmentMap, next: &AssignmentMap) -> bool {
        assignment::is_reshuffling(current, next)
    }

    // ------------------
    // --- Booking
    // ------------------

    /// Atomically credits every entry of `map` to `app` within `view`, or
    /// leaves the view unchanged.
    ///
    /// Returns the booked copy of the map with the per-resource shares
    /// recorded. With `check_availability` disabled (and always while a
    /// sync session is open) entries carrying recorded shares are replayed
    /// exactly; a replay that cannot be satisfied is a contract violation
    /// reported as `Exhausted`.
    pub fn book_resources(&self, app: AppUid, map: &AssignmentMap, view: ViewToken, check_availability: bool) -> Result<AssignmentMap> {
        if map.is_empty() {
            return Err(Error::InvalidArgument(format!("[{}] empty assignment map", app)));
        }
        let mut guard = self.inner.write().expect("accounter lock poisoned");
        let sync_open = guard.sync.is_some();
        let Some(view_state) = guard.views.get_mut(&view) else {
            return Err(Error::NotFound(format!("{} not allocated", view)));
        };
        if view_state.apps.contains_key(&app) {
            return Err(Error::AlreadyPresent(format!("[{}] already booked in {}", app, view)));
        }

        // Availability is owned by the session while one is open.
        let check = check_availability && !sync_open;
        if check {
            for (path, assignment) in map {
                let available: u64 = assignment
                    .candidates
                    .iter()
                    .filter_map(|key| self.tree.get(*key))
                    .map(|handle| handle.read().expect("resource lock poisoned").available(view))
                    .sum();
                if available < assignment.amount {
                    return Err(Error::Exhausted(format!("[{}] '{}' requests {}, {} available", app, path, assignment.amount, available)));
                }
            }
        }

        let mut booked_map = AssignmentMap::new();
        for (path, assignment) in map {
            match self.do_resource_booking(app, view, view_state, assignment) {
                Ok(booked) => {
                    booked_map.insert(path.clone(), booked);
                }
                Err(e) => {
                    // Roll back everything drawn for the earlier entries.
                    for booked in booked_map.values() {
                        self.undo_shares(app, view, &booked.shares);
                    }
                    log::debug!("BookResources: [{}] rolled back in {}: {}", app, view, e);
                    return Err(e);
                }
            }
        }
        view_state.apps.insert(app, booked_map.clone());
        Ok(booked_map)
    }

    fn undo_shares(&self, app: AppUid, view: ViewToken, shares: &[BindingShare]) {
        for share in shares {
            if let Some(handle) = self.tree.get(share.resource) {
                handle.write().expect("resource lock poisoned").release_amount(app, view, share.amount);
            }
        }
    }

    /// Books one assignment: draws from each candidate in order the minimum
    /// of its availability and the outstanding amount. An entry with
    /// recorded shares is replayed exactly instead.
    fn do_resource_booking(&self, app: AppUid, view: ViewToken, view_state: &mut View, assignment: &ResourceAssignment) -> Result<ResourceAssignment> {
        let mut booked = ResourceAssignment::with_candidates(assignment.amount, assignment.candidates.clone());

        if !assignment.shares.is_empty() {
            for share in &assignment.shares {
                let Some(handle) = self.tree.get(share.resource) else {
                    self.undo_shares(app, view, &booked.shares);
                    return Err(Error::NotFound(format!("[{}] booked resource vanished", app)));
                };
                let drawn = handle.write().expect("resource lock poisoned").acquire(app, view, share.amount);
                if drawn != share.amount {
                    handle.write().expect("resource lock poisoned").release_amount(app, view, drawn);
                    self.undo_shares(app, view, &booked.shares);
                    return Err(Error::Exhausted(format!("[{}] cannot reproduce recorded share of {}", app, share.amount)));
                }
                view_state.touched.insert(share.resource);
                booked.shares.push(*share);
            }
            return Ok(booked);
        }

        let mut remaining = assignment.amount;
        for key in &assignment.candidates {
            if remaining == 0 {
                break;
            }
            let Some(handle) = self.tree.get(*key) else {
                continue;
            };
            let drawn = handle.write().expect("resource lock poisoned").acquire(app, view, remaining);
            if drawn > 0 {
                view_state.touched.insert(*key);
                booked.shares.push(BindingShare { resource: *key, amount: drawn });
                remaining -= drawn;
            }
        }
        if remaining > 0 {
            self.undo_shares(app, view, &booked.shares);
            return Err(Error::Exhausted(format!("[{}] {} still outstanding after the binding list", app, remaining)));
        }
        Ok(booked)
    }

    /// Returns everything `app` holds in `view`.
    pub fn release_resources(&self, app: AppUid, view: ViewToken) -> Result<()> {
        let mut guard = self.inner.write().expect("accounter lock poisoned");
        let Some(view_state) = guard.views.get_mut(&view) else {
            return Err(Error::NotFound(format!("{} not allocated", view)));
        };
        let Some(map) = view_state.apps.remove(&app) else {
            return Ok(());
        };
        for assignment in map.values() {
            for share in &assignment.shares {
                if let Some(handle) = self.tree.get(share.resource) {
                    handle.write().expect("resource lock poisoned").release(app, view);
                }
            }
        }
        log::debug!("ReleaseResources: [{}] released from {}", app, view);
        Ok(())
    }
}
