use slotmap::new_key_type;
use std::collections::HashMap;

use crate::domain::accounter::view::ViewToken;
use crate::domain::resource::resource_path::ResourcePath;
use crate::domain::utils::id::AppUid;

new_key_type! {
    pub struct ResourceKey;
}

/// One node of the resource inventory.
///
/// A resource is created at registration time and never destroyed during a
/// run. Besides its static totals it carries, for every accounting view,
/// the amounts assigned to each application.
///
/// Invariants: `used(view) <= total - reserved` and
/// `available(view) = total - reserved - used(view)` (zero while offline).
#[derive(Debug, Clone)]
pub struct Resource {
    path: ResourcePath,
    units: String,
    total: u64,
    reserved: u64,
    offline: bool,
    by_view: HashMap<ViewToken, HashMap<AppUid, u64>>,
}

impl Resource {
    pub fn new(path: ResourcePath, units: impl Into<String>, total: u64) -> Self {
        Self { path, units: units.into(), total, reserved: 0, offline: false, by_view: HashMap::new() }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Updates the registered amount, e.g. after a platform refresh.
    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Amount not set aside by a reservation.
    pub fn unreserved(&self) -> u64 {
        self.total.saturating_sub(self.reserved)
    }

    /// Sets the reserved amount. Idempotent: reserving the same amount
    /// twice leaves the state unchanged. The amount is clamped to the
    /// total.
    pub fn reserve(&mut self, amount: u64) {
        self.reserved = amount.min(self.total);
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Marks the resource offline: availability drops to zero, the total is
    /// untouched. Idempotent.
    pub fn set_offline(&mut self) {
        self.offline = true;
    }

    /// Idempotent.
    pub fn set_online(&mut self) {
        self.offline = false;
    }

    /// Total amount assigned to applications within the given view.
    pub fn used(&self, view: ViewToken) -> u64 {
        self.by_view.get(&view).map(|m| m.values().sum()).unwrap_or(0)
    }

    /// Amount assigned to one application within the given view.
    pub fn used_by(&self, app: AppUid, view: ViewToken) -> u64 {
        self.by_view.get(&view).and_then(|m| m.get(&app)).copied().unwrap_or(0)
    }

    /// Amount still assignable within the given view.
    pub fn available(&self, view: ViewToken) -> u64 {
        if self.offline {
            return 0;
        }
        self.unreserved().saturating_sub(self.used(view))
    }

    /// Amount the given application could take within the view, i.e. the
    /// availability ignoring its own current assignment.
    pub fn available_for(&self, app: AppUid, view: ViewToken) -> u64 {
        if self.offline {
            return 0;
        }
        self.unreserved().saturating_sub(self.used(view).saturating_sub(self.used_by(app, view)))
    }

    /// Draws up to `amount` for `app` in `view`, bounded by the current
    /// availability. Returns the amount actually drawn.
    pub fn acquire(&mut self, app: AppUid, view: ViewToken, amount: u64) -> u64 {
        let drawn = amount.min(self.available(view));
        if drawn > 0 {
            *self.by_view.entry(view).or_default().entry(app).or_insert(0) += drawn;
        }
        drawn
    }

    /// Returns everything `app` holds on this resource in `view`.
    pub fn release(&mut self, app: AppUid, view: ViewToken) -> u64 {
        match self.by_view.get_mut(&view) {
            Some(m) => m.remove(&app).unwrap_or(0),
            None => 0,
        }
    }

    /// Returns part of what `app` holds, e.g. when a multi-entry booking
    /// is rolled back share by share.
    pub fn release_amount(&mut self, app: AppUid, view: ViewToken, amount: u64) -> u64 {
        let Some(per_app) = self.by_view.get_mut(&view) else {
            return 0;
        };
        let Some(held) = per_app.get_mut(&app) else {
            return 0;
        };
        let released = amount.min(*held);
        *held -= released;
        if *held == 0 {
            per_app.remove(&app);
        }
        released
    }

    /// Drops the whole per-view state of a released view.
    pub fn clear_view(&mut self, view: ViewToken) {
        self.by_view.remove(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accounter::view::SYSTEM_VIEW;

    fn pe0() -> Resource {
        Resource::new(ResourcePath::parse("sys0.cpu0.pe0").unwrap(), "%", 100)
    }

    #[test]
    fn acquire_is_bounded_by_availability() {
        let mut r = pe0();
        let a = AppUid::new(100, 0);
        let b = AppUid::new(200, 0);

        assert_eq!(r.acquire(a, SYSTEM_VIEW, 60), 60);
        assert_eq!(r.acquire(b, SYSTEM_VIEW, 60), 40);
        assert_eq!(r.used(SYSTEM_VIEW), 100);
        assert_eq!(r.available(SYSTEM_VIEW), 0);
    }

    #[test]
    fn views_are_isolated() {
        let mut r = pe0();
        let a = AppUid::new(100, 0);
        let candidate = ViewToken::from_label("candidate");

        r.acquire(a, candidate, 80);
        assert_eq!(r.used(SYSTEM_VIEW), 0);
        assert_eq!(r.used(candidate), 80);

        r.clear_view(candidate);
        assert_eq!(r.used(candidate), 0);
    }

    #[test]
    fn reserve_and_offline_are_idempotent() {
        let mut r = pe0();
        r.reserve(30);
        r.reserve(30);
        assert_eq!(r.unreserved(), 70);
        assert_eq!(r.available(SYSTEM_VIEW), 70);

        r.set_offline();
        r.set_offline();
        assert_eq!(r.available(SYSTEM_VIEW), 0);
        assert_eq!(r.total(), 100);

        r.set_online();
        assert_eq!(r.available(SYSTEM_VIEW), 70);
    }

    #[test]
    fn available_for_ignores_own_share() {
        let mut r = pe0();
        let a = AppUid::new(100, 0);
        let b = AppUid::new(200, 0);
        r.acquire(a, SYSTEM_VIEW, 40);
        r.acquire(b, SYSTEM_VIEW, 30);

        assert_eq!(r.available(SYSTEM_VIEW), 30);
        assert_eq!(r.available_for(a, SYSTEM_VIEW), 70);
        assert_eq!(r.available_for(b, SYSTEM_VIEW), 60);
    }
}
