use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::accounter::view::ViewToken;
use crate::domain::app::constraints::{AwmBitset, AwmConstraintKind, ResourceBounds, ResourceConstraintMap, violates_resource_constraints};
use crate::domain::app::recipe::Recipe;
use crate::domain::app::working_mode::WorkingMode;
use crate::domain::resource::resource_type::ResourceType;
use crate::domain::utils::id::{AppUid, BindingRef};
use crate::error::{Error, Result};

/// Schedule states of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    Disabled,
    Ready,
    Sync,
    Running,
    Finished,
}

/// Synchronization sub-states; `None` if and only if the application is
/// not in `AppState::Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Starting,
    Reconf,
    Migrec,
    Migrate,
    Blocked,
    None,
}

impl SyncState {
    /// The order sub-states are processed by the synchronization protocol.
    pub const PROTOCOL_ORDER: [SyncState; 5] = [SyncState::Starting, SyncState::Reconf, SyncState::Migrec, SyncState::Migrate, SyncState::Blocked];
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Starting => "STARTING",
            SyncState::Reconf => "RECONF",
            SyncState::Migrec => "MIGREC",
            SyncState::Migrate => "MIGRATE",
            SyncState::Blocked => "BLOCKED",
            SyncState::None => "NONE",
        };
        write!(f, "{}", s)
    }
}

/// The schedule state block. Mutated only under the application state lock.
#[derive(Debug, Default)]
struct ScheduleState {
    state: AppState,
    pre_sync_state: AppState,
    sync_state: SyncState,
    current_awm: Option<Arc<RwLock<WorkingMode>>>,
    next_awm: Option<Arc<RwLock<WorkingMode>>>,
    count: u64,
    goal_gap_percent: i32,
}

impl Default for AppState {
    fn default() -> Self {
        AppState::Disabled
    }
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::None
    }
}

#[derive(Debug)]
struct ConstraintState {
    awm_bits: AwmBitset,
    resources: ResourceConstraintMap,
    /// Working modes currently selectable by a policy, sorted by ascending
    /// normalized value.
    enabled: Vec<Arc<RwLock<WorkingMode>>>,
}

/// One schedulable execution context.
///
/// Owns its working modes; every state transition and every read of the
/// schedule state block goes through the state lock. Constraint updates
/// use an independent lock and only peek at the schedule state to flag an
/// invalidated working mode.
#[derive(Debug)]
pub struct Application {
    uid: AppUid,
    name: String,
    priority: u8,
    language: String,
    is_container: bool,
    recipe: Arc<Recipe>,
    working_modes: Vec<Arc<RwLock<WorkingMode>>>,
    schedule: Mutex<ScheduleState>,
    state_changed: Condvar,
    constraints: Mutex<ConstraintState>,
    /// Set when a constraint update invalidated the committed working
    /// mode; consumed by the next policy run.
    current_invalid: std::sync::atomic::AtomicBool,
}

impl Application {
    pub fn new(uid: AppUid, name: impl Into<String>, recipe: Arc<Recipe>, lowest_priority: u8, language: impl Into<String>, is_container: bool, accounter: &ResourceAccounter) -> Arc<Self> {
        let priority = recipe.priority().min(lowest_priority);
        let working_modes: Vec<_> = recipe
            .working_modes()
            .iter()
            .map(|tmpl| {
                let mut wm = WorkingMode::from_template(tmpl, recipe.normalized_value(tmpl.id), uid);
                wm.update_hidden(accounter);
                Arc::new(RwLock::new(wm))
            })
            .collect();

        let mut resources = ResourceConstraintMap::new();
        for (path, sc) in recipe.constraints() {
            resources.insert(path.clone(), ResourceBounds { lower: sc.lower, upper: sc.upper });
        }

        let app = Arc::new(Self {
            uid,
            name: name.into(),
            priority,
            language: language.into(),
            is_container,
            recipe: recipe.clone(),
            working_modes,
            schedule: Mutex::new(ScheduleState::default()),
            state_changed: Condvar::new(),
            constraints: Mutex::new(ConstraintState { awm_bits: AwmBitset::new(recipe.working_mode_count()), resources, enabled: Vec::new() }),
            current_invalid: std::sync::atomic::AtomicBool::new(false),
        });
        app.rebuild_enabled();
        app
    }

    pub fn uid(&self) -> AppUid {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_container(&self) -> bool {
        self.is_container
    }

    pub fn recipe(&self) -> &Arc<Recipe> {
        &self.recipe
    }

    // ------------------
    // --- State queries
    // ------------------

    pub fn state(&self) -> AppState {
        self.schedule.lock().expect("state lock poisoned").state
    }

    pub fn sync_state(&self) -> SyncState {
        self.schedule.lock().expect("state lock poisoned").sync_state
    }

    pub fn pre_sync_state(&self) -> AppState {
        self.schedule.lock().expect("state lock poisoned").pre_sync_state
    }

    pub fn is_disabled(&self) -> bool {
        self.state() == AppState::Disabled
    }

    pub fn is_running(&self) -> bool {
        self.state() == AppState::Running
    }

    pub fn current_awm(&self) -> Option<Arc<RwLock<WorkingMode>>> {
        self.schedule.lock().expect("state lock poisoned").current_awm.clone()
    }

    pub fn next_awm(&self) -> Option<Arc<RwLock<WorkingMode>>> {
        self.schedule.lock().expect("state lock poisoned").next_awm.clone()
    }

    pub fn schedule_count(&self) -> u64 {
        self.schedule.lock().expect("state lock poisoned").count
    }

    pub fn goal_gap(&self) -> i32 {
        self.schedule.lock().expect("state lock poisoned").goal_gap_percent
    }

    /// Records the application-reported performance gap hint.
    pub fn set_goal_gap(&self, percent: i32) {
        self.schedule.lock().expect("state lock poisoned").goal_gap_percent = percent;
    }

    /// Blocks until the state block satisfies `pred` or the timeout
    /// elapses. Releases the state lock while waiting; every transition
    /// (including disable, which must wake blocked waiters) signals it.
    pub fn wait_state(&self, pred: impl Fn(AppState, SyncState) -> bool, timeout: std::time::Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut st = self.schedule.lock().expect("state lock poisoned");
        while !pred(st.state, st.sync_state) {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self.state_changed.wait_timeout(st, deadline - now).expect("state lock poisoned");
            st = next;
        }
        true
    }

    pub fn working_mode(&self, id: u8) -> Option<Arc<RwLock<WorkingMode>>> {
        self.working_modes.get(id as usize).cloned()
    }

    pub fn working_modes(&self) -> &[Arc<RwLock<WorkingMode>>] {
        &self.working_modes
    }

    // ------------------
    // --- Lifecycle
    // ------------------

    /// Valid only from DISABLED or FINISHED.
    pub fn enable(&self) -> Result<()> {
        let mut st = self.schedule.lock().expect("state lock poisoned");
        match st.state {
            AppState::Disabled | AppState::Finished => {
                self.set_state(&mut st, AppState::Ready, SyncState::None);
                log::info!("Enable: [{}] is READY", self.uid);
                Ok(())
            }
            other => Err(Error::Conflict(format!("[{}] cannot enable from {:?}", self.uid, other))),
        }
    }

    /// Valid from any non-DISABLED state. Clears the working modes and
    /// wakes any thread blocked on a sync notification.
    pub fn disable(&self) -> Result<()> {
        let mut st = self.schedule.lock().expect("state lock poisoned");
        if st.state == AppState::Disabled {
            return Err(Error::Conflict(format!("[{}] already disabled", self.uid)));
        }
        self.clear_working_modes(&mut st);
        self.set_state(&mut st, AppState::Disabled, SyncState::None);
        log::info!("Disable: [{}] is DISABLED", self.uid);
        Ok(())
    }

    /// Absorbing: no state is reachable from FINISHED except via enable().
    pub fn terminate(&self) {
        let mut st = self.schedule.lock().expect("state lock poisoned");
        self.clear_working_modes(&mut st);
        self.set_state(&mut st, AppState::Finished, SyncState::None);
        log::info!("Terminate: [{}] is FINISHED", self.uid);
    }

    // ------------------
    // --- Scheduling
    // ------------------

    /// Books the candidate binding `binding_ref` of working mode `awm_id`
    /// into `view`; on success records the next working mode and moves the
    /// application toward SYNC. A booking failure unschedules the
    /// application (it turns to SYNC/BLOCKED, recoverable by a later
    /// request).
    pub fn schedule_request(&self, awm_id: u8, binding_ref: BindingRef, accounter: &ResourceAccounter, view: ViewToken) -> Result<()> {
        let mut st = self.schedule.lock().expect("state lock poisoned");

        let Some(wm_handle) = self.working_mode(awm_id) else {
            return Err(Error::NotFound(format!("[{}] no working mode {}", self.uid, awm_id)));
        };

        // A previously failed scheduling left the application blocking;
        // reset for this new attempt.
        if st.state == AppState::Sync && st.sync_state == SyncState::Blocked {
            let pre = st.pre_sync_state;
            self.set_state(&mut st, pre, SyncState::None);
        }

        match st.state {
            AppState::Disabled | AppState::Finished => {
                return Err(Error::Conflict(format!("[{}] cannot schedule while {:?}", self.uid, st.state)));
            }
            AppState::Sync => {
                return Err(Error::Conflict(format!("[{}] already synchronizing", self.uid)));
            }
            _ => {}
        }

        let map = {
            let wm = wm_handle.read().expect("working mode lock poisoned");
            wm.binding(binding_ref).cloned().ok_or_else(|| Error::NotFound(format!("[{}] awm{} has no binding {}", self.uid, awm_id, binding_ref)))?
        };

        let booked = match accounter.book_resources(self.uid, &map, view, true) {
            Ok(b) => b,
            Err(e) => {
                log::debug!("ScheduleRequest: [{}] awm{} rejected: {}", self.uid, awm_id, e);
                self.unschedule_locked(&mut st);
                return Err(e);
            }
        };
        wm_handle.write().expect("working mode lock poisoned").set_scheduled(booked);

        let sync = match st.state {
            AppState::Ready => SyncState::Starting,
            AppState::Running => self.sync_required(&st, &wm_handle, accounter),
            _ => SyncState::Starting,
        };

        st.next_awm = Some(wm_handle.clone());
        self.current_invalid.store(false, std::sync::atomic::Ordering::Release);

        if sync == SyncState::None {
            // Same working mode, same binding: nothing to synchronize.
            log::debug!("ScheduleRequest: [{}] awm{} needs no sync", self.uid, awm_id);
            return Ok(());
        }

        self.set_state(&mut st, AppState::Sync, sync);
        log::info!("ScheduleRequest: [{}] awm{} -> SYNC/{}", self.uid, awm_id, sync);
        Ok(())
    }

    /// The sync sub-state a reconfiguration to `next` requires, comparing
    /// the committed binding of the current working mode with the
    /// scheduled binding of the next one.
    fn sync_required(&self, st: &ScheduleState, next: &Arc<RwLock<WorkingMode>>, accounter: &ResourceAccounter) -> SyncState {
        let Some(cur_handle) = st.current_awm.as_ref() else {
            return SyncState::Starting;
        };
        let cur = cur_handle.read().expect("working mode lock poisoned");
        let nxt = next.read().expect("working mode lock poisoned");

        let cur_set: BTreeSet<u32> = cur.committed_binding_set(ResourceType::Cpu);
        let nxt_set: BTreeSet<u32> = nxt.scheduled_binding_set(ResourceType::Cpu);

        if cur.id() != nxt.id() && cur_set != nxt_set {
            return SyncState::Migrec;
        }
        if cur.id() == nxt.id() && cur_set != nxt_set {
            return SyncState::Migrate;
        }
        if cur.id() != nxt.id() {
            return SyncState::Reconf;
        }
        // Same working mode, same binding-domain set: a finer-grained
        // difference in the per-resource assignments still requires a
        // reconfiguration.
        if let (Some(cur_map), Some(nxt_map)) = (cur.committed(), nxt.scheduled()) {
            if accounter.is_reshuffling(cur_map, nxt_map) {
                return SyncState::Reconf;
            }
        }
        SyncState::None
    }

    /// Requests the BLOCKED sub-state; idempotent while already blocking.
    pub fn unschedule(&self) -> Result<()> {
        let mut st = self.schedule.lock().expect("state lock poisoned");
        match (st.state, st.sync_state) {
            (AppState::Sync, SyncState::Blocked) => Ok(()),
            (AppState::Running | AppState::Ready, _) => {
                self.unschedule_locked(&mut st);
                Ok(())
            }
            (state, _) => Err(Error::Conflict(format!("[{}] cannot unschedule while {:?}", self.uid, state))),
        }
    }

    fn unschedule_locked(&self, st: &mut MutexGuard<'_, ScheduleState>) {
        if st.state == AppState::Sync && st.sync_state == SyncState::Blocked {
            return;
        }
        st.next_awm = None;
        self.set_state(st, AppState::Sync, SyncState::Blocked);
        log::debug!("Unschedule: [{}] -> SYNC/BLOCKED", self.uid);
    }

    /// Promotes `next_awm` to `current_awm` at the end of a successful
    /// synchronization. A BLOCKED application returns to READY with both
    /// working modes cleared; an application disabled or terminated
    /// meanwhile is silently dropped.
    pub fn schedule_commit(&self) -> Result<()> {
        let mut st = self.schedule.lock().expect("state lock poisoned");

        if st.state == AppState::Disabled || st.state == AppState::Finished {
            log::debug!("ScheduleCommit: [{}] left {:?}, dropping", self.uid, st.state);
            return Ok(());
        }
        if st.state != AppState::Sync {
            return Err(Error::Conflict(format!("[{}] commit outside SYNC", self.uid)));
        }

        match st.sync_state {
            SyncState::Starting | SyncState::Reconf | SyncState::Migrec | SyncState::Migrate => {
                let next = st.next_awm.take().ok_or_else(|| Error::Fatal(format!("[{}] SYNC/{} without a next working mode", self.uid, st.sync_state)))?;

                // Reset the goal gap when moving to a higher-valued mode.
                if let Some(cur) = st.current_awm.as_ref() {
                    let cur_v = cur.read().expect("working mode lock poisoned").value();
                    let nxt_v = next.read().expect("working mode lock poisoned").value();
                    if cur_v < nxt_v && st.goal_gap_percent != 0 {
                        log::debug!("ScheduleCommit: resetting goal gap ({}%) on [{}]", st.goal_gap_percent, self.uid);
                        st.goal_gap_percent = 0;
                    }
                }

                next.write().expect("working mode lock poisoned").commit_binding();
                st.current_awm = Some(next);
                st.count += 1;
                self.set_state(&mut st, AppState::Running, SyncState::None);
            }
            SyncState::Blocked => {
                self.clear_working_modes(&mut st);
                st.count += 1;
                self.set_state(&mut st, AppState::Ready, SyncState::None);
            }
            SyncState::None => {
                return Err(Error::Fatal(format!("[{}] SYNC with no sync sub-state", self.uid)));
            }
        }
        log::info!("ScheduleCommit: [{}] -> {:?} (round {})", self.uid, st.state, st.count);
        Ok(())
    }

    /// Legal only in SYNC: returns to READY dropping both working modes.
    pub fn schedule_abort(&self) -> Result<()> {
        let mut st = self.schedule.lock().expect("state lock poisoned");
        if st.state != AppState::Sync {
            return Err(Error::Conflict(format!("[{}] abort outside SYNC", self.uid)));
        }
        self.clear_working_modes(&mut st);
        self.set_state(&mut st, AppState::Ready, SyncState::None);
        log::warn!("ScheduleAbort: [{}] back to READY", self.uid);
        Ok(())
    }

    /// Legal only in RUNNING with `current_awm == next_awm`: confirms the
    /// current working mode and clears the redundant next one.
    pub fn schedule_continue(&self) -> Result<()> {
        let mut st = self.schedule.lock().expect("state lock poisoned");
        if st.state != AppState::Running {
            return Err(Error::Conflict(format!("[{}] continue outside RUNNING", self.uid)));
        }
        match (&st.current_awm, &st.next_awm) {
            (Some(cur), Some(next)) => {
                let same = cur.read().expect("working mode lock poisoned").id() == next.read().expect("working mode lock poisoned").id();
                if !same {
                    return Err(Error::Conflict(format!("[{}] continue with a different next working mode", self.uid)));
                }
            }
            (_, None) => return Ok(()),
            (None, _) => return Err(Error::Fatal(format!("[{}] RUNNING without a current working mode", self.uid))),
        }
        st.next_awm = None;
        Ok(())
    }

    // ------------------
    // --- Constraints
    // ------------------

    /// Asserts or removes one working mode range constraint, then rebuilds
    /// the enabled list.
    pub fn set_awm_constraint(&self, kind: AwmConstraintKind, awm_id: u8, add: bool) -> Result<()> {
        if awm_id as usize >= self.working_modes.len() {
            return Err(Error::NotFound(format!("[{}] no working mode {}", self.uid, awm_id)));
        }
        {
            let mut cs = self.constraints.lock().expect("constraints lock poisoned");
            match (kind, add) {
                (AwmConstraintKind::LowerBound, true) => cs.awm_bits.set_lower_bound(awm_id),
                (AwmConstraintKind::LowerBound, false) => cs.awm_bits.clear_lower_bound(),
                (AwmConstraintKind::UpperBound, true) => cs.awm_bits.set_upper_bound(awm_id),
                (AwmConstraintKind::UpperBound, false) => cs.awm_bits.clear_upper_bound(),
                (AwmConstraintKind::Exact, enable) => cs.awm_bits.set_exact(awm_id, enable),
            }
        }
        self.rebuild_enabled();
        Ok(())
    }

    /// Sets per-path resource bounds, then rebuilds the enabled list.
    pub fn set_resource_constraint(&self, path: crate::domain::resource::resource_path::ResourcePath, bounds: ResourceBounds) {
        self.constraints.lock().expect("constraints lock poisoned").resources.insert(path, bounds);
        self.rebuild_enabled();
    }

    pub fn clear_resource_constraint(&self, path: &crate::domain::resource::resource_path::ResourcePath) {
        self.constraints.lock().expect("constraints lock poisoned").resources.remove(path);
        self.rebuild_enabled();
    }

    /// Clears every dynamic constraint (the recipe's static bounds are
    /// re-installed).
    pub fn clear_constraints(&self) {
        {
            let mut cs = self.constraints.lock().expect("constraints lock poisoned");
            cs.awm_bits = AwmBitset::new(self.working_modes.len());
            cs.resources.clear();
            for (path, sc) in self.recipe.constraints() {
                cs.resources.insert(path.clone(), ResourceBounds { lower: sc.lower, upper: sc.upper });
            }
        }
        self.rebuild_enabled();
    }

    /// Working modes a policy may select, sorted by ascending normalized
    /// value.
    pub fn enabled_working_modes(&self) -> Vec<Arc<RwLock<WorkingMode>>> {
        self.constraints.lock().expect("constraints lock poisoned").enabled.clone()
    }

    /// True when a constraint update invalidated the committed working
    /// mode. Consumed (reset) by the next successful schedule request.
    pub fn is_current_awm_invalid(&self) -> bool {
        self.current_invalid.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Re-evaluates the hidden flags after a platform change, then rebuilds
    /// the enabled list.
    pub fn update_hidden_working_modes(&self, accounter: &ResourceAccounter) {
        for handle in &self.working_modes {
            handle.write().expect("working mode lock poisoned").update_hidden(accounter);
        }
        self.rebuild_enabled();
    }

    fn rebuild_enabled(&self) {
        // Read the committed working mode before taking the constraints
        // lock; the schedule lock is never taken under it.
        let current_id = self.schedule.lock().expect("state lock poisoned").current_awm.as_ref().map(|wm| wm.read().expect("working mode lock poisoned").id());

        let mut cs = self.constraints.lock().expect("constraints lock poisoned");
        let mut enabled: Vec<Arc<RwLock<WorkingMode>>> = Vec::new();
        for handle in &self.working_modes {
            let wm = handle.read().expect("working mode lock poisoned");
            if !cs.awm_bits.is_enabled(wm.id()) || wm.is_hidden() {
                continue;
            }
            if violates_resource_constraints(wm.requests(), &cs.resources) {
                continue;
            }
            enabled.push(handle.clone());
        }
        enabled.sort_by(|a, b| {
            let va = a.read().expect("working mode lock poisoned").norm_value();
            let vb = b.read().expect("working mode lock poisoned").norm_value();
            va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(id) = current_id {
            let still_enabled = enabled.iter().any(|wm| wm.read().expect("working mode lock poisoned").id() == id);
            if !still_enabled {
                log::info!("Constraints: [{}] current awm{} invalidated", self.uid, id);
                self.current_invalid.store(true, std::sync::atomic::Ordering::Release);
            }
        }
        cs.enabled = enabled;
    }

    // ------------------
    // --- Internals
    // ------------------

    /// Transition helper maintaining the SYNC invariants: entering SYNC
    /// captures the pre-sync state, leaving it clears the sub-state.
    fn set_state(&self, st: &mut MutexGuard<'_, ScheduleState>, state: AppState, sync: SyncState) {
        debug_assert_eq!(state == AppState::Sync, sync != SyncState::None);
        if state == AppState::Sync && st.state != AppState::Sync {
            st.pre_sync_state = st.state;
        }
        st.state = state;
        st.sync_state = sync;
        self.state_changed.notify_all();
    }

    fn clear_working_modes(&self, st: &mut MutexGuard<'_, ScheduleState>) {
        if let Some(wm) = st.current_awm.take() {
            let mut wm = wm.write().expect("working mode lock poisoned");
            wm.clear_committed();
            wm.clear_scheduled();
        }
        if let Some(wm) = st.next_awm.take() {
            let mut wm = wm.write().expect("working mode lock poisoned");
            wm.clear_scheduled();
            wm.clear_bindings();
        }
    }
}
