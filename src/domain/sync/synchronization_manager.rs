use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::app::application::{Application, SyncState};
use crate::domain::app::application_manager::ApplicationManager;
use crate::domain::platform::platform_proxy::PlatformProxy;
use crate::domain::resource::assignment::AssignmentMap;
use crate::domain::resource::resource_path::InstanceId;
use crate::domain::resource::resource_type::ResourceType;
use crate::domain::rpc::application_proxy::ApplicationProxy;
use crate::domain::rpc::protocol::PreChangeSystem;
use crate::domain::utils::id::AppUid;
use crate::domain::utils::statistics::{StatParameter, StatisticEvent, StatsCollector};
use crate::error::{Error, Result};

/// Counters and samples collected across synchronization rounds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncMetrics {
    pub rounds: u64,
    pub sync_misses: u64,
    pub excs_reconfigured: u64,
    /// Worst sync latency declared by an application in the last round.
    pub last_round_latency_ms: u32,
}

/// Drives the four-phase synchronization protocol over a freshly
/// scheduled candidate view.
///
/// Applications are partitioned by sync sub-state and each sub-state is
/// processed as a batch: no application advances to phase N+1 until phase
/// N has been attempted on every application still in sync. A timeout or
/// platform failure disables the offending application and the round goes
/// on without it; the live view is promoted if and only if at least one
/// application completed its acquisition.
pub struct SynchronizationManager {
    app_manager: Arc<ApplicationManager>,
    accounter: ResourceAccounter,
    proxy: Arc<ApplicationProxy>,
    platform: Arc<dyn PlatformProxy>,
    stats: Option<Arc<StatsCollector>>,
    terminate: Arc<AtomicBool>,
    metrics: Mutex<SyncMetrics>,
}

impl SynchronizationManager {
    pub fn new(
        app_manager: Arc<ApplicationManager>,
        accounter: ResourceAccounter,
        proxy: Arc<ApplicationProxy>,
        platform: Arc<dyn PlatformProxy>,
        stats: Option<Arc<StatsCollector>>,
        terminate: Arc<AtomicBool>,
    ) -> Self {
        Self { app_manager, accounter, proxy, platform, stats, terminate, metrics: Mutex::new(SyncMetrics::default()) }
    }

    pub fn metrics(&self) -> SyncMetrics {
        *self.metrics.lock().expect("sync metrics lock poisoned")
    }

    /// Runs one synchronization round over every application in SYNC.
    pub fn sync_schedule(&self) -> Result<()> {
        if !self.app_manager.has_sync_apps() {
            log::debug!("SyncSchedule: no application to synchronize");
            return Ok(());
        }

        let round = {
            let mut m = self.metrics.lock().expect("sync metrics lock poisoned");
            m.rounds += 1;
            m.last_round_latency_ms = 0;
            m.rounds
        };
        log::info!("SyncSchedule: round {} START", round);
        let started = Instant::now();

        let running = self.app_manager.running_uids();
        self.accounter.sync_start(&running)?;

        let mut committed = 0u64;
        for sync_state in SyncState::PROTOCOL_ORDER {
            if self.terminate.load(Ordering::Acquire) {
                log::warn!("SyncSchedule: termination requested, aborting round {}", round);
                self.accounter.sync_abort()?;
                return Ok(());
            }
            let apps = self.app_manager.sync_apps(sync_state);
            if apps.is_empty() {
                continue;
            }
            log::info!("SyncSchedule: {} applications in SYNC/{}", apps.len(), sync_state);
            committed += self.sync_substate(round, sync_state, &apps)?;
        }

        let outcome = if committed > 0 {
            self.accounter.sync_commit()?;
            "committed"
        } else {
            self.accounter.sync_abort()?;
            "aborted"
        };

        let elapsed_ms = started.elapsed().as_millis() as i64;
        let metrics = {
            let mut m = self.metrics.lock().expect("sync metrics lock poisoned");
            m.excs_reconfigured += committed;
            *m
        };
        log::info!("SyncSchedule: round {} {} ({} EXCs, {} ms, {} misses total)", round, outcome, committed, elapsed_ms, metrics.sync_misses);
        if let Some(stats) = &self.stats {
            stats.log(
                StatisticEvent::new()
                    .set(StatParameter::LogDescription, format!("round {}", outcome))
                    .set(StatParameter::Round, round)
                    .set(StatParameter::ProcessingTime, elapsed_ms)
                    .set(StatParameter::SyncMisses, metrics.sync_misses)
                    .set(StatParameter::ExcsReconfigured, committed),
            );
        }
        Ok(())
    }

    /// Runs the full protocol over one sub-state batch. Returns the number
    /// of applications whose synchronization completed.
    fn sync_substate(&self, round: u64, sync_state: SyncState, apps: &[Arc<Application>]) -> Result<u64> {
        // STEP 1: pre-change. Collect the declared sync latencies.
        let step = Instant::now();
        let mut latencies: HashMap<AppUid, u32> = HashMap::new();
        for app in apps {
            if app.is_disabled() || !self.needs_notification(app) {
                continue;
            }
            let uid = app.uid();
            let (awm_id, systems) = match self.pre_change_payload(app) {
                Some(p) => p,
                None => continue,
            };
            log::info!("STEP 1: pre-change ===> [{}]", uid);
            match self.proxy.syncp_pre_change(uid, &sync_state.to_string(), awm_id, systems) {
                Ok(latency_ms) => {
                    log::info!("STEP 1: <=== OK [{}] declared latency {} ms", uid, latency_ms);
                    latencies.insert(uid, latency_ms);
                }
                Err(e) => self.disable_exc(app, "pre-change", &e),
            }
        }
        self.log_phase(round, sync_state, "pre-change", step);
        if let Some(worst) = latencies.values().max() {
            self.metrics.lock().expect("sync metrics lock poisoned").last_round_latency_ms = *worst;
        }

        // STEP M: platform enforcement. Failed applications are disabled
        // and filtered out of the remaining phases.
        let step = Instant::now();
        for app in apps {
            if app.is_disabled() {
                continue;
            }
            let uid = app.uid();
            if sync_state == SyncState::Blocked {
                if let Err(e) = self.platform.reclaim_resources(uid) {
                    log::warn!("STEP M: reclaim failed for [{}]: {}", uid, e);
                }
                continue;
            }
            let Some(map) = self.next_assignment(app) else {
                continue;
            };
            let mapped = self.platform.setup(uid).and_then(|_| self.platform.map_resources(uid, &map, false));
            if let Err(e) = mapped {
                self.disable_exc(app, "platform map", &e);
            }
        }
        self.log_phase(round, sync_state, "platform-map", step);

        // STEP 2: sync-change. Wait for each application to reach a safe
        // sync point.
        let step = Instant::now();
        for app in apps {
            if app.is_disabled() || !self.needs_notification(app) {
                continue;
            }
            log::info!("STEP 2: sync-change ===> [{}]", app.uid());
            if let Err(e) = self.proxy.syncp_sync_change(app.uid()) {
                self.disable_exc(app, "sync-change", &e);
            }
        }
        self.log_phase(round, sync_state, "sync-change", step);

        // STEP 3: do-change, fire and forget.
        let step = Instant::now();
        for app in apps {
            if app.is_disabled() || !self.needs_notification(app) {
                continue;
            }
            log::info!("STEP 3: do-change ===> [{}]", app.uid());
            if let Err(e) = self.proxy.syncp_do_change(app.uid()) {
                log::warn!("STEP 3: do-change failed for [{}]: {}", app.uid(), e);
            }
        }
        self.log_phase(round, sync_state, "do-change", step);

        // STEP 4: post-change, then resource acquisition (or promotion to
        // READY for blocked applications).
        let step = Instant::now();
        let mut committed = 0u64;
        for app in apps {
            if app.is_disabled() {
                continue;
            }
            let uid = app.uid();
            if self.needs_notification(app) {
                log::info!("STEP 4: post-change ===> [{}]", uid);
                if let Err(e) = self.proxy.syncp_post_change(uid) {
                    self.disable_exc(app, "post-change", &e);
                    continue;
                }
            }
            if sync_state == SyncState::Blocked {
                match app.schedule_commit() {
                    Ok(()) => committed += 1,
                    Err(e) => log::error!("STEP 4: blocked commit failed for [{}]: {}", uid, e),
                }
                continue;
            }
            let Some(map) = self.next_assignment(app) else {
                log::error!("STEP 4: [{}] lost its next working mode", uid);
                let _ = app.schedule_abort();
                continue;
            };
            match self.accounter.sync_acquire_resources(uid, &map) {
                Ok(_) => match app.schedule_commit() {
                    Ok(()) => committed += 1,
                    Err(e) => {
                        log::error!("STEP 4: commit failed for [{}]: {}", uid, e);
                        if let Some(session_view) = self.accounter.sync_view() {
                            let _ = self.accounter.release_resources(uid, session_view);
                        }
                    }
                },
                Err(e) => {
                    log::error!("STEP 4: acquisition failed for [{}]: {}", uid, e);
                    let _ = app.schedule_abort();
                }
            }
        }
        self.log_phase(round, sync_state, "post-change", step);

        Ok(committed)
    }

    /// Containers and reshuffling-only reconfigurations (same working
    /// mode, different fine-grained assignment) need no client
    /// notification: only the accounting and the platform mapping change.
    fn needs_notification(&self, app: &Arc<Application>) -> bool {
        if app.is_container() {
            return false;
        }
        let (Some(cur), Some(next)) = (app.current_awm(), app.next_awm()) else {
            return true;
        };
        let same_awm = {
            let cur = cur.read().expect("working mode lock poisoned");
            let next = next.read().expect("working mode lock poisoned");
            cur.id() == next.id()
        };
        !same_awm
    }

    fn next_assignment(&self, app: &Arc<Application>) -> Option<AssignmentMap> {
        let next = app.next_awm()?;
        let map = next.read().expect("working mode lock poisoned").scheduled().cloned();
        map
    }

    /// Builds the per-system quantities announced by a pre-change
    /// notification from the scheduled assignment map.
    fn pre_change_payload(&self, app: &Arc<Application>) -> Option<(u8, Vec<PreChangeSystem>)> {
        let next = app.next_awm()?;
        let next = next.read().expect("working mode lock poisoned");
        let map = next.scheduled()?;

        let mut systems: HashMap<u32, PreChangeSystem> = HashMap::new();
        for (path, assignment) in map {
            let sys_id = match path.instance_of(ResourceType::System) {
                Some(InstanceId::Id(n)) => n,
                _ => 0,
            };
            let entry = systems
                .entry(sys_id)
                .or_insert_with(|| PreChangeSystem { sys_id, cpu_ids: Vec::new(), cpu_quota: 0, proc_elements: 0, memory: 0, gpu_bandwidth: None, dev_id: None });
            if let Some(InstanceId::Id(cpu)) = path.instance_of(ResourceType::Cpu) {
                if !entry.cpu_ids.contains(&cpu) {
                    entry.cpu_ids.push(cpu);
                }
            }
            match path.target_type() {
                Some(ResourceType::ProcessingElement) => {
                    entry.cpu_quota += assignment.amount;
                    entry.proc_elements += assignment.candidates.len() as u64;
                }
                Some(ResourceType::Memory) => entry.memory += assignment.amount,
                Some(ResourceType::Gpu) => entry.gpu_bandwidth = Some(entry.gpu_bandwidth.unwrap_or(0) + assignment.amount),
                _ => {}
            }
        }
        let mut systems: Vec<_> = systems.into_values().collect();
        systems.sort_by_key(|s| s.sys_id);
        Some((next.id(), systems))
    }

    /// Failure policy shared by the RPC phases: disable the execution
    /// context, count a sync miss, carry on with the others.
    fn disable_exc(&self, app: &Arc<Application>, phase: &str, error: &Error) {
        log::warn!("STEP {}: <=== FAILED [{}]: {}", phase, app.uid(), error);
        self.metrics.lock().expect("sync metrics lock poisoned").sync_misses += 1;
        if let Err(e) = app.disable() {
            log::debug!("SyncSchedule: disable [{}] raced: {}", app.uid(), e);
        }
        let _ = self.platform.reclaim_resources(app.uid());
    }

    fn log_phase(&self, round: u64, sync_state: SyncState, phase: &str, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as i64;
        log::debug!("SyncSchedule: {} for SYNC/{} took {} ms", phase, sync_state, elapsed_ms);
        if let Some(stats) = &self.stats {
            stats.log(
                StatisticEvent::new()
                    .set(StatParameter::LogDescription, "phase")
                    .set(StatParameter::Round, round)
                    .set(StatParameter::Phase, phase)
                    .set(StatParameter::SyncState, sync_state.to_string())
                    .set(StatParameter::ProcessingTime, elapsed_ms),
            );
        }
    }
}
