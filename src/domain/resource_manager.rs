use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::app::application_manager::ApplicationManager;
use crate::domain::platform::platform_proxy::PlatformProxy;
use crate::domain::schedule::policy::SchedulerPolicy;
use crate::domain::sync::synchronization_manager::SynchronizationManager;
use crate::domain::system::SystemView;
use crate::domain::utils::id::AppUid;
use crate::error::Result;

/// Events that trigger (or batch up into) a scheduling round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtrmEvent {
    NewApplication(AppUid),
    ApplicationExited(AppUid),
    ConstraintsChanged(AppUid),
    PlatformRefresh,
    Shutdown,
}

/// The daemon main loop: collects events, runs the active policy over the
/// system view and hands the scheduled view to the synchronization
/// manager. A terminate flag is checked at round boundaries.
pub struct ResourceManager {
    system: SystemView,
    accounter: ResourceAccounter,
    app_manager: Arc<ApplicationManager>,
    platform: Arc<dyn PlatformProxy>,
    sync_manager: Arc<SynchronizationManager>,
    policy: Mutex<Box<dyn SchedulerPolicy>>,
    terminate: Arc<AtomicBool>,
    /// Events arriving within this window are coalesced into one round.
    settle_delay: Duration,
}

impl ResourceManager {
    pub fn new(
        system: SystemView,
        platform: Arc<dyn PlatformProxy>,
        sync_manager: Arc<SynchronizationManager>,
        policy: Box<dyn SchedulerPolicy>,
        terminate: Arc<AtomicBool>,
    ) -> Self {
        let accounter = system.accounter().clone();
        let app_manager = system.app_manager().clone();
        Self { system, accounter, app_manager, platform, sync_manager, policy: Mutex::new(policy), terminate, settle_delay: Duration::from_millis(50) }
    }

    pub fn terminate_flag(&self) -> Arc<AtomicBool> {
        self.terminate.clone()
    }

    /// One full scheduling round: policy evaluation over a fresh candidate
    /// view, then the synchronization protocol. The candidate view is
    /// always released afterwards; on a round-level failure the live view
    /// is untouched.
    pub fn schedule_round(&self) -> Result<()> {
        let policy_name = self.policy.lock().expect("policy lock poisoned").name();
        log::info!("Round: running policy '{}' over {} applications", policy_name, self.app_manager.count());

        let view = self.policy.lock().expect("policy lock poisoned").schedule(&self.system)?;
        let outcome = self.sync_manager.sync_schedule();

        // Applications re-assigned their current working mode needed no
        // synchronization; confirm them and drop the redundant next mode.
        for app in self.app_manager.in_state(crate::domain::app::application::AppState::Running) {
            if app.next_awm().is_some() {
                if let Err(e) = app.schedule_continue() {
                    log::debug!("Round: continue for [{}] failed: {}", app.uid(), e);
                }
            }
        }

        if let Err(e) = self.accounter.put_view(view) {
            log::debug!("Round: candidate view already gone: {}", e);
        }
        outcome
    }

    /// Blocks consuming events until a shutdown event arrives or the
    /// terminate flag is raised.
    pub fn run(&self, events: mpsc::Receiver<RtrmEvent>) {
        log::info!("ResourceManager: event loop started");
        while !self.terminate.load(Ordering::Acquire) {
            let event = match events.recv_timeout(Duration::from_millis(500)) {
                Ok(e) => e,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            };

            // Let a burst of registrations settle into a single round.
            std::thread::sleep(self.settle_delay);
            let mut shutdown = event == RtrmEvent::Shutdown;
            let mut refresh = event == RtrmEvent::PlatformRefresh;
            while let Ok(more) = events.try_recv() {
                match more {
                    RtrmEvent::Shutdown => shutdown = true,
                    RtrmEvent::PlatformRefresh => refresh = true,
                    _ => {}
                }
            }
            if shutdown {
                break;
            }
            if refresh {
                self.handle_platform_refresh();
            }
            if let Err(e) = self.schedule_round() {
                log::error!("Round failed: {}", e);
            }
        }
        self.terminate.store(true, Ordering::Release);
        log::info!("ResourceManager: event loop stopped");
    }

    /// Availabilities changed: re-register the platform and re-evaluate
    /// every application's hidden working modes.
    fn handle_platform_refresh(&self) {
        if let Err(e) = self.platform.refresh(&self.accounter) {
            log::error!("PlatformRefresh: {}", e);
            return;
        }
        for app in self.app_manager.all() {
            app.update_hidden_working_modes(&self.accounter);
        }
    }
}
