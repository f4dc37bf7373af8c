use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::app::application_manager::ApplicationManager;
use crate::domain::app::constraints::{AwmConstraintKind, ResourceBounds};
use crate::domain::resource::resource_path::ResourcePath;
use crate::domain::rpc::command_session::SessionRegistry;
use crate::domain::rpc::protocol::{ConstraintRequest, MessageHeader, PreChangeSystem, RpcMessage, RpcResult};
use crate::domain::rpc::transport::ConnectionRegistry;
use crate::domain::resource_manager::RtrmEvent;
use crate::domain::utils::id::AppUid;
use crate::error::{Error, Result};
use crate::loader::recipe_loader::RecipeLoader;

struct ProxyInner {
    sessions: SessionRegistry,
    connections: ConnectionRegistry,
    rpc_timeout: Duration,
    app_manager: Arc<ApplicationManager>,
    accounter: ResourceAccounter,
    recipe_loader: Arc<RecipeLoader>,
    events: mpsc::Sender<RtrmEvent>,
    terminate: AtomicBool,
}

/// Message router between the RPC transport and the rest of the daemon.
///
/// A worker thread polls the inbound channel: request records fan out to
/// short-lived executors calling into the application manager, response
/// records are matched to their command session by the token in the
/// header and handed to the waiting synchronization-manager thread.
pub struct ApplicationProxy {
    inner: Arc<ProxyInner>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ApplicationProxy {
    pub fn new(
        app_manager: Arc<ApplicationManager>,
        accounter: ResourceAccounter,
        recipe_loader: Arc<RecipeLoader>,
        events: mpsc::Sender<RtrmEvent>,
        rpc_timeout: Duration,
    ) -> Self {
        let inner = ProxyInner {
            sessions: SessionRegistry::new(),
            connections: ConnectionRegistry::new(),
            rpc_timeout,
            app_manager,
            accounter,
            recipe_loader,
            events,
            terminate: AtomicBool::new(false),
        };
        Self { inner: Arc::new(inner), dispatcher: Mutex::new(None) }
    }

    pub fn connections(&self) -> ConnectionRegistry {
        self.inner.connections.clone()
    }

    /// Spawns the dispatcher thread over the inbound record channel.
    pub fn start(&self, rx: mpsc::Receiver<RpcMessage>) {
        let inner = self.inner.clone();
        let handle = std::thread::Builder::new()
            .name("rtrm-dispatcher".to_string())
            .spawn(move || {
                log::info!("Dispatcher: started");
                while !inner.terminate.load(Ordering::Acquire) {
                    match rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(msg) => Self::dispatch(&inner, msg),
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::info!("Dispatcher: stopped");
            })
            .expect("failed to spawn the dispatcher thread");
        *self.dispatcher.lock().expect("dispatcher handle lock poisoned") = Some(handle);
    }

    /// Stops the dispatcher and fails every outstanding command session.
    pub fn stop(&self) {
        self.inner.terminate.store(true, Ordering::Release);
        self.inner.sessions.close_all();
        if let Some(handle) = self.dispatcher.lock().expect("dispatcher handle lock poisoned").take() {
            let _ = handle.join();
        }
    }

    fn dispatch(inner: &Arc<ProxyInner>, msg: RpcMessage) {
        if msg.is_response() {
            let token = msg.header().token;
            if !inner.sessions.notify(token, msg) {
                log::debug!("Dispatcher: dropping late reply for {}", token);
            }
            return;
        }
        // Requests run on a short-lived executor so a slow recipe load or
        // state transition never stalls the dispatch loop.
        let inner = inner.clone();
        std::thread::spawn(move || {
            if let Err(e) = Self::handle_request(&inner, msg) {
                log::warn!("Dispatcher: request failed: {}", e);
            }
        });
    }

    fn handle_request(inner: &ProxyInner, msg: RpcMessage) -> Result<()> {
        let uid = msg.header().app;
        match msg {
            RpcMessage::AppPair { app_name, .. } => {
                log::info!("Proxy: paired application '{}' ({})", app_name, uid.pid);
                Ok(())
            }
            RpcMessage::ExcRegister { name, recipe, language, .. } => {
                let recipe = inner.recipe_loader.load(&name, &recipe, false)?;
                inner.app_manager.register(uid, &name, recipe, &language, false, &inner.accounter)?;
                Ok(())
            }
            RpcMessage::ExcUnregister { .. } => {
                inner.app_manager.unregister(uid, &inner.accounter)?;
                let _ = inner.events.send(RtrmEvent::ApplicationExited(uid));
                Ok(())
            }
            RpcMessage::ExcStart { .. } => {
                let app = inner.app_manager.get(uid).ok_or_else(|| Error::NotFound(format!("[{}] not registered", uid)))?;
                app.enable()?;
                let _ = inner.events.send(RtrmEvent::NewApplication(uid));
                Ok(())
            }
            RpcMessage::ExcStop { .. } => {
                let app = inner.app_manager.get(uid).ok_or_else(|| Error::NotFound(format!("[{}] not registered", uid)))?;
                app.disable()?;
                inner.accounter.release_resources(uid, inner.accounter.live_view())?;
                let _ = inner.events.send(RtrmEvent::ApplicationExited(uid));
                Ok(())
            }
            RpcMessage::ExcSchedule { .. } => {
                let _ = inner.events.send(RtrmEvent::NewApplication(uid));
                Ok(())
            }
            RpcMessage::AppExit { .. } => {
                for app in inner.app_manager.all() {
                    if app.uid().pid == uid.pid {
                        let _ = inner.app_manager.unregister(app.uid(), &inner.accounter);
                    }
                }
                inner.connections.unpair(uid.pid);
                let _ = inner.events.send(RtrmEvent::ApplicationExited(uid));
                Ok(())
            }
            RpcMessage::ExcSetConstraints { constraints, .. } => {
                let app = inner.app_manager.get(uid).ok_or_else(|| Error::NotFound(format!("[{}] not registered", uid)))?;
                for constraint in constraints {
                    match constraint {
                        ConstraintRequest::AwmLowerBound { awm_id, add } => app.set_awm_constraint(AwmConstraintKind::LowerBound, awm_id, add)?,
                        ConstraintRequest::AwmUpperBound { awm_id, add } => app.set_awm_constraint(AwmConstraintKind::UpperBound, awm_id, add)?,
                        ConstraintRequest::AwmExact { awm_id, enable } => app.set_awm_constraint(AwmConstraintKind::Exact, awm_id, enable)?,
                        ConstraintRequest::Resource { path, lower, upper } => {
                            let path = ResourcePath::parse(&path).ok_or_else(|| Error::InvalidArgument(format!("bad path '{}'", path)))?;
                            app.set_resource_constraint(path, ResourceBounds { lower, upper });
                        }
                    }
                }
                let _ = inner.events.send(RtrmEvent::ConstraintsChanged(uid));
                Ok(())
            }
            RpcMessage::ExcClearConstraints { .. } => {
                let app = inner.app_manager.get(uid).ok_or_else(|| Error::NotFound(format!("[{}] not registered", uid)))?;
                app.clear_constraints();
                let _ = inner.events.send(RtrmEvent::ConstraintsChanged(uid));
                Ok(())
            }
            RpcMessage::ExcRuntimeNotify { goal_gap_percent, cpu_usage, cycle_time_ms, .. } => {
                log::debug!("Proxy: [{}] runtime profile gap={}% cpu={:.1} cycle={}ms", uid, goal_gap_percent, cpu_usage, cycle_time_ms);
                inner.app_manager.set_runtime_profile(uid, goal_gap_percent)
            }
            other => {
                log::warn!("Proxy: unexpected request {:?}", other);
                Ok(())
            }
        }
    }

    // ------------------
    // --- Synchronization protocol commands
    // ------------------

    /// Notifies the next working mode and its assigned quantities,
    /// soliciting the application's sync-latency estimate.
    pub fn syncp_pre_change(&self, uid: AppUid, sync_state: &str, awm_id: u8, systems: Vec<PreChangeSystem>) -> Result<u32> {
        let (token, gate) = self.inner.sessions.open();
        let msg = RpcMessage::SyncPreChange {
            header: MessageHeader::new(token, uid),
            sync_state: sync_state.to_string(),
            awm_id,
            systems,
        };
        let reply = self.send_and_wait(uid, token, msg, gate);
        match reply? {
            RpcMessage::SyncPreChangeResp { result: RpcResult::Ok, sync_latency_ms, .. } => Ok(sync_latency_ms),
            RpcMessage::SyncPreChangeResp { .. } => Err(Error::RpcChannel(format!("[{}] pre-change refused", uid))),
            other => Err(Error::RpcChannel(format!("[{}] mismatched reply {:?}", uid, other))),
        }
    }

    /// Blocks until the application signals it reached a safe sync point.
    pub fn syncp_sync_change(&self, uid: AppUid) -> Result<()> {
        let (token, gate) = self.inner.sessions.open();
        let msg = RpcMessage::SyncChange { header: MessageHeader::new(token, uid) };
        match self.send_and_wait(uid, token, msg, gate)? {
            RpcMessage::SyncChangeResp { result: RpcResult::Ok, .. } => Ok(()),
            RpcMessage::SyncChangeResp { .. } => Err(Error::RpcChannel(format!("[{}] sync-change refused", uid))),
            other => Err(Error::RpcChannel(format!("[{}] mismatched reply {:?}", uid, other))),
        }
    }

    /// Fire-and-forget: tells the application to commit the new mode.
    pub fn syncp_do_change(&self, uid: AppUid) -> Result<()> {
        let (token, _gate) = self.inner.sessions.open();
        let msg = RpcMessage::SyncDoChange { header: MessageHeader::new(token, uid) };
        let result = self.inner.connections.sink(uid.pid).and_then(|sink| sink.send(msg));
        self.inner.sessions.release(token);
        result
    }

    /// Waits for the reconfiguration-complete acknowledgement.
    pub fn syncp_post_change(&self, uid: AppUid) -> Result<()> {
        let (token, gate) = self.inner.sessions.open();
        let msg = RpcMessage::SyncPostChange { header: MessageHeader::new(token, uid) };
        match self.send_and_wait(uid, token, msg, gate)? {
            RpcMessage::SyncPostChangeResp { result: RpcResult::Ok, .. } => Ok(()),
            RpcMessage::SyncPostChangeResp { .. } => Err(Error::RpcChannel(format!("[{}] post-change refused", uid))),
            other => Err(Error::RpcChannel(format!("[{}] mismatched reply {:?}", uid, other))),
        }
    }

    /// Asks a paired application to stop within the given grace period.
    pub fn stop_execution(&self, uid: AppUid, timeout_ms: u32) -> Result<()> {
        let (token, _gate) = self.inner.sessions.open();
        let msg = RpcMessage::StopExecution { header: MessageHeader::new(token, uid), timeout_ms };
        let result = self.inner.connections.sink(uid.pid).and_then(|sink| sink.send(msg));
        self.inner.sessions.release(token);
        result
    }

    /// Requests the runtime profile of a paired application.
    pub fn get_profile(&self, uid: AppUid) -> Result<(i32, f32, u32)> {
        let (token, gate) = self.inner.sessions.open();
        let msg = RpcMessage::GetProfile { header: MessageHeader::new(token, uid) };
        match self.send_and_wait(uid, token, msg, gate)? {
            RpcMessage::GetProfileResp { goal_gap_percent, cpu_usage, cycle_time_ms, .. } => Ok((goal_gap_percent, cpu_usage, cycle_time_ms)),
            other => Err(Error::RpcChannel(format!("[{}] mismatched reply {:?}", uid, other))),
        }
    }

    fn send_and_wait(
        &self,
        uid: AppUid,
        token: crate::domain::utils::id::SessionToken,
        msg: RpcMessage,
        gate: Arc<crate::domain::rpc::command_session::CommandGate>,
    ) -> Result<RpcMessage> {
        let sent = self.inner.connections.sink(uid.pid).and_then(|sink| sink.send(msg));
        if let Err(e) = sent {
            self.inner.sessions.release(token);
            return Err(e);
        }
        let reply = gate.wait_with_timeout(self.inner.rpc_timeout);
        self.inner.sessions.release(token);
        reply
    }
}
