#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use rtrm::api::platform_dto::PlatformDto;
use rtrm::domain::accounter::accounter::ResourceAccounter;
use rtrm::domain::app::application_manager::ApplicationManager;
use rtrm::domain::app::recipe::{AwmTemplate, Recipe};
use rtrm::domain::platform::simulated::SimulatedPlatform;
use rtrm::domain::resource::resource_path::ResourcePath;
use rtrm::domain::resource::resource_tree::ResourceTree;
use rtrm::domain::rpc::application_proxy::ApplicationProxy;
use rtrm::domain::rpc::protocol::{RpcMessage, RpcResult};
use rtrm::domain::rpc::transport::ChannelSink;
use rtrm::domain::sync::synchronization_manager::SynchronizationManager;
use rtrm::loader::recipe_loader::RecipeLoader;

pub fn path(s: &str) -> ResourcePath {
    ResourcePath::parse(s).expect("bad test path")
}

/// Accounter over the standard test platform: two cpus with two
/// processing elements each (100 units apiece) plus one memory node.
pub fn accounter_with_platform() -> ResourceAccounter {
    let tree = ResourceTree::new();
    for p in ["sys0.cpu0.pe0", "sys0.cpu0.pe1", "sys0.cpu1.pe0", "sys0.cpu1.pe1"] {
        tree.register(path(p), "%", 100).unwrap();
    }
    tree.register(path("sys0.mem0"), "MB", 4096).unwrap();
    ResourceAccounter::new(tree)
}

/// Recipe with a single working mode requesting `amount` on `req_path`.
pub fn recipe_single(name: &str, req_path: &str, amount: u64) -> Arc<Recipe> {
    let mut requests = BTreeMap::new();
    requests.insert(path(req_path), amount);
    let wm = AwmTemplate { id: 0, name: "only".to_string(), value: 1.0, requests };
    Arc::new(Recipe::new(name, 1, vec![wm], BTreeMap::new(), Default::default()).unwrap())
}

/// Recipe with three working modes of increasing value and demand.
pub fn recipe_three(name: &str) -> Arc<Recipe> {
    let mut working_modes = Vec::new();
    for (id, value, amount) in [(0u8, 10.0f32, 50u64), (1, 25.0, 120), (2, 40.0, 200)] {
        let mut requests = BTreeMap::new();
        requests.insert(path("sys0.cpu*.pe*"), amount);
        working_modes.push(AwmTemplate { id, name: format!("wm{}", id), value, requests });
    }
    Arc::new(Recipe::new(name, 1, working_modes, BTreeMap::new(), Default::default()).unwrap())
}

/// How the mock runtime library reacts to the sync protocol.
#[derive(Debug, Clone, Copy)]
pub struct MockClientOptions {
    pub respond_prechange: bool,
    pub respond_syncchange: bool,
    pub respond_postchange: bool,
    pub latency_ms: u32,
}

impl Default for MockClientOptions {
    fn default() -> Self {
        Self { respond_prechange: true, respond_syncchange: true, respond_postchange: true, latency_ms: 5 }
    }
}

/// Pairs a mock runtime library with the proxy: commands written to the
/// connection are answered through the inbound record channel according
/// to the options.
pub fn connect_mock(proxy: &ApplicationProxy, inbound: mpsc::Sender<RpcMessage>, pid: i32, opts: MockClientOptions) -> thread::JoinHandle<()> {
    let (tx, rx) = mpsc::channel();
    proxy.connections().pair(pid, Arc::new(ChannelSink::new(tx)));
    thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            let reply = match &msg {
                RpcMessage::SyncPreChange { header, .. } if opts.respond_prechange => {
                    Some(RpcMessage::SyncPreChangeResp { header: *header, result: RpcResult::Ok, sync_latency_ms: opts.latency_ms })
                }
                RpcMessage::SyncChange { header } if opts.respond_syncchange => Some(RpcMessage::SyncChangeResp { header: *header, result: RpcResult::Ok }),
                RpcMessage::SyncPostChange { header } if opts.respond_postchange => {
                    Some(RpcMessage::SyncPostChangeResp { header: *header, result: RpcResult::Ok })
                }
                _ => None,
            };
            if let Some(reply) = reply {
                if inbound.send(reply).is_err() {
                    break;
                }
            }
        }
    })
}

/// The full synchronization stack over an in-process transport.
pub struct SyncStack {
    pub accounter: ResourceAccounter,
    pub app_manager: Arc<ApplicationManager>,
    pub proxy: Arc<ApplicationProxy>,
    pub platform: Arc<SimulatedPlatform>,
    pub sync_manager: SynchronizationManager,
    pub inbound: mpsc::Sender<RpcMessage>,
}

pub fn sync_stack(rpc_timeout: Duration) -> SyncStack {
    let accounter = accounter_with_platform();
    let app_manager = Arc::new(ApplicationManager::new(4));
    let (events_tx, _events_rx) = mpsc::channel();
    let recipe_loader = Arc::new(RecipeLoader::new("data/recipes", accounter.clone()));
    let proxy = Arc::new(ApplicationProxy::new(app_manager.clone(), accounter.clone(), recipe_loader, events_tx, rpc_timeout));

    let (inbound_tx, inbound_rx) = mpsc::channel();
    proxy.start(inbound_rx);

    let platform = Arc::new(SimulatedPlatform::new(PlatformDto { name: "test".to_string(), resources: vec![] }));
    let sync_manager = SynchronizationManager::new(
        app_manager.clone(),
        accounter.clone(),
        proxy.clone(),
        platform.clone(),
        None,
        Arc::new(AtomicBool::new(false)),
    );

    SyncStack { accounter, app_manager, proxy, platform, sync_manager, inbound: inbound_tx }
}
