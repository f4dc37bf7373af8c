use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::time::Duration;

use crate::api::config_dto::ConfigDto;
use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::app::application_manager::ApplicationManager;
use crate::domain::platform::platform_proxy::PlatformProxy;
use crate::domain::platform::simulated::SimulatedPlatform;
use crate::domain::resource::resource_tree::ResourceTree;
use crate::domain::resource_manager::{ResourceManager, RtrmEvent};
use crate::domain::rpc::application_proxy::ApplicationProxy;
use crate::domain::rpc::protocol::RpcMessage;
use crate::domain::schedule::policy::PolicyRegistry;
use crate::domain::sync::synchronization_manager::SynchronizationManager;
use crate::domain::system::SystemView;
use crate::domain::utils::statistics::StatsCollector;
use crate::error::Result;
use crate::loader::parser::parse_json_file;
use crate::loader::recipe_loader::RecipeLoader;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// The assembled daemon: every long-lived component plus the channel
/// endpoints the transports and the main loop plug into.
///
/// Construction order follows the component lifecycles: platform data is
/// registered before any application exists, and everything is torn down
/// in reverse once the RPC worker stops.
pub struct RtrmDaemon {
    pub config: ConfigDto,
    pub accounter: ResourceAccounter,
    pub app_manager: Arc<ApplicationManager>,
    pub platform: Arc<dyn PlatformProxy>,
    pub proxy: Arc<ApplicationProxy>,
    pub sync_manager: Arc<SynchronizationManager>,
    pub resource_manager: Arc<ResourceManager>,
    pub events: mpsc::Sender<RtrmEvent>,
    pub rpc_inbound: mpsc::Sender<RpcMessage>,
    pub events_rx: mpsc::Receiver<RtrmEvent>,
    pub rpc_rx: mpsc::Receiver<RpcMessage>,
}

/// Builds the full daemon from a configuration file.
pub fn build_system(config_path: &str) -> Result<RtrmDaemon> {
    let config: ConfigDto = parse_json_file(config_path)?;
    log::info!("Configuration loaded from '{}' (policy '{}')", config_path, config.policy);
    build_system_from(config)
}

/// Builds the full daemon from an already parsed configuration.
pub fn build_system_from(config: ConfigDto) -> Result<RtrmDaemon> {
    let accounter = ResourceAccounter::new(ResourceTree::new());
    let platform: Arc<dyn PlatformProxy> = Arc::new(SimulatedPlatform::from_file(&config.platform_path)?);
    platform.load_platform_data(&accounter)?;

    let app_manager = Arc::new(ApplicationManager::new(config.lowest_priority));
    let recipe_loader = Arc::new(RecipeLoader::new(config.recipe_dir.clone(), accounter.clone()));

    let (events, events_rx) = mpsc::channel();
    let (rpc_inbound, rpc_rx) = mpsc::channel();
    let proxy = Arc::new(ApplicationProxy::new(
        app_manager.clone(),
        accounter.clone(),
        recipe_loader,
        events.clone(),
        Duration::from_millis(config.rpc_timeout_ms),
    ));

    let stats = config.stats_path.clone().map(|p| Arc::new(StatsCollector::init(Some(p))));
    let terminate = Arc::new(AtomicBool::new(false));
    let sync_manager = Arc::new(SynchronizationManager::new(
        app_manager.clone(),
        accounter.clone(),
        proxy.clone(),
        platform.clone(),
        stats,
        terminate.clone(),
    ));

    let system = SystemView::new(app_manager.clone(), accounter.clone());
    let contrib_config = contrib_config_from(&config);
    let mut registry = PolicyRegistry::with_builtins();
    registry.register("metric", move |sys| {
        Box::new(crate::domain::schedule::metric_policy::MetricPolicy::new(sys.accounter().clone(), contrib_config.clone()))
    });
    let policy = registry.create(&config.policy, &system)?;
    let resource_manager = Arc::new(ResourceManager::new(system, platform.clone(), sync_manager.clone(), policy, terminate));

    Ok(RtrmDaemon { config, accounter, app_manager, platform, proxy, sync_manager, resource_manager, events, rpc_inbound, events_rx, rpc_rx })
}

/// Maps the configuration file's tunables onto the contribution config.
fn contrib_config_from(config: &ConfigDto) -> crate::domain::schedule::contrib::ContribConfig {
    use crate::domain::resource::resource_type::ResourceType;
    use crate::domain::schedule::contrib::{ContribConfig, ContribType};

    let mut contrib = ContribConfig::default();
    contrib.expbase = config.expbase;
    for (name, weight) in &config.contrib_weights {
        let key = match name.as_str() {
            "value" => ContribType::Value,
            "reconfig" => ContribType::Reconfig,
            "fairness" => ContribType::Fairness,
            "migration" => ContribType::Migration,
            "congestion" => ContribType::Congestion,
            other => {
                log::warn!("Configuration: unknown contribution '{}'", other);
                continue;
            }
        };
        contrib.weights.insert(key, *weight);
    }
    for (type_name, level) in &config.max_saturation {
        match ResourceType::parse(type_name) {
            Some(r_type) => {
                contrib.msl.insert(r_type, *level);
            }
            None => log::warn!("Configuration: unknown resource type '{}'", type_name),
        }
    }
    contrib
}
