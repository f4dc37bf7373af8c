mod common;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use common::{MockClientOptions, accounter_with_platform, connect_mock, path, recipe_three};

use rtrm::api::platform_dto::PlatformDto;
use rtrm::domain::app::application::AppState;
use rtrm::domain::app::constraints::AwmConstraintKind;
use rtrm::domain::platform::platform_proxy::PlatformProxy;
use rtrm::domain::platform::simulated::SimulatedPlatform;
use rtrm::domain::resource_manager::ResourceManager;
use rtrm::domain::rpc::application_proxy::ApplicationProxy;
use rtrm::domain::schedule::contrib::ContribConfig;
use rtrm::domain::schedule::metric_policy::MetricPolicy;
use rtrm::domain::sync::synchronization_manager::SynchronizationManager;
use rtrm::domain::system::SystemView;
use rtrm::domain::utils::id::AppUid;
use rtrm::loader::recipe_loader::RecipeLoader;

struct Round {
    manager: ResourceManager,
    accounter: rtrm::domain::accounter::accounter::ResourceAccounter,
    app_manager: Arc<rtrm::domain::app::application_manager::ApplicationManager>,
    proxy: Arc<ApplicationProxy>,
    inbound: mpsc::Sender<rtrm::domain::rpc::protocol::RpcMessage>,
}

fn round_stack() -> Round {
    let accounter = accounter_with_platform();
    let app_manager = Arc::new(rtrm::domain::app::application_manager::ApplicationManager::new(4));
    let (events_tx, _events_rx) = mpsc::channel();
    let loader = Arc::new(RecipeLoader::new("data/recipes", accounter.clone()));
    let proxy = Arc::new(ApplicationProxy::new(app_manager.clone(), accounter.clone(), loader, events_tx, Duration::from_millis(300)));
    let (inbound_tx, inbound_rx) = mpsc::channel();
    proxy.start(inbound_rx);

    let platform: Arc<dyn PlatformProxy> = Arc::new(SimulatedPlatform::new(PlatformDto { name: "test".to_string(), resources: vec![] }));
    let terminate = Arc::new(AtomicBool::new(false));
    let sync_manager = Arc::new(SynchronizationManager::new(
        app_manager.clone(),
        accounter.clone(),
        proxy.clone(),
        platform.clone(),
        None,
        terminate.clone(),
    ));

    let system = SystemView::new(app_manager.clone(), accounter.clone());
    let policy = Box::new(MetricPolicy::new(accounter.clone(), ContribConfig::default()));
    let manager = ResourceManager::new(system, platform, sync_manager, policy, terminate);

    Round { manager, accounter, app_manager, proxy, inbound: inbound_tx }
}

#[test]
fn a_full_round_takes_an_application_from_ready_to_running() {
    let stack = round_stack();
    let uid = AppUid::new(100, 0);
    connect_mock(&stack.proxy, stack.inbound.clone(), uid.pid, MockClientOptions::default());

    let app = stack.app_manager.register(uid, "tri", recipe_three("tri"), "C", false, &stack.accounter).unwrap();
    app.enable().unwrap();

    stack.manager.schedule_round().unwrap();

    assert_eq!(app.state(), AppState::Running);
    // The highest-valued mode fits an empty platform.
    assert_eq!(app.current_awm().unwrap().read().unwrap().id(), 2);
    assert_eq!(stack.accounter.used(&path("sys0.cpu*.pe*"), stack.accounter.live_view()), 200);

    stack.proxy.stop();
}

#[test]
fn an_invalidating_constraint_migrates_on_the_next_round() {
    let stack = round_stack();
    let uid = AppUid::new(100, 0);
    connect_mock(&stack.proxy, stack.inbound.clone(), uid.pid, MockClientOptions::default());

    let app = stack.app_manager.register(uid, "tri", recipe_three("tri"), "C", false, &stack.accounter).unwrap();
    app.enable().unwrap();
    stack.manager.schedule_round().unwrap();
    assert_eq!(app.current_awm().unwrap().read().unwrap().id(), 2);

    // Cap the application below its committed mode.
    app.set_awm_constraint(AwmConstraintKind::UpperBound, 1, true).unwrap();
    assert!(app.is_current_awm_invalid());

    stack.manager.schedule_round().unwrap();

    assert_eq!(app.state(), AppState::Running);
    let committed = app.current_awm().unwrap().read().unwrap().id();
    assert!(committed <= 1, "still running the invalidated mode");
    assert!(!app.is_current_awm_invalid());
    // The live view follows the migration.
    let used = stack.accounter.used(&path("sys0.cpu*.pe*"), stack.accounter.live_view());
    assert!(used == 50 || used == 120, "unexpected live usage {}", used);

    stack.proxy.stop();
}

#[test]
fn consecutive_rounds_without_changes_are_stable() {
    let stack = round_stack();
    let uid = AppUid::new(100, 0);
    connect_mock(&stack.proxy, stack.inbound.clone(), uid.pid, MockClientOptions::default());

    let app = stack.app_manager.register(uid, "tri", recipe_three("tri"), "C", false, &stack.accounter).unwrap();
    app.enable().unwrap();

    stack.manager.schedule_round().unwrap();
    let first = app.current_awm().unwrap().read().unwrap().id();
    let count_after_first = app.schedule_count();

    stack.manager.schedule_round().unwrap();

    // Re-running without an intervening change keeps the assignment.
    assert_eq!(app.state(), AppState::Running);
    assert_eq!(app.current_awm().unwrap().read().unwrap().id(), first);
    assert!(app.next_awm().is_none());
    assert_eq!(stack.accounter.used(&path("sys0.cpu*.pe*"), stack.accounter.live_view()), 200);
    assert!(app.schedule_count() >= count_after_first);

    stack.proxy.stop();
}
