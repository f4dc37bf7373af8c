mod common;

use std::sync::mpsc;
use std::time::Duration;

use common::{MockClientOptions, connect_mock, sync_stack};

use rtrm::domain::app::application::AppState;
use rtrm::domain::resource_manager::RtrmEvent;
use rtrm::domain::rpc::protocol::{ConstraintRequest, MessageHeader, RpcMessage};
use rtrm::domain::utils::id::{AppUid, SessionToken};

fn header(uid: AppUid) -> MessageHeader {
    MessageHeader::new(SessionToken(0), uid)
}

/// Polls until the predicate holds; the dispatcher hands requests to
/// short-lived executors, so effects are asynchronous.
fn eventually(pred: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pred()
}

#[test]
fn register_start_and_profile_flow_through_the_dispatcher() {
    let stack = sync_stack(Duration::from_millis(300));
    let uid = AppUid::new(100, 0);
    connect_mock(&stack.proxy, stack.inbound.clone(), uid.pid, MockClientOptions::default());

    stack.inbound.send(RpcMessage::AppPair { header: header(uid), app_name: "demo-app".to_string() }).unwrap();
    stack
        .inbound
        .send(RpcMessage::ExcRegister { header: header(uid), name: "demo-app".to_string(), recipe: "demo".to_string(), language: "C".to_string() })
        .unwrap();

    assert!(eventually(|| stack.app_manager.get(uid).is_some()), "registration never landed");
    let app = stack.app_manager.get(uid).unwrap();
    assert_eq!(app.state(), AppState::Disabled);
    // The demo recipe carries three working modes.
    assert_eq!(app.working_modes().len(), 3);

    stack.inbound.send(RpcMessage::ExcStart { header: header(uid) }).unwrap();
    assert!(eventually(|| app.state() == AppState::Ready));

    stack.inbound.send(RpcMessage::ExcRuntimeNotify { header: header(uid), goal_gap_percent: 25, cpu_usage: 80.0, cycle_time_ms: 16 }).unwrap();
    assert!(eventually(|| app.goal_gap() == 25));

    stack.proxy.stop();
}

#[test]
fn constraint_requests_rebuild_the_enabled_list() {
    let stack = sync_stack(Duration::from_millis(300));
    let uid = AppUid::new(100, 0);
    connect_mock(&stack.proxy, stack.inbound.clone(), uid.pid, MockClientOptions::default());

    stack
        .inbound
        .send(RpcMessage::ExcRegister { header: header(uid), name: "demo-app".to_string(), recipe: "demo".to_string(), language: "C".to_string() })
        .unwrap();
    assert!(eventually(|| stack.app_manager.get(uid).is_some()));
    let app = stack.app_manager.get(uid).unwrap();

    stack
        .inbound
        .send(RpcMessage::ExcSetConstraints { header: header(uid), constraints: vec![ConstraintRequest::AwmUpperBound { awm_id: 1, add: true }] })
        .unwrap();
    assert!(eventually(|| app.enabled_working_modes().len() == 2));

    stack.inbound.send(RpcMessage::ExcClearConstraints { header: header(uid) }).unwrap();
    assert!(eventually(|| app.enabled_working_modes().len() == 3));

    stack.proxy.stop();
}

#[test]
fn app_exit_unregisters_every_execution_context() {
    let stack = sync_stack(Duration::from_millis(300));
    let exc0 = AppUid::new(100, 0);
    let exc1 = AppUid::new(100, 1);
    connect_mock(&stack.proxy, stack.inbound.clone(), 100, MockClientOptions::default());

    for uid in [exc0, exc1] {
        stack
            .inbound
            .send(RpcMessage::ExcRegister { header: header(uid), name: "demo-app".to_string(), recipe: "demo".to_string(), language: "C".to_string() })
            .unwrap();
    }
    assert!(eventually(|| stack.app_manager.count() == 2));

    stack.inbound.send(RpcMessage::AppExit { header: header(exc0) }).unwrap();
    assert!(eventually(|| stack.app_manager.count() == 0));
    assert!(!stack.proxy.connections().connected(100));

    stack.proxy.stop();
}

#[test]
fn sync_commands_to_a_disconnected_application_fail_fast() {
    let stack = sync_stack(Duration::from_millis(100));
    let uid = AppUid::new(999, 0);

    let err = stack.proxy.syncp_sync_change(uid).unwrap_err();
    assert!(matches!(err, rtrm::error::Error::RpcChannel(_)));

    stack.proxy.stop();
}

#[test]
fn late_replies_are_dropped_without_a_session() {
    let stack = sync_stack(Duration::from_millis(100));
    // A reply whose token never had a session: the dispatcher must not
    // panic or leak; nothing observable happens.
    stack
        .inbound
        .send(RpcMessage::SyncChangeResp {
            header: MessageHeader::new(SessionToken(4242), AppUid::new(1, 0)),
            result: rtrm::domain::rpc::protocol::RpcResult::Ok,
        })
        .unwrap();
    std::thread::sleep(Duration::from_millis(50));
    stack.proxy.stop();
}

#[test]
fn events_reach_the_resource_manager_channel() {
    // A dedicated stack so the events receiver stays in the test.
    use rtrm::domain::accounter::accounter::ResourceAccounter;
    use rtrm::domain::app::application_manager::ApplicationManager;
    use rtrm::domain::resource::resource_tree::ResourceTree;
    use rtrm::domain::rpc::application_proxy::ApplicationProxy;
    use rtrm::loader::recipe_loader::RecipeLoader;
    use std::sync::Arc;

    let tree = ResourceTree::new();
    tree.register(rtrm::domain::resource::resource_path::ResourcePath::parse("sys0.cpu0.pe0").unwrap(), "%", 100).unwrap();
    let accounter = ResourceAccounter::new(tree);
    let app_manager = Arc::new(ApplicationManager::new(4));
    let loader = Arc::new(RecipeLoader::new("data/recipes", accounter.clone()));
    let (events_tx, events_rx) = mpsc::channel();
    let proxy = ApplicationProxy::new(app_manager.clone(), accounter.clone(), loader, events_tx, Duration::from_millis(100));
    let (inbound_tx, inbound_rx) = mpsc::channel();
    proxy.start(inbound_rx);

    inbound_tx.send(RpcMessage::ExcSchedule { header: header(AppUid::new(7, 0)) }).unwrap();
    let event = events_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event, RtrmEvent::NewApplication(AppUid::new(7, 0)));

    proxy.stop();
}
