mod common;

use std::sync::Arc;

use common::{accounter_with_platform, path, recipe_single, recipe_three};

use rtrm::domain::app::application::{AppState, SyncState};
use rtrm::domain::app::application_manager::ApplicationManager;
use rtrm::domain::schedule::contrib::manager::ContribManager;
use rtrm::domain::schedule::contrib::{ContribConfig, ContribType, PriorityInit};
use rtrm::domain::schedule::entity::{EntityBinding, EvalEntity};
use rtrm::domain::schedule::metric_policy::MetricPolicy;
use rtrm::domain::schedule::policy::{PolicyRegistry, SchedulerPolicy};
use rtrm::domain::schedule::random_policy::RandomPolicy;
use rtrm::domain::system::SystemView;
use rtrm::domain::resource::resource_type::ResourceType;
use rtrm::domain::utils::id::AppUid;

#[test]
fn weights_are_normalized() {
    let accounter = accounter_with_platform();
    let manager = ContribManager::new(accounter, ContribConfig::default());

    let sum: f32 = manager.weights().iter().map(|(_, w)| w).sum();
    assert!((sum - 1.0).abs() < 1e-6, "weights sum to {}", sum);

    // All-zero weights fall back to the defaults, still normalized.
    let accounter = accounter_with_platform();
    let mut config = ContribConfig::default();
    for w in config.weights.values_mut() {
        *w = 0.0;
    }
    let manager = ContribManager::new(accounter, config);
    let sum: f32 = manager.weights().iter().map(|(_, w)| w).sum();
    assert!((sum - 1.0).abs() < 1e-6);
}

#[test]
fn every_contribution_stays_in_unit_range() {
    let accounter = accounter_with_platform();
    let app_manager = ApplicationManager::new(4);
    let app = app_manager.register(AppUid::new(100, 0), "tri", recipe_three("tri"), "C", false, &accounter).unwrap();
    app.enable().unwrap();
    app.set_goal_gap(30);

    let view = accounter.get_view("eval").unwrap();
    let mut manager = ContribManager::new(accounter.clone(), ContribConfig::default());
    manager.init_priority(&PriorityInit { priority: 1, app_count: 1, view }).unwrap();

    for awm in app.enabled_working_modes() {
        let binding_ref = awm.write().unwrap().bind_resources(accounter.tree(), ResourceType::Cpu, 0).unwrap();
        let entity = EvalEntity::unbound(app.clone(), awm.clone(), view).bound(EntityBinding { domain: ResourceType::Cpu, instance: 0, binding_ref });
        for c_type in ContribType::ALL {
            let index = manager.raw_index_of(c_type, &entity).unwrap();
            assert!((0.0..=1.0).contains(&index), "{:?} returned {}", c_type, index);
        }
    }
}

#[test]
fn fairness_peaks_exactly_at_the_fair_partition() {
    let accounter = accounter_with_platform();
    let app_manager = ApplicationManager::new(4);
    // Two applications at the same priority: the fair partition of the
    // 400 processing-element units is 200 each.
    let fair = app_manager.register(AppUid::new(100, 0), "fair", recipe_single("fair", "sys0.cpu*.pe*", 200), "C", false, &accounter).unwrap();
    let greedy = app_manager.register(AppUid::new(200, 0), "greedy", recipe_single("greedy", "sys0.cpu*.pe*", 400), "C", false, &accounter).unwrap();
    let modest = app_manager.register(AppUid::new(300, 0), "modest", recipe_single("modest", "sys0.cpu*.pe*", 40), "C", false, &accounter).unwrap();

    let view = accounter.get_view("eval").unwrap();
    let manager = {
        let mut m = ContribManager::new(accounter.clone(), ContribConfig::default());
        m.init_priority(&PriorityInit { priority: 1, app_count: 2, view }).unwrap();
        m
    };

    let index_of = |app: &Arc<rtrm::domain::app::application::Application>| {
        let awm = app.working_mode(0).unwrap();
        let entity = EvalEntity::unbound(app.clone(), awm, view);
        manager.raw_index_of(ContribType::Fairness, &entity).unwrap()
    };

    assert_eq!(index_of(&fair), 1.0);
    assert!(index_of(&greedy) < 1.0);
    assert!(index_of(&modest) < 1.0);
}

#[test]
fn metric_policy_schedules_every_feasible_application() {
    let accounter = accounter_with_platform();
    let app_manager = Arc::new(ApplicationManager::new(4));
    let a = app_manager.register(AppUid::new(100, 0), "a", recipe_single("a", "sys0.cpu*.pe*", 120), "C", false, &accounter).unwrap();
    let b = app_manager.register(AppUid::new(200, 0), "b", recipe_single("b", "sys0.cpu*.pe*", 120), "C", false, &accounter).unwrap();
    a.enable().unwrap();
    b.enable().unwrap();

    let system = SystemView::new(app_manager.clone(), accounter.clone());
    let mut policy = MetricPolicy::new(accounter.clone(), ContribConfig::default());
    let view = policy.schedule(&system).unwrap();

    for app in [&a, &b] {
        assert_eq!(app.state(), AppState::Sync, "[{}] not scheduled", app.uid());
        assert_eq!(app.sync_state(), SyncState::Starting);
        let next = app.next_awm().unwrap();
        assert!(next.read().unwrap().scheduled().is_some());
    }
    // Both fit: 240 booked over the four processing elements.
    assert_eq!(accounter.used(&path("sys0.cpu*.pe*"), view), 240);
    // The live view is untouched by the policy run.
    assert_eq!(accounter.used(&path("sys0.cpu*.pe*"), accounter.live_view()), 0);
}

#[test]
fn metric_policy_prefers_the_higher_valued_mode_that_fits() {
    let accounter = accounter_with_platform();
    let app_manager = Arc::new(ApplicationManager::new(4));
    let app = app_manager.register(AppUid::new(100, 0), "tri", recipe_three("tri"), "C", false, &accounter).unwrap();
    app.enable().unwrap();

    let system = SystemView::new(app_manager.clone(), accounter.clone());
    let mut policy = MetricPolicy::new(accounter.clone(), ContribConfig::default());
    policy.schedule(&system).unwrap();

    let next = app.next_awm().expect("application not scheduled");
    // With the whole platform free and value dominating the weights, the
    // highest-valued mode wins.
    assert_eq!(next.read().unwrap().id(), 2);
}

#[test]
fn policy_dispatch_skips_exhausted_candidates() {
    let accounter = accounter_with_platform();
    let app_manager = Arc::new(ApplicationManager::new(4));
    // Three applications asking a full cpu each over two cpus: exactly one
    // stays behind.
    let apps: Vec<_> = [100, 200, 300]
        .iter()
        .map(|pid| {
            let app = app_manager
                .register(AppUid::new(*pid, 0), "full-cpu", recipe_single("full-cpu", "sys0.cpu*.pe*", 200), "C", false, &accounter)
                .unwrap();
            app.enable().unwrap();
            app
        })
        .collect();

    let system = SystemView::new(app_manager.clone(), accounter.clone());
    let mut policy = MetricPolicy::new(accounter.clone(), ContribConfig::default());
    let view = policy.schedule(&system).unwrap();

    let scheduled = apps.iter().filter(|app| app.sync_state() == SyncState::Starting).count();
    let blocked = apps.iter().filter(|app| app.sync_state() == SyncState::Blocked).count();
    assert_eq!(scheduled, 2);
    assert_eq!(blocked, 1);
    assert_eq!(accounter.used(&path("sys0.cpu*.pe*"), view), 400);
}

#[test]
fn random_policy_only_uses_enabled_modes() {
    let accounter = accounter_with_platform();
    let app_manager = Arc::new(ApplicationManager::new(4));
    let app = app_manager.register(AppUid::new(100, 0), "tri", recipe_three("tri"), "C", false, &accounter).unwrap();
    app.enable().unwrap();
    app.set_awm_constraint(rtrm::domain::app::constraints::AwmConstraintKind::UpperBound, 0, true).unwrap();

    let system = SystemView::new(app_manager.clone(), accounter.clone());
    let mut policy = RandomPolicy::new();
    policy.schedule(&system).unwrap();

    let next = app.next_awm().expect("application not scheduled");
    assert_eq!(next.read().unwrap().id(), 0);
}

#[test]
fn policies_are_discovered_by_name() {
    let accounter = accounter_with_platform();
    let app_manager = Arc::new(ApplicationManager::new(4));
    let system = SystemView::new(app_manager, accounter);

    let registry = PolicyRegistry::with_builtins();
    assert!(registry.create("metric", &system).is_ok());
    assert!(registry.create("random", &system).is_ok());
    assert!(registry.create("nonexistent", &system).is_err());
}
