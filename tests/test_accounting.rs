mod common;

use common::{accounter_with_platform, path};

use rtrm::domain::accounter::view::SYSTEM_VIEW;
use rtrm::domain::resource::assignment::{AssignmentMap, ResourceAssignment};
use rtrm::domain::utils::id::AppUid;
use rtrm::error::Error;

fn request(accounter: &rtrm::domain::accounter::accounter::ResourceAccounter, req_path: &str, amount: u64) -> AssignmentMap {
    let candidates: Vec<_> = accounter.tree().find_mixed(&path(req_path)).into_iter().map(|(_, key)| key).collect();
    assert!(!candidates.is_empty(), "no candidate for {}", req_path);
    let mut map = AssignmentMap::new();
    map.insert(path(req_path), ResourceAssignment::with_candidates(amount, candidates));
    map
}

#[test]
fn booking_draws_in_binding_order_and_conserves_amounts() {
    let accounter = accounter_with_platform();
    let a = AppUid::new(100, 0);
    let b = AppUid::new(200, 0);

    // 150 over cpu0: fills pe0 completely, half of pe1.
    let booked = accounter.book_resources(a, &request(&accounter, "sys0.cpu0.pe*", 150), SYSTEM_VIEW, true).unwrap();
    assert_eq!(booked.values().next().unwrap().booked(), 150);
    assert_eq!(accounter.used(&path("sys0.cpu0.pe0"), SYSTEM_VIEW), 100);
    assert_eq!(accounter.used(&path("sys0.cpu0.pe1"), SYSTEM_VIEW), 50);

    accounter.book_resources(b, &request(&accounter, "sys0.cpu0.pe*", 50), SYSTEM_VIEW, true).unwrap();
    assert_eq!(accounter.used(&path("sys0.cpu0.pe*"), SYSTEM_VIEW), 200);
    assert_eq!(accounter.available(&path("sys0.cpu0.pe*"), SYSTEM_VIEW, None), 0);
}

#[test]
fn second_booking_beyond_availability_is_exhausted_and_rolled_back() {
    let accounter = accounter_with_platform();
    accounter.tree().register(path("sys0.acc0"), "%", 1000).unwrap();
    let a = AppUid::new(100, 0);
    let b = AppUid::new(200, 0);

    accounter.book_resources(a, &request(&accounter, "sys0.acc0", 600), SYSTEM_VIEW, true).unwrap();
    let rejected = accounter.book_resources(b, &request(&accounter, "sys0.acc0", 600), SYSTEM_VIEW, true);
    assert!(matches!(rejected, Err(Error::Exhausted(_))));

    // The view is unchanged by the failed booking.
    assert_eq!(accounter.used(&path("sys0.acc0"), SYSTEM_VIEW), 600);
    assert!(accounter.assignments_of(b, SYSTEM_VIEW).is_none());
}

#[test]
fn duplicate_booking_per_view_is_rejected() {
    let accounter = accounter_with_platform();
    let a = AppUid::new(100, 0);

    accounter.book_resources(a, &request(&accounter, "sys0.cpu0.pe0", 10), SYSTEM_VIEW, true).unwrap();
    let again = accounter.book_resources(a, &request(&accounter, "sys0.cpu0.pe1", 10), SYSTEM_VIEW, true);
    assert!(matches!(again, Err(Error::AlreadyPresent(_))));
}

#[test]
fn views_are_isolated_from_each_other() {
    let accounter = accounter_with_platform();
    let a = AppUid::new(100, 0);

    let candidate = accounter.get_view("candidate").unwrap();
    accounter.book_resources(a, &request(&accounter, "sys0.cpu0.pe*", 180), candidate, true).unwrap();

    assert_eq!(accounter.used(&path("sys0.cpu0.pe*"), candidate), 180);
    assert_eq!(accounter.used(&path("sys0.cpu0.pe*"), SYSTEM_VIEW), 0);
    assert_eq!(accounter.available(&path("sys0.cpu0.pe*"), SYSTEM_VIEW, None), 200);

    accounter.put_view(candidate).unwrap();
    assert_eq!(accounter.used(&path("sys0.cpu0.pe*"), candidate), 0);
}

#[test]
fn view_lifecycle_errors() {
    let accounter = accounter_with_platform();

    assert!(matches!(accounter.get_view(""), Err(Error::InvalidArgument(_))));

    let v = accounter.get_view("twice").unwrap();
    assert!(matches!(accounter.get_view("twice"), Err(Error::AlreadyPresent(_))));

    assert!(matches!(accounter.put_view(SYSTEM_VIEW), Err(Error::InvalidArgument(_))));
    accounter.put_view(v).unwrap();
    assert!(matches!(accounter.put_view(v), Err(Error::NotFound(_))));
}

#[test]
fn set_view_promotes_and_drops_the_prior_live_view() {
    let accounter = accounter_with_platform();
    let a = AppUid::new(100, 0);

    accounter.book_resources(a, &request(&accounter, "sys0.cpu0.pe0", 40), SYSTEM_VIEW, true).unwrap();

    let next = accounter.get_view("next-live").unwrap();
    accounter.book_resources(a, &request(&accounter, "sys0.cpu0.pe0", 70), next, true).unwrap();

    let prior = accounter.set_view(next).unwrap();
    assert_eq!(prior, SYSTEM_VIEW);
    assert_eq!(accounter.live_view(), next);
    assert_eq!(accounter.used(&path("sys0.cpu0.pe0"), accounter.live_view()), 70);
    // The dropped view no longer accounts anything.
    assert_eq!(accounter.used(&path("sys0.cpu0.pe0"), SYSTEM_VIEW), 0);
}

#[test]
fn sync_commit_promotes_the_session_view() {
    let accounter = accounter_with_platform();
    let running = AppUid::new(100, 0);
    let incoming = AppUid::new(200, 0);

    // A running application holds 60 in the live view.
    accounter.book_resources(running, &request(&accounter, "sys0.cpu0.pe0", 60), SYSTEM_VIEW, true).unwrap();

    accounter.sync_start(&[running]).unwrap();
    accounter.sync_acquire_resources(incoming, &request(&accounter, "sys0.cpu1.pe0", 80)).unwrap();
    accounter.sync_commit().unwrap();

    let live = accounter.live_view();
    assert_eq!(accounter.used(&path("sys0.cpu0.pe0"), live), 60);
    assert_eq!(accounter.used(&path("sys0.cpu1.pe0"), live), 80);
    assert!(accounter.assignments_of(running, live).is_some());
    assert!(accounter.assignments_of(incoming, live).is_some());
    assert!(!accounter.sync_in_progress());
}

#[test]
fn sync_abort_restores_every_query_result() {
    let accounter = accounter_with_platform();
    let running = AppUid::new(100, 0);
    let incoming = AppUid::new(200, 0);

    accounter.book_resources(running, &request(&accounter, "sys0.cpu0.pe0", 60), SYSTEM_VIEW, true).unwrap();
    let live_before = accounter.live_view();
    let used_before = accounter.used(&path("sys0.cpu*.pe*"), live_before);

    accounter.sync_start(&[running]).unwrap();
    accounter.sync_acquire_resources(incoming, &request(&accounter, "sys0.cpu1.pe0", 80)).unwrap();
    accounter.sync_abort().unwrap();

    assert_eq!(accounter.live_view(), live_before);
    assert_eq!(accounter.used(&path("sys0.cpu*.pe*"), live_before), used_before);
    assert_eq!(accounter.used(&path("sys0.cpu1.pe0"), live_before), 0);
    assert!(!accounter.sync_in_progress());
}

#[test]
fn booking_skips_availability_checks_while_a_session_is_open() {
    let accounter = accounter_with_platform();
    let running = AppUid::new(100, 0);

    accounter.sync_start(&[]).unwrap();
    // An ordinary booking during the session is not availability-checked
    // (the session owns that invariant), but the draw is still bounded.
    let candidate = accounter.get_view("scheduling").unwrap();
    let result = accounter.book_resources(running, &request(&accounter, "sys0.cpu0.pe0", 10), candidate, true);
    assert!(result.is_ok());
    accounter.sync_abort().unwrap();
    accounter.put_view(candidate).unwrap();
}

#[test]
fn reshuffling_is_detected_per_resource() {
    let accounter = accounter_with_platform();
    let a = AppUid::new(100, 0);

    let v1 = accounter.get_view("first").unwrap();
    let booked_first = accounter.book_resources(a, &request(&accounter, "sys0.cpu0.pe*", 100), v1, true).unwrap();

    // Same request re-booked after pe0 got occupied lands on pe1.
    let v2 = accounter.get_view("second").unwrap();
    let blocker = AppUid::new(300, 0);
    accounter.book_resources(blocker, &request(&accounter, "sys0.cpu0.pe0", 100), v2, true).unwrap();
    let booked_second = accounter.book_resources(a, &request(&accounter, "sys0.cpu0.pe*", 100), v2, true).unwrap();

    assert!(accounter.is_reshuffling(&booked_first, &booked_second));
    assert!(!accounter.is_reshuffling(&booked_first, &booked_first));
}

#[test]
fn reservation_and_offlining_shrink_availability() {
    let accounter = accounter_with_platform();

    accounter.tree().reserve(&path("sys0.cpu0.pe0"), 30).unwrap();
    assert_eq!(accounter.unreserved(&path("sys0.cpu0.pe0")), 70);
    assert_eq!(accounter.total(&path("sys0.cpu0.pe0")), 100);

    accounter.tree().offline(&path("sys0.cpu1.pe*")).unwrap();
    assert_eq!(accounter.available(&path("sys0.cpu1.pe*"), SYSTEM_VIEW, None), 0);
    assert_eq!(accounter.total(&path("sys0.cpu1.pe*")), 200);

    accounter.tree().online(&path("sys0.cpu1.pe*")).unwrap();
    assert_eq!(accounter.available(&path("sys0.cpu1.pe*"), SYSTEM_VIEW, None), 200);
}
