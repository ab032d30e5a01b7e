use faultline_dedupe::{DecisionKind, DedupDecision, classify, find_duplicates};
use faultline_error::TrackerError;
use faultline_schema::ticket::StatusCategory;
use faultline_testkit::{FakeTracker, TrackerOp, identity, ticket};

#[test]
fn reuses_open_ticket_with_identity_label() {
    let tracker = FakeTracker::default();
    let id = identity("test_login");
    tracker.insert(ticket("QA-50", &[&id.label()], StatusCategory::InProgress));
    tracker.insert(ticket("QA-51", &["faultline-ffffffffffffffff"], StatusCategory::New));

    match classify(&tracker, &id, false).unwrap() {
        DedupDecision::Reuse(t) => assert_eq!(t.key, "QA-50"),
        other => panic!("expected reuse, got {other:?}"),
    }
    let jql = &tracker.searches()[0];
    assert!(jql.starts_with(r#"project = "QA" AND labels = "faultline-"#));
    assert!(jql.ends_with("ORDER BY created ASC"));
}

#[test]
fn done_tickets_do_not_count() {
    let tracker = FakeTracker::default();
    let id = identity("test_login");
    tracker.insert(ticket("QA-50", &[&id.label()], StatusCategory::Done));
    assert_eq!(classify(&tracker, &id, false).unwrap(), DedupDecision::Create);
}

#[test]
fn create_duplicates_skips_the_search() {
    let tracker = FakeTracker::default();
    let id = identity("test_login");
    tracker.insert(ticket("QA-50", &[&id.label()], StatusCategory::New));
    assert_eq!(
        classify(&tracker, &id, true).unwrap().kind(),
        DecisionKind::Create
    );
    assert!(tracker.searches().is_empty());
}

#[test]
fn not_found_search_means_no_duplicates() {
    let tracker = FakeTracker::default();
    tracker.fail(TrackerOp::Search, || TrackerError::NotFound("project QA".into()));
    let found = find_duplicates(&tracker, &identity("test_login")).unwrap();
    assert!(found.is_empty());
}

#[test]
fn other_search_errors_propagate() {
    let tracker = FakeTracker::default();
    tracker.fail(TrackerOp::Search, || TrackerError::Transient("503".into()));
    let err = classify(&tracker, &identity("test_login"), false).unwrap_err();
    assert!(err.is_retryable());
}
