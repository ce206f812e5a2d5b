//! Commit Phase Tests
//!
//! Tests for flush, before-commit, before-completion and after-completion
//! dispatch, including failure handling in each phase.

use crate::*;
use txnsync::Phase;

// =============================================================================
// FLUSH
// =============================================================================

#[test]
fn test_manual_flush_then_commit() {
    let service = create_service();
    let log = journal();
    let listener = Recorder::new("l", &log);

    let txn = service.begin(false).unwrap();
    let support = service.support();
    support.bind_resource("x", 1i32).unwrap();
    support.bind_listener(listener.clone()).unwrap();

    support.flush().unwrap();
    assert_eq!(count(&log, "l.flush"), 1);

    service.commit(txn).unwrap();
    assert_eq!(count(&log, "l.after_commit"), 1);
    assert_eq!(count(&log, "l.after_rollback"), 0);
    assert!(matches!(
        support.get_resource::<i32>("x"),
        Err(Error::NoTransaction(_))
    ));
}

#[test]
fn test_flush_order_and_fail_fast() {
    let service = create_service();
    let log = journal();
    let rules = Recorder::failing("r", &log, Some("rules"));
    let checker = Recorder::new("c", &log);
    let listener = Recorder::new("l", &log);

    let txn = service.begin(false).unwrap();
    let support = service.support();
    support.bind_rule_executor(rules.clone()).unwrap();
    support.bind_integrity_checker(checker.clone()).unwrap();
    support.bind_listener(listener.clone()).unwrap();

    let err = support.flush().unwrap_err();
    assert!(matches!(err, Error::Collaborator(_)));
    assert_eq!(entries(&log), vec!["r.rules"]);
    assert_eq!(support.context().unwrap().phase(), Phase::Active);

    service.rollback(txn).unwrap();
}

#[test]
fn test_dirty_tracking() {
    let service = create_service();
    let log = journal();
    let dao = Recorder::new("d", &log);

    let txn = service.begin(false).unwrap();
    let support = service.support();
    assert!(!support.is_dirty().unwrap());

    support.bind_dao(dao.clone()).unwrap();
    dao.touch();
    assert!(support.is_dirty().unwrap());

    support.flush().unwrap();
    assert!(!support.is_dirty().unwrap());
    service.commit(txn).unwrap();
}

// =============================================================================
// BEFORE COMMIT
// =============================================================================

#[test]
fn test_read_only_commit_flushes_dirty_dao() {
    let service = create_service();
    let log = journal();
    let dao = Recorder::new("d", &log);

    let txn = service.begin(true).unwrap();
    let support = service.support();
    support.bind_dao(dao.clone()).unwrap();
    dao.touch();
    assert!(support.is_dirty().unwrap());

    service.commit(txn).unwrap();
    assert_eq!(count(&log, "d.dao_flush"), 1);
    assert!(!dao.is_dirty());
    assert_eq!(service.metrics().total_committed, 1);
}

#[test]
fn test_read_only_commit_with_clean_dao() {
    let service = create_service();
    let log = journal();
    let dao = Recorder::new("d", &log);

    let txn = service.begin(true).unwrap();
    service.support().bind_dao(dao.clone()).unwrap();
    service.commit(txn).unwrap();
    assert_eq!(count(&log, "d.dao_flush"), 1);
}

#[test]
fn test_before_commit_failure_propagates_and_rolls_back() {
    let service = create_service();
    let log = journal();
    let failing = Recorder::failing("l", &log, Some("before_commit"));

    let txn = service.begin(false).unwrap();
    service.support().bind_listener(failing.clone()).unwrap();

    let err = service.commit(txn).unwrap_err();
    assert!(matches!(err, Error::Collaborator(_)));

    let metrics = service.metrics();
    assert_eq!(metrics.total_committed, 0);
    assert_eq!(metrics.total_rolled_back, 1);
    assert_eq!(count(&log, "l.after_commit"), 0);
    assert_eq!(count(&log, "l.after_rollback"), 1);
    assert!(service.support().transaction_id().is_none());
}

#[test]
fn test_before_commit_failure_skips_later_listeners() {
    let service = create_service();
    let log = journal();
    let first = Recorder::failing("a", &log, Some("before_commit"));
    let second = Recorder::new("b", &log);

    let txn = service.begin(false).unwrap();
    let support = service.support();
    support.bind_listener(first.clone()).unwrap();
    support.bind_listener(second.clone()).unwrap();

    assert!(service.commit(txn).is_err());
    assert_eq!(count(&log, "b.before_commit"), 0);
    // Rollback still reaches every listener
    assert_eq!(count(&log, "a.after_rollback"), 1);
    assert_eq!(count(&log, "b.after_rollback"), 1);
}

#[test]
fn test_before_completion_failure_is_logged_only() {
    let service = create_service();
    let log = journal();
    let failing = Recorder::failing("a", &log, Some("before_completion"));
    let other = Recorder::new("b", &log);

    let txn = service.begin(false).unwrap();
    let support = service.support();
    support.bind_listener(failing.clone()).unwrap();
    support.bind_listener(other.clone()).unwrap();

    service.commit(txn).unwrap();
    assert_eq!(count(&log, "b.before_completion"), 1);
    assert_eq!(count(&log, "a.after_commit"), 1);
    assert_eq!(count(&log, "b.after_commit"), 1);
}

// =============================================================================
// AFTER COMPLETION
// =============================================================================

#[test]
fn test_after_commit_failure_still_clears_context() {
    let service = create_service();
    let log = journal();
    let failing = Recorder::failing("a", &log, Some("after_commit"));
    let other = Recorder::new("b", &log);

    let txn = service.begin(false).unwrap();
    let support = service.support();
    support.bind_listener(failing.clone()).unwrap();
    support.bind_listener(other.clone()).unwrap();
    let context = support.context().unwrap();

    service.commit(txn).unwrap();

    assert!(support.transaction_id().is_none());
    assert_eq!(count(&log, "b.after_commit"), 1);
    assert_eq!(context.phase(), Phase::Cleared);
    assert_eq!(service.metrics().total_committed, 1);
}

#[test]
fn test_rollback_notifies_without_flushing() {
    let service = create_service();
    let log = journal();
    let recorder = Recorder::new("x", &log);

    let txn = service.begin(false).unwrap();
    let support = service.support();
    support.bind_listener(recorder.clone()).unwrap();
    support.bind_indexer(recorder.clone()).unwrap();

    service.rollback(txn).unwrap();
    assert_eq!(entries(&log), vec!["x.index_rollback", "x.after_rollback"]);
}

#[test]
fn test_rollback_only_commit_reports_unexpected_rollback() {
    let service = create_service();
    let log = journal();
    let listener = Recorder::new("l", &log);

    let txn = service.begin(false).unwrap();
    service.support().bind_listener(listener.clone()).unwrap();
    service.set_rollback_only().unwrap();

    let err = service.commit(txn).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRollback(_)));
    assert_eq!(count(&log, "l.before_commit"), 0);
    assert_eq!(count(&log, "l.after_rollback"), 1);
}

#[test]
fn test_full_commit_sequence() {
    let service = create_service();
    let log = journal();
    let recorder = Recorder::new("x", &log);

    let txn = service.begin(false).unwrap();
    let support = service.support();
    support.bind_rule_executor(recorder.clone()).unwrap();
    support.bind_integrity_checker(recorder.clone()).unwrap();
    support.bind_dao(recorder.clone()).unwrap();
    support.bind_indexer(recorder.clone()).unwrap();
    support.bind_listener(recorder.clone()).unwrap();

    service.commit(txn).unwrap();
    assert_eq!(
        entries(&log),
        vec![
            "x.rules",
            "x.integrity",
            "x.dao_flush",
            "x.flush",
            "x.prepare",
            "x.before_commit",
            "x.before_completion",
            "x.index_commit",
            "x.after_commit",
        ]
    );
}

#[test]
fn test_transaction_without_coordinator_use() {
    let service = create_service();
    let txn = service.begin(false).unwrap();
    service.commit(txn).unwrap();
    assert!(synchronization::synchronizations().is_empty());
    assert!(!synchronization::is_synchronization_active());
}
