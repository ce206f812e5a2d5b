//! Nesting Tests
//!
//! Tests for joined transactions and for independent transactions that
//! suspend and later resume the outer one.

use crate::*;
use txnsync::TransactionDefinition;

#[test]
fn test_inner_rollback_restores_outer_context() {
    let service = create_service();
    let support = service.support();

    let outer = service.begin(false).unwrap();
    let t1 = support.transaction_id().unwrap();

    let inner = service.begin_non_propagating(false).unwrap();
    let t2 = support.transaction_id().unwrap();
    assert_ne!(t1, t2);
    support.bind_resource("inner-only", 5i32).unwrap();
    service.rollback(inner).unwrap();

    assert_eq!(support.transaction_id(), Some(t1));
    assert!(support.get_resource::<i32>("inner-only").unwrap().is_none());
    service.commit(outer).unwrap();
}

#[test]
fn test_outer_resources_hidden_from_inner() {
    let service = create_service();
    let support = service.support();

    let outer = service.begin(false).unwrap();
    support.bind_resource("outer-only", 1i32).unwrap();

    let inner = service.begin_non_propagating(false).unwrap();
    assert!(support.get_resource::<i32>("outer-only").unwrap().is_none());
    service.commit(inner).unwrap();

    assert_eq!(*support.get_resource::<i32>("outer-only").unwrap().unwrap(), 1);
    service.commit(outer).unwrap();
}

#[test]
fn test_inner_listeners_complete_with_inner_transaction() {
    let service = create_service();
    let support = service.support();
    let log = journal();
    let outer_listener = Recorder::new("outer", &log);
    let inner_listener = Recorder::new("inner", &log);

    let outer = service.begin(false).unwrap();
    support.bind_listener(outer_listener.clone()).unwrap();

    let inner = service.begin_non_propagating(false).unwrap();
    support.bind_listener(inner_listener.clone()).unwrap();
    service.commit(inner).unwrap();

    assert_eq!(count(&log, "inner.after_commit"), 1);
    assert_eq!(count(&log, "outer.flush"), 0);

    service.rollback(outer).unwrap();
    assert_eq!(count(&log, "outer.after_rollback"), 1);
    assert_eq!(count(&log, "inner.after_rollback"), 0);
}

#[test]
fn test_inner_failure_leaves_outer_usable() {
    let service = create_service();
    let support = service.support();
    let log = journal();

    let outer = service.begin(false).unwrap();
    let t1 = support.transaction_id().unwrap();

    let inner = service.begin_non_propagating(false).unwrap();
    support
        .bind_listener(Recorder::failing("inner", &log, Some("before_commit")))
        .unwrap();
    assert!(service.commit(inner).is_err());

    assert_eq!(support.transaction_id(), Some(t1));
    assert!(!service.manager().is_rollback_only());
    service.commit(outer).unwrap();
}

#[test]
fn test_three_levels() {
    let service = create_service();
    let support = service.support();

    let first = service.begin(false).unwrap();
    let t1 = support.transaction_id().unwrap();
    let second = service.begin_non_propagating(false).unwrap();
    let t2 = support.transaction_id().unwrap();
    let third = service.begin_non_propagating(true).unwrap();
    let t3 = support.transaction_id().unwrap();
    assert_eq!(support.read_state(), TxnReadState::ReadOnly);

    service.commit(third).unwrap();
    assert_eq!(support.transaction_id(), Some(t2));
    assert_eq!(support.read_state(), TxnReadState::ReadWrite);
    service.commit(second).unwrap();
    assert_eq!(support.transaction_id(), Some(t1));
    service.commit(first).unwrap();

    assert_ne!(t1, t3);
    assert!(support.transaction_id().is_none());
}

// =============================================================================
// JOINED TRANSACTIONS
// =============================================================================

#[test]
fn test_joined_transaction_shares_context() {
    let service = create_service();
    let support = service.support();

    let outer = service.begin(false).unwrap();
    let t1 = support.transaction_id().unwrap();

    let joined = service.begin(false).unwrap();
    assert!(!joined.is_new_transaction());
    assert_eq!(support.transaction_id(), Some(t1));
    support.bind_resource("shared", 3i32).unwrap();
    service.commit(joined).unwrap();

    assert_eq!(*support.get_resource::<i32>("shared").unwrap().unwrap(), 3);
    service.commit(outer).unwrap();
}

#[test]
fn test_joined_rollback_dooms_outer() {
    let service = create_service();
    let log = journal();

    let outer = service.begin(false).unwrap();
    service.support().bind_listener(Recorder::new("l", &log)).unwrap();

    let joined = service.begin(false).unwrap();
    service.rollback(joined).unwrap();

    let err = service.commit(outer).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRollback(_)));
    assert_eq!(count(&log, "l.after_rollback"), 1);
}

#[test]
fn test_mandatory_requires_transaction() {
    let service = create_service();
    let err = service
        .begin_with(TransactionDefinition::mandatory())
        .unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));

    let outer = service.begin(false).unwrap();
    let joined = service.begin_with(TransactionDefinition::mandatory()).unwrap();
    assert!(!joined.is_new_transaction());
    service.commit(joined).unwrap();
    service.commit(outer).unwrap();
}

#[test]
fn test_resume_rebinds_same_context() {
    let service = create_service();
    let support = service.support();
    let log = journal();

    let outer = service.begin(false).unwrap();
    support.bind_listener(Recorder::new("outer", &log)).unwrap();
    let before = support.context().unwrap();

    let inner = service.begin_non_propagating(false).unwrap();
    let nested = support.context().unwrap();
    assert!(!Rc::ptr_eq(&before, &nested));
    assert_eq!(nested.listener_count(), 0);
    service.commit(inner).unwrap();

    let after = support.context().unwrap();
    assert!(Rc::ptr_eq(&before, &after));
    assert_eq!(after.id(), before.id());
    assert_eq!(after.listener_count(), 1);
    assert_eq!(after.phase(), txnsync::Phase::Active);

    service.commit(outer).unwrap();
    assert_eq!(count(&log, "outer.after_commit"), 1);
}

// =============================================================================
// SEVERAL SERVICES ON ONE THREAD
// =============================================================================

#[test]
fn test_two_services_nested() {
    let a = create_service();
    let b = create_service();
    let support = a.support();
    let log = journal();

    let outer = a.begin(false).unwrap();
    let t1 = support.transaction_id().unwrap();
    support.bind_listener(Recorder::new("outer", &log)).unwrap();

    let inner = b.begin_non_propagating(false).unwrap();
    assert_ne!(outer.txn_id(), inner.txn_id());
    assert_ne!(support.transaction_id(), Some(t1));
    b.commit(inner).unwrap();

    assert_eq!(support.transaction_id(), Some(t1));
    a.commit(outer).unwrap();

    assert_eq!(count(&log, "outer.after_commit"), 1);
    assert_eq!(a.metrics().active_count, 0);
    assert_eq!(b.metrics().active_count, 0);
}

#[test]
fn test_out_of_order_commit_across_services() {
    let a = create_service();
    let b = create_service();
    let log = journal();

    let outer = a.begin(false).unwrap();
    a.support().bind_listener(Recorder::new("outer", &log)).unwrap();
    let inner = b.begin_non_propagating(false).unwrap();

    let err = a.commit(outer).unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));
    b.commit(inner).unwrap();

    // The outer transaction could not commit, so it is rolled back once resumed
    assert_eq!(count(&log, "outer.after_commit"), 0);
    assert_eq!(count(&log, "outer.after_rollback"), 1);
    assert!(a.support().transaction_id().is_none());
    assert_eq!(a.metrics().active_count, 0);
    assert_eq!(b.metrics().active_count, 0);
    assert_eq!(b.metrics().total_committed, 1);
}

#[test]
fn test_handle_completed_through_other_service() {
    let a = create_service();
    let b = create_service();

    let txn = a.begin(false).unwrap();
    let err = b.commit(txn).unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));

    assert!(a.support().transaction_id().is_none());
    assert_eq!(a.metrics().active_count, 0);
    assert_eq!(b.metrics().active_count, 0);
}
