//! Synchronization Ordering Tests
//!
//! The coordinator's before-commit work must finish before the persistence
//! session finalizes.

use crate::*;

#[test]
fn test_coordinator_runs_before_persistence_session() {
    let service = create_service();
    let log = journal();
    let listener = Recorder::new("l", &log);

    let txn = service.begin(false).unwrap();
    // Session registered first; order decides, not registration
    PersistenceSession::register(&log);
    service.support().bind_listener(listener.clone()).unwrap();
    service.commit(txn).unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "l.flush",
            "l.before_commit",
            "session.before_commit",
            "l.before_completion",
            "l.after_commit",
            "session.after_completion(committed)",
        ]
    );
}

#[test]
fn test_session_sees_rollback_after_coordinator_failure() {
    let service = create_service();
    let log = journal();

    let txn = service.begin(false).unwrap();
    PersistenceSession::register(&log);
    service
        .support()
        .bind_listener(Recorder::failing("l", &log, Some("before_commit")))
        .unwrap();
    assert!(service.commit(txn).is_err());

    assert_eq!(count(&log, "session.before_commit"), 0);
    assert_eq!(count(&log, "session.after_completion(rolled-back)"), 1);
}

#[test]
fn test_session_order_constant() {
    assert!(txnsync::SESSION_SYNCHRONIZATION_ORDER < PERSISTENCE_SYNCHRONIZATION_ORDER);
}
