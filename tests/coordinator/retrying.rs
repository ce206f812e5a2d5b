//! Retrying Helper Tests
//!
//! Runs coordinator work through the retrying helper end to end.

use crate::*;

#[test]
fn test_each_attempt_gets_fresh_context() {
    let service = create_service();
    let log = journal();
    let attempt = Cell::new(0u32);
    let mut seen = Vec::new();

    service
        .retrying_helper()
        .do_in_transaction(|| {
            attempt.set(attempt.get() + 1);
            let support = service.support();
            seen.push(support.transaction_id());
            assert!(support.get_resource::<u32>("attempt").unwrap().is_none());
            support.bind_resource("attempt", attempt.get())?;
            support.bind_listener(Recorder::new("l", &log))?;
            if attempt.get() == 1 {
                return Err(Error::ConcurrencyFailure("row locked".into()));
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0], seen[1]);
    assert_eq!(count(&log, "l.after_rollback"), 1);
    assert_eq!(count(&log, "l.after_commit"), 1);
}

#[test]
fn test_retry_on_listener_conflict_at_commit() {
    let service = create_service();
    let log = journal();
    let attempt = Cell::new(0);

    struct Conflicting {
        fail: bool,
    }

    impl TransactionListener for Conflicting {
        fn before_commit(&self, _read_only: bool) -> Result<()> {
            if self.fail {
                Err(Error::ConcurrencyFailure("stale node version".into()))
            } else {
                Ok(())
            }
        }
    }

    service
        .retrying_helper()
        .do_in_transaction(|| {
            attempt.set(attempt.get() + 1);
            let support = service.support();
            support.bind_listener(Rc::new(Conflicting { fail: attempt.get() < 3 }))?;
            support.bind_listener(Recorder::new("l", &log))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(attempt.get(), 3);
    assert_eq!(count(&log, "l.after_rollback"), 2);
    assert_eq!(count(&log, "l.after_commit"), 1);
}

#[test]
fn test_read_only_attempt() {
    let service = create_service();
    let state = service
        .retrying_helper()
        .do_in_transaction_with(true, false, || Ok(service.support().read_state()))
        .unwrap();
    assert_eq!(state, TxnReadState::ReadOnly);
}

#[test]
fn test_no_transaction_left_behind() {
    let service = create_service();
    let _ = service
        .retrying_helper()
        .do_in_transaction(|| -> Result<()> { Err(Error::collaborator("boom")) });
    assert!(!service.manager().has_transaction());
    assert!(service.support().transaction_id().is_none());
    assert_eq!(service.metrics().active_count, 0);
}

#[test]
fn test_panicking_callback_rolls_back() {
    let service = create_service();
    let log = journal();
    let listener = Recorder::new("l", &log);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        service.retrying_helper().do_in_transaction(|| -> Result<()> {
            service.support().bind_listener(listener.clone())?;
            panic!("unit of work failed");
        })
    }));
    assert!(outcome.is_err());

    assert!(service.support().transaction_id().is_none());
    assert_eq!(count(&log, "l.after_commit"), 0);
    assert_eq!(count(&log, "l.after_rollback"), 1);
    assert_eq!(service.metrics().active_count, 0);

    let txn = service.begin(false).unwrap();
    assert!(txn.is_new_transaction());
    service.commit(txn).unwrap();
}

#[test]
fn test_early_return_rolls_back() {
    fn import(service: &TransactionService, log: &Journal) -> Result<()> {
        let _txn = service.begin(false)?;
        service.support().bind_listener(Recorder::new("l", log))?;
        Err(Error::IntegrityViolation("missing parent".into()))
    }

    let service = create_service();
    let log = journal();
    assert!(import(&service, &log).is_err());

    assert!(service.support().transaction_id().is_none());
    assert_eq!(count(&log, "l.after_rollback"), 1);
}
