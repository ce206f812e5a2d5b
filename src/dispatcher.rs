//! Phase dispatcher: fans transaction manager callbacks out to collaborators.
//!
//! One [`PhaseDispatcher`] is registered with the transaction manager per
//! transaction, at [`SESSION_SYNCHRONIZATION_ORDER`], so its before-commit
//! work runs before the persistence engine finalizes its session.
//!
//! ## Phases
//!
//! ```text
//! flush             rules -> integrity -> DAOs -> listener.flush       (fail fast)
//! before_commit     flush -> indexer.prepare -> listener.before_commit (fail fast)
//! before_completion listener.before_completion                         (logged)
//! after_completion  indexer.commit|rollback -> listener.after_*        (logged)
//!                   -> unbind context from the thread                  (always)
//! ```
//!
//! Each step snapshots its participants, so a callback may call back into
//! [`TransactionSupport`](crate::TransactionSupport). Participants bound
//! during a step are picked up by the next step, not the current one.

use crate::context::{Phase, TransactionContext};
use std::any::Any;
use std::rc::Rc;
use txnsync_concurrency::synchronization;
use txnsync_concurrency::{TransactionSynchronization, PERSISTENCE_SYNCHRONIZATION_ORDER};
use txnsync_core::{CompletionStatus, Error, ResourceKey, Result};

/// Order of the coordinator's synchronization, just ahead of the persistence engine
pub const SESSION_SYNCHRONIZATION_ORDER: i32 = PERSISTENCE_SYNCHRONIZATION_ORDER - 100;

/// Thread resource key under which the current context is bound
pub(crate) const CONTEXT_RESOURCE_KEY: ResourceKey = ResourceKey::from_static("txnsync.context");

/// Drives the commit phases of one [`TransactionContext`]
pub struct PhaseDispatcher {
    context: Rc<TransactionContext>,
}

impl PhaseDispatcher {
    pub(crate) fn new(context: Rc<TransactionContext>) -> Self {
        PhaseDispatcher { context }
    }

    /// Run all flush work now
    ///
    /// The first failure is returned and the remaining flush work skipped;
    /// rolling back is up to the caller.
    pub fn flush(&self) -> Result<()> {
        let previous = self.context.phase();
        self.context.set_phase(Phase::Flushing);
        let result = self.run_flush();
        self.context.set_phase(previous);
        result
    }

    fn run_flush(&self) -> Result<()> {
        for executor in self.context.rule_executors() {
            executor.execute_pending_rules()?;
        }
        for checker in self.context.integrity_checkers() {
            checker.check_integrity()?;
        }
        for dao in self.context.daos() {
            dao.flush()?;
        }
        for listener in self.context.listeners() {
            listener.flush()?;
        }
        Ok(())
    }

    fn is_bound(&self) -> bool {
        synchronization::get_resource(&CONTEXT_RESOURCE_KEY).is_some_and(|bound| {
            Rc::as_ptr(&bound).cast::<()>() == Rc::as_ptr(&self.context).cast::<()>()
        })
    }

    fn unbind(&self) {
        if self.is_bound() {
            synchronization::unbind_resource_if_possible(&CONTEXT_RESOURCE_KEY);
            tracing::debug!(txn_id = %self.context.id(), "Unbound transaction context");
        }
    }

    fn after_commit(&self) {
        let txn_id = self.context.id();
        for indexer in self.context.indexers() {
            if let Err(e) = indexer.commit() {
                tracing::error!(txn_id = %txn_id, error = %e, "Index commit failed after transaction commit");
            }
        }
        for listener in self.context.listeners() {
            if let Err(e) = listener.after_commit() {
                tracing::error!(txn_id = %txn_id, error = %e, "Listener after_commit failed");
            }
        }
    }

    fn after_rollback(&self) {
        let txn_id = self.context.id();
        for indexer in self.context.indexers() {
            if let Err(e) = indexer.rollback() {
                tracing::error!(txn_id = %txn_id, error = %e, "Index rollback failed");
            }
        }
        for listener in self.context.listeners() {
            if let Err(e) = listener.after_rollback() {
                tracing::error!(txn_id = %txn_id, error = %e, "Listener after_rollback failed");
            }
        }
    }
}

impl TransactionSynchronization for PhaseDispatcher {
    fn order(&self) -> i32 {
        SESSION_SYNCHRONIZATION_ORDER
    }

    fn suspend(&self) {
        tracing::debug!(context = %self.context, "Suspending transaction");
        self.unbind();
    }

    fn resume(&self) {
        tracing::debug!(context = %self.context, "Resuming transaction");
        let context: Rc<dyn Any> = Rc::clone(&self.context) as Rc<dyn Any>;
        if let Err(e) = synchronization::bind_resource(CONTEXT_RESOURCE_KEY, context) {
            tracing::error!(txn_id = %self.context.id(), error = %e, "Failed to rebind transaction context");
        }
    }

    fn before_commit(&self, read_only: bool) -> Result<()> {
        tracing::debug!(read_only, context = %self.context, "Before commit");
        if !self.is_bound() {
            return Err(Error::IllegalState(format!(
                "transaction context {} is not bound to the committing thread",
                self.context.id()
            )));
        }

        self.context.set_phase(Phase::Flushing);
        self.run_flush()?;

        self.context.set_phase(Phase::BeforeCommit);
        for indexer in self.context.indexers() {
            indexer.prepare()?;
        }
        for listener in self.context.listeners() {
            listener.before_commit(read_only)?;
        }
        Ok(())
    }

    fn before_completion(&self) -> Result<()> {
        tracing::debug!(context = %self.context, "Before completion");
        self.context.set_phase(Phase::BeforeCompletion);
        for listener in self.context.listeners() {
            if let Err(e) = listener.before_completion() {
                tracing::error!(txn_id = %self.context.id(), error = %e, "Listener before_completion failed");
            }
        }
        Ok(())
    }

    fn after_completion(&self, status: CompletionStatus) -> Result<()> {
        tracing::debug!(status = %status, context = %self.context, "After completion");
        if status == CompletionStatus::Committed {
            self.context.set_phase(Phase::Committed);
            self.after_commit();
        } else {
            self.context.set_phase(Phase::RolledBack);
            self.after_rollback();
        }

        self.unbind();
        self.context.set_phase(Phase::Cleared);
        Ok(())
    }
}
