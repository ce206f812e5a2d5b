//! Registration façade used by all collaborators.
//!
//! [`TransactionSupport`] is the entry point through which services attach
//! state and deferred work to the transaction running on the current thread.
//! The first call within a transaction creates its [`TransactionContext`]
//! and registers a [`PhaseDispatcher`] with the transaction manager; every
//! later call finds the same context.
//!
//! # Example
//!
//! ```ignore
//! use txnsync::prelude::*;
//!
//! const KEY_PENDING: &str = "Tagging.pendingUpdates";
//!
//! let support = service.support();
//! let pending = TransactionalResourceHelper::new(support).get_set::<String>(KEY_PENDING)?;
//! pending.borrow_mut().insert(tag);
//! support.bind_listener(tag_updater.clone())?;
//! ```

use crate::context::TransactionContext;
use crate::dispatcher::{PhaseDispatcher, CONTEXT_RESOURCE_KEY};
use std::any::Any;
use std::rc::Rc;
use txnsync_concurrency::synchronization;
use txnsync_core::{
    Error, FlushableDao, IndexParticipant, IntegrityChecker, ResourceKey, Result, RuleExecutor,
    TransactionListener, TxnId, TxnReadState,
};

/// Per-thread transaction coordinator façade
///
/// Stateless: all state lives with the transaction on the calling thread,
/// so copies of this value are interchangeable.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionSupport {
    _private: (),
}

impl TransactionSupport {
    /// Create a façade
    pub const fn new() -> Self {
        TransactionSupport { _private: () }
    }

    /// Id of the current transaction, or `None` outside a transaction
    pub fn transaction_id(&self) -> Option<TxnId> {
        if !synchronization::is_synchronization_active() {
            return None;
        }
        match self.context() {
            Ok(context) => Some(context.id()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to obtain transaction context");
                None
            }
        }
    }

    /// Read/write state of the current transaction
    pub fn read_state(&self) -> TxnReadState {
        if !synchronization::is_synchronization_active() {
            TxnReadState::NoTransaction
        } else if synchronization::is_current_transaction_read_only() {
            TxnReadState::ReadOnly
        } else {
            TxnReadState::ReadWrite
        }
    }

    /// Resource bound under `key`, downcast to `V`
    ///
    /// # Errors
    ///
    /// - [`Error::NoTransaction`] outside a transaction
    /// - [`Error::WrongType`] if the resource is not a `V`
    pub fn get_resource<V: Any>(&self, key: impl Into<ResourceKey>) -> Result<Option<Rc<V>>> {
        let key = key.into();
        match self.get_resource_any(key.clone())? {
            None => Ok(None),
            Some(value) => value.downcast::<V>().map(Some).map_err(|_| Error::WrongType {
                key: key.to_string(),
                expected: std::any::type_name::<V>(),
            }),
        }
    }

    /// Resource bound under `key`, untyped
    pub fn get_resource_any(&self, key: impl Into<ResourceKey>) -> Result<Option<Rc<dyn Any>>> {
        let key = key.into();
        let resource = self.context()?.get_resource(&key);
        tracing::trace!(key = %key, found = resource.is_some(), "Fetched resource");
        Ok(resource)
    }

    /// Bind `value` under `key`, replacing any previous binding
    pub fn bind_resource<V: Any>(&self, key: impl Into<ResourceKey>, value: V) -> Result<()> {
        self.bind_shared_resource(key, Rc::new(value))
    }

    /// Bind an already shared value under `key`, replacing any previous binding
    pub fn bind_shared_resource(&self, key: impl Into<ResourceKey>, value: Rc<dyn Any>) -> Result<()> {
        let key = key.into();
        let context = self.context()?;
        tracing::trace!(txn_id = %context.id(), key = %key, "Bound resource");
        context.bind_resource(key, value);
        Ok(())
    }

    /// Remove the binding under `key`, if any
    pub fn unbind_resource(&self, key: impl Into<ResourceKey>) -> Result<()> {
        let key = key.into();
        let context = self.context()?;
        if context.unbind_resource(&key).is_some() {
            tracing::trace!(txn_id = %context.id(), key = %key, "Unbound resource");
        }
        Ok(())
    }

    /// Register a listener; returns `true` if it was not yet registered
    pub fn bind_listener(&self, listener: Rc<dyn TransactionListener>) -> Result<bool> {
        let context = self.context()?;
        let bound = context.bind_listener(listener);
        log_bound(&context, "listener", bound);
        Ok(bound)
    }

    /// Register a rule executor (flushed first)
    pub fn bind_rule_executor(&self, executor: Rc<dyn RuleExecutor>) -> Result<bool> {
        let context = self.context()?;
        let bound = context.bind_rule_executor(executor);
        log_bound(&context, "rule executor", bound);
        Ok(bound)
    }

    /// Register an integrity checker (flushed after rule executors)
    pub fn bind_integrity_checker(&self, checker: Rc<dyn IntegrityChecker>) -> Result<bool> {
        let context = self.context()?;
        let bound = context.bind_integrity_checker(checker);
        log_bound(&context, "integrity checker", bound);
        Ok(bound)
    }

    /// Register a flushable DAO (flushed after integrity checkers)
    pub fn bind_dao(&self, dao: Rc<dyn FlushableDao>) -> Result<bool> {
        let context = self.context()?;
        let bound = context.bind_dao(dao);
        log_bound(&context, "DAO", bound);
        Ok(bound)
    }

    /// Register an index participant (prepared before commit, then committed or rolled back)
    pub fn bind_indexer(&self, indexer: Rc<dyn IndexParticipant>) -> Result<bool> {
        let context = self.context()?;
        let bound = context.bind_indexer(indexer);
        log_bound(&context, "indexer", bound);
        Ok(bound)
    }

    /// Run all flush work of the current transaction now
    ///
    /// Use this to surface failures of deferred work before commit. The
    /// first failure is returned; marking the transaction for rollback is up
    /// to the caller.
    pub fn flush(&self) -> Result<()> {
        PhaseDispatcher::new(self.context()?).flush()
    }

    /// Whether any bound DAO has unflushed changes
    pub fn is_dirty(&self) -> Result<bool> {
        Ok(self.context()?.is_dirty())
    }

    /// The current transaction's context, created on first use
    pub fn context(&self) -> Result<Rc<TransactionContext>> {
        if !synchronization::is_synchronization_active() {
            return Err(Error::NoTransaction(
                "transaction must be active and synchronization is required".into(),
            ));
        }
        if let Some(bound) = synchronization::get_resource(&CONTEXT_RESOURCE_KEY) {
            return bound.downcast::<TransactionContext>().map_err(|_| {
                Error::Internal(format!(
                    "thread resource [{}] does not hold a transaction context",
                    CONTEXT_RESOURCE_KEY
                ))
            });
        }

        let context = Rc::new(TransactionContext::new(TxnId::new()));
        synchronization::register_synchronization(Rc::new(PhaseDispatcher::new(Rc::clone(
            &context,
        ))))?;
        synchronization::bind_resource(CONTEXT_RESOURCE_KEY, Rc::clone(&context) as Rc<dyn Any>)?;
        tracing::debug!(txn_id = %context.id(), "Bound transaction context");
        Ok(context)
    }
}

fn log_bound(context: &TransactionContext, kind: &'static str, bound: bool) {
    if bound {
        tracing::debug!(txn_id = %context.id(), kind, "Bound service");
    } else {
        tracing::debug!(txn_id = %context.id(), kind, "Service already bound");
    }
}
