//! Thread-bound synchronization registry
//!
//! Every thread carries its own registry holding:
//! - the list of [`TransactionSynchronization`]s of the running transaction
//!   (`None` while synchronization is inactive),
//! - a resource map used by collaborators to find per-transaction state,
//! - the read-only flag and name of the running transaction.
//!
//! The registry is driven by [`TransactionManager`](crate::TransactionManager):
//! it is initialised when a transaction starts, detached on suspend,
//! restored on resume and cleared after completion. Nothing here is shared
//! between threads, so no locking is involved.
//!
//! Callbacks are never invoked while the registry is borrowed; callers get
//! snapshots and may re-enter freely.

use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use txnsync_core::{CompletionStatus, Error, ResourceKey, Result};

/// Order used by synchronizations that do not care where they run
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Order of the persistence engine's own session synchronization
///
/// Synchronizations with a smaller order run their before-commit work
/// before the persistence session is finalized.
pub const PERSISTENCE_SYNCHRONIZATION_ORDER: i32 = 1000;

/// Callback contract between the transaction manager and its participants
///
/// Invoked in ascending [`order`](Self::order) for every phase. Errors from
/// `before_commit` abort the commit; errors from the completion callbacks
/// are logged by the manager and otherwise ignored.
pub trait TransactionSynchronization {
    /// Position in the callback sequence (lower runs first)
    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    /// The transaction is being suspended; detach thread-bound resources
    fn suspend(&self) {}

    /// The transaction is being resumed; re-attach thread-bound resources
    fn resume(&self) {}

    /// Invoked before commit, in order, failing fast
    fn before_commit(&self, _read_only: bool) -> Result<()> {
        Ok(())
    }

    /// Invoked before commit or rollback
    fn before_completion(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked after commit or rollback with the final outcome
    fn after_completion(&self, _status: CompletionStatus) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to a registered synchronization
pub type SynchronizationRef = Rc<dyn TransactionSynchronization>;

/// Thread resources keyed by [`ResourceKey`]
pub type ResourceMap = FxHashMap<ResourceKey, Rc<dyn Any>>;

#[derive(Default)]
struct ThreadRegistry {
    synchronizations: Option<Vec<SynchronizationRef>>,
    resources: ResourceMap,
    read_only: bool,
    name: Option<String>,
}

thread_local! {
    static REGISTRY: RefCell<ThreadRegistry> = RefCell::new(ThreadRegistry::default());
}

// ============================================================================
// Synchronizations
// ============================================================================

/// Whether synchronization is active on this thread
pub fn is_synchronization_active() -> bool {
    REGISTRY.with(|r| r.borrow().synchronizations.is_some())
}

/// Activate synchronization for a new transaction
///
/// Fails if synchronization is already active on this thread.
pub fn init_synchronization() -> Result<()> {
    REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        if registry.synchronizations.is_some() {
            return Err(Error::IllegalState(
                "cannot activate synchronization - already active".into(),
            ));
        }
        registry.synchronizations = Some(Vec::new());
        tracing::trace!("Initializing transaction synchronization");
        Ok(())
    })
}

/// Register a synchronization for the current transaction
///
/// Fails with [`Error::IllegalState`] if synchronization is not active.
pub fn register_synchronization(synchronization: SynchronizationRef) -> Result<()> {
    REGISTRY.with(|r| match r.borrow_mut().synchronizations.as_mut() {
        Some(list) => {
            list.push(synchronization);
            Ok(())
        }
        None => Err(Error::IllegalState(
            "transaction synchronization is not active".into(),
        )),
    })
}

/// Snapshot of the registered synchronizations, sorted by order
///
/// The sort is stable: synchronizations with equal order keep their
/// registration order. Returns an empty list when inactive.
pub fn synchronizations() -> Vec<SynchronizationRef> {
    let mut list = REGISTRY.with(|r| r.borrow().synchronizations.clone().unwrap_or_default());
    list.sort_by_key(|s| s.order());
    list
}

/// Deactivate synchronization, dropping the registered list
pub fn clear_synchronization() {
    // dropped outside the borrow: a synchronization's Drop may re-enter
    let _dropped = REGISTRY.with(|r| r.borrow_mut().synchronizations.take());
    tracing::trace!("Clearing transaction synchronization");
}

// ============================================================================
// Resources
// ============================================================================

/// Whether a resource is bound under `key`
pub fn has_resource(key: &ResourceKey) -> bool {
    REGISTRY.with(|r| r.borrow().resources.contains_key(key))
}

/// The resource bound under `key`, if any
pub fn get_resource(key: &ResourceKey) -> Option<Rc<dyn Any>> {
    REGISTRY.with(|r| r.borrow().resources.get(key).cloned())
}

/// Bind a resource to this thread
///
/// Fails if a resource is already bound under `key`.
pub fn bind_resource(key: ResourceKey, value: Rc<dyn Any>) -> Result<()> {
    REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        if registry.resources.contains_key(&key) {
            return Err(Error::IllegalState(format!(
                "already value bound for key [{}] on this thread",
                key
            )));
        }
        tracing::trace!(key = %key, "Bound thread resource");
        registry.resources.insert(key, value);
        Ok(())
    })
}

/// Unbind the resource under `key`
///
/// Fails if nothing is bound.
pub fn unbind_resource(key: &ResourceKey) -> Result<Rc<dyn Any>> {
    unbind_resource_if_possible(key).ok_or_else(|| {
        Error::IllegalState(format!("no value for key [{}] bound to thread", key))
    })
}

/// Unbind the resource under `key` if one is bound
pub fn unbind_resource_if_possible(key: &ResourceKey) -> Option<Rc<dyn Any>> {
    let removed = REGISTRY.with(|r| r.borrow_mut().resources.remove(key));
    if removed.is_some() {
        tracing::trace!(key = %key, "Unbound thread resource");
    }
    removed
}

/// Detach every thread resource, leaving the map empty
pub fn take_resources() -> ResourceMap {
    REGISTRY.with(|r| std::mem::take(&mut r.borrow_mut().resources))
}

/// Re-attach resources detached by [`take_resources`]
///
/// A key bound in the meantime keeps its current value.
pub fn restore_resources(resources: ResourceMap) {
    REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        for (key, value) in resources {
            if registry.resources.contains_key(&key) {
                tracing::warn!(key = %key, "Resource rebound while detached; keeping current value");
                continue;
            }
            registry.resources.insert(key, value);
        }
    })
}

// ============================================================================
// Transaction characteristics
// ============================================================================

/// Mark the current transaction read-only or read-write
pub fn set_current_transaction_read_only(read_only: bool) {
    REGISTRY.with(|r| r.borrow_mut().read_only = read_only);
}

/// Whether the current transaction is read-only
pub fn is_current_transaction_read_only() -> bool {
    REGISTRY.with(|r| r.borrow().read_only)
}

/// Set the name of the current transaction
pub fn set_current_transaction_name(name: Option<String>) {
    REGISTRY.with(|r| r.borrow_mut().name = name);
}

/// Name of the current transaction, if any
pub fn current_transaction_name() -> Option<String> {
    REGISTRY.with(|r| r.borrow().name.clone())
}

/// Reset synchronization and transaction characteristics
///
/// Thread resources are left alone; see [`take_resources`].
pub fn clear() {
    let _dropped = REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        registry.read_only = false;
        registry.name = None;
        registry.synchronizations.take()
    });
}
