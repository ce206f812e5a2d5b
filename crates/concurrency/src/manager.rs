//! Transaction manager for thread-bound transactions
//!
//! Drives the synchronization callbacks registered in
//! [`synchronization`](crate::synchronization) through the commit protocol.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Participating handle: return, the outermost handle decides
//! 2. Rollback-only: run rollback completion, return UnexpectedRollback
//! 3. before_commit(read_only) on every synchronization (FAIL FAST)
//!    - on error: rollback completion, return the error
//! 4. before_completion() on every synchronization (errors logged)
//! 5. after_completion(Committed) on every synchronization (errors logged)
//! 6. Clear thread state, resume any suspended outer transaction
//! ```
//!
//! Synchronizations run in ascending `order()`. A `RequiresNew` begin
//! suspends the running transaction: every synchronization gets `suspend()`,
//! then the list, the thread resources and the transaction frame move into
//! the new handle. They are restored (with `resume()`) once the inner
//! transaction completes.
//!
//! Thread resources never outlive the transaction that bound them: anything
//! still bound after completion is discarded with a warning.
//!
//! ## Abandoned Handles
//!
//! Dropping the handle of a transaction it started without committing or
//! rolling back (a panic in the unit of work, an early `?` return) rolls
//! the transaction back. If the transaction is suspended at that point, it
//! is rolled back as soon as it is resumed.
//!
//! Transaction ids are unique per process, so handles of different managers
//! on one thread never collide. The manager itself is `Send + Sync` and only
//! holds counters; the state of a running transaction lives in thread-local
//! storage and its handle is `!Send`.

use crate::synchronization::{self, ResourceMap, SynchronizationRef};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use txnsync_core::{CompletionStatus, Error, Propagation, Result, TransactionDefinition};

/// Next transaction id, shared by all managers
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Next manager id
static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct ActiveTransaction {
    txn_id: u64,
    read_only: bool,
    rollback_only: bool,
    name: Option<String>,
}

/// Frame of a started transaction whose handle was dropped while suspended
struct AbandonedFrame {
    txn_id: u64,
    suspended: Option<SuspendedResources>,
    counters: Arc<Counters>,
}

thread_local! {
    static CURRENT: RefCell<Option<ActiveTransaction>> = RefCell::new(None);
    static ABANDONED: RefCell<Vec<AbandonedFrame>> = RefCell::new(Vec::new());
}

fn current() -> Option<ActiveTransaction> {
    CURRENT.with(|c| c.borrow().clone())
}

fn take_abandoned(txn_id: u64) -> Option<AbandonedFrame> {
    ABANDONED.with(|a| {
        let mut abandoned = a.borrow_mut();
        let index = abandoned.iter().position(|f| f.txn_id == txn_id)?;
        Some(abandoned.swap_remove(index))
    })
}

/// State of an outer transaction detached by a `RequiresNew` begin
struct SuspendedResources {
    transaction: ActiveTransaction,
    synchronizations: Vec<SynchronizationRef>,
    resources: ResourceMap,
}

#[derive(Debug)]
struct Counters {
    manager_id: u64,
    total_begun: AtomicU64,
    total_committed: AtomicU64,
    total_rolled_back: AtomicU64,
    active: AtomicU64,
}

/// Handle to a transaction begun on the current thread
///
/// Must be passed back to [`TransactionManager::commit`] or
/// [`TransactionManager::rollback`] of the manager that created it, on the
/// same thread. Dropping the handle of a transaction it started without
/// completing it rolls that transaction back.
pub struct TransactionHandle {
    txn_id: u64,
    new_transaction: bool,
    read_only: bool,
    completed: bool,
    suspended: Option<SuspendedResources>,
    counters: Arc<Counters>,
    _not_send: PhantomData<Rc<()>>,
}

impl TransactionHandle {
    /// Numeric id of the transaction, unique within the process
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Whether this handle started the transaction (as opposed to joining it)
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// Whether the transaction is read-only
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether an outer transaction was suspended to begin this one
    pub fn has_suspended(&self) -> bool {
        self.suspended.is_some()
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("txn_id", &self.txn_id)
            .field("new_transaction", &self.new_transaction)
            .field("read_only", &self.read_only)
            .field("completed", &self.completed)
            .field(
                "suspended",
                &self.suspended.as_ref().map(|s| s.transaction.txn_id),
            )
            .finish()
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        if self.completed || !self.new_transaction {
            return;
        }
        let Ok(running) = CURRENT.try_with(|c| c.borrow().as_ref().map(|t| t.txn_id)) else {
            return;
        };
        if running == Some(self.txn_id) {
            tracing::warn!(
                txn_id = self.txn_id,
                "Transaction handle dropped without completion; rolling back"
            );
            roll_back(self.txn_id, self.suspended.take(), &self.counters);
        } else {
            tracing::warn!(
                txn_id = self.txn_id,
                current = ?running,
                "Suspended transaction handle dropped; rolling back on resume"
            );
            let frame = AbandonedFrame {
                txn_id: self.txn_id,
                suspended: self.suspended.take(),
                counters: Arc::clone(&self.counters),
            };
            let _ = ABANDONED.try_with(|a| a.borrow_mut().push(frame));
        }
    }
}

/// Transaction manager metrics.
#[derive(Debug, Clone)]
pub struct TransactionMetrics {
    /// Total transactions started (participation not counted)
    pub total_begun: u64,
    /// Total committed transactions
    pub total_committed: u64,
    /// Total rolled back transactions
    pub total_rolled_back: u64,
    /// Currently active transactions across all threads
    pub active_count: u64,
    /// Commit success rate (0.0 - 1.0)
    pub commit_rate: f64,
}

/// Manages transaction lifecycle and synchronization callbacks
///
/// Share one manager between threads with `Arc`. Each thread runs its own
/// transactions independently. Several managers may run transactions on the
/// same thread; each handle still completes only through its own manager.
pub struct TransactionManager {
    counters: Arc<Counters>,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new() -> Self {
        TransactionManager {
            counters: Arc::new(Counters {
                manager_id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
                total_begun: AtomicU64::new(0),
                total_committed: AtomicU64::new(0),
                total_rolled_back: AtomicU64::new(0),
                active: AtomicU64::new(0),
            }),
        }
    }

    /// Begin a transaction according to `definition`
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] for [`Propagation::Mandatory`] with no
    ///   transaction running
    pub fn begin(&self, definition: &TransactionDefinition) -> Result<TransactionHandle> {
        match (current(), definition.propagation) {
            (Some(existing), Propagation::Required | Propagation::Mandatory) => {
                if !definition.read_only && existing.read_only {
                    tracing::warn!(
                        txn_id = existing.txn_id,
                        "Read-write work joining a read-only transaction"
                    );
                }
                tracing::trace!(txn_id = existing.txn_id, "Participating in existing transaction");
                Ok(TransactionHandle {
                    txn_id: existing.txn_id,
                    new_transaction: false,
                    read_only: existing.read_only,
                    completed: false,
                    suspended: None,
                    counters: Arc::clone(&self.counters),
                    _not_send: PhantomData,
                })
            }
            (Some(_), Propagation::RequiresNew) => {
                let suspended = suspend()?;
                let outer_id = suspended.transaction.txn_id;
                match self.start(definition, Some(suspended)) {
                    Ok(handle) => Ok(handle),
                    Err(e) => {
                        tracing::error!(txn_id = outer_id, error = %e, "Failed to start nested transaction");
                        Err(e)
                    }
                }
            }
            (None, Propagation::Mandatory) => Err(Error::IllegalState(
                "no existing transaction found for transaction marked with propagation 'mandatory'"
                    .into(),
            )),
            (None, _) => self.start(definition, None),
        }
    }

    /// Commit the transaction behind `handle`
    ///
    /// For a participating handle this does nothing; the outermost handle
    /// commits. See the module docs for the full sequence.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if `handle` belongs to another manager or is
    ///   not the current transaction; the handle is then dropped, which rolls
    ///   its transaction back (see the module docs)
    /// - [`Error::UnexpectedRollback`] if the transaction was rollback-only
    /// - any error raised by a `before_commit` callback (the transaction has
    ///   been rolled back when this is returned)
    pub fn commit(&self, mut handle: TransactionHandle) -> Result<()> {
        let current = self.check_current(&handle)?;
        if !handle.new_transaction {
            tracing::trace!(txn_id = handle.txn_id, "Commit of participating transaction deferred");
            handle.completed = true;
            return Ok(());
        }
        if current.rollback_only {
            tracing::debug!(txn_id = handle.txn_id, "Transaction is rollback-only; rolling back");
            let txn_id = handle.txn_id;
            Self::process_rollback(&mut handle);
            return Err(Error::UnexpectedRollback(format!(
                "transaction {txn_id} was marked rollback-only"
            )));
        }

        if let Err(e) = trigger_before_commit(handle.read_only) {
            tracing::debug!(
                txn_id = handle.txn_id,
                error = %e,
                "Before-commit failed; rolling back"
            );
            Self::process_rollback(&mut handle);
            return Err(e);
        }
        trigger_before_completion();

        tracing::debug!(txn_id = handle.txn_id, name = ?current.name, "Committed transaction");
        trigger_after_completion(CompletionStatus::Committed);
        handle.completed = true;
        self.counters.total_committed.fetch_add(1, Ordering::Relaxed);
        finish(handle.txn_id, handle.suspended.take(), &self.counters);
        Ok(())
    }

    /// Roll back the transaction behind `handle`
    ///
    /// A participating handle only marks the running transaction
    /// rollback-only; the outermost handle then fails to commit.
    pub fn rollback(&self, mut handle: TransactionHandle) -> Result<()> {
        self.check_current(&handle)?;
        if !handle.new_transaction {
            tracing::debug!(
                txn_id = handle.txn_id,
                "Participating transaction rolled back; marking rollback-only"
            );
            handle.completed = true;
            return self.set_rollback_only();
        }
        Self::process_rollback(&mut handle);
        Ok(())
    }

    /// Mark the current transaction so that it can only roll back
    pub fn set_rollback_only(&self) -> Result<()> {
        CURRENT.with(|c| match c.borrow_mut().as_mut() {
            Some(txn) => {
                txn.rollback_only = true;
                Ok(())
            }
            None => Err(Error::NoTransaction(
                "cannot mark rollback-only without a transaction".into(),
            )),
        })
    }

    /// Whether the current transaction is marked rollback-only
    pub fn is_rollback_only(&self) -> bool {
        current().is_some_and(|t| t.rollback_only)
    }

    /// Whether a transaction is running on this thread
    pub fn has_transaction(&self) -> bool {
        current().is_some()
    }

    /// Numeric id of the transaction running on this thread
    pub fn current_transaction_id(&self) -> Option<u64> {
        current().map(|t| t.txn_id)
    }

    /// Get transaction metrics
    pub fn metrics(&self) -> TransactionMetrics {
        let counters = &self.counters;
        let committed = counters.total_committed.load(Ordering::Relaxed);
        let rolled_back = counters.total_rolled_back.load(Ordering::Relaxed);
        let completed = committed + rolled_back;
        TransactionMetrics {
            total_begun: counters.total_begun.load(Ordering::Relaxed),
            total_committed: committed,
            total_rolled_back: rolled_back,
            active_count: counters.active.load(Ordering::Relaxed),
            commit_rate: if completed == 0 {
                0.0
            } else {
                committed as f64 / completed as f64
            },
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn check_current(&self, handle: &TransactionHandle) -> Result<ActiveTransaction> {
        if handle.counters.manager_id != self.counters.manager_id {
            return Err(Error::IllegalState(format!(
                "transaction {} was begun by another transaction manager",
                handle.txn_id
            )));
        }
        match current() {
            Some(txn) if txn.txn_id == handle.txn_id => Ok(txn),
            Some(txn) => Err(Error::IllegalState(format!(
                "transaction {} is not the current transaction ({}) on this thread",
                handle.txn_id, txn.txn_id
            ))),
            None => Err(Error::IllegalState(format!(
                "transaction {} is not active on this thread",
                handle.txn_id
            ))),
        }
    }

    fn start(
        &self,
        definition: &TransactionDefinition,
        suspended: Option<SuspendedResources>,
    ) -> Result<TransactionHandle> {
        if let Err(e) = synchronization::init_synchronization() {
            if let Some(suspended) = suspended {
                resume(suspended);
            }
            return Err(e);
        }
        let txn_id = NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed);
        synchronization::set_current_transaction_read_only(definition.read_only);
        synchronization::set_current_transaction_name(definition.name.clone());
        CURRENT.with(|c| {
            *c.borrow_mut() = Some(ActiveTransaction {
                txn_id,
                read_only: definition.read_only,
                rollback_only: false,
                name: definition.name.clone(),
            })
        });
        self.counters.total_begun.fetch_add(1, Ordering::Relaxed);
        self.counters.active.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            txn_id,
            read_only = definition.read_only,
            name = ?definition.name,
            "Began transaction"
        );
        Ok(TransactionHandle {
            txn_id,
            new_transaction: true,
            read_only: definition.read_only,
            completed: false,
            suspended,
            counters: Arc::clone(&self.counters),
            _not_send: PhantomData,
        })
    }

    fn process_rollback(handle: &mut TransactionHandle) {
        handle.completed = true;
        roll_back(handle.txn_id, handle.suspended.take(), &handle.counters);
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Thread state transitions
// ============================================================================

fn suspend() -> Result<SuspendedResources> {
    let synchronizations = synchronization::synchronizations();
    for sync in &synchronizations {
        sync.suspend();
    }
    synchronization::clear();
    let resources = synchronization::take_resources();
    let transaction = CURRENT
        .with(|c| c.borrow_mut().take())
        .ok_or_else(|| Error::Internal("no transaction to suspend".into()))?;
    tracing::debug!(txn_id = transaction.txn_id, "Suspended transaction");
    Ok(SuspendedResources {
        transaction,
        synchronizations,
        resources,
    })
}

fn resume(suspended: SuspendedResources) {
    let SuspendedResources {
        transaction,
        synchronizations,
        resources,
    } = suspended;
    let txn_id = transaction.txn_id;

    synchronization::restore_resources(resources);
    synchronization::set_current_transaction_read_only(transaction.read_only);
    synchronization::set_current_transaction_name(transaction.name.clone());
    CURRENT.with(|c| *c.borrow_mut() = Some(transaction));
    if let Err(e) = synchronization::init_synchronization() {
        tracing::error!(txn_id, error = %e, "Failed to restore synchronization on resume");
        return;
    }
    for sync in synchronizations {
        sync.resume();
        if let Err(e) = synchronization::register_synchronization(sync) {
            tracing::error!(txn_id, error = %e, "Failed to re-register synchronization");
        }
    }
    tracing::debug!(txn_id, "Resumed transaction");

    if let Some(frame) = take_abandoned(txn_id) {
        tracing::warn!(txn_id, "Rolling back resumed transaction whose handle was dropped");
        roll_back(frame.txn_id, frame.suspended, &frame.counters);
    }
}

/// Rollback completion of the current transaction, then cleanup
fn roll_back(txn_id: u64, suspended: Option<SuspendedResources>, counters: &Counters) {
    trigger_before_completion();
    tracing::debug!(txn_id, "Rolled back transaction");
    trigger_after_completion(CompletionStatus::RolledBack);
    counters.total_rolled_back.fetch_add(1, Ordering::Relaxed);
    finish(txn_id, suspended, counters);
}

/// Clear thread state and resume the suspended outer transaction, if any
fn finish(txn_id: u64, suspended: Option<SuspendedResources>, counters: &Counters) {
    synchronization::clear();
    let leftover = synchronization::take_resources();
    if !leftover.is_empty() {
        let keys: Vec<String> = leftover.keys().map(|k| k.to_string()).collect();
        tracing::warn!(
            txn_id,
            keys = ?keys,
            "Discarding thread resources still bound after completion"
        );
    }
    CURRENT.with(|c| *c.borrow_mut() = None);
    counters.active.fetch_sub(1, Ordering::Relaxed);
    if let Some(suspended) = suspended {
        resume(suspended);
    }
}

fn trigger_before_commit(read_only: bool) -> Result<()> {
    for sync in synchronization::synchronizations() {
        sync.before_commit(read_only)?;
    }
    Ok(())
}

fn trigger_before_completion() {
    for sync in synchronization::synchronizations() {
        if let Err(e) = sync.before_completion() {
            tracing::error!(error = %e, "Synchronization before_completion failed");
        }
    }
}

fn trigger_after_completion(status: CompletionStatus) {
    for sync in synchronization::synchronizations() {
        if let Err(e) = sync.after_completion(status) {
            tracing::error!(
                status = %status,
                error = %e,
                "Synchronization after_completion failed"
            );
        }
    }
}
