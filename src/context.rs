//! Per-transaction identity, resources and registered collaborators.
//!
//! A [`TransactionContext`] is created lazily by
//! [`TransactionSupport`](crate::TransactionSupport) the first time a
//! transaction is touched, and lives until that transaction completes. It is
//! shared through `Rc` between the thread's resource map and the
//! [`PhaseDispatcher`](crate::dispatcher::PhaseDispatcher) registered with
//! the transaction manager, and is therefore confined to one thread.

use crate::registry::ListenerSet;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use txnsync_core::{
    FlushableDao, IndexParticipant, IntegrityChecker, ResourceKey, RuleExecutor,
    TransactionListener, TxnId,
};

/// Lifecycle phase of a transaction context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Collaborators may bind resources and listeners
    Active,
    /// Flush work is running
    Flushing,
    /// Before-commit callbacks are running
    BeforeCommit,
    /// Before-completion callbacks are running
    BeforeCompletion,
    /// After-commit callbacks are running
    Committed,
    /// After-rollback callbacks are running
    RolledBack,
    /// Unbound from the thread; terminal
    Cleared,
}

#[derive(Default)]
struct Participants {
    listeners: ListenerSet<dyn TransactionListener>,
    rule_executors: ListenerSet<dyn RuleExecutor>,
    integrity_checkers: ListenerSet<dyn IntegrityChecker>,
    daos: ListenerSet<dyn FlushableDao>,
    indexers: ListenerSet<dyn IndexParticipant>,
}

/// Identity, resource map and listener registry of one transaction
pub struct TransactionContext {
    id: TxnId,
    phase: Cell<Phase>,
    resources: RefCell<FxHashMap<ResourceKey, Rc<dyn Any>>>,
    participants: RefCell<Participants>,
}

impl TransactionContext {
    pub(crate) fn new(id: TxnId) -> Self {
        TransactionContext {
            id,
            phase: Cell::new(Phase::Active),
            resources: RefCell::new(FxHashMap::default()),
            participants: RefCell::new(Participants::default()),
        }
    }

    /// Transaction id, fixed for the lifetime of the context
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        let previous = self.phase.replace(phase);
        if previous != phase {
            tracing::trace!(txn_id = %self.id, ?previous, ?phase, "Phase transition");
        }
    }

    // ========================================================================
    // Resources
    // ========================================================================

    pub(crate) fn get_resource(&self, key: &ResourceKey) -> Option<Rc<dyn Any>> {
        self.resources.borrow().get(key).cloned()
    }

    /// Returns the value previously bound under `key`
    pub(crate) fn bind_resource(&self, key: ResourceKey, value: Rc<dyn Any>) -> Option<Rc<dyn Any>> {
        self.resources.borrow_mut().insert(key, value)
    }

    pub(crate) fn unbind_resource(&self, key: &ResourceKey) -> Option<Rc<dyn Any>> {
        self.resources.borrow_mut().remove(key)
    }

    /// Number of bound resources
    pub fn resource_count(&self) -> usize {
        self.resources.borrow().len()
    }

    // ========================================================================
    // Participants
    // ========================================================================

    pub(crate) fn bind_listener(&self, listener: Rc<dyn TransactionListener>) -> bool {
        self.participants.borrow_mut().listeners.insert(listener)
    }

    pub(crate) fn bind_rule_executor(&self, executor: Rc<dyn RuleExecutor>) -> bool {
        self.participants.borrow_mut().rule_executors.insert(executor)
    }

    pub(crate) fn bind_integrity_checker(&self, checker: Rc<dyn IntegrityChecker>) -> bool {
        self.participants
            .borrow_mut()
            .integrity_checkers
            .insert(checker)
    }

    pub(crate) fn bind_dao(&self, dao: Rc<dyn FlushableDao>) -> bool {
        self.participants.borrow_mut().daos.insert(dao)
    }

    pub(crate) fn bind_indexer(&self, indexer: Rc<dyn IndexParticipant>) -> bool {
        self.participants.borrow_mut().indexers.insert(indexer)
    }

    pub(crate) fn listeners(&self) -> Vec<Rc<dyn TransactionListener>> {
        self.participants.borrow().listeners.snapshot()
    }

    pub(crate) fn rule_executors(&self) -> Vec<Rc<dyn RuleExecutor>> {
        self.participants.borrow().rule_executors.snapshot()
    }

    pub(crate) fn integrity_checkers(&self) -> Vec<Rc<dyn IntegrityChecker>> {
        self.participants.borrow().integrity_checkers.snapshot()
    }

    pub(crate) fn daos(&self) -> Vec<Rc<dyn FlushableDao>> {
        self.participants.borrow().daos.snapshot()
    }

    pub(crate) fn indexers(&self) -> Vec<Rc<dyn IndexParticipant>> {
        self.participants.borrow().indexers.snapshot()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.participants.borrow().listeners.len()
    }

    /// Whether any bound DAO reports unflushed changes
    pub fn is_dirty(&self) -> bool {
        self.daos().iter().any(|dao| dao.is_dirty())
    }
}

impl std::fmt::Display for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let participants = self.participants.borrow();
        write!(
            f,
            "TransactionContext[txnId={}, phase={:?}, listeners={}, rules={}, integrity={}, daos={}, indexers={}, resources={}]",
            self.id,
            self.phase.get(),
            participants.listeners.len(),
            participants.rule_executors.len(),
            participants.integrity_checkers.len(),
            participants.daos.len(),
            participants.indexers.len(),
            self.resources.borrow().len(),
        )
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
