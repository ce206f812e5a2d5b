//! # txnsync
//!
//! Per-transaction synchronization for services that share a thread-bound
//! transaction.
//!
//! Services attach resources and deferred work to the transaction running on
//! the current thread through [`TransactionSupport`]. When the transaction
//! commits, a [`PhaseDispatcher`] flushes that work in a fixed order (rule
//! executors, integrity checkers, DAOs, listeners), prepares index
//! participants, and after completion notifies listeners of the outcome.
//!
//! ## Quick Start
//!
//! ```ignore
//! use txnsync::prelude::*;
//!
//! let service = TransactionService::new();
//!
//! service.retrying_helper().do_in_transaction(|| {
//!     let support = service.support();
//!     support.bind_resource("import.batch", 42u32)?;
//!     support.bind_listener(audit_listener.clone())?;
//!     Ok(())
//! })?;
//! ```
//!
//! ## Nesting
//!
//! A transaction begun with [`TransactionService::begin_non_propagating`]
//! suspends the current one. Its context is independent: resources and
//! listeners bound inside it are invisible to the outer transaction, and the
//! outer context is bound again once the inner transaction completes.
//!
//! ## Modules
//!
//! - [`TransactionSupport`] - registration façade
//! - [`TransactionContext`] - per-transaction state
//! - [`PhaseDispatcher`] - commit-phase driver
//! - [`TransactionalResourceHelper`] - transaction-scoped collections
//! - [`TransactionService`] / [`RetryingTransactionHelper`] - running work

#![warn(missing_docs)]

mod config;
mod context;
mod dispatcher;
mod registry;
mod resource_helper;
mod retrying;
mod service;
mod support;

pub mod prelude;

// Re-export main entry points
pub use config::TransactionConfig;
pub use service::{TransactionService, TransactionServiceBuilder};
pub use support::TransactionSupport;

// Coordinator
pub use context::{Phase, TransactionContext};
pub use dispatcher::{PhaseDispatcher, SESSION_SYNCHRONIZATION_ORDER};
pub use registry::ListenerSet;
pub use resource_helper::{TransactionalMap, TransactionalResourceHelper, TransactionalSet};
pub use retrying::RetryingTransactionHelper;

// Re-export core types
pub use txnsync_core::{
    CompletionStatus, Error, FlushableDao, IndexParticipant, IntegrityChecker, Propagation,
    ResourceKey, Result, RuleExecutor, TransactionDefinition, TransactionListener, TxnId,
    TxnReadState,
};

// Re-export the transaction manager
pub use txnsync_concurrency::{
    synchronization, TransactionHandle, TransactionManager, TransactionMetrics,
    TransactionSynchronization, LOWEST_PRECEDENCE, PERSISTENCE_SYNCHRONIZATION_ORDER,
};
