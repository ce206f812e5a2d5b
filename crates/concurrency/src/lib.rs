//! Thread-bound transaction management for txnsync
//!
//! This crate implements the underlying transaction manager that the
//! coordinator plugs into:
//! - Synchronization registry: per-thread callbacks, resources and flags
//! - TransactionManager: begin/commit/rollback with propagation
//! - Suspend/resume of outer transactions for `RequiresNew`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod synchronization;

pub use manager::{TransactionHandle, TransactionManager, TransactionMetrics};
pub use synchronization::{
    SynchronizationRef, TransactionSynchronization, LOWEST_PRECEDENCE,
    PERSISTENCE_SYNCHRONIZATION_ORDER,
};
