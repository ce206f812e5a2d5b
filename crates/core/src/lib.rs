//! Core types and traits for txnsync
//!
//! This crate defines the vocabulary shared by the transaction manager and
//! the coordinator:
//! - Error: the single error type and `Result` alias
//! - Types: TxnId, ResourceKey, CompletionStatus, TxnReadState, Propagation
//! - Listener: the collaborator capabilities driven at commit time

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod listener;
pub mod types;

pub use error::{Error, Result};
pub use listener::{FlushableDao, IndexParticipant, IntegrityChecker, RuleExecutor, TransactionListener};
pub use types::{
    CompletionStatus, Propagation, ResourceKey, TransactionDefinition, TxnId, TxnReadState,
};
