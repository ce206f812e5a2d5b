//! Convenient imports for txnsync.
//!
//! ```ignore
//! use txnsync::prelude::*;
//!
//! let service = TransactionService::new();
//! let txn = service.begin(false)?;
//! service.support().bind_listener(listener)?;
//! service.commit(txn)?;
//! ```

// Main entry point
pub use crate::service::{TransactionService, TransactionServiceBuilder};
pub use crate::support::TransactionSupport;

// Error handling
pub use txnsync_core::{Error, Result};

// Collaborator capabilities
pub use txnsync_core::{
    FlushableDao, IndexParticipant, IntegrityChecker, RuleExecutor, TransactionListener,
};

// Helpers
pub use crate::resource_helper::TransactionalResourceHelper;
pub use crate::retrying::RetryingTransactionHelper;

// Core types
pub use txnsync_core::{CompletionStatus, ResourceKey, TxnId, TxnReadState};
