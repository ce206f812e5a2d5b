//! Transaction service: entry point tying the manager, configuration and
//! coordinator together.
//!
//! This module provides the `TransactionService` struct, the primary entry
//! point for running units of work.

use crate::config::TransactionConfig;
use crate::retrying::RetryingTransactionHelper;
use crate::support::TransactionSupport;
use parking_lot::RwLock;
use std::sync::Arc;
use txnsync_concurrency::{TransactionHandle, TransactionManager, TransactionMetrics};
use txnsync_core::{Result, TransactionDefinition};

/// Transaction service.
///
/// Cheap to clone; clones share the same manager and configuration. Create
/// one with [`TransactionService::new`] or [`TransactionService::builder`].
///
/// # Example
///
/// ```ignore
/// use txnsync::prelude::*;
///
/// let service = TransactionService::new();
///
/// let txn = service.begin(false)?;
/// service.support().bind_resource("import.batch", 42u32)?;
/// service.commit(txn)?;
///
/// // Or let the helper commit, roll back and retry
/// service.retrying_helper().do_in_transaction(|| {
///     service.support().flush()
/// })?;
/// ```
#[derive(Clone)]
pub struct TransactionService {
    manager: Arc<TransactionManager>,
    config: Arc<RwLock<TransactionConfig>>,
}

impl TransactionService {
    /// Create a service with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for service configuration.
    pub fn builder() -> TransactionServiceBuilder {
        TransactionServiceBuilder::new()
    }

    /// Begin a transaction, joining the current one if present.
    pub fn begin(&self, read_only: bool) -> Result<TransactionHandle> {
        self.begin_with(TransactionDefinition::required().read_only(read_only))
    }

    /// Begin an independent transaction, suspending the current one if present.
    pub fn begin_non_propagating(&self, read_only: bool) -> Result<TransactionHandle> {
        self.begin_with(TransactionDefinition::requires_new().read_only(read_only))
    }

    /// Begin a transaction from an explicit definition.
    ///
    /// When writes are disallowed the transaction is forced read-only.
    pub fn begin_with(&self, mut definition: TransactionDefinition) -> Result<TransactionHandle> {
        if !self.allows_write() && !definition.read_only {
            tracing::debug!(
                propagation = ?definition.propagation,
                "Writes disallowed; beginning read-only transaction"
            );
            definition.read_only = true;
        }
        self.manager.begin(&definition)
    }

    /// Commit a transaction.
    pub fn commit(&self, handle: TransactionHandle) -> Result<()> {
        self.manager.commit(handle)
    }

    /// Roll back a transaction.
    pub fn rollback(&self, handle: TransactionHandle) -> Result<()> {
        self.manager.rollback(handle)
    }

    /// Mark the current transaction rollback-only.
    pub fn set_rollback_only(&self) -> Result<()> {
        self.manager.set_rollback_only()
    }

    /// The coordinator façade for the calling thread.
    pub fn support(&self) -> TransactionSupport {
        TransactionSupport::new()
    }

    /// A retrying helper running work through this service.
    pub fn retrying_helper(&self) -> RetryingTransactionHelper {
        RetryingTransactionHelper::new(self.clone())
    }

    /// Allow or disallow read-write transactions from now on.
    pub fn set_allow_write(&self, allow_write: bool) {
        self.config.write().allow_write = allow_write;
        tracing::info!(allow_write, "Transaction write mode changed");
    }

    /// Whether read-write transactions are allowed.
    pub fn allows_write(&self) -> bool {
        self.config.read().allow_write
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> TransactionConfig {
        self.config.read().clone()
    }

    /// The underlying transaction manager.
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Get transaction metrics.
    pub fn metrics(&self) -> TransactionMetrics {
        self.manager.metrics()
    }
}

impl Default for TransactionService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionService")
            .field("config", &*self.config.read())
            .field("metrics", &self.manager.metrics())
            .finish()
    }
}

/// Builder for service configuration.
///
/// # Example
///
/// ```ignore
/// // Read-only replica: no write transactions at all
/// let service = TransactionService::builder()
///     .allow_write(false)
///     .build();
///
/// // Tests: retry quickly
/// let service = TransactionService::builder()
///     .max_retries(3)
///     .retry_wait(0, 0, 0)
///     .build();
/// ```
pub struct TransactionServiceBuilder {
    config: TransactionConfig,
    manager: Option<Arc<TransactionManager>>,
}

impl TransactionServiceBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: TransactionConfig::default(),
            manager: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: TransactionConfig) -> Self {
        self.config = config;
        self
    }

    /// Allow or disallow read-write transactions.
    pub fn allow_write(mut self, allow_write: bool) -> Self {
        self.config.allow_write = allow_write;
        self
    }

    /// Set how often the retrying helper retries.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Set retry wait bounds and per-attempt increment, in milliseconds.
    pub fn retry_wait(mut self, min_ms: u64, max_ms: u64, increment_ms: u64) -> Self {
        self.config.min_retry_wait_ms = min_ms;
        self.config.max_retry_wait_ms = max_ms;
        self.config.retry_wait_increment_ms = increment_ms;
        self
    }

    /// Share an existing transaction manager.
    pub fn manager(mut self, manager: Arc<TransactionManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Build the service.
    pub fn build(self) -> TransactionService {
        if self.config.min_retry_wait_ms > self.config.max_retry_wait_ms {
            tracing::warn!(
                min = self.config.min_retry_wait_ms,
                max = self.config.max_retry_wait_ms,
                "Minimum retry wait exceeds maximum; the minimum is used"
            );
        }
        TransactionService {
            manager: self.manager.unwrap_or_default(),
            config: Arc::new(RwLock::new(self.config)),
        }
    }
}

impl Default for TransactionServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
