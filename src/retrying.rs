//! Run a unit of work in a transaction, retrying on concurrency failures.
//!
//! The helper begins a transaction, runs the callback, and commits on
//! success or rolls back on failure. When the failure is retryable (see
//! [`Error::is_retryable`]) and the helper owns the transaction, it waits a
//! randomized, growing interval and tries again, up to
//! [`TransactionConfig::max_retries`](crate::TransactionConfig::max_retries)
//! times.
//!
//! A callback that joins an outer transaction is never retried here: its
//! failure marks the outer transaction rollback-only and is returned as-is,
//! leaving the retry decision to whoever owns the outer transaction.

use crate::service::TransactionService;
use rand::Rng;
use std::time::Duration;
use txnsync_core::{Error, Result};

/// Retrying transaction runner
#[derive(Debug, Clone)]
pub struct RetryingTransactionHelper {
    service: TransactionService,
}

impl RetryingTransactionHelper {
    /// Helper running work through `service`
    pub fn new(service: TransactionService) -> Self {
        RetryingTransactionHelper { service }
    }

    /// Run `callback` in a read-write transaction, joining the current one
    pub fn do_in_transaction<R>(&self, callback: impl FnMut() -> Result<R>) -> Result<R> {
        self.do_in_transaction_with(false, false, callback)
    }

    /// Run `callback` in a transaction
    ///
    /// With `requires_new` the callback always runs in its own transaction,
    /// suspending any current one for the duration.
    ///
    /// # Errors
    ///
    /// - The callback's error, or the commit error, when not retryable
    /// - [`Error::RetriesExhausted`] when every attempt failed retryably
    pub fn do_in_transaction_with<R>(
        &self,
        read_only: bool,
        requires_new: bool,
        mut callback: impl FnMut() -> Result<R>,
    ) -> Result<R> {
        let config = self.service.config();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let handle = if requires_new {
                self.service.begin_non_propagating(read_only)?
            } else {
                self.service.begin(read_only)?
            };
            let owns_transaction = handle.is_new_transaction();

            let outcome = match callback() {
                Ok(value) => self.service.commit(handle).map(|()| value),
                Err(e) => {
                    if let Err(rollback_err) = self.service.rollback(handle) {
                        tracing::error!(
                            error = %rollback_err,
                            cause = %e,
                            "Rollback failed after callback error"
                        );
                    }
                    Err(e)
                }
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Transaction succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };
            if !owns_transaction || !err.is_retryable() {
                return Err(err);
            }
            if attempt > config.max_retries {
                tracing::warn!(attempts = attempt, error = %err, "Giving up on transaction");
                return Err(Error::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let wait = retry_wait(
                attempt,
                config.min_retry_wait_ms,
                config.max_retry_wait_ms,
                config.retry_wait_increment_ms,
            );
            tracing::info!(
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Retrying transaction"
            );
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }
    }
}

/// Random wait before retry number `attempt` (1-based)
///
/// The upper bound grows by `increment_ms` per attempt and is capped at
/// `max_ms`; the wait is never below `min_ms`.
fn retry_wait(attempt: u32, min_ms: u64, max_ms: u64, increment_ms: u64) -> Duration {
    let grown = min_ms.saturating_add(increment_ms.saturating_mul(u64::from(attempt)));
    let upper = grown.min(max_ms).max(min_ms);
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=upper))
}
