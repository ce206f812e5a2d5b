//! Transaction service configuration.

use serde::Deserialize;

/// Settings for [`TransactionService`](crate::TransactionService)
///
/// Deserializable so hosts can load it with the rest of their configuration;
/// missing fields take their defaults.
///
/// # Example
///
/// ```ignore
/// let config: TransactionConfig = serde_json::from_str(r#"{ "max_retries": 5 }"#)?;
/// let service = TransactionService::builder().config(config).build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// When false, every transaction is begun read-only
    pub allow_write: bool,
    /// Attempts after the first before the retrying helper gives up
    pub max_retries: u32,
    /// Lower bound of the wait before a retry, in milliseconds
    pub min_retry_wait_ms: u64,
    /// Upper bound of the wait before a retry, in milliseconds
    pub max_retry_wait_ms: u64,
    /// Growth of the wait per attempt, in milliseconds
    pub retry_wait_increment_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        TransactionConfig {
            allow_write: true,
            max_retries: 20,
            min_retry_wait_ms: 100,
            max_retry_wait_ms: 2000,
            retry_wait_increment_ms: 100,
        }
    }
}
