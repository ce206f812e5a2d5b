//! Core types for transaction coordination
//!
//! This module defines the fundamental types used throughout the system:
//! - [`TxnId`]: Unique identifier for a logical transaction
//! - [`ResourceKey`]: Key under which transaction-scoped state is bound
//! - [`CompletionStatus`], [`TxnReadState`]: Outcome and read/write state
//! - [`Propagation`], [`TransactionDefinition`]: How a transaction is begun

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;

/// Unique identifier for a logical transaction
///
/// Generated once when the coordinator first touches a transaction and
/// never changed afterwards. Nested `RequiresNew` transactions get their
/// own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Create a new random TxnId using UUID v4
    ///
    /// # Examples
    ///
    /// ```
    /// use txnsync_core::types::TxnId;
    ///
    /// let id1 = TxnId::new();
    /// let id2 = TxnId::new();
    /// assert_ne!(id1, id2);
    /// ```
    pub fn new() -> Self {
        TxnId(Uuid::new_v4())
    }

    /// Create TxnId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        TxnId(Uuid::from_bytes(bytes))
    }

    /// Get raw bytes representation
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key for a transaction-scoped resource
///
/// Collaborators normally declare one `&'static str` constant per resource,
/// e.g. `"ContentCleaner.deletedUrls"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Cow<'static, str>);

impl ResourceKey {
    /// Key from a static string
    pub const fn from_static(key: &'static str) -> Self {
        ResourceKey(Cow::Borrowed(key))
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for ResourceKey {
    fn from(key: &'static str) -> Self {
        ResourceKey(Cow::Borrowed(key))
    }
}

impl From<String> for ResourceKey {
    fn from(key: String) -> Self {
        ResourceKey(Cow::Owned(key))
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final outcome reported to after-completion callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionStatus {
    /// Transaction committed
    Committed,
    /// Transaction rolled back
    RolledBack,
    /// Outcome could not be determined
    Unknown,
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionStatus::Committed => "committed",
            CompletionStatus::RolledBack => "rolled-back",
            CompletionStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Read/write state of the current thread's transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnReadState {
    /// No transaction is active
    NoTransaction,
    /// A read-only transaction is active
    ReadOnly,
    /// A read-write transaction is active
    ReadWrite,
}

/// How `begin` treats an already active transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Propagation {
    /// Join the current transaction, or start one if there is none
    #[default]
    Required,
    /// Suspend the current transaction (if any) and start an independent one
    RequiresNew,
    /// Join the current transaction; fail if there is none
    Mandatory,
}

/// Parameters for beginning a transaction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionDefinition {
    /// Propagation behaviour
    pub propagation: Propagation,
    /// Whether the transaction is read-only
    pub read_only: bool,
    /// Optional name used in log output
    pub name: Option<String>,
}

impl TransactionDefinition {
    /// Definition with [`Propagation::Required`]
    pub fn required() -> Self {
        Self::default()
    }

    /// Definition with [`Propagation::RequiresNew`]
    pub fn requires_new() -> Self {
        Self {
            propagation: Propagation::RequiresNew,
            ..Self::default()
        }
    }

    /// Definition with [`Propagation::Mandatory`]
    pub fn mandatory() -> Self {
        Self {
            propagation: Propagation::Mandatory,
            ..Self::default()
        }
    }

    /// Set the read-only flag
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the transaction name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
