//! Lazily created, transaction-scoped collections.
//!
//! Services typically accumulate work during a transaction (URLs to clean
//! up, nodes to re-tag, counters) and consume it from a listener callback.
//! These helpers create the container on first access and bind it through
//! [`TransactionSupport`], so it disappears with the transaction.

use crate::support::TransactionSupport;
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::hash::Hash;
use std::rc::Rc;
use txnsync_core::{ResourceKey, Result};

/// Shared, mutable, transaction-scoped set
pub type TransactionalSet<T> = Rc<RefCell<FxHashSet<T>>>;

/// Shared, mutable, transaction-scoped map
pub type TransactionalMap<K, V> = Rc<RefCell<FxHashMap<K, V>>>;

/// Helper for transaction-scoped containers
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionalResourceHelper {
    support: TransactionSupport,
}

impl TransactionalResourceHelper {
    /// Helper bound to `support`
    pub const fn new(support: TransactionSupport) -> Self {
        TransactionalResourceHelper { support }
    }

    /// Resource under `key`, binding `init()` first if nothing is bound
    pub fn get_or_bind_with<V: Any>(
        &self,
        key: impl Into<ResourceKey>,
        init: impl FnOnce() -> V,
    ) -> Result<Rc<V>> {
        let key = key.into();
        if let Some(existing) = self.support.get_resource::<V>(key.clone())? {
            return Ok(existing);
        }
        let value = Rc::new(init());
        self.support
            .bind_shared_resource(key, Rc::clone(&value) as Rc<dyn Any>)?;
        Ok(value)
    }

    /// Transaction-scoped set under `key`
    pub fn get_set<T: Eq + Hash + 'static>(
        &self,
        key: impl Into<ResourceKey>,
    ) -> Result<TransactionalSet<T>> {
        self.get_or_bind_with(key, || RefCell::new(FxHashSet::default()))
    }

    /// Transaction-scoped map under `key`
    pub fn get_map<K: Eq + Hash + 'static, V: 'static>(
        &self,
        key: impl Into<ResourceKey>,
    ) -> Result<TransactionalMap<K, V>> {
        self.get_or_bind_with(key, || RefCell::new(FxHashMap::default()))
    }

    /// Current value of the counter under `key` (zero if never incremented)
    pub fn get_counter(&self, key: impl Into<ResourceKey>) -> Result<u64> {
        Ok(self
            .support
            .get_resource::<Cell<u64>>(key)?
            .map_or(0, |c| c.get()))
    }

    /// Increment the counter under `key` and return the new value
    pub fn increment_counter(&self, key: impl Into<ResourceKey>) -> Result<u64> {
        let counter = self.get_or_bind_with(key, || Cell::new(0u64))?;
        counter.set(counter.get() + 1);
        Ok(counter.get())
    }
}
