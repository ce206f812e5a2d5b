//! Collaborator capabilities invoked by the coordinator
//!
//! [`TransactionListener`] is the general deferred-work capability. Every
//! phase has a no-op default body, so a collaborator overrides only the
//! phases it cares about.
//!
//! The remaining traits are narrow, older participant categories. They are
//! driven by dedicated steps of the commit protocol rather than by the
//! listener phases:
//!
//! | Participant | Called during |
//! |-------------|---------------|
//! | [`RuleExecutor`] | flush (first) |
//! | [`IntegrityChecker`] | flush (second) |
//! | [`FlushableDao`] | flush (third) |
//! | [`IndexParticipant`] | before-commit (`prepare`), after-completion (`commit`/`rollback`) |
//!
//! Callbacks take `&self`; collaborators that accumulate state use interior
//! mutability or bind transaction-scoped resources.

use crate::error::Result;

/// Multi-phase transaction callback
///
/// Errors returned from [`flush`](Self::flush) and
/// [`before_commit`](Self::before_commit) abort the commit and cause a
/// rollback. Errors returned from the completion callbacks are logged and
/// cannot change the outcome.
pub trait TransactionListener {
    /// Run deferred work that must happen before commit.
    ///
    /// May be invoked several times per transaction: once for each explicit
    /// flush and once more at the start of before-commit.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Called once, after flushing, before the persistence engine commits.
    fn before_commit(&self, _read_only: bool) -> Result<()> {
        Ok(())
    }

    /// Called before the final commit/rollback decision, whatever the outcome.
    fn before_completion(&self) -> Result<()> {
        Ok(())
    }

    /// Called after a successful commit.
    fn after_commit(&self) -> Result<()> {
        Ok(())
    }

    /// Called after a rollback.
    fn after_rollback(&self) -> Result<()> {
        Ok(())
    }
}

/// Executes rules queued during the transaction
pub trait RuleExecutor {
    /// Execute all rules pending for the current transaction
    fn execute_pending_rules(&self) -> Result<()>;
}

/// Validates model integrity before commit
pub trait IntegrityChecker {
    /// Check all changes recorded in the current transaction
    fn check_integrity(&self) -> Result<()>;
}

/// Data access object holding unflushed changes
pub trait FlushableDao {
    /// Push pending changes to the persistence session
    fn flush(&self) -> Result<()>;

    /// Whether the DAO has changes that have not been flushed
    fn is_dirty(&self) -> bool {
        false
    }
}

/// Two-phase participant for a secondary index
pub trait IndexParticipant {
    /// Prepare pending index changes
    fn prepare(&self) -> Result<()>;

    /// Make prepared changes visible
    fn commit(&self) -> Result<()>;

    /// Discard pending changes
    fn rollback(&self) -> Result<()>;
}
