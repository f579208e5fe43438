//! Graph store session and transaction seams.

use crate::error::SyncResult;
use tracing::warn;

/// A transaction handle.
///
/// Outcome is decided by the marks: `close` commits when the transaction
/// was marked successful and never marked failed, and rolls back
/// otherwise. `close` is idempotent.
pub trait GraphTransaction {
    /// Marks the transaction to commit on close.
    fn mark_success(&mut self);

    /// Marks the transaction to roll back on close. Wins over success.
    fn mark_failure(&mut self);

    /// Finishes the transaction. Calling it again is a no-op.
    fn close(&mut self) -> SyncResult<()>;

    /// Whether `close` has run.
    fn is_closed(&self) -> bool;
}

/// A handle to a graph store session.
pub trait GraphStore {
    /// Begins a transaction.
    fn begin_transaction(&self) -> SyncResult<Box<dyn GraphTransaction>>;
}

/// Owns a transaction handle and closes it exactly once.
///
/// Dropping a scope that was neither committed nor rolled back marks the
/// transaction failed and closes it, which covers early returns and
/// unwinding.
pub struct TransactionScope {
    tx: Box<dyn GraphTransaction>,
    closed: bool,
}

impl TransactionScope {
    /// Begins a transaction on `store`.
    pub fn begin(store: &dyn GraphStore) -> SyncResult<Self> {
        Ok(Self {
            tx: store.begin_transaction()?,
            closed: false,
        })
    }

    /// Marks success and closes.
    pub fn commit(mut self) -> SyncResult<()> {
        self.tx.mark_success();
        self.close()
    }

    /// Marks failure and closes.
    pub fn rollback(mut self) -> SyncResult<()> {
        self.tx.mark_failure();
        self.close()
    }

    fn close(&mut self) -> SyncResult<()> {
        self.closed = true;
        self.tx.close()
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.tx.mark_failure();
        if let Err(error) = self.close() {
            warn!(%error, "failed to close abandoned transaction");
        }
    }
}
