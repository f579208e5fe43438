//! Undo-log transactions over the in-memory graph.

use crate::graph::{GraphData, MemoryGraph, RelationshipData};
use crate::record::WriteBuffer;
use entigraph_core::{GraphTransaction, PropertyValue, RecordId, RecordRef, SyncError, SyncResult};
use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for a transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new random transaction ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// One reversible change.
#[derive(Debug)]
pub(crate) enum Undo {
    Property {
        record: RecordRef,
        key: String,
        previous: Option<PropertyValue>,
    },
    CreateNode(RecordId),
    CreateRelationship(RecordId),
    DeleteRelationship(RecordId, RelationshipData),
}

impl Undo {
    fn revert(self, data: &mut GraphData) {
        match self {
            Undo::Property {
                record,
                key,
                previous,
            } => {
                if let Some(properties) = data.properties_mut(record) {
                    match previous {
                        Some(value) => {
                            properties.insert(key, value);
                        }
                        None => {
                            properties.remove(&key);
                        }
                    }
                }
            }
            Undo::CreateNode(id) => {
                data.nodes.remove(&id);
            }
            Undo::CreateRelationship(id) => {
                data.relationships.remove(&id);
            }
            Undo::DeleteRelationship(id, relationship) => {
                data.relationships.insert(id, relationship);
            }
        }
    }
}

/// State of the active top-level transaction.
#[derive(Debug)]
pub(crate) struct TxLog {
    pub(crate) id: TransactionId,
    pub(crate) owner: ThreadId,
    pub(crate) undo: Vec<Undo>,
    pub(crate) enlisted: Vec<Arc<WriteBuffer>>,
    pub(crate) rollback_only: bool,
}

impl TxLog {
    pub(crate) fn new(owner: ThreadId) -> Self {
        Self {
            id: TransactionId::new(),
            owner,
            undo: Vec::new(),
            enlisted: Vec::new(),
            rollback_only: false,
        }
    }

    pub(crate) fn rollback(self, data: &mut GraphData) {
        for undo in self.undo.into_iter().rev() {
            undo.revert(data);
        }
        for buffer in &self.enlisted {
            buffer.discard();
        }
    }
}

/// A transaction on a [`MemoryGraph`].
///
/// The first transaction a thread begins on a graph is top-level and owns
/// the undo log. Transactions the same thread begins while it is active
/// join it: closing a nested transaction that was not marked successful,
/// or was marked failed, makes the whole top-level transaction roll back.
///
/// Close a transaction on the thread that began it; buffered writes are
/// flushed on commit as that thread.
#[derive(Debug)]
pub struct MemoryTransaction {
    graph: MemoryGraph,
    id: TransactionId,
    top_level: bool,
    success: bool,
    failure: bool,
    closed: bool,
}

impl MemoryTransaction {
    pub(crate) fn new(graph: MemoryGraph, id: TransactionId, top_level: bool) -> Self {
        Self {
            graph,
            id,
            top_level,
            success: false,
            failure: false,
            closed: false,
        }
    }

    /// Returns the transaction ID (shared by nested transactions).
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Whether this transaction owns the undo log.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.top_level
    }

    fn wants_commit(&self) -> bool {
        self.success && !self.failure
    }

    fn close_nested(&mut self) -> SyncResult<()> {
        if !self.wants_commit() {
            if let Some(log) = self.graph.inner.active.lock().as_mut() {
                if log.id == self.id {
                    log.rollback_only = true;
                }
            }
        }
        Ok(())
    }

    fn close_top_level(&mut self) -> SyncResult<()> {
        // Buffered remote writes land inside the transaction, so they are
        // undone together with everything else if the commit fails.
        let mut flush_error = None;
        if self.wants_commit() {
            let enlisted = match self.graph.inner.active.lock().as_mut() {
                Some(log) => std::mem::take(&mut log.enlisted),
                None => Vec::new(),
            };
            for buffer in &enlisted {
                if let Err(error) = buffer.flush_into(&self.graph) {
                    flush_error = Some(error);
                    break;
                }
            }
            for buffer in enlisted {
                buffer.discard();
            }
        }

        let mut active = self.graph.inner.active.lock();
        let log = match active.take() {
            Some(log) if log.id == self.id => log,
            other => {
                *active = other;
                return Err(SyncError::transaction("no active transaction to close"));
            }
        };
        let rollback_only = log.rollback_only;
        self.graph.inner.released.notify_all();

        if self.wants_commit() && !rollback_only && flush_error.is_none() {
            debug!(txn = %self.id, changes = log.undo.len(), "transaction committed");
            return Ok(());
        }

        let mut data = self.graph.inner.data.write();
        log.rollback(&mut data);
        debug!(txn = %self.id, "transaction rolled back");

        if let Some(error) = flush_error {
            return Err(error);
        }
        if self.wants_commit() && rollback_only {
            return Err(SyncError::transaction(
                "transaction was marked rollback-only by a nested transaction",
            ));
        }
        Ok(())
    }
}

impl GraphTransaction for MemoryTransaction {
    fn mark_success(&mut self) {
        self.success = true;
    }

    fn mark_failure(&mut self) {
        self.failure = true;
    }

    fn close(&mut self) -> SyncResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.top_level {
            self.close_top_level()
        } else {
            self.close_nested()
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.failure = true;
        if let Err(error) = self.close() {
            warn!(txn = %self.id, %error, "failed to close dropped transaction");
        }
    }
}
