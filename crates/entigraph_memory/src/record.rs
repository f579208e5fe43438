//! Record handles onto the in-memory graph.

use crate::graph::MemoryGraph;
use entigraph_core::{
    Direction, PropertyValue, RecordId, RecordKind, RecordRef, RemoteIdentified, StoredRecord,
    SyncError, SyncResult, Trackable,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Pending writes of a remote-style record.
///
/// A `Null` entry is a pending removal.
#[derive(Debug)]
pub(crate) struct WriteBuffer {
    uri: String,
    record: RecordRef,
    tracked: AtomicBool,
    pending: Mutex<BTreeMap<String, PropertyValue>>,
}

impl WriteBuffer {
    fn new(record: RecordRef, uri: String) -> Self {
        Self {
            uri,
            record,
            tracked: AtomicBool::new(false),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    fn pending(&self, key: &str) -> Option<PropertyValue> {
        self.pending.lock().get(key).cloned()
    }

    /// Applies pending writes to the graph. On error the unapplied writes
    /// stay pending.
    pub(crate) fn flush_into(&self, graph: &MemoryGraph) -> SyncResult<()> {
        let pending = std::mem::take(&mut *self.pending.lock());
        let count = pending.len();
        let mut remaining = pending.into_iter();
        while let Some((key, value)) = remaining.next() {
            if let Err(error) = graph.set_property(self.record, &key, value.clone()) {
                let mut restored = self.pending.lock();
                restored.insert(key, value);
                restored.extend(remaining);
                return Err(error);
            }
        }
        trace!(record = %self.record, writes = count, "flushed buffered writes");
        Ok(())
    }

    /// Drops pending writes and stops tracking.
    pub(crate) fn discard(&self) {
        self.pending.lock().clear();
        self.tracked.store(false, Ordering::SeqCst);
    }
}

/// A handle to a node or relationship in a [`MemoryGraph`].
///
/// Local handles write straight through to the graph. Remote-style handles
/// (from [`MemoryGraph::remote_record`] or [`MemoryGraph::record_from_uri`])
/// carry a URI and, once tracked, buffer their writes until flushed or
/// until the transaction they were tracked in commits. Rollback discards
/// the buffer. Clones share the buffer.
#[derive(Debug, Clone)]
pub struct GraphRecord {
    graph: MemoryGraph,
    reference: RecordRef,
    remote: Option<Arc<WriteBuffer>>,
}

impl GraphRecord {
    pub(crate) fn local(graph: MemoryGraph, reference: RecordRef) -> Self {
        Self {
            graph,
            reference,
            remote: None,
        }
    }

    pub(crate) fn remote(graph: MemoryGraph, reference: RecordRef, uri: String) -> Self {
        Self {
            graph,
            reference,
            remote: Some(Arc::new(WriteBuffer::new(reference, uri))),
        }
    }

    /// The graph this record lives in.
    #[must_use]
    pub fn graph(&self) -> &MemoryGraph {
        &self.graph
    }

    /// Whether this is a remote-style handle.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Start node of a relationship record.
    pub fn start_node(&self) -> SyncResult<RecordId> {
        self.endpoints().map(|(start, _, _)| start)
    }

    /// End node of a relationship record.
    pub fn end_node(&self) -> SyncResult<RecordId> {
        self.endpoints().map(|(_, end, _)| end)
    }

    /// Type of a relationship record.
    pub fn relationship_type(&self) -> SyncResult<String> {
        self.endpoints().map(|(_, _, rel_type)| rel_type)
    }

    /// Nodes related to this node through `rel_type` in `direction`.
    pub fn related(&self, rel_type: &str, direction: Direction) -> SyncResult<Vec<RecordId>> {
        self.ensure_node("related")?;
        self.graph.neighbours(self.reference.id, rel_type, direction)
    }

    /// Replaces this node's `rel_type` relationships in `direction` with
    /// one relationship per target.
    pub fn replace_related(
        &self,
        rel_type: &str,
        direction: Direction,
        targets: &[RecordId],
    ) -> SyncResult<()> {
        self.ensure_node("replace_related")?;
        self.graph
            .replace_relationships(self.reference.id, rel_type, direction, targets)
    }

    fn endpoints(&self) -> SyncResult<(RecordId, RecordId, String)> {
        match self.reference.kind {
            RecordKind::Relationship => self.graph.endpoints(self.reference.id),
            RecordKind::Node => Err(SyncError::invalid_operation(format!(
                "{} is not a relationship",
                self.reference
            ))),
        }
    }

    fn ensure_node(&self, operation: &str) -> SyncResult<()> {
        if self.reference.kind.is_node() {
            Ok(())
        } else {
            Err(SyncError::invalid_operation(format!(
                "{operation} is not supported on {}",
                self.reference
            )))
        }
    }

    fn buffer(&self) -> Option<&WriteBuffer> {
        self.remote
            .as_deref()
            .filter(|buffer| buffer.tracked.load(Ordering::SeqCst))
    }
}

impl StoredRecord for GraphRecord {
    fn id(&self) -> RecordId {
        self.reference.id
    }

    fn kind(&self) -> RecordKind {
        self.reference.kind
    }

    fn property(&self, key: &str) -> SyncResult<Option<PropertyValue>> {
        if let Some(pending) = self.remote.as_deref().and_then(|b| b.pending(key)) {
            return Ok((!pending.is_null()).then_some(pending));
        }
        self.graph.get_property(self.reference, key)
    }

    fn set_property(&self, key: &str, value: PropertyValue) -> SyncResult<()> {
        match self.buffer() {
            Some(buffer) => {
                buffer.pending.lock().insert(key.to_string(), value);
                Ok(())
            }
            None => self
                .graph
                .set_property(self.reference, key, value)
                .map(|_| ()),
        }
    }

    fn remove_property(&self, key: &str) -> SyncResult<Option<PropertyValue>> {
        match self.buffer() {
            Some(buffer) => {
                let previous = self.property(key)?;
                buffer
                    .pending
                    .lock()
                    .insert(key.to_string(), PropertyValue::Null);
                Ok(previous)
            }
            None => self
                .graph
                .set_property(self.reference, key, PropertyValue::Null),
        }
    }

    fn property_keys(&self) -> SyncResult<Vec<String>> {
        let mut keys = self.graph.property_keys(self.reference)?;
        if let Some(buffer) = self.remote.as_deref() {
            for (key, value) in buffer.pending.lock().iter() {
                if value.is_null() {
                    keys.remove(key);
                } else {
                    keys.insert(key.clone());
                }
            }
        }
        Ok(keys.into_iter().collect())
    }

    fn as_trackable(&self) -> Option<&dyn Trackable> {
        self.remote.as_ref().map(|_| self as &dyn Trackable)
    }

    fn as_remote(&self) -> Option<&dyn RemoteIdentified> {
        self.remote.as_ref().map(|_| self as &dyn RemoteIdentified)
    }
}

impl Trackable for GraphRecord {
    /// Starts buffering writes and enlists the buffer with the active
    /// transaction, if any. Without a transaction the buffer waits for an
    /// explicit `flush`.
    fn track(&self) {
        if let Some(buffer) = &self.remote {
            if !buffer.tracked.swap(true, Ordering::SeqCst) {
                self.graph.enlist(Arc::clone(buffer));
            }
        }
    }

    fn is_tracked(&self) -> bool {
        self.buffer().is_some()
    }

    fn flush(&self) -> SyncResult<()> {
        match &self.remote {
            Some(buffer) => buffer.flush_into(&self.graph),
            None => Ok(()),
        }
    }
}

impl RemoteIdentified for GraphRecord {
    fn uri(&self) -> &str {
        self.remote.as_deref().map_or("", |buffer| buffer.uri.as_str())
    }
}
