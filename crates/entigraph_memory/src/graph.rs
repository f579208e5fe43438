//! In-memory graph storage.
//!
//! Nodes and relationships live in ordered maps behind a `parking_lot`
//! read-write lock. Every mutation requires an active transaction and
//! records an undo entry, so a rollback restores the exact prior state.
//!
//! The graph has a single writer: the active transaction belongs to the
//! thread that began it. Other threads block in [`MemoryGraph::begin`]
//! until it closes.

use crate::record::{GraphRecord, WriteBuffer};
use crate::transaction::{MemoryTransaction, TxLog, Undo};
use entigraph_core::{
    Direction, GraphStore, GraphTransaction, PropertyValue, RecordId, RecordKind, RecordRef,
    SyncError, SyncResult,
};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::thread;
use tracing::{trace, warn};

pub(crate) type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, Default)]
pub(crate) struct NodeData {
    pub(crate) properties: Properties,
}

#[derive(Debug, Clone)]
pub(crate) struct RelationshipData {
    pub(crate) rel_type: String,
    pub(crate) start: RecordId,
    pub(crate) end: RecordId,
    pub(crate) properties: Properties,
}

impl RelationshipData {
    fn touches(&self, node: RecordId, rel_type: &str, direction: Direction) -> bool {
        let endpoint = match direction {
            Direction::Outgoing => self.start,
            Direction::Incoming => self.end,
        };
        endpoint == node && self.rel_type == rel_type
    }

    fn other_end(&self, direction: Direction) -> RecordId {
        match direction {
            Direction::Outgoing => self.end,
            Direction::Incoming => self.start,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct GraphData {
    next_id: u64,
    pub(crate) nodes: BTreeMap<RecordId, NodeData>,
    pub(crate) relationships: BTreeMap<RecordId, RelationshipData>,
}

impl GraphData {
    fn allocate(&mut self) -> RecordId {
        self.next_id += 1;
        RecordId::new(self.next_id)
    }

    fn contains(&self, record: RecordRef) -> bool {
        match record.kind {
            RecordKind::Node => self.nodes.contains_key(&record.id),
            RecordKind::Relationship => self.relationships.contains_key(&record.id),
        }
    }

    fn properties(&self, record: RecordRef) -> Option<&Properties> {
        match record.kind {
            RecordKind::Node => self.nodes.get(&record.id).map(|n| &n.properties),
            RecordKind::Relationship => self.relationships.get(&record.id).map(|r| &r.properties),
        }
    }

    pub(crate) fn properties_mut(&mut self, record: RecordRef) -> Option<&mut Properties> {
        match record.kind {
            RecordKind::Node => self.nodes.get_mut(&record.id).map(|n| &mut n.properties),
            RecordKind::Relationship => self
                .relationships
                .get_mut(&record.id)
                .map(|r| &mut r.properties),
        }
    }
}

pub(crate) struct GraphInner {
    pub(crate) data: RwLock<GraphData>,
    pub(crate) active: Mutex<Option<TxLog>>,
    pub(crate) released: Condvar,
}

/// An in-memory property graph.
///
/// `MemoryGraph` is a cheap handle; clones share the same graph and may be
/// sent across threads. Lock order is always the transaction slot first,
/// then the data.
#[derive(Clone)]
pub struct MemoryGraph {
    pub(crate) inner: Arc<GraphInner>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GraphInner {
                data: RwLock::new(GraphData::default()),
                active: Mutex::new(None),
                released: Condvar::new(),
            }),
        }
    }

    /// Begins a transaction.
    ///
    /// On the thread that owns the active transaction this joins it. On any
    /// other thread it blocks until the active transaction closes and then
    /// begins a new top-level one.
    pub fn begin(&self) -> SyncResult<MemoryTransaction> {
        let current = thread::current().id();
        let mut active = self.inner.active.lock();
        let tx = loop {
            match active.as_ref().map(|log| (log.owner, log.id)) {
                Some((owner, id)) if owner == current => {
                    break MemoryTransaction::new(self.clone(), id, false);
                }
                Some((_, id)) => {
                    trace!(txn = %id, "waiting for active transaction to close");
                    self.inner.released.wait(&mut active);
                }
                None => {
                    let log = TxLog::new(current);
                    let id = log.id;
                    *active = Some(log);
                    break MemoryTransaction::new(self.clone(), id, true);
                }
            }
        };
        trace!(txn = %tx.id(), top_level = tx.is_top_level(), "transaction begun");
        Ok(tx)
    }

    /// Runs `f` inside a transaction that commits when `f` succeeds.
    pub fn write<R>(&self, f: impl FnOnce(&Self) -> SyncResult<R>) -> SyncResult<R> {
        let mut tx = self.begin()?;
        match f(self) {
            Ok(value) => {
                tx.mark_success();
                tx.close()?;
                Ok(value)
            }
            Err(error) => {
                tx.mark_failure();
                if let Err(close_error) = tx.close() {
                    warn!(error = %close_error, "failed to close transaction after error");
                }
                Err(error)
            }
        }
    }

    /// Whether a transaction is active on any thread.
    #[must_use]
    pub fn has_active_transaction(&self) -> bool {
        self.inner.active.lock().is_some()
    }

    /// Whether the calling thread owns the active transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        let current = thread::current().id();
        self.inner
            .active
            .lock()
            .as_ref()
            .is_some_and(|log| log.owner == current)
    }

    /// Creates a node.
    pub fn create_node(&self) -> SyncResult<GraphRecord> {
        let id = self.mutate(|data, log| {
            let id = data.allocate();
            data.nodes.insert(id, NodeData::default());
            log.undo.push(Undo::CreateNode(id));
            Ok(id)
        })?;
        Ok(GraphRecord::local(self.clone(), RecordRef::node(id)))
    }

    /// Creates a relationship of `rel_type` from `start` to `end`.
    pub fn create_relationship(
        &self,
        start: RecordId,
        end: RecordId,
        rel_type: &str,
    ) -> SyncResult<GraphRecord> {
        let id = self.mutate(|data, log| create_relationship_in(data, log, start, end, rel_type))?;
        Ok(GraphRecord::local(self.clone(), RecordRef::relationship(id)))
    }

    /// Deletes a relationship.
    pub fn delete_relationship(&self, id: RecordId) -> SyncResult<()> {
        self.mutate(|data, log| {
            let removed = data
                .relationships
                .remove(&id)
                .ok_or_else(|| SyncError::record_not_found(RecordRef::relationship(id)))?;
            log.undo.push(Undo::DeleteRelationship(id, removed));
            Ok(())
        })
    }

    /// Replaces the relationships of `rel_type` leaving `node` in `direction`
    /// with one relationship per target, created in order.
    pub fn replace_relationships(
        &self,
        node: RecordId,
        rel_type: &str,
        direction: Direction,
        targets: &[RecordId],
    ) -> SyncResult<()> {
        self.mutate(|data, log| {
            if !data.nodes.contains_key(&node) {
                return Err(SyncError::record_not_found(RecordRef::node(node)));
            }
            let stale: Vec<RecordId> = data
                .relationships
                .iter()
                .filter(|(_, rel)| rel.touches(node, rel_type, direction))
                .map(|(id, _)| *id)
                .collect();
            for id in stale {
                if let Some(removed) = data.relationships.remove(&id) {
                    log.undo.push(Undo::DeleteRelationship(id, removed));
                }
            }
            for target in targets {
                let (start, end) = match direction {
                    Direction::Outgoing => (node, *target),
                    Direction::Incoming => (*target, node),
                };
                create_relationship_in(data, log, start, end, rel_type)?;
            }
            Ok(())
        })
    }

    /// Returns a handle to an existing node.
    pub fn node(&self, id: RecordId) -> SyncResult<GraphRecord> {
        self.record(RecordRef::node(id))
    }

    /// Returns a handle to an existing relationship.
    pub fn relationship(&self, id: RecordId) -> SyncResult<GraphRecord> {
        self.record(RecordRef::relationship(id))
    }

    /// Returns a handle to an existing record.
    pub fn record(&self, record: RecordRef) -> SyncResult<GraphRecord> {
        self.ensure_exists(record)?;
        Ok(GraphRecord::local(self.clone(), record))
    }

    /// Returns a remote-style handle whose URI is `{base_uri}/{kind}/{id}`.
    ///
    /// Remote handles buffer writes while tracked.
    pub fn remote_record(&self, record: RecordRef, base_uri: &str) -> SyncResult<GraphRecord> {
        self.ensure_exists(record)?;
        let uri = format!(
            "{}/{}/{}",
            base_uri.trim_end_matches('/'),
            record.kind.path_segment(),
            record.id
        );
        Ok(GraphRecord::remote(self.clone(), record, uri))
    }

    /// Resolves a URI such as `http://host/db/data/node/12` to a remote-style
    /// handle.
    pub fn record_from_uri(&self, uri: &str) -> SyncResult<GraphRecord> {
        let kind = RecordKind::from_uri(uri).ok_or_else(|| {
            SyncError::invalid_operation(format!("cannot derive record kind from {uri}"))
        })?;
        let id = uri
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse::<u64>().ok())
            .ok_or_else(|| {
                SyncError::invalid_operation(format!("cannot derive record id from {uri}"))
            })?;
        let record = RecordRef {
            kind,
            id: RecordId::new(id),
        };
        self.ensure_exists(record)?;
        Ok(GraphRecord::remote(self.clone(), record, uri.to_string()))
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.data.read().nodes.len()
    }

    /// Number of relationships.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.inner.data.read().relationships.len()
    }

    /// Relationships of `rel_type` attached to `node` in `direction`, in id
    /// order.
    pub fn relationships_of(
        &self,
        node: RecordId,
        rel_type: &str,
        direction: Direction,
    ) -> SyncResult<Vec<GraphRecord>> {
        let ids = self.related_ids(node, rel_type, direction, |id, _| id)?;
        Ok(ids
            .into_iter()
            .map(|id| GraphRecord::local(self.clone(), RecordRef::relationship(id)))
            .collect())
    }

    /// Nodes at the far end of `node`'s `rel_type` relationships.
    pub(crate) fn neighbours(
        &self,
        node: RecordId,
        rel_type: &str,
        direction: Direction,
    ) -> SyncResult<Vec<RecordId>> {
        self.related_ids(node, rel_type, direction, |_, rel| rel.other_end(direction))
    }

    fn related_ids(
        &self,
        node: RecordId,
        rel_type: &str,
        direction: Direction,
        pick: impl Fn(RecordId, &RelationshipData) -> RecordId,
    ) -> SyncResult<Vec<RecordId>> {
        let data = self.inner.data.read();
        if !data.nodes.contains_key(&node) {
            return Err(SyncError::record_not_found(RecordRef::node(node)));
        }
        Ok(data
            .relationships
            .iter()
            .filter(|(_, rel)| rel.touches(node, rel_type, direction))
            .map(|(id, rel)| pick(*id, rel))
            .collect())
    }

    pub(crate) fn endpoints(&self, id: RecordId) -> SyncResult<(RecordId, RecordId, String)> {
        let data = self.inner.data.read();
        data.relationships
            .get(&id)
            .map(|rel| (rel.start, rel.end, rel.rel_type.clone()))
            .ok_or_else(|| SyncError::record_not_found(RecordRef::relationship(id)))
    }

    pub(crate) fn get_property(
        &self,
        record: RecordRef,
        key: &str,
    ) -> SyncResult<Option<PropertyValue>> {
        let data = self.inner.data.read();
        let properties = data
            .properties(record)
            .ok_or_else(|| SyncError::record_not_found(record))?;
        Ok(properties.get(key).cloned())
    }

    /// Writes or, for `Null`, removes a property. Returns the previous value.
    pub(crate) fn set_property(
        &self,
        record: RecordRef,
        key: &str,
        value: PropertyValue,
    ) -> SyncResult<Option<PropertyValue>> {
        self.mutate(|data, log| {
            let properties = data
                .properties_mut(record)
                .ok_or_else(|| SyncError::record_not_found(record))?;
            let previous = if value.is_null() {
                properties.remove(key)
            } else {
                properties.insert(key.to_string(), value)
            };
            log.undo.push(Undo::Property {
                record,
                key: key.to_string(),
                previous: previous.clone(),
            });
            Ok(previous)
        })
    }

    pub(crate) fn property_keys(&self, record: RecordRef) -> SyncResult<BTreeSet<String>> {
        let data = self.inner.data.read();
        let properties = data
            .properties(record)
            .ok_or_else(|| SyncError::record_not_found(record))?;
        Ok(properties.keys().cloned().collect())
    }

    /// Registers a write buffer with the calling thread's transaction, if
    /// any.
    pub(crate) fn enlist(&self, buffer: Arc<WriteBuffer>) {
        let current = thread::current().id();
        if let Some(log) = self.inner.active.lock().as_mut() {
            if log.owner == current {
                log.enlisted.push(buffer);
            }
        }
    }

    fn ensure_exists(&self, record: RecordRef) -> SyncResult<()> {
        if self.inner.data.read().contains(record) {
            Ok(())
        } else {
            Err(SyncError::record_not_found(record))
        }
    }

    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut GraphData, &mut TxLog) -> SyncResult<R>,
    ) -> SyncResult<R> {
        let current = thread::current().id();
        let mut active = self.inner.active.lock();
        let log = active
            .as_mut()
            .filter(|log| log.owner == current)
            .ok_or(SyncError::NotInTransaction)?;
        let mut data = self.inner.data.write();
        f(&mut data, log)
    }
}

fn create_relationship_in(
    data: &mut GraphData,
    log: &mut TxLog,
    start: RecordId,
    end: RecordId,
    rel_type: &str,
) -> SyncResult<RecordId> {
    for node in [start, end] {
        if !data.nodes.contains_key(&node) {
            return Err(SyncError::record_not_found(RecordRef::node(node)));
        }
    }
    let id = data.allocate();
    data.relationships.insert(
        id,
        RelationshipData {
            rel_type: rel_type.to_string(),
            start,
            end,
            properties: Properties::new(),
        },
    );
    log.undo.push(Undo::CreateRelationship(id));
    Ok(id)
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.data.read();
        f.debug_struct("MemoryGraph")
            .field("nodes", &data.nodes.len())
            .field("relationships", &data.relationships.len())
            .finish()
    }
}

impl GraphStore for MemoryGraph {
    fn begin_transaction(&self) -> SyncResult<Box<dyn GraphTransaction>> {
        Ok(Box::new(self.begin()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entigraph_core::{RemoteIdentified, StoredRecord};

    fn pair(graph: &MemoryGraph) -> (GraphRecord, GraphRecord) {
        graph
            .write(|g| Ok((g.create_node()?, g.create_node()?)))
            .unwrap()
    }

    #[test]
    fn writes_require_a_transaction() {
        let graph = MemoryGraph::new();
        assert!(matches!(
            graph.create_node(),
            Err(SyncError::NotInTransaction)
        ));
        let node = graph.write(|g| g.create_node()).unwrap();
        assert!(matches!(
            node.set_property("name", "Alice".into()),
            Err(SyncError::NotInTransaction)
        ));
    }

    #[test]
    fn write_rolls_back_on_error() {
        let graph = MemoryGraph::new();
        let result: SyncResult<()> = graph.write(|g| {
            g.create_node()?;
            Err(SyncError::invalid_operation("boom"))
        });
        assert!(result.is_err());
        assert_eq!(graph.node_count(), 0);
        assert!(!graph.has_active_transaction());
    }

    #[test]
    fn relationship_needs_existing_endpoints() {
        let graph = MemoryGraph::new();
        let (a, _) = pair(&graph);
        let err = graph
            .write(|g| g.create_relationship(a.id(), RecordId::new(99), "KNOWS"))
            .unwrap_err();
        assert!(matches!(err, SyncError::RecordNotFound { .. }));
    }

    #[test]
    fn relationships_by_direction() {
        let graph = MemoryGraph::new();
        let (a, b) = pair(&graph);
        graph
            .write(|g| g.create_relationship(a.id(), b.id(), "KNOWS"))
            .unwrap();

        let out = graph
            .relationships_of(a.id(), "KNOWS", Direction::Outgoing)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), RecordKind::Relationship);
        assert!(graph
            .relationships_of(a.id(), "KNOWS", Direction::Incoming)
            .unwrap()
            .is_empty());
        assert_eq!(
            graph
                .neighbours(b.id(), "KNOWS", Direction::Incoming)
                .unwrap(),
            vec![a.id()]
        );
    }

    #[test]
    fn replace_relationships_keeps_order() {
        let graph = MemoryGraph::new();
        let (a, b) = pair(&graph);
        let c = graph.write(|g| g.create_node()).unwrap();
        graph
            .write(|g| g.replace_relationships(a.id(), "KNOWS", Direction::Outgoing, &[b.id()]))
            .unwrap();
        graph
            .write(|g| {
                g.replace_relationships(a.id(), "KNOWS", Direction::Outgoing, &[c.id(), b.id()])
            })
            .unwrap();

        assert_eq!(graph.relationship_count(), 2);
        assert_eq!(
            graph
                .neighbours(a.id(), "KNOWS", Direction::Outgoing)
                .unwrap(),
            vec![c.id(), b.id()]
        );
    }

    #[test]
    fn remote_handles_from_uri() {
        let graph = MemoryGraph::new();
        let node = graph.write(|g| g.create_node()).unwrap();
        let remote = graph
            .remote_record(node.reference(), "http://localhost/db/data/")
            .unwrap();
        let uri = remote.as_remote().unwrap().uri().to_string();
        assert_eq!(uri, format!("http://localhost/db/data/node/{}", node.id()));

        let resolved = graph.record_from_uri(&uri).unwrap();
        assert_eq!(resolved.reference(), node.reference());
        assert!(graph.record_from_uri("http://localhost/db/data/node/x").is_err());
        assert!(matches!(
            graph.record_from_uri("http://localhost/db/data/node/404"),
            Err(SyncError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn missing_records_are_reported() {
        let graph = MemoryGraph::new();
        assert!(matches!(
            graph.node(RecordId::new(1)),
            Err(SyncError::RecordNotFound { .. })
        ));
        assert!(graph.relationship(RecordId::new(1)).is_err());
    }
}
