//! Property-container entity state over [`GraphRecord`]s.

use crate::record::GraphRecord;
use entigraph_core::{
    Cardinality, EntityState, EntityStateFactory, GraphStore, MappingPolicy, PersistentProperty,
    PropertyAccessor, PropertyKind, PropertyValue, RecordId, StateValue, StoredRecord, SyncError,
    SyncResult,
};
use tracing::trace;

/// Record key holding the entity's type alias.
pub const TYPE_KEY: &str = "__type__";

/// Entity state that keeps scalars as record properties and associations
/// as relationships.
#[derive(Debug, Clone)]
pub struct GraphEntityState {
    record: Option<GraphRecord>,
    type_alias: String,
    transactional: bool,
}

impl GraphEntityState {
    /// Creates an unbound state for entities stored under `type_alias`.
    #[must_use]
    pub fn new(type_alias: impl Into<String>, transactional: bool) -> Self {
        Self {
            record: None,
            type_alias: type_alias.into(),
            transactional,
        }
    }

    /// Type alias stamped on persist.
    #[must_use]
    pub fn type_alias(&self) -> &str {
        &self.type_alias
    }

    /// Whether writes run in their own transaction.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    fn bound(&self) -> SyncResult<&GraphRecord> {
        self.record
            .as_ref()
            .ok_or_else(|| SyncError::invalid_operation("entity state has no bound record"))
    }

    fn apply(
        record: &GraphRecord,
        property: &PersistentProperty,
        value: PropertyValue,
    ) -> SyncResult<()> {
        match property.kind() {
            PropertyKind::Identity => Err(SyncError::invalid_operation(format!(
                "identity property {} cannot be written",
                property.name()
            ))),
            PropertyKind::Scalar => record.set_property(property.store_key(), value),
            PropertyKind::Association {
                relationship_type,
                direction,
                cardinality,
            } => {
                let targets = value.into_references()?;
                if *cardinality == Cardinality::One && targets.len() > 1 {
                    return Err(SyncError::invalid_operation(format!(
                        "association {} holds at most one record, got {}",
                        property.name(),
                        targets.len()
                    )));
                }
                record.replace_related(relationship_type, *direction, &targets)
            }
        }
    }
}

impl EntityState for GraphEntityState {
    type Record = GraphRecord;

    fn bind(&mut self, record: GraphRecord) {
        self.record = Some(record);
    }

    fn record(&self) -> Option<&GraphRecord> {
        self.record.as_ref()
    }

    fn is_writable(&self, property: &PersistentProperty) -> bool {
        !property.is_identity()
            && !property.is_read_only()
            && !property.declared_policy().is_some_and(|policy| policy.read_only)
    }

    fn read(
        &self,
        property: &PersistentProperty,
        policy: &MappingPolicy,
    ) -> SyncResult<StateValue> {
        let record = self.bound()?;
        let value = match property.kind() {
            PropertyKind::Identity => {
                let id = i64::try_from(record.id().as_u64()).map_err(|_| {
                    SyncError::invalid_operation(format!("record id {} overflows", record.id()))
                })?;
                PropertyValue::Integer(id)
            }
            PropertyKind::Scalar => record
                .property(property.store_key())?
                .unwrap_or(PropertyValue::Null),
            PropertyKind::Association {
                relationship_type,
                direction,
                cardinality,
            } => {
                if !policy.should_load() {
                    trace!(property = property.name(), "association deferred");
                    return Ok(StateValue::Deferred);
                }
                let related = record.related(relationship_type, *direction)?;
                match cardinality {
                    Cardinality::One => related
                        .first()
                        .copied()
                        .map_or(PropertyValue::Null, PropertyValue::Reference),
                    Cardinality::Many => PropertyValue::from(related),
                }
            }
        };
        Ok(StateValue::Value(value))
    }

    fn write(
        &mut self,
        property: &PersistentProperty,
        value: PropertyValue,
        policy: &MappingPolicy,
    ) -> SyncResult<()> {
        if policy.read_only {
            trace!(property = property.name(), "read-only policy, write skipped");
            return Ok(());
        }
        let record = self.bound()?;
        if self.transactional {
            record
                .graph()
                .write(|_| Self::apply(record, property, value))
        } else {
            Self::apply(record, property, value)
        }
    }

    fn persist(&mut self) -> SyncResult<()> {
        let record = self.bound()?;
        if record.property(TYPE_KEY)?.is_some() {
            return Ok(());
        }
        let alias = PropertyValue::from(self.type_alias.as_str());
        if self.transactional {
            record.graph().write(|_| record.set_property(TYPE_KEY, alias))
        } else {
            record.set_property(TYPE_KEY, alias)
        }
    }
}

/// Creates [`GraphEntityState`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphStateFactory;

impl GraphStateFactory {
    /// Creates a factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EntityStateFactory for GraphStateFactory {
    type Record = GraphRecord;
    type State = GraphEntityState;

    fn create(
        &self,
        entity: &dyn PropertyAccessor,
        transactional: bool,
        _store: &dyn GraphStore,
    ) -> SyncResult<GraphEntityState> {
        Ok(GraphEntityState::new(entity.type_alias(), transactional))
    }
}

/// Reference ids held by an association value, in order.
#[must_use]
pub fn referenced_ids(value: &PropertyValue) -> Vec<RecordId> {
    match value {
        PropertyValue::Reference(id) => vec![*id],
        PropertyValue::Array(items) => items.iter().filter_map(PropertyValue::as_reference).collect(),
        _ => Vec::new(),
    }
}
