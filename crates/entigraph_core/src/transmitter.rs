//! Copies entity state between domain objects and stored records.

use crate::config::TransmitterConfig;
use crate::error::{SavePhase, SyncResult};
use crate::mapping::{
    read_property, write_property, EntityAccessor, EntityDescriptor, MappedEntity,
    PersistentProperty, PropertyAccessor,
};
use crate::policy::MappingPolicy;
use crate::record::StoredRecord;
use crate::state::{EntityState, EntityStateFactory};
use crate::store::{GraphStore, TransactionScope};
use tracing::{debug, trace, warn};

/// Synchronizes domain objects with stored records in both directions.
///
/// The transmitter holds no per-operation state: every call creates a
/// fresh entity state through the factory, binds it to the record and
/// walks the descriptor. One instance can serve concurrent callers.
///
/// # Example
///
/// ```rust,ignore
/// let transmitter = Transmitter::new(GraphStateFactory::new());
///
/// // object -> record, inside one transaction
/// transmitter.save_entity(&alice, &record, &graph)?;
///
/// // record -> object, no transaction
/// let mut copy = Person::default();
/// transmitter.load_entity(&mut copy, &record, &graph)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Transmitter<F> {
    factory: F,
    config: TransmitterConfig,
}

impl<F: EntityStateFactory> Transmitter<F> {
    /// Creates a transmitter with the default configuration.
    pub fn new(factory: F) -> Self {
        Self::with_config(factory, TransmitterConfig::default())
    }

    /// Creates a transmitter with an explicit configuration.
    pub fn with_config(factory: F, config: TransmitterConfig) -> Self {
        Self { factory, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TransmitterConfig {
        &self.config
    }

    /// Returns the entity state factory.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Populates the object behind `accessor` from `source`.
    ///
    /// Properties are visited first, then associations (through their
    /// inverse property), each in descriptor order. A deferred value leaves
    /// the field untouched. No transaction is opened.
    ///
    /// The walk stops at the first failure, so the object may be partially
    /// populated when an error is returned.
    pub fn copy_properties_from<A: PropertyAccessor>(
        &self,
        accessor: &mut A,
        source: &F::Record,
        descriptor: &EntityDescriptor,
        policy: &MappingPolicy,
        store: &dyn GraphStore,
    ) -> SyncResult<()> {
        debug!(
            entity = descriptor.name(),
            record = %source.reference(),
            "copying properties from record"
        );

        let mut state = self.factory.create(&*accessor, false, store)?;
        state.bind(source.clone());

        descriptor.for_each_property(|property| {
            copy_state_value(property, &state, accessor, &property.effective_policy(policy))
        })?;
        descriptor.for_each_association(|association| {
            let property = association.inverse();
            copy_state_value(property, &state, accessor, &property.effective_policy(policy))
        })?;
        Ok(())
    }

    /// Writes the object behind `accessor` into `target` inside one
    /// transaction.
    ///
    /// Either every eligible property and association is committed or the
    /// transaction is rolled back. The transaction handle is closed exactly
    /// once on every path. Runtime errors come back unchanged; uncategorized
    /// collaborator errors come back wrapped in
    /// [`SyncError::StoreSynchronization`](crate::SyncError::StoreSynchronization).
    pub fn copy_properties_to<A: PropertyAccessor>(
        &self,
        accessor: &A,
        target: &F::Record,
        descriptor: &EntityDescriptor,
        policy: &MappingPolicy,
        store: &dyn GraphStore,
    ) -> SyncResult<()> {
        let record = target.reference();
        debug!(entity = descriptor.name(), %record, "copying properties to record");

        let scope = TransactionScope::begin(store)?;
        let mut phase = SavePhase::TransactionOpen;

        match self.write_entity(accessor, target, descriptor, policy, store, &mut phase) {
            Ok(()) => match scope.commit() {
                Ok(()) => {
                    debug!(entity = descriptor.name(), %record, phase = %SavePhase::Committed, "save finished");
                    Ok(())
                }
                Err(error) => {
                    warn!(entity = descriptor.name(), %record, %error, "commit failed");
                    Err(error.into_store_fault(descriptor.name(), record, phase))
                }
            },
            Err(error) => {
                warn!(
                    entity = descriptor.name(),
                    %record,
                    %phase,
                    %error,
                    "save failed, rolling back"
                );
                if let Err(close_error) = scope.rollback() {
                    warn!(%record, error = %close_error, "rollback failed");
                }
                debug!(%record, phase = %SavePhase::RolledBack, "save aborted");
                Err(error.into_store_fault(descriptor.name(), record, phase))
            }
        }
    }

    fn write_entity<A: PropertyAccessor>(
        &self,
        accessor: &A,
        target: &F::Record,
        descriptor: &EntityDescriptor,
        policy: &MappingPolicy,
        store: &dyn GraphStore,
        phase: &mut SavePhase,
    ) -> SyncResult<()> {
        let mut state = self.factory.create(accessor, false, store)?;
        if let Some(trackable) = target.as_trackable() {
            trackable.track();
        }
        state.bind(target.clone());
        state.persist()?;

        descriptor.for_each_property(|property| {
            set_state_value(property, &mut state, accessor, &property.effective_policy(policy))
        })?;
        *phase = SavePhase::PropertiesWritten;

        if self.config.flush_tracked_nodes && target.kind().is_node() {
            if let Some(trackable) = target.as_trackable() {
                if trackable.is_tracked() && trackable.buffers_writes() {
                    debug!(record = %target.reference(), "flushing node before associations");
                    trackable.flush()?;
                }
            }
        }

        descriptor.for_each_association(|association| {
            let property = association.inverse();
            set_state_value(property, &mut state, accessor, &property.effective_policy(policy))
        })?;
        *phase = SavePhase::AssociationsWritten;
        Ok(())
    }

    /// Loads a [`MappedEntity`] from `source` using the configured default
    /// policy.
    pub fn load_entity<T: MappedEntity>(
        &self,
        entity: &mut T,
        source: &F::Record,
        store: &dyn GraphStore,
    ) -> SyncResult<()> {
        let descriptor = T::mapping().descriptor();
        let mut accessor = EntityAccessor::new(entity);
        self.copy_properties_from(
            &mut accessor,
            source,
            descriptor,
            &self.config.default_policy,
            store,
        )
    }

    /// Builds a fresh [`MappedEntity`] from `source`.
    pub fn read_entity<T: MappedEntity + Default>(
        &self,
        source: &F::Record,
        store: &dyn GraphStore,
    ) -> SyncResult<T> {
        let mut entity = T::default();
        self.load_entity(&mut entity, source, store)?;
        Ok(entity)
    }

    /// Saves a [`MappedEntity`] into `target` using the configured default
    /// policy.
    pub fn save_entity<T: MappedEntity>(
        &self,
        entity: &T,
        target: &F::Record,
        store: &dyn GraphStore,
    ) -> SyncResult<()> {
        let descriptor = T::mapping().descriptor();
        let accessor = EntityAccessor::read_only(entity);
        self.copy_properties_to(
            &accessor,
            target,
            descriptor,
            &self.config.default_policy,
            store,
        )
    }
}

/// Reads one property from the state and writes it onto the object.
///
/// A deferred value is skipped.
pub fn copy_state_value<S, A>(
    property: &PersistentProperty,
    state: &S,
    accessor: &mut A,
    policy: &MappingPolicy,
) -> SyncResult<()>
where
    S: EntityState,
    A: PropertyAccessor + ?Sized,
{
    match state.read(property, policy)?.unwrap_deferred() {
        Some(value) => {
            trace!(property = property.name(), %value, "copying value to object");
            write_property(accessor, property, value)
        }
        None => {
            trace!(property = property.name(), "value deferred, leaving field untouched");
            Ok(())
        }
    }
}

/// Reads one property from the object and writes it into the state.
///
/// Properties the state reports as not writable are skipped without
/// touching the object.
pub fn set_state_value<S, A>(
    property: &PersistentProperty,
    state: &mut S,
    accessor: &A,
    policy: &MappingPolicy,
) -> SyncResult<()>
where
    S: EntityState,
    A: PropertyAccessor + ?Sized,
{
    if !state.is_writable(property) {
        trace!(property = property.name(), "property not writable, skipping");
        return Ok(());
    }
    let value = read_property(accessor, property)?;
    trace!(property = property.name(), %value, "copying value to record");
    state.write(property, value, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::mapping::{AccessError, EntityMapping};
    use crate::record::Trackable;
    use crate::store::GraphTransaction;
    use crate::types::{RecordId, RecordKind};
    use crate::value::{PropertyValue, StateValue};
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use std::sync::OnceLock;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Note {
        id: Option<i64>,
        title: String,
        body: String,
    }

    impl MappedEntity for Note {
        fn mapping() -> &'static EntityMapping<Self> {
            static MAPPING: OnceLock<EntityMapping<Note>> = OnceLock::new();
            MAPPING.get_or_init(|| {
                let descriptor = EntityDescriptor::builder("Note")
                    .id("id")
                    .property("title")
                    .property_with(PersistentProperty::new("body").policy(MappingPolicy::LAZY))
                    .build()
                    .unwrap();
                EntityMapping::<Note>::builder(descriptor)
                    .bind("id", |n| Ok(n.id.into()), |n, v| {
                        n.id = v.into_optional(PropertyValue::into_integer)?;
                        Ok(())
                    })
                    .bind("title", |n| Ok(n.title.clone().into()), |n, v| {
                        n.title = v.into_text()?;
                        Ok(())
                    })
                    .bind("body", |n| Ok(n.body.clone().into()), |n, v| {
                        n.body = v.into_text()?;
                        Ok(())
                    })
                    .build()
                    .unwrap()
            })
        }
    }

    #[derive(Clone, Default)]
    struct Sheet {
        props: Rc<RefCell<BTreeMap<String, PropertyValue>>>,
        tracked: Rc<Cell<bool>>,
        flushes: Rc<Cell<u32>>,
    }

    impl StoredRecord for Sheet {
        fn id(&self) -> RecordId {
            RecordId::new(5)
        }

        fn kind(&self) -> RecordKind {
            RecordKind::Node
        }

        fn property(&self, key: &str) -> SyncResult<Option<PropertyValue>> {
            Ok(self.props.borrow().get(key).cloned())
        }

        fn set_property(&self, key: &str, value: PropertyValue) -> SyncResult<()> {
            self.props.borrow_mut().insert(key.to_string(), value);
            Ok(())
        }

        fn remove_property(&self, key: &str) -> SyncResult<Option<PropertyValue>> {
            Ok(self.props.borrow_mut().remove(key))
        }

        fn property_keys(&self) -> SyncResult<Vec<String>> {
            Ok(self.props.borrow().keys().cloned().collect())
        }

        fn as_trackable(&self) -> Option<&dyn Trackable> {
            Some(self)
        }
    }

    impl Trackable for Sheet {
        fn track(&self) {
            self.tracked.set(true);
        }

        fn is_tracked(&self) -> bool {
            self.tracked.get()
        }

        fn flush(&self) -> SyncResult<()> {
            self.flushes.set(self.flushes.get() + 1);
            Ok(())
        }
    }

    /// Honors lazy policies with the deferred marker and refuses writes
    /// to the identity.
    struct SheetState {
        record: Option<Sheet>,
        fail_on: Option<&'static str>,
    }

    impl EntityState for SheetState {
        type Record = Sheet;

        fn bind(&mut self, record: Sheet) {
            self.record = Some(record);
        }

        fn record(&self) -> Option<&Sheet> {
            self.record.as_ref()
        }

        fn is_writable(&self, property: &PersistentProperty) -> bool {
            !property.is_identity()
        }

        fn read(
            &self,
            property: &PersistentProperty,
            policy: &MappingPolicy,
        ) -> SyncResult<StateValue> {
            let record = self.record.as_ref().unwrap();
            if property.is_identity() {
                return Ok(StateValue::Value(PropertyValue::Integer(5)));
            }
            if !policy.should_load() {
                return Ok(StateValue::Deferred);
            }
            Ok(StateValue::Value(
                record.property(property.store_key())?.unwrap_or_default(),
            ))
        }

        fn write(
            &mut self,
            property: &PersistentProperty,
            value: PropertyValue,
            _policy: &MappingPolicy,
        ) -> SyncResult<()> {
            if self.fail_on == Some(property.name()) {
                return Err(SyncError::external("write refused"));
            }
            self.record
                .as_ref()
                .unwrap()
                .set_property(property.store_key(), value)
        }

        fn persist(&mut self) -> SyncResult<()> {
            Ok(())
        }
    }

    struct SheetFactory {
        fail_on: Option<&'static str>,
    }

    impl EntityStateFactory for SheetFactory {
        type Record = Sheet;
        type State = SheetState;

        fn create(
            &self,
            _entity: &dyn PropertyAccessor,
            _transactional: bool,
            _store: &dyn GraphStore,
        ) -> SyncResult<SheetState> {
            Ok(SheetState {
                record: None,
                fail_on: self.fail_on,
            })
        }
    }

    #[derive(Default)]
    struct NullStore {
        closes: Rc<Cell<u32>>,
        failures: Rc<Cell<u32>>,
    }

    struct NullTx {
        closes: Rc<Cell<u32>>,
        failures: Rc<Cell<u32>>,
    }

    impl GraphTransaction for NullTx {
        fn mark_success(&mut self) {}

        fn mark_failure(&mut self) {
            self.failures.set(self.failures.get() + 1);
        }

        fn close(&mut self) -> SyncResult<()> {
            self.closes.set(self.closes.get() + 1);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closes.get() > 0
        }
    }

    impl GraphStore for NullStore {
        fn begin_transaction(&self) -> SyncResult<Box<dyn GraphTransaction>> {
            Ok(Box::new(NullTx {
                closes: Rc::clone(&self.closes),
                failures: Rc::clone(&self.failures),
            }))
        }
    }

    fn transmitter(fail_on: Option<&'static str>) -> Transmitter<SheetFactory> {
        Transmitter::new(SheetFactory { fail_on })
    }

    #[test]
    fn save_skips_identity_and_flushes_tracked_node() {
        let store = NullStore::default();
        let sheet = Sheet::default();
        let note = Note {
            id: Some(99),
            title: "groceries".into(),
            body: "milk".into(),
        };

        transmitter(None).save_entity(&note, &sheet, &store).unwrap();

        assert_eq!(sheet.property_keys().unwrap(), vec!["body", "title"]);
        assert!(sheet.is_tracked());
        assert_eq!(sheet.flushes.get(), 1);
        assert_eq!(store.closes.get(), 1);
        assert_eq!(store.failures.get(), 0);
    }

    #[test]
    fn flush_can_be_disabled() {
        let store = NullStore::default();
        let sheet = Sheet::default();
        let transmitter = Transmitter::with_config(
            SheetFactory { fail_on: None },
            TransmitterConfig::new().flush_tracked_nodes(false),
        );
        assert!(!transmitter.config().flush_tracked_nodes);
        assert_eq!(transmitter.factory().fail_on, None);
        transmitter
            .save_entity(&Note::default(), &sheet, &store)
            .unwrap();
        assert_eq!(sheet.flushes.get(), 0);
    }

    #[test]
    fn load_leaves_deferred_fields_untouched() {
        let store = NullStore::default();
        let sheet = Sheet::default();
        sheet.set_property("title", "groceries".into()).unwrap();
        sheet.set_property("body", "milk".into()).unwrap();

        let mut note = Note {
            body: "unchanged".into(),
            ..Note::default()
        };
        transmitter(None)
            .load_entity(&mut note, &sheet, &store)
            .unwrap();

        assert_eq!(note.id, Some(5));
        assert_eq!(note.title, "groceries");
        assert_eq!(note.body, "unchanged");
        assert_eq!(store.closes.get(), 0);
    }

    #[test]
    fn operation_policy_applies_when_property_declares_none() {
        let store = NullStore::default();
        let sheet = Sheet::default();
        sheet.set_property("title", "groceries".into()).unwrap();
        let descriptor = Note::mapping().descriptor();

        let mut note = Note::default();
        let mut accessor = EntityAccessor::new(&mut note);
        transmitter(None)
            .copy_properties_from(&mut accessor, &sheet, descriptor, &MappingPolicy::LAZY, &store)
            .unwrap();

        // title follows the lazy operation policy, id is always resolved
        assert_eq!(note.title, "");
        assert_eq!(note.id, Some(5));
    }

    #[test]
    fn external_write_failure_is_wrapped_and_rolled_back() {
        let store = NullStore::default();
        let sheet = Sheet::default();
        let note = Note {
            title: "t".into(),
            body: "b".into(),
            ..Note::default()
        };

        let err = transmitter(Some("body"))
            .save_entity(&note, &sheet, &store)
            .unwrap_err();

        match err {
            SyncError::StoreSynchronization {
                descriptor, phase, ..
            } => {
                assert_eq!(descriptor, "Note");
                assert_eq!(phase, SavePhase::TransactionOpen);
            }
            other => panic!("expected StoreSynchronization, got {other:?}"),
        }
        assert_eq!(store.failures.get(), 1);
        assert_eq!(store.closes.get(), 1);
    }

    #[test]
    fn mapping_failure_on_load_names_property() {
        let store = NullStore::default();
        let sheet = Sheet::default();
        sheet.set_property("title", PropertyValue::Integer(7)).unwrap();

        let mut note = Note::default();
        let err = transmitter(None)
            .load_entity(&mut note, &sheet, &store)
            .unwrap_err();

        assert_eq!(err.property(), Some("title"));
        assert!(matches!(
            err,
            SyncError::MappingWrite {
                source: AccessError::Value(_),
                ..
            }
        ));
    }
}
