//! Scripted test doubles.
//!
//! Records, states, stores and accessors that append every call to a
//! shared [`EventLog`], so tests can assert on the exact order in which the
//! transmitter talks to its collaborators. Faults can be injected per
//! property.

use entigraph_core::{
    AccessError, EntityState, EntityStateFactory, GraphStore, GraphTransaction, MappingPolicy,
    PersistentProperty, PropertyAccessor, PropertyValue, RecordId, RecordKind, StateValue,
    StoredRecord, SyncError, SyncResult, Trackable,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One observed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A transaction was begun.
    Begin,
    /// The transaction was marked successful.
    Success,
    /// The transaction was marked failed.
    Failure,
    /// The transaction was closed.
    Close,
    /// The record started tracking.
    Track,
    /// The record was flushed.
    Flush,
    /// The state persisted record-level data.
    Persist,
    /// The state was asked for a property.
    StateRead(String),
    /// The state was given a property value.
    StateWrite(String),
    /// The object was asked for a property.
    ObjectGet(String),
    /// The object was given a property value.
    ObjectSet(String),
}

/// Shared, ordered log of [`Event`]s.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    /// Number of events equal to `event`.
    pub fn count(&self, event: &Event) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }

    /// Position of the first event equal to `event`.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }

    /// Names of the properties written to the state, in order.
    pub fn state_writes(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::StateWrite(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forgets every event.
    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// How an injected fault is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A runtime error (`SyncError::InvalidOperation`), passed through as is.
    Runtime,
    /// A foreign error (`SyncError::External`), wrapped once by the save path.
    External,
}

impl Fault {
    /// Builds the error for a failing property.
    pub fn error(self, property: &str) -> SyncError {
        match self {
            Fault::Runtime => {
                SyncError::invalid_operation(format!("scripted fault writing {property}"))
            }
            Fault::External => SyncError::external(ScriptedFault(property.to_string())),
        }
    }
}

/// The foreign error raised by [`Fault::External`].
#[derive(Debug)]
pub struct ScriptedFault(pub String);

impl fmt::Display for ScriptedFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scripted fault writing {}", self.0)
    }
}

impl std::error::Error for ScriptedFault {}

/// A record backed by a shared map.
///
/// Trackable only when built with [`ScriptedRecord::trackable`]. Writes
/// always land in the map right away; buffering is only reported.
#[derive(Debug, Clone)]
pub struct ScriptedRecord {
    id: RecordId,
    kind: RecordKind,
    properties: Arc<Mutex<BTreeMap<String, PropertyValue>>>,
    trackable: bool,
    buffers: bool,
    tracked: Arc<AtomicBool>,
    log: EventLog,
}

impl ScriptedRecord {
    /// A plain node record.
    pub fn node(id: u64, log: &EventLog) -> Self {
        Self::new(RecordId::new(id), RecordKind::Node, log)
    }

    /// A plain relationship record.
    pub fn relationship(id: u64, log: &EventLog) -> Self {
        Self::new(RecordId::new(id), RecordKind::Relationship, log)
    }

    fn new(id: RecordId, kind: RecordKind, log: &EventLog) -> Self {
        Self {
            id,
            kind,
            properties: Arc::default(),
            trackable: false,
            buffers: false,
            tracked: Arc::default(),
            log: log.clone(),
        }
    }

    /// Makes the record trackable; `buffers` is what `buffers_writes` reports.
    #[must_use]
    pub fn trackable(mut self, buffers: bool) -> Self {
        self.trackable = true;
        self.buffers = buffers;
        self
    }

    /// Snapshot of the stored properties.
    pub fn snapshot(&self) -> BTreeMap<String, PropertyValue> {
        self.properties.lock().clone()
    }
}

impl StoredRecord for ScriptedRecord {
    fn id(&self) -> RecordId {
        self.id
    }

    fn kind(&self) -> RecordKind {
        self.kind
    }

    fn property(&self, key: &str) -> SyncResult<Option<PropertyValue>> {
        Ok(self.properties.lock().get(key).cloned())
    }

    fn set_property(&self, key: &str, value: PropertyValue) -> SyncResult<()> {
        let mut properties = self.properties.lock();
        if value.is_null() {
            properties.remove(key);
        } else {
            properties.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn remove_property(&self, key: &str) -> SyncResult<Option<PropertyValue>> {
        Ok(self.properties.lock().remove(key))
    }

    fn property_keys(&self) -> SyncResult<Vec<String>> {
        Ok(self.properties.lock().keys().cloned().collect())
    }

    fn as_trackable(&self) -> Option<&dyn Trackable> {
        self.trackable.then_some(self as &dyn Trackable)
    }
}

impl Trackable for ScriptedRecord {
    fn track(&self) {
        self.log.push(Event::Track);
        self.tracked.store(true, Ordering::SeqCst);
    }

    fn is_tracked(&self) -> bool {
        self.tracked.load(Ordering::SeqCst)
    }

    fn buffers_writes(&self) -> bool {
        self.buffers
    }

    fn flush(&self) -> SyncResult<()> {
        self.log.push(Event::Flush);
        Ok(())
    }
}

/// What a [`ScriptedState`] does differently from a plain map state.
#[derive(Debug, Clone, Default)]
pub struct Script {
    fail_on: Option<(String, Fault)>,
    not_writable: BTreeSet<String>,
    deferred: BTreeSet<String>,
}

/// An entity state over [`ScriptedRecord`]s.
///
/// Identity reads as the record id and is never writable; every other
/// property lives under its store key.
#[derive(Debug)]
pub struct ScriptedState {
    record: Option<ScriptedRecord>,
    script: Script,
    log: EventLog,
}

impl ScriptedState {
    fn bound(&self) -> SyncResult<&ScriptedRecord> {
        self.record
            .as_ref()
            .ok_or_else(|| SyncError::invalid_operation("scripted state is not bound"))
    }
}

impl EntityState for ScriptedState {
    type Record = ScriptedRecord;

    fn bind(&mut self, record: ScriptedRecord) {
        self.record = Some(record);
    }

    fn record(&self) -> Option<&ScriptedRecord> {
        self.record.as_ref()
    }

    fn is_writable(&self, property: &PersistentProperty) -> bool {
        !property.is_identity() && !self.script.not_writable.contains(property.name())
    }

    fn read(
        &self,
        property: &PersistentProperty,
        _policy: &MappingPolicy,
    ) -> SyncResult<StateValue> {
        self.log.push(Event::StateRead(property.name().to_string()));
        let record = self.bound()?;
        if self.script.deferred.contains(property.name()) {
            return Ok(StateValue::Deferred);
        }
        if property.is_identity() {
            return Ok(StateValue::Value(PropertyValue::Integer(
                record.id().as_u64() as i64,
            )));
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
        self.log.push(Event::StateWrite(property.name().to_string()));
        if let Some((name, fault)) = &self.script.fail_on {
            if name == property.name() {
                return Err(fault.error(name));
            }
        }
        self.bound()?.set_property(property.store_key(), value)
    }

    fn persist(&mut self) -> SyncResult<()> {
        self.log.push(Event::Persist);
        Ok(())
    }
}

/// Creates [`ScriptedState`]s that share one script and log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    script: Script,
    log: EventLog,
}

impl ScriptedFactory {
    /// Creates a factory logging to `log`.
    pub fn new(log: &EventLog) -> Self {
        Self {
            script: Script::default(),
            log: log.clone(),
        }
    }

    /// Fails when `property` is written.
    #[must_use]
    pub fn fail_on(mut self, property: &str, fault: Fault) -> Self {
        self.script.fail_on = Some((property.to_string(), fault));
        self
    }

    /// Reports `property` as not writable.
    #[must_use]
    pub fn not_writable(mut self, property: &str) -> Self {
        self.script.not_writable.insert(property.to_string());
        self
    }

    /// Answers reads of `property` with the deferred marker.
    #[must_use]
    pub fn deferred(mut self, property: &str) -> Self {
        self.script.deferred.insert(property.to_string());
        self
    }
}

impl EntityStateFactory for ScriptedFactory {
    type Record = ScriptedRecord;
    type State = ScriptedState;

    fn create(
        &self,
        _entity: &dyn PropertyAccessor,
        _transactional: bool,
        _store: &dyn GraphStore,
    ) -> SyncResult<ScriptedState> {
        Ok(ScriptedState {
            record: None,
            script: self.script.clone(),
            log: self.log.clone(),
        })
    }
}

/// A store whose transactions only log.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    log: EventLog,
    fail_close: bool,
}

impl RecordingStore {
    /// Creates a store logging to `log`.
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            fail_close: false,
        }
    }

    /// Makes every `close` fail after logging.
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

struct RecordingTransaction {
    log: EventLog,
    fail_close: bool,
    closed: bool,
}

impl GraphTransaction for RecordingTransaction {
    fn mark_success(&mut self) {
        self.log.push(Event::Success);
    }

    fn mark_failure(&mut self) {
        self.log.push(Event::Failure);
    }

    fn close(&mut self) -> SyncResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.log.push(Event::Close);
        if self.fail_close {
            Err(SyncError::external(ScriptedFault("close".to_string())))
        } else {
            Ok(())
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl GraphStore for RecordingStore {
    fn begin_transaction(&self) -> SyncResult<Box<dyn GraphTransaction>> {
        self.log.push(Event::Begin);
        Ok(Box::new(RecordingTransaction {
            log: self.log.clone(),
            fail_close: self.fail_close,
            closed: false,
        }))
    }
}

/// Wraps an accessor and logs every get and set.
pub struct RecordingAccessor<A> {
    inner: A,
    log: EventLog,
}

impl<A: PropertyAccessor> RecordingAccessor<A> {
    /// Wraps `inner`.
    pub fn new(inner: A, log: &EventLog) -> Self {
        Self {
            inner,
            log: log.clone(),
        }
    }

    /// The wrapped accessor.
    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<A: PropertyAccessor> PropertyAccessor for RecordingAccessor<A> {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn type_alias(&self) -> &str {
        self.inner.type_alias()
    }

    fn get_property(&self, property: &PersistentProperty) -> Result<PropertyValue, AccessError> {
        self.log.push(Event::ObjectGet(property.name().to_string()));
        self.inner.get_property(property)
    }

    fn set_property(
        &mut self,
        property: &PersistentProperty,
        value: PropertyValue,
    ) -> Result<(), AccessError> {
        self.log.push(Event::ObjectSet(property.name().to_string()));
        self.inner.set_property(property, value)
    }
}

/// Wraps another factory and fails writes of one property.
///
/// Lets real states (for example over a `MemoryGraph`) fail part-way
/// through a save.
#[derive(Debug, Clone)]
pub struct FaultInjector<F> {
    inner: F,
    property: String,
    fault: Fault,
}

impl<F: EntityStateFactory> FaultInjector<F> {
    /// Fails writes of `property` with `fault`.
    pub fn new(inner: F, property: &str, fault: Fault) -> Self {
        Self {
            inner,
            property: property.to_string(),
            fault,
        }
    }
}

impl<F: EntityStateFactory> EntityStateFactory for FaultInjector<F> {
    type Record = F::Record;
    type State = FaultyState<F::State>;

    fn create(
        &self,
        entity: &dyn PropertyAccessor,
        transactional: bool,
        store: &dyn GraphStore,
    ) -> SyncResult<Self::State> {
        Ok(FaultyState {
            inner: self.inner.create(entity, transactional, store)?,
            property: self.property.clone(),
            fault: self.fault,
        })
    }
}

/// State produced by [`FaultInjector`].
#[derive(Debug)]
pub struct FaultyState<S> {
    inner: S,
    property: String,
    fault: Fault,
}

impl<S: EntityState> EntityState for FaultyState<S> {
    type Record = S::Record;

    fn bind(&mut self, record: S::Record) {
        self.inner.bind(record);
    }

    fn record(&self) -> Option<&S::Record> {
        self.inner.record()
    }

    fn is_writable(&self, property: &PersistentProperty) -> bool {
        self.inner.is_writable(property)
    }

    fn read(
        &self,
        property: &PersistentProperty,
        policy: &MappingPolicy,
    ) -> SyncResult<StateValue> {
        self.inner.read(property, policy)
    }

    fn write(
        &mut self,
        property: &PersistentProperty,
        value: PropertyValue,
        policy: &MappingPolicy,
    ) -> SyncResult<()> {
        if property.name() == self.property {
            return Err(self.fault.error(property.name()));
        }
        self.inner.write(property, value, policy)
    }

    fn persist(&mut self) -> SyncResult<()> {
        self.inner.persist()
    }
}
