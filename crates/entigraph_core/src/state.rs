//! Entity-state adapters.
//!
//! An entity state sits between one domain object and one stored record
//! for the duration of a copy operation. It decides how each property is
//! read from and written to the record, and may defer, cache or batch the
//! underlying store operations.

use crate::error::SyncResult;
use crate::mapping::{PersistentProperty, PropertyAccessor};
use crate::policy::MappingPolicy;
use crate::record::StoredRecord;
use crate::store::GraphStore;
use crate::value::{PropertyValue, StateValue};

/// Per-operation bridge between a domain object and a stored record.
pub trait EntityState {
    /// Record type this state binds to.
    type Record: StoredRecord;

    /// Binds the stored record. Must happen before any property is touched.
    fn bind(&mut self, record: Self::Record);

    /// The bound record, if any.
    fn record(&self) -> Option<&Self::Record>;

    /// Whether the property may currently be written to the record.
    fn is_writable(&self, property: &PersistentProperty) -> bool;

    /// Reads a property value, or the deferred marker.
    fn read(&self, property: &PersistentProperty, policy: &MappingPolicy)
        -> SyncResult<StateValue>;

    /// Writes a property value.
    fn write(
        &mut self,
        property: &PersistentProperty,
        value: PropertyValue,
        policy: &MappingPolicy,
    ) -> SyncResult<()>;

    /// Materializes record-level state (identity, type marker) before
    /// property writes.
    fn persist(&mut self) -> SyncResult<()>;
}

/// Creates entity states.
pub trait EntityStateFactory {
    /// Record type the created states bind to.
    type Record: StoredRecord;
    /// The state type produced.
    type State: EntityState<Record = Self::Record>;

    /// Creates a fresh state for `entity`.
    ///
    /// `transactional` asks for a state that wraps its own writes in a
    /// transaction; the transmitter always passes `false` and manages the
    /// transaction itself.
    fn create(
        &self,
        entity: &dyn PropertyAccessor,
        transactional: bool,
        store: &dyn GraphStore,
    ) -> SyncResult<Self::State>;
}
