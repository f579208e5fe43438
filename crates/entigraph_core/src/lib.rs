//! # EntiGraph Core
//!
//! Entity-state synchronization between domain objects and graph records.
//!
//! This crate provides:
//! - A dynamic property value model shared by objects and records
//! - Entity descriptors, mapping policies and per-type property accessors
//! - Trait seams for stored records, entity states and store transactions
//! - The [`Transmitter`], which loads objects from records and saves them
//!   back inside a transaction
//!
//! ## Example
//!
//! ```rust,ignore
//! use entigraph_core::Transmitter;
//! use entigraph_memory::{GraphStateFactory, MemoryGraph};
//!
//! let graph = MemoryGraph::new();
//! let record = graph.write(|g| g.create_node())?;
//! let transmitter = Transmitter::new(GraphStateFactory::new());
//!
//! transmitter.save_entity(&alice, &record, &graph)?;
//! let copy: Person = transmitter.read_entity(&record, &graph)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod mapping;
mod policy;
mod record;
mod state;
mod store;
mod transmitter;
mod types;
mod value;

pub use config::TransmitterConfig;
pub use error::{BoxError, SavePhase, SyncError, SyncResult};
pub use mapping::{
    AccessError, Association, Cardinality, EntityAccessor, EntityDescriptor, EntityMapping,
    MappedEntity, PersistentProperty, PropertyAccessor, PropertyKind,
};
pub use policy::{LoadStrategy, MappingPolicy};
pub use record::{RemoteIdentified, StoredRecord, Trackable};
pub use state::{EntityState, EntityStateFactory};
pub use store::{GraphStore, GraphTransaction, TransactionScope};
pub use transmitter::{copy_state_value, set_state_value, Transmitter};
pub use types::{Direction, RecordId, RecordKind, RecordRef};
pub use value::{PropertyValue, StateValue, ValueError};
