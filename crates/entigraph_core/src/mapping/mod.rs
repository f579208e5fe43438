//! Mapping metadata and property access.
//!
//! An [`EntityDescriptor`] lists the persistent properties and
//! associations of a type. A [`PropertyAccessor`] reads and writes those
//! fields on one instance; [`EntityAccessor`] implements it for any
//! [`MappedEntity`] through a per-type [`EntityMapping`] table.

mod accessor;
mod descriptor;

pub use accessor::{
    read_property, write_property, AccessError, EntityAccessor, EntityMapping,
    EntityMappingBuilder, Getter, MappedEntity, PropertyAccessor, Setter,
};
pub use descriptor::{
    Association, Cardinality, EntityDescriptor, EntityDescriptorBuilder, PersistentProperty,
    PropertyKind,
};
