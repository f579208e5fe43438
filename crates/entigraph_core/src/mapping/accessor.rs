//! Property accessors over domain objects.

use crate::error::{SyncError, SyncResult};
use crate::mapping::descriptor::{EntityDescriptor, PersistentProperty};
use crate::value::{PropertyValue, ValueError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a [`PropertyAccessor`].
#[derive(Debug, Error)]
pub enum AccessError {
    /// The accessor has no binding for the property.
    #[error("unknown property {name}")]
    UnknownProperty {
        /// Property name.
        name: String,
    },

    /// The accessor only allows reads.
    #[error("accessor is read-only")]
    ReadOnly,

    /// The value had the wrong type for the field.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// The domain type refused the value.
    #[error("{message}")]
    Rejected {
        /// Reason given by the domain type.
        message: String,
    },
}

impl AccessError {
    /// Creates an unknown property error.
    pub fn unknown_property(name: impl Into<String>) -> Self {
        Self::UnknownProperty { name: name.into() }
    }

    /// Creates a rejected value error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Get/set access to the persistent fields of one domain object.
///
/// An accessor lives for the duration of one copy operation.
pub trait PropertyAccessor {
    /// Describes the wrapped object for diagnostics.
    fn describe(&self) -> String;

    /// Alias under which the wrapped object's type is stored.
    fn type_alias(&self) -> &str;

    /// Reads a field.
    fn get_property(&self, property: &PersistentProperty) -> Result<PropertyValue, AccessError>;

    /// Writes a field.
    fn set_property(
        &mut self,
        property: &PersistentProperty,
        value: PropertyValue,
    ) -> Result<(), AccessError>;
}

/// Reads a field through an accessor, naming the property and object on
/// failure.
pub fn read_property<A>(accessor: &A, property: &PersistentProperty) -> SyncResult<PropertyValue>
where
    A: PropertyAccessor + ?Sized,
{
    accessor
        .get_property(property)
        .map_err(|source| SyncError::MappingRead {
            property: property.name().to_string(),
            entity: accessor.describe(),
            source,
        })
}

/// Writes a field through an accessor, naming the property, value and
/// object on failure.
pub fn write_property<A>(
    accessor: &mut A,
    property: &PersistentProperty,
    value: PropertyValue,
) -> SyncResult<()>
where
    A: PropertyAccessor + ?Sized,
{
    let rendered = value.to_string();
    accessor
        .set_property(property, value)
        .map_err(|source| SyncError::MappingWrite {
            property: property.name().to_string(),
            value: rendered,
            entity: accessor.describe(),
            source,
        })
}

/// Reads one field of `T`.
pub type Getter<T> = fn(&T) -> Result<PropertyValue, AccessError>;

/// Writes one field of `T`.
pub type Setter<T> = fn(&mut T, PropertyValue) -> Result<(), AccessError>;

struct FieldBinding<T> {
    name: String,
    get: Getter<T>,
    set: Setter<T>,
}

/// Per-type field table: the descriptor plus a getter/setter for every
/// persistent field, indexed by [`PersistentProperty::index`].
///
/// Built once per type (usually in a `OnceLock`) and shared.
pub struct EntityMapping<T> {
    descriptor: Arc<EntityDescriptor>,
    fields: Vec<Option<FieldBinding<T>>>,
}

impl<T> EntityMapping<T> {
    /// Starts a mapping over `descriptor`.
    pub fn builder(descriptor: EntityDescriptor) -> EntityMappingBuilder<T> {
        let mut fields = Vec::with_capacity(descriptor.field_count());
        fields.resize_with(descriptor.field_count(), || None);
        EntityMappingBuilder {
            descriptor,
            fields,
            unknown: Vec::new(),
        }
    }

    /// The type's descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    fn binding(&self, property: &PersistentProperty) -> Result<&FieldBinding<T>, AccessError> {
        self.fields
            .get(property.index())
            .and_then(Option::as_ref)
            .filter(|binding| binding.name == property.name())
            .ok_or_else(|| AccessError::unknown_property(property.name()))
    }
}

impl<T> fmt::Debug for EntityMapping<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMapping")
            .field("descriptor", &self.descriptor.name())
            .field("bound", &self.fields.iter().filter(|b| b.is_some()).count())
            .finish()
    }
}

/// Builder for [`EntityMapping`].
pub struct EntityMappingBuilder<T> {
    descriptor: EntityDescriptor,
    fields: Vec<Option<FieldBinding<T>>>,
    unknown: Vec<String>,
}

impl<T> EntityMappingBuilder<T> {
    /// Binds a getter and setter to the named field.
    #[must_use]
    pub fn bind(mut self, name: &str, get: Getter<T>, set: Setter<T>) -> Self {
        match self.descriptor.property(name).map(PersistentProperty::index) {
            Some(index) => {
                self.fields[index] = Some(FieldBinding {
                    name: name.to_string(),
                    get,
                    set,
                });
            }
            None => self.unknown.push(name.to_string()),
        }
        self
    }

    /// Builds the mapping. Every non-transient field must be bound, and
    /// every binding must name a declared field.
    pub fn build(self) -> SyncResult<EntityMapping<T>> {
        if let Some(name) = self.unknown.first() {
            return Err(SyncError::invalid_operation(format!(
                "{} has no field {name}",
                self.descriptor.name()
            )));
        }
        let unbound = self
            .descriptor
            .properties()
            .chain(self.descriptor.associations().map(|a| a.inverse()))
            .find(|p| self.fields[p.index()].is_none());
        if let Some(property) = unbound {
            return Err(SyncError::invalid_operation(format!(
                "{}.{} has no accessor binding",
                self.descriptor.name(),
                property.name()
            )));
        }
        Ok(EntityMapping {
            descriptor: Arc::new(self.descriptor),
            fields: self.fields,
        })
    }
}

/// A domain type with a static field mapping.
pub trait MappedEntity: Sized + 'static {
    /// The type's mapping, built once.
    fn mapping() -> &'static EntityMapping<Self>;

    /// Describes this instance for diagnostics.
    fn describe(&self) -> String {
        Self::mapping().descriptor().name().to_string()
    }
}

enum Target<'a, T> {
    Shared(&'a T),
    Exclusive(&'a mut T),
}

/// [`PropertyAccessor`] for a [`MappedEntity`], dispatching through its
/// [`EntityMapping`].
pub struct EntityAccessor<'a, T: MappedEntity> {
    target: Target<'a, T>,
    mapping: &'static EntityMapping<T>,
}

impl<'a, T: MappedEntity> EntityAccessor<'a, T> {
    /// Creates a read/write accessor.
    pub fn new(entity: &'a mut T) -> Self {
        Self {
            target: Target::Exclusive(entity),
            mapping: T::mapping(),
        }
    }

    /// Creates an accessor that rejects writes.
    pub fn read_only(entity: &'a T) -> Self {
        Self {
            target: Target::Shared(entity),
            mapping: T::mapping(),
        }
    }

    /// The wrapped entity.
    #[must_use]
    pub fn entity(&self) -> &T {
        match &self.target {
            Target::Shared(entity) => *entity,
            Target::Exclusive(entity) => &**entity,
        }
    }

    /// The entity's descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        self.mapping.descriptor()
    }
}

impl<T: MappedEntity> PropertyAccessor for EntityAccessor<'_, T> {
    fn describe(&self) -> String {
        self.entity().describe()
    }

    fn type_alias(&self) -> &str {
        self.mapping.descriptor().type_alias()
    }

    fn get_property(&self, property: &PersistentProperty) -> Result<PropertyValue, AccessError> {
        let binding = self.mapping.binding(property)?;
        (binding.get)(self.entity())
    }

    fn set_property(
        &mut self,
        property: &PersistentProperty,
        value: PropertyValue,
    ) -> Result<(), AccessError> {
        let binding = self.mapping.binding(property)?;
        match &mut self.target {
            Target::Shared(_) => Err(AccessError::ReadOnly),
            Target::Exclusive(entity) => (binding.set)(entity, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::descriptor::Association;
    use std::sync::OnceLock;

    #[derive(Debug, Default)]
    struct Pet {
        name: String,
        legs: i64,
    }

    impl MappedEntity for Pet {
        fn mapping() -> &'static EntityMapping<Self> {
            static MAPPING: OnceLock<EntityMapping<Pet>> = OnceLock::new();
            MAPPING.get_or_init(|| {
                let descriptor = EntityDescriptor::builder("Pet")
                    .property("name")
                    .property("legs")
                    .build()
                    .unwrap();
                EntityMapping::<Pet>::builder(descriptor)
                    .bind("name", |p| Ok(p.name.clone().into()), |p, v| {
                        p.name = v.into_text()?;
                        Ok(())
                    })
                    .bind("legs", |p| Ok(p.legs.into()), |p, v| {
                        let legs = v.into_integer()?;
                        if legs < 0 {
                            return Err(AccessError::rejected("negative leg count"));
                        }
                        p.legs = legs;
                        Ok(())
                    })
                    .build()
                    .unwrap()
            })
        }

        fn describe(&self) -> String {
            format!("Pet({})", self.name)
        }
    }

    fn prop(name: &str) -> PersistentProperty {
        Pet::mapping().descriptor().property(name).unwrap().clone()
    }

    #[test]
    fn get_and_set_through_mapping() {
        let mut pet = Pet::default();
        let mut accessor = EntityAccessor::new(&mut pet);
        accessor
            .set_property(&prop("name"), PropertyValue::from("Rex"))
            .unwrap();
        accessor
            .set_property(&prop("legs"), PropertyValue::Integer(4))
            .unwrap();
        assert_eq!(
            accessor.get_property(&prop("name")).unwrap(),
            PropertyValue::from("Rex")
        );
        assert_eq!(pet.legs, 4);
    }

    #[test]
    fn read_only_accessor_rejects_writes() {
        let pet = Pet::default();
        let mut accessor = EntityAccessor::read_only(&pet);
        let err = accessor
            .set_property(&prop("name"), PropertyValue::from("Rex"))
            .unwrap_err();
        assert!(matches!(err, AccessError::ReadOnly));
    }

    #[test]
    fn foreign_property_is_unknown() {
        let pet = Pet::default();
        let accessor = EntityAccessor::read_only(&pet);
        let foreign = PersistentProperty::new("wings");
        assert!(matches!(
            accessor.get_property(&foreign),
            Err(AccessError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn write_property_names_property_value_and_entity() {
        let mut pet = Pet {
            name: "Rex".into(),
            legs: 4,
        };
        let mut accessor = EntityAccessor::new(&mut pet);
        let err = write_property(&mut accessor, &prop("legs"), PropertyValue::Integer(-1))
            .unwrap_err();
        assert_eq!(err.to_string(), "setting property legs to -1 on Pet(Rex)");
        assert_eq!(err.property(), Some("legs"));
    }

    #[test]
    fn type_mismatch_surfaces_as_mapping_error() {
        let mut pet = Pet::default();
        let mut accessor = EntityAccessor::new(&mut pet);
        let err = write_property(&mut accessor, &prop("name"), PropertyValue::Integer(1))
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::MappingWrite {
                source: AccessError::Value(_),
                ..
            }
        ));
    }

    #[test]
    fn build_requires_every_field_bound() {
        let descriptor = EntityDescriptor::builder("Pet")
            .property("name")
            .association(Association::new("owner", "OWNED_BY"))
            .build()
            .unwrap();
        let result = EntityMapping::<Pet>::builder(descriptor)
            .bind("name", |p| Ok(p.name.clone().into()), |_, _| Ok(()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn build_rejects_unknown_binding() {
        let descriptor = EntityDescriptor::builder("Pet").build().unwrap();
        let result = EntityMapping::<Pet>::builder(descriptor)
            .bind("tail", |_| Ok(PropertyValue::Null), |_, _| Ok(()))
            .build();
        assert!(result.is_err());
    }
}
