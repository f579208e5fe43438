//! Entity descriptors: the persistent shape of a mapped type.

use crate::error::{SyncError, SyncResult};
use crate::policy::MappingPolicy;
use crate::types::Direction;
use std::collections::HashSet;
use std::fmt;

/// How many records an association points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cardinality {
    /// At most one related record; the value is a single reference.
    One,
    /// Any number of related records; the value is an array of references.
    #[default]
    Many,
}

/// What a persistent property maps to in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// The record identity. Readable, never writable.
    Identity,
    /// A key/value property on the record.
    Scalar,
    /// The inverse end of an association, backed by relationships.
    Association {
        /// Relationship type connecting the records.
        relationship_type: String,
        /// Direction relative to the mapped record.
        direction: Direction,
        /// Single or multi-valued.
        cardinality: Cardinality,
    },
}

/// One persistent field of a mapped type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentProperty {
    name: String,
    key: String,
    kind: PropertyKind,
    index: usize,
    policy: Option<MappingPolicy>,
    read_only: bool,
    transient: bool,
}

impl PersistentProperty {
    /// Creates a scalar property stored under its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            kind: PropertyKind::Scalar,
            index: 0,
            policy: None,
            read_only: false,
            transient: false,
        }
    }

    /// Creates the identity property.
    pub fn identity(name: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::Identity,
            ..Self::new(name)
        }
    }

    /// Stores the property under a different key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Declares the property's own mapping policy.
    #[must_use]
    pub fn policy(mut self, policy: MappingPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Marks the property read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Excludes the property from persistence.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Field name on the domain type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key the value is stored under.
    #[must_use]
    pub fn store_key(&self) -> &str {
        &self.key
    }

    /// What the property maps to.
    #[must_use]
    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// Stable position within the descriptor, assigned at build time.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The property's own mapping policy, if declared.
    #[must_use]
    pub fn declared_policy(&self) -> Option<&MappingPolicy> {
        self.policy.as_ref()
    }

    /// The policy that applies when copying this property under an
    /// operation-level policy.
    #[must_use]
    pub fn effective_policy(&self, operation: &MappingPolicy) -> MappingPolicy {
        MappingPolicy::resolve(operation, self.policy.as_ref())
    }

    /// Whether the property itself is declared read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the property is excluded from persistence.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Whether this is the identity property.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(self.kind, PropertyKind::Identity)
    }

    /// Whether this is the inverse end of an association.
    #[must_use]
    pub fn is_association(&self) -> bool {
        matches!(self.kind, PropertyKind::Association { .. })
    }
}

impl fmt::Display for PersistentProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An association between the mapped type and other records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    inverse: PersistentProperty,
}

impl Association {
    /// Creates a multi-valued outgoing association.
    pub fn new(name: impl Into<String>, relationship_type: impl Into<String>) -> Self {
        let mut inverse = PersistentProperty::new(name);
        inverse.kind = PropertyKind::Association {
            relationship_type: relationship_type.into(),
            direction: Direction::Outgoing,
            cardinality: Cardinality::Many,
        };
        Self { inverse }
    }

    /// Sets the direction.
    #[must_use]
    pub fn direction(mut self, value: Direction) -> Self {
        if let PropertyKind::Association { direction, .. } = &mut self.inverse.kind {
            *direction = value;
        }
        self
    }

    /// Sets the cardinality.
    #[must_use]
    pub fn cardinality(mut self, value: Cardinality) -> Self {
        if let PropertyKind::Association { cardinality, .. } = &mut self.inverse.kind {
            *cardinality = value;
        }
        self
    }

    /// Declares the association's own mapping policy.
    #[must_use]
    pub fn policy(mut self, policy: MappingPolicy) -> Self {
        self.inverse = self.inverse.policy(policy);
        self
    }

    /// Marks the association read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.inverse = self.inverse.read_only();
        self
    }

    /// The property on the mapped type that holds this association.
    #[must_use]
    pub fn inverse(&self) -> &PersistentProperty {
        &self.inverse
    }

    /// Relationship type connecting the records.
    #[must_use]
    pub fn relationship_type(&self) -> &str {
        match &self.inverse.kind {
            PropertyKind::Association {
                relationship_type, ..
            } => relationship_type,
            _ => unreachable!("association inverse always has association kind"),
        }
    }
}

/// Persistent shape of one mapped type.
///
/// Descriptors are built once per type and shared; iteration order is the
/// declaration order and is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    name: String,
    alias: Option<String>,
    properties: Vec<PersistentProperty>,
    associations: Vec<Association>,
}

impl EntityDescriptor {
    /// Starts building a descriptor for the named type.
    pub fn builder(name: impl Into<String>) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder {
            name: name.into(),
            alias: None,
            properties: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Name of the mapped type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alias stored on records to identify the mapped type.
    #[must_use]
    pub fn type_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Persistent, non-transient properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &PersistentProperty> {
        self.properties.iter().filter(|p| !p.is_transient())
    }

    /// Associations in declaration order.
    pub fn associations(&self) -> impl Iterator<Item = &Association> {
        self.associations.iter()
    }

    /// Visits every persistent property, stopping at the first error.
    pub fn for_each_property<E>(
        &self,
        mut visitor: impl FnMut(&PersistentProperty) -> Result<(), E>,
    ) -> Result<(), E> {
        self.properties().try_for_each(|property| visitor(property))
    }

    /// Visits every association, stopping at the first error.
    pub fn for_each_association<E>(
        &self,
        mut visitor: impl FnMut(&Association) -> Result<(), E>,
    ) -> Result<(), E> {
        self.associations().try_for_each(|association| visitor(association))
    }

    /// Looks up a property or association inverse by field name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PersistentProperty> {
        self.properties
            .iter()
            .chain(self.associations.iter().map(Association::inverse))
            .find(|p| p.name() == name)
    }

    /// The identity property, if declared.
    #[must_use]
    pub fn id_property(&self) -> Option<&PersistentProperty> {
        self.properties.iter().find(|p| p.is_identity())
    }

    /// Number of declared fields, including transient ones.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.properties.len() + self.associations.len()
    }
}

impl fmt::Display for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for [`EntityDescriptor`].
#[derive(Debug)]
pub struct EntityDescriptorBuilder {
    name: String,
    alias: Option<String>,
    properties: Vec<PersistentProperty>,
    associations: Vec<Association>,
}

impl EntityDescriptorBuilder {
    /// Sets the type alias stored on records.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Declares the identity property.
    #[must_use]
    pub fn id(self, name: impl Into<String>) -> Self {
        self.property_with(PersistentProperty::identity(name))
    }

    /// Declares a scalar property with default settings.
    #[must_use]
    pub fn property(self, name: impl Into<String>) -> Self {
        self.property_with(PersistentProperty::new(name))
    }

    /// Declares a fully configured property.
    #[must_use]
    pub fn property_with(mut self, property: PersistentProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Declares an association.
    #[must_use]
    pub fn association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Validates and builds the descriptor.
    ///
    /// Fails if two fields share a name, if two stored properties share a
    /// key, if more than one identity is declared, or if a property was
    /// given an association kind outside [`Association`].
    pub fn build(self) -> SyncResult<EntityDescriptor> {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        let mut identities = 0;

        for property in &self.properties {
            if property.is_association() {
                return Err(SyncError::invalid_operation(format!(
                    "{}.{} must be declared as an association",
                    self.name,
                    property.name()
                )));
            }
            if property.is_identity() {
                identities += 1;
            } else if !property.is_transient() && !keys.insert(property.store_key().to_string()) {
                return Err(SyncError::invalid_operation(format!(
                    "{} maps two properties to key {}",
                    self.name,
                    property.store_key()
                )));
            }
        }
        if identities > 1 {
            return Err(SyncError::invalid_operation(format!(
                "{} declares {identities} identity properties",
                self.name
            )));
        }

        let fields = self
            .properties
            .iter()
            .chain(self.associations.iter().map(Association::inverse));
        for field in fields {
            if !names.insert(field.name().to_string()) {
                return Err(SyncError::invalid_operation(format!(
                    "{} declares field {} twice",
                    self.name,
                    field.name()
                )));
            }
        }

        let mut properties = self.properties;
        let mut associations = self.associations;
        for (index, property) in properties.iter_mut().enumerate() {
            property.index = index;
        }
        let offset = properties.len();
        for (index, association) in associations.iter_mut().enumerate() {
            association.inverse.index = offset + index;
        }

        Ok(EntityDescriptor {
            name: self.name,
            alias: self.alias,
            properties,
            associations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityDescriptor {
        EntityDescriptor::builder("Person")
            .alias("person")
            .id("id")
            .property("name")
            .property_with(PersistentProperty::new("age").policy(MappingPolicy::EAGER))
            .property_with(PersistentProperty::new("scratch").transient())
            .association(Association::new("friends", "KNOWS"))
            .build()
            .unwrap()
    }

    #[test]
    fn properties_skip_transient_and_keep_order() {
        let descriptor = person();
        let names: Vec<_> = descriptor.properties().map(|p| p.name()).collect();
        assert_eq!(names, vec!["id", "name", "age"]);
    }

    #[test]
    fn indexes_cover_properties_then_associations() {
        let descriptor = person();
        assert_eq!(descriptor.property("id").unwrap().index(), 0);
        assert_eq!(descriptor.property("scratch").unwrap().index(), 3);
        assert_eq!(descriptor.property("friends").unwrap().index(), 4);
        assert_eq!(descriptor.field_count(), 5);
    }

    #[test]
    fn id_property_is_the_declared_identity() {
        let descriptor = person();
        let id = descriptor.id_property().unwrap();
        assert_eq!(id.name(), "id");
        assert!(id.is_identity());

        let anonymous = EntityDescriptor::builder("Tag")
            .property("label")
            .build()
            .unwrap();
        assert!(anonymous.id_property().is_none());
    }

    #[test]
    fn visitor_stops_at_first_error() {
        let descriptor = person();
        let mut seen = Vec::new();
        let result = descriptor.for_each_property(|p| {
            seen.push(p.name().to_string());
            if p.name() == "name" {
                Err("stop")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, vec!["id", "name"]);
    }

    #[test]
    fn association_inverse_carries_relationship() {
        let descriptor = person();
        let association = descriptor.associations().next().unwrap();
        assert_eq!(association.relationship_type(), "KNOWS");
        assert!(association.inverse().is_association());
        assert_eq!(
            association.inverse().kind(),
            &PropertyKind::Association {
                relationship_type: "KNOWS".into(),
                direction: Direction::Outgoing,
                cardinality: Cardinality::Many,
            }
        );
    }

    #[test]
    fn effective_policy_prefers_declared() {
        let descriptor = person();
        let age = descriptor.property("age").unwrap();
        let name = descriptor.property("name").unwrap();
        assert_eq!(age.effective_policy(&MappingPolicy::LAZY), MappingPolicy::EAGER);
        assert_eq!(name.effective_policy(&MappingPolicy::LAZY), MappingPolicy::LAZY);
    }

    #[test]
    fn alias_falls_back_to_name() {
        assert_eq!(person().type_alias(), "person");
        let plain = EntityDescriptor::builder("Thing").build().unwrap();
        assert_eq!(plain.type_alias(), "Thing");
    }

    #[test]
    fn duplicate_fields_rejected() {
        let result = EntityDescriptor::builder("Person")
            .property("name")
            .association(Association::new("name", "NAMED"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_keys_rejected() {
        let result = EntityDescriptor::builder("Person")
            .property("name")
            .property_with(PersistentProperty::new("label").key("name"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn two_identities_rejected() {
        let result = EntityDescriptor::builder("Person").id("a").id("b").build();
        assert!(result.is_err());
    }
}
