//! Sample mapped entities and graph helpers.
//!
//! `Person` is a node entity with scalars, a renamed key and two
//! associations; `Friendship` maps onto relationship records.

use crate::logging::init_tracing;
use entigraph_core::{
    Association, Cardinality, EntityDescriptor, EntityMapping, MappedEntity, MappingPolicy,
    PersistentProperty, PropertyValue, RecordId, StoredRecord, Transmitter,
};
use entigraph_memory::{GraphRecord, GraphStateFactory, MemoryGraph};
use std::sync::OnceLock;

/// Relationship type of [`Person::friends`].
pub const KNOWS: &str = "KNOWS";

/// Relationship type of [`Person::employer`].
pub const WORKS_AT: &str = "WORKS_AT";

/// A person node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    /// Record id, filled on load.
    pub id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: i64,
    /// Contact address, stored under `email_address`.
    pub email: Option<String>,
    /// Outgoing `KNOWS` relationships. Always loaded eagerly.
    pub friends: Vec<RecordId>,
    /// Outgoing `WORKS_AT` relationship.
    pub employer: Option<RecordId>,
}

impl Person {
    /// Creates a person with a name and age.
    pub fn new(name: impl Into<String>, age: i64) -> Self {
        Self {
            name: name.into(),
            age,
            ..Self::default()
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the friends.
    #[must_use]
    pub fn with_friends(mut self, friends: Vec<RecordId>) -> Self {
        self.friends = friends;
        self
    }

    /// Sets the employer.
    #[must_use]
    pub fn with_employer(mut self, employer: RecordId) -> Self {
        self.employer = Some(employer);
        self
    }

    /// The same person without the id assigned on load.
    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.id = None;
        self
    }
}

impl MappedEntity for Person {
    fn mapping() -> &'static EntityMapping<Self> {
        static MAPPING: OnceLock<EntityMapping<Person>> = OnceLock::new();
        MAPPING.get_or_init(|| {
            let descriptor = EntityDescriptor::builder("Person")
                .id("id")
                .property("name")
                .property("age")
                .property_with(PersistentProperty::new("email").key("email_address"))
                .association(Association::new("friends", KNOWS).policy(MappingPolicy::EAGER))
                .association(Association::new("employer", WORKS_AT).cardinality(Cardinality::One))
                .build()
                .expect("Invalid Person descriptor");
            EntityMapping::<Person>::builder(descriptor)
                .bind("id", |p| Ok(p.id.into()), |p, v| {
                    p.id = v.into_optional(PropertyValue::into_integer)?;
                    Ok(())
                })
                .bind("name", |p| Ok(p.name.as_str().into()), |p, v| {
                    p.name = v.into_optional(PropertyValue::into_text)?.unwrap_or_default();
                    Ok(())
                })
                .bind("age", |p| Ok(p.age.into()), |p, v| {
                    p.age = v.into_optional(PropertyValue::into_integer)?.unwrap_or_default();
                    Ok(())
                })
                .bind("email", |p| Ok(p.email.clone().into()), |p, v| {
                    p.email = v.into_optional(PropertyValue::into_text)?;
                    Ok(())
                })
                .bind("friends", |p| Ok(p.friends.clone().into()), |p, v| {
                    p.friends = v.into_references()?;
                    Ok(())
                })
                .bind("employer", |p| Ok(p.employer.into()), |p, v| {
                    p.employer = v.into_optional(PropertyValue::into_reference)?;
                    Ok(())
                })
                .build()
                .expect("Invalid Person mapping")
        })
    }

    fn describe(&self) -> String {
        format!("Person({})", self.name)
    }
}

/// A friendship stored on a `KNOWS` relationship record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Friendship {
    /// Year the friendship started.
    pub since: i64,
    /// Free-form note. Never written back.
    pub note: Option<String>,
}

impl MappedEntity for Friendship {
    fn mapping() -> &'static EntityMapping<Self> {
        static MAPPING: OnceLock<EntityMapping<Friendship>> = OnceLock::new();
        MAPPING.get_or_init(|| {
            let descriptor = EntityDescriptor::builder("Friendship")
                .alias("knows")
                .property("since")
                .property_with(PersistentProperty::new("note").read_only())
                .build()
                .expect("Invalid Friendship descriptor");
            EntityMapping::<Friendship>::builder(descriptor)
                .bind("since", |f| Ok(f.since.into()), |f, v| {
                    f.since = v.into_optional(PropertyValue::into_integer)?.unwrap_or_default();
                    Ok(())
                })
                .bind("note", |f| Ok(f.note.clone().into()), |f, v| {
                    f.note = v.into_optional(PropertyValue::into_text)?;
                    Ok(())
                })
                .build()
                .expect("Invalid Friendship mapping")
        })
    }
}

/// Alice, 30.
pub fn alice() -> Person {
    Person::new("Alice", 30)
}

/// Bob, 41, with an email.
pub fn bob() -> Person {
    Person::new("Bob", 41).with_email("bob@example.com")
}

/// A transmitter over [`GraphStateFactory`] with the default configuration.
pub fn memory_transmitter() -> Transmitter<GraphStateFactory> {
    Transmitter::new(GraphStateFactory::new())
}

/// Creates a committed, empty node.
pub fn empty_node(graph: &MemoryGraph) -> GraphRecord {
    graph
        .write(|g| g.create_node())
        .expect("Failed to create node")
}

/// Creates `count` committed, empty nodes and returns their ids.
pub fn empty_nodes(graph: &MemoryGraph, count: usize) -> Vec<RecordId> {
    graph
        .write(|g| {
            (0..count)
                .map(|_| g.create_node().map(|node| node.id()))
                .collect()
        })
        .expect("Failed to create nodes")
}

/// Runs a test with a fresh graph and transmitter, tracing enabled.
///
/// # Example
///
/// ```rust,ignore
/// use entigraph_testkit::with_graph;
///
/// #[test]
/// fn my_test() {
///     with_graph(|graph, transmitter| {
///         let node = empty_node(graph);
///         transmitter.save_entity(&alice(), &node, graph).unwrap();
///     });
/// }
/// ```
pub fn with_graph<F, R>(f: F) -> R
where
    F: FnOnce(&MemoryGraph, &Transmitter<GraphStateFactory>) -> R,
{
    init_tracing();
    let graph = MemoryGraph::new();
    let transmitter = memory_transmitter();
    f(&graph, &transmitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_descriptor_order() {
        let descriptor = Person::mapping().descriptor();
        let names: Vec<&str> = descriptor.properties().map(|p| p.name()).collect();
        assert_eq!(names, ["id", "name", "age", "email"]);
        let associations: Vec<&str> = descriptor
            .associations()
            .map(|a| a.inverse().name())
            .collect();
        assert_eq!(associations, ["friends", "employer"]);
    }

    #[test]
    fn empty_nodes_are_committed() {
        let graph = MemoryGraph::new();
        let ids = empty_nodes(&graph, 3);
        assert_eq!(ids.len(), 3);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn friendship_alias() {
        assert_eq!(Friendship::mapping().descriptor().type_alias(), "knows");
    }
}
