//! Stored record trait and its opt-in capabilities.

use crate::error::SyncResult;
use crate::types::{RecordId, RecordKind, RecordRef};
use crate::value::PropertyValue;

/// A node or relationship in a graph store, seen as a property container.
///
/// Records are handles: cloning one yields another handle onto the same
/// stored container. The store owns the container's lifetime.
///
/// # Invariants
///
/// - `property` returns `None` for keys that are not set; stores never keep
///   a `Null` under a key
/// - `set_property` with `PropertyValue::Null` removes the key
/// - `kind` never changes for a given record
pub trait StoredRecord: Clone {
    /// Record identifier.
    fn id(&self) -> RecordId;

    /// Whether this is a node or a relationship.
    fn kind(&self) -> RecordKind;

    /// Kind and identifier together.
    fn reference(&self) -> RecordRef {
        RecordRef {
            kind: self.kind(),
            id: self.id(),
        }
    }

    /// Reads a property.
    fn property(&self, key: &str) -> SyncResult<Option<PropertyValue>>;

    /// Writes a property. Writing `Null` removes it.
    fn set_property(&self, key: &str, value: PropertyValue) -> SyncResult<()>;

    /// Removes a property, returning the previous value.
    fn remove_property(&self, key: &str) -> SyncResult<Option<PropertyValue>>;

    /// Keys currently set, in ascending order.
    fn property_keys(&self) -> SyncResult<Vec<String>>;

    /// Change-tracking capability, for records that buffer writes.
    fn as_trackable(&self) -> Option<&dyn Trackable> {
        None
    }

    /// Remote identity capability, for records living behind a URI.
    fn as_remote(&self) -> Option<&dyn RemoteIdentified> {
        None
    }
}

/// Records whose writes can be buffered and flushed explicitly.
///
/// A tracked record that buffers writes keeps them local until `flush`
/// (or until the surrounding transaction commits). The save path flushes
/// tracked node records between writing properties and associations, so
/// relationships are created against a node that already exists remotely.
pub trait Trackable {
    /// Starts tracking changes.
    fn track(&self);

    /// Whether `track` has been called.
    fn is_tracked(&self) -> bool;

    /// Whether writes are held back until a flush.
    fn buffers_writes(&self) -> bool {
        true
    }

    /// Pushes buffered writes to the store.
    fn flush(&self) -> SyncResult<()>;
}

/// Records that have an external identifier.
pub trait RemoteIdentified {
    /// The record's URI, for example `http://host/db/data/node/12`.
    fn uri(&self) -> &str;

    /// Kind derived from the URI, when it has the usual shape.
    fn uri_kind(&self) -> Option<RecordKind> {
        RecordKind::from_uri(self.uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Bag(Rc<RefCell<BTreeMap<String, PropertyValue>>>);

    impl StoredRecord for Bag {
        fn id(&self) -> RecordId {
            RecordId::new(1)
        }

        fn kind(&self) -> RecordKind {
            RecordKind::Relationship
        }

        fn property(&self, key: &str) -> SyncResult<Option<PropertyValue>> {
            Ok(self.0.borrow().get(key).cloned())
        }

        fn set_property(&self, key: &str, value: PropertyValue) -> SyncResult<()> {
            if value.is_null() {
                self.0.borrow_mut().remove(key);
            } else {
                self.0.borrow_mut().insert(key.to_string(), value);
            }
            Ok(())
        }

        fn remove_property(&self, key: &str) -> SyncResult<Option<PropertyValue>> {
            Ok(self.0.borrow_mut().remove(key))
        }

        fn property_keys(&self) -> SyncResult<Vec<String>> {
            Ok(self.0.borrow().keys().cloned().collect())
        }
    }

    struct Remote(&'static str);

    impl RemoteIdentified for Remote {
        fn uri(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn capabilities_default_to_absent() {
        let bag = Bag::default();
        assert!(bag.as_trackable().is_none());
        assert!(bag.as_remote().is_none());
        assert_eq!(bag.reference(), RecordRef::relationship(RecordId::new(1)));
    }

    #[test]
    fn clones_share_the_container() {
        let bag = Bag::default();
        let other = bag.clone();
        bag.set_property("name", PropertyValue::from("Alice")).unwrap();
        assert_eq!(
            other.property("name").unwrap(),
            Some(PropertyValue::from("Alice"))
        );
        other.set_property("name", PropertyValue::Null).unwrap();
        assert!(bag.property_keys().unwrap().is_empty());
    }

    #[test]
    fn uri_kind_parses_identifier() {
        assert_eq!(
            Remote("http://h/db/data/node/3").uri_kind(),
            Some(RecordKind::Node)
        );
        assert_eq!(Remote("opaque").uri_kind(), None);
    }
}
