//! Core type definitions for EntiGraph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a record in a graph store.
///
/// Node and relationship identifiers share one numeric space per store;
/// the [`RecordKind`] travels alongside when the distinction matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Creates a new record ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of container a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// A node.
    Node,
    /// A relationship between two nodes.
    Relationship,
}

impl RecordKind {
    /// Returns true for node records.
    #[must_use]
    pub const fn is_node(self) -> bool {
        matches!(self, RecordKind::Node)
    }

    /// Path segment used for this kind in remote identifiers.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            RecordKind::Node => "node",
            RecordKind::Relationship => "relationship",
        }
    }

    /// Derives a record kind from a remote identifier such as
    /// `http://host/db/data/node/12`.
    ///
    /// The kind is the second-to-last path segment, compared
    /// case-insensitively. Only meant for building records out of
    /// identifier strings; records themselves carry an explicit kind.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        let mut segments = uri.trim_end_matches('/').rsplit('/');
        segments.next()?;
        let kind = segments.next()?;
        if kind.eq_ignore_ascii_case("node") {
            Some(RecordKind::Node)
        } else if kind.eq_ignore_ascii_case("relationship") {
            Some(RecordKind::Relationship)
        } else {
            None
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// A fully qualified record reference: kind plus identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Record kind.
    pub kind: RecordKind,
    /// Record identifier.
    pub id: RecordId,
}

impl RecordRef {
    /// Reference to a node.
    #[must_use]
    pub const fn node(id: RecordId) -> Self {
        Self {
            kind: RecordKind::Node,
            id,
        }
    }

    /// Reference to a relationship.
    #[must_use]
    pub const fn relationship(id: RecordId) -> Self {
        Self {
            kind: RecordKind::Relationship,
            id,
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Direction of a relationship relative to the record being mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// From the mapped node to the related node.
    #[default]
    Outgoing,
    /// From the related node to the mapped node.
    Incoming,
}
