//! Error types for EntiGraph.

use crate::mapping::AccessError;
use crate::types::RecordRef;
use crate::value::ValueError;
use std::fmt;
use thiserror::Error;

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A boxed error raised by a collaborator outside this crate's taxonomy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Phase a save operation had reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    /// Nothing happened yet.
    NotStarted,
    /// The transaction is open; properties are being written.
    TransactionOpen,
    /// All eligible properties were written.
    PropertiesWritten,
    /// All eligible associations were written.
    AssociationsWritten,
    /// The transaction was marked successful and closed.
    Committed,
    /// The transaction was marked failed and closed. Terminal.
    RolledBack,
}

impl fmt::Display for SavePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SavePhase::NotStarted => "not started",
            SavePhase::TransactionOpen => "transaction open",
            SavePhase::PropertiesWritten => "properties written",
            SavePhase::AssociationsWritten => "associations written",
            SavePhase::Committed => "committed",
            SavePhase::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while synchronizing entities with a graph store.
///
/// Every variant except [`SyncError::External`] is a runtime-level error:
/// the save path propagates those unchanged. `External` carries a
/// collaborator failure that has not been categorized yet and is wrapped
/// exactly once into [`SyncError::StoreSynchronization`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// Reading a field from the domain object failed.
    #[error("error retrieving property {property} from {entity}")]
    MappingRead {
        /// Property name.
        property: String,
        /// Description of the domain object.
        entity: String,
        /// Accessor failure.
        #[source]
        source: AccessError,
    },

    /// Writing a field onto the domain object failed.
    #[error("setting property {property} to {value} on {entity}")]
    MappingWrite {
        /// Property name.
        property: String,
        /// Rendered value that was being written.
        value: String,
        /// Description of the domain object.
        entity: String,
        /// Accessor failure.
        #[source]
        source: AccessError,
    },

    /// A save could not be synchronized with the store.
    #[error("error copying properties from {descriptor} to {record} ({phase}): {source}")]
    StoreSynchronization {
        /// Name of the entity descriptor.
        descriptor: String,
        /// Target record.
        record: RecordRef,
        /// Phase the save had reached.
        phase: SavePhase,
        /// Original cause.
        #[source]
        source: BoxError,
    },

    /// The record no longer exists in the store.
    #[error("record not found: {record}")]
    RecordNotFound {
        /// The missing record.
        record: RecordRef,
    },

    /// A store write was attempted without an active transaction.
    #[error("not in transaction")]
    NotInTransaction,

    /// Transaction misuse or failure.
    #[error("transaction error: {message}")]
    Transaction {
        /// Description of the failure.
        message: String,
    },

    /// Operation not permitted for this record or property.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A value had the wrong type.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Uncategorized collaborator failure.
    #[error("external error: {0}")]
    External(BoxError),
}

impl SyncError {
    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a record not found error.
    pub fn record_not_found(record: RecordRef) -> Self {
        Self::RecordNotFound { record }
    }

    /// Wraps a foreign error as an uncategorized collaborator failure.
    pub fn external(error: impl Into<BoxError>) -> Self {
        Self::External(error.into())
    }

    /// Returns true if this error propagates unwrapped through a save.
    #[must_use]
    pub fn is_runtime(&self) -> bool {
        !matches!(self, SyncError::External(_))
    }

    /// Names the domain property a mapping error is about, if any.
    #[must_use]
    pub fn property(&self) -> Option<&str> {
        match self {
            SyncError::MappingRead { property, .. } | SyncError::MappingWrite { property, .. } => {
                Some(property)
            }
            _ => None,
        }
    }

    /// Converts a fault raised during a save into what the caller sees.
    ///
    /// Runtime-level errors come back unchanged; `External` causes are
    /// wrapped once with the descriptor, record and phase as context.
    #[must_use]
    pub fn into_store_fault(self, descriptor: &str, record: RecordRef, phase: SavePhase) -> Self {
        match self {
            SyncError::External(source) => SyncError::StoreSynchronization {
                descriptor: descriptor.to_string(),
                record,
                phase,
                source,
            },
            runtime => runtime,
        }
    }
}
