//! Dynamic property value type.

use crate::types::RecordId;
use std::fmt;
use thiserror::Error;

/// A dynamic graph property value.
///
/// This is the value model shared by domain-object accessors and stored
/// records. Floats are intentionally not supported, so values stay
/// comparable with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropertyValue {
    /// Absent value. Stores never keep a null under a key.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Homogeneous or mixed array of values.
    Array(Vec<PropertyValue>),
    /// Pointer at another record, used by association values.
    Reference(RecordId),
}

/// Errors converting a [`PropertyValue`] into a concrete Rust type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The value had a different type than requested.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Requested type.
        expected: &'static str,
        /// Name of the actual value type.
        actual: &'static str,
    },
}

impl ValueError {
    fn mismatch(expected: &'static str, actual: &PropertyValue) -> Self {
        Self::TypeMismatch {
            expected,
            actual: actual.type_name(),
        }
    }
}

impl PropertyValue {
    /// Name of this value's type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Bytes(_) => "bytes",
            PropertyValue::Text(_) => "text",
            PropertyValue::Array(_) => "array",
            PropertyValue::Reference(_) => "reference",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a record reference, if it is one.
    pub fn as_reference(&self) -> Option<RecordId> {
        match self {
            PropertyValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Converts into a `String`.
    pub fn into_text(self) -> Result<String, ValueError> {
        match self {
            PropertyValue::Text(s) => Ok(s),
            other => Err(ValueError::mismatch("text", &other)),
        }
    }

    /// Converts into an `i64`.
    pub fn into_integer(self) -> Result<i64, ValueError> {
        match self {
            PropertyValue::Integer(n) => Ok(n),
            other => Err(ValueError::mismatch("integer", &other)),
        }
    }

    /// Converts into a `bool`.
    pub fn into_bool(self) -> Result<bool, ValueError> {
        match self {
            PropertyValue::Bool(b) => Ok(b),
            other => Err(ValueError::mismatch("bool", &other)),
        }
    }

    /// Converts into a record reference.
    pub fn into_reference(self) -> Result<RecordId, ValueError> {
        match self {
            PropertyValue::Reference(id) => Ok(id),
            other => Err(ValueError::mismatch("reference", &other)),
        }
    }

    /// Converts into a list of record references.
    ///
    /// `Null` converts to an empty list and a single reference to a
    /// one-element list.
    pub fn into_references(self) -> Result<Vec<RecordId>, ValueError> {
        match self {
            PropertyValue::Null => Ok(Vec::new()),
            PropertyValue::Reference(id) => Ok(vec![id]),
            PropertyValue::Array(items) => items.into_iter().map(Self::into_reference).collect(),
            other => Err(ValueError::mismatch("references", &other)),
        }
    }

    /// Maps a nullable value through `convert`, turning `Null` into `None`.
    pub fn into_optional<T>(
        self,
        convert: impl FnOnce(Self) -> Result<T, ValueError>,
    ) -> Result<Option<T>, ValueError> {
        if self.is_null() {
            Ok(None)
        } else {
            convert(self).map(Some)
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => f.write_str("null"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Integer(n) => write!(f, "{n}"),
            PropertyValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            PropertyValue::Text(s) => write!(f, "{s:?}"),
            PropertyValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            PropertyValue::Reference(id) => write!(f, "#{id}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Integer(n)
    }
}

impl From<i32> for PropertyValue {
    fn from(n: i32) -> Self {
        PropertyValue::Integer(i64::from(n))
    }
}

impl From<u32> for PropertyValue {
    fn from(n: u32) -> Self {
        PropertyValue::Integer(i64::from(n))
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(b: Vec<u8>) -> Self {
        PropertyValue::Bytes(b)
    }
}

impl From<RecordId> for PropertyValue {
    fn from(id: RecordId) -> Self {
        PropertyValue::Reference(id)
    }
}

impl From<Vec<RecordId>> for PropertyValue {
    fn from(ids: Vec<RecordId>) -> Self {
        PropertyValue::Array(ids.into_iter().map(PropertyValue::Reference).collect())
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PropertyValue::Null, Into::into)
    }
}

impl From<()> for PropertyValue {
    fn from((): ()) -> Self {
        PropertyValue::Null
    }
}

/// What an entity state returns when asked for a property.
///
/// `Deferred` means the state has no concrete value to hand out (for
/// instance a lazily loaded association) and the target field must be
/// left untouched. It is distinct from `Value(PropertyValue::Null)`,
/// which clears the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateValue {
    /// A concrete value.
    Value(PropertyValue),
    /// No concrete value; do not overwrite.
    Deferred,
}

impl StateValue {
    /// Unwraps the deferred marker, returning `None` for it.
    #[must_use]
    pub fn unwrap_deferred(self) -> Option<PropertyValue> {
        match self {
            StateValue::Value(value) => Some(value),
            StateValue::Deferred => None,
        }
    }

    /// Returns true for the deferred marker.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, StateValue::Deferred)
    }
}

impl From<PropertyValue> for StateValue {
    fn from(value: PropertyValue) -> Self {
        StateValue::Value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_accessors() {
        assert!(PropertyValue::Null.is_null());
        assert!(!PropertyValue::Bool(true).is_null());

        assert_eq!(PropertyValue::Bool(true).as_bool(), Some(true));
        assert_eq!(PropertyValue::Integer(42).as_bool(), None);
        assert_eq!(PropertyValue::Integer(42).as_integer(), Some(42));
        assert_eq!(PropertyValue::from("hello").as_text(), Some("hello"));
        assert_eq!(
            PropertyValue::Bytes(vec![1, 2, 3]).as_bytes(),
            Some(&[1, 2, 3][..])
        );
        assert_eq!(
            PropertyValue::Reference(RecordId::new(9)).as_reference(),
            Some(RecordId::new(9))
        );
    }

    #[test]
    fn conversions_report_mismatch() {
        let err = PropertyValue::from("thirty").into_integer().unwrap_err();
        assert_eq!(
            err,
            ValueError::TypeMismatch {
                expected: "integer",
                actual: "text"
            }
        );
        assert!(PropertyValue::Integer(1).into_text().is_err());
        assert!(PropertyValue::Null.into_bool().is_err());
    }

    #[test]
    fn references_accept_null_single_and_array() {
        assert!(PropertyValue::Null.into_references().unwrap().is_empty());
        assert_eq!(
            PropertyValue::Reference(RecordId::new(1))
                .into_references()
                .unwrap(),
            vec![RecordId::new(1)]
        );
        let many = PropertyValue::from(vec![RecordId::new(2), RecordId::new(3)]);
        assert_eq!(
            many.into_references().unwrap(),
            vec![RecordId::new(2), RecordId::new(3)]
        );
        let mixed = PropertyValue::Array(vec![PropertyValue::Integer(1)]);
        assert!(mixed.into_references().is_err());
    }

    #[test]
    fn optional_conversion() {
        assert_eq!(
            PropertyValue::Null.into_optional(PropertyValue::into_text),
            Ok(None)
        );
        assert_eq!(
            PropertyValue::from("a").into_optional(PropertyValue::into_text),
            Ok(Some("a".to_string()))
        );
        assert_eq!(PropertyValue::from(None::<i64>), PropertyValue::Null);
        assert_eq!(PropertyValue::from(Some(5i64)), PropertyValue::Integer(5));
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(PropertyValue::from("Alice").to_string(), "\"Alice\"");
        assert_eq!(
            PropertyValue::Array(vec![PropertyValue::Integer(1), PropertyValue::Null]).to_string(),
            "[1, null]"
        );
        assert_eq!(PropertyValue::Reference(RecordId::new(4)).to_string(), "#4");
    }

    #[test]
    fn deferred_marker_is_not_null() {
        assert_eq!(StateValue::Deferred.unwrap_deferred(), None);
        assert_eq!(
            StateValue::Value(PropertyValue::Null).unwrap_deferred(),
            Some(PropertyValue::Null)
        );
        assert!(StateValue::Deferred.is_deferred());
    }
}
