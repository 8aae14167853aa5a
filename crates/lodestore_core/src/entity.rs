//! Entity trait and record helpers.

use lodestore_codec::{from_cbor, to_canonical_cbor, Value};

use crate::error::{CoreError, CoreResult};
use crate::key::PrimaryKey;

/// A typed record with exactly one primary-key field.
///
/// Records are stored as canonical CBOR maps. The map produced by
/// [`to_value`](Entity::to_value) is also what queries evaluate field paths
/// against, so its field names are the names used in query text.
///
/// # Example
///
/// ```rust
/// use lodestore_codec::Value;
/// use lodestore_core::{CoreResult, Entity, PrimaryKey, RecordReader};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct City {
///     name: String,
///     population: i64,
/// }
///
/// impl Entity for City {
///     const TYPE_NAME: &'static str = "City";
///
///     fn primary_key(&self) -> PrimaryKey {
///         PrimaryKey::Text(self.name.clone())
///     }
///
///     fn to_value(&self) -> Value {
///         Value::map(vec![
///             (Value::text("name"), Value::text(&self.name)),
///             (Value::text("population"), Value::Integer(self.population)),
///         ])
///     }
///
///     fn from_value(value: &Value) -> CoreResult<Self> {
///         let record = RecordReader::new(Self::TYPE_NAME, value)?;
///         Ok(Self {
///             name: record.text("name")?,
///             population: record.integer("population")?,
///         })
///     }
/// }
/// ```
pub trait Entity: Sized {
    /// Name under which the type is registered.
    const TYPE_NAME: &'static str;

    /// The primary key. Must not change over the entity's lifetime.
    fn primary_key(&self) -> PrimaryKey;

    /// The record form of the entity, a map of field name to value.
    fn to_value(&self) -> Value;

    /// Rebuilds the entity from its record form.
    fn from_value(value: &Value) -> CoreResult<Self>;
}

/// Encodes an entity to canonical CBOR.
pub fn encode_entity<T: Entity>(entity: &T) -> Vec<u8> {
    to_canonical_cbor(&entity.to_value())
}

/// Decodes an entity from canonical CBOR.
pub fn decode_entity<T: Entity>(bytes: &[u8]) -> CoreResult<T> {
    let value = from_cbor(bytes)?;
    T::from_value(&value)
}

/// Field accessors for implementing [`Entity::from_value`].
///
/// Missing or mistyped fields become [`CoreError::EntityShape`] errors that
/// name the type and field.
#[derive(Debug, Clone, Copy)]
pub struct RecordReader<'a> {
    type_name: &'a str,
    value: &'a Value,
}

impl<'a> RecordReader<'a> {
    /// Wraps a record, which must be a map.
    pub fn new(type_name: &'a str, value: &'a Value) -> CoreResult<Self> {
        if value.as_map().is_none() {
            return Err(CoreError::entity_shape(
                type_name,
                format!("expected a map, found {}", value.type_name()),
            ));
        }
        Ok(Self { type_name, value })
    }

    fn field(&self, name: &str) -> CoreResult<&'a Value> {
        self.value
            .get(name)
            .ok_or_else(|| CoreError::entity_shape(self.type_name, format!("missing field '{name}'")))
    }

    fn mismatch(&self, name: &str, expected: &str, found: &Value) -> CoreError {
        CoreError::entity_shape(
            self.type_name,
            format!("field '{name}' should be {expected}, found {}", found.type_name()),
        )
    }

    /// A required text field.
    pub fn text(&self, name: &str) -> CoreResult<String> {
        let value = self.field(name)?;
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(name, "text", value))
    }

    /// A required integer field.
    pub fn integer(&self, name: &str) -> CoreResult<i64> {
        let value = self.field(name)?;
        value
            .as_integer()
            .ok_or_else(|| self.mismatch(name, "an integer", value))
    }

    /// A required boolean field.
    pub fn boolean(&self, name: &str) -> CoreResult<bool> {
        let value = self.field(name)?;
        value
            .as_bool()
            .ok_or_else(|| self.mismatch(name, "a boolean", value))
    }

    /// A text field that may be absent or null.
    pub fn optional_text(&self, name: &str) -> CoreResult<Option<String>> {
        match self.value.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.text(name).map(Some),
        }
    }

    /// A required nested record.
    pub fn nested(&self, name: &str) -> CoreResult<RecordReader<'a>> {
        let value = self.field(name)?;
        RecordReader::new(self.type_name, value)
    }

    /// A required field of any type.
    pub fn raw(&self, name: &str) -> CoreResult<&'a Value> {
        self.field(name)
    }
}
