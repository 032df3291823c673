//! Dynamic field values and ordered field maps.
//!
//! # Responsibility
//! - Carry record column values between storage, JSON and typed records.
//! - Coerce storage encodings (integer booleans, timestamp text) on read.
//!
//! # Invariants
//! - `FieldMap` keeps insertion order; re-inserting a key replaces in place.
//! - Blobs and non-finite reals never serialize to JSON.

use super::timestamp::{format_timestamp, parse_timestamp, Timestamp};
use crate::transform::{TransformError, TransformResult};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;
use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{self, Serialize, SerializeMap, Serializer};
use std::fmt::{self, Formatter};

/// One column value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Timestamp(Timestamp),
    Blob(Vec<u8>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type label used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Boolean(_) => "boolean",
            Self::Timestamp(_) => "timestamp",
            Self::Blob(_) => "blob",
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Timestamp> for FieldValue {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Integer(v) => Self::Integer(v),
            Value::Real(v) => Self::Real(v),
            Value::Text(v) => Self::Text(v),
            Value::Blob(v) => Self::Blob(v),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Self::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Self::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Self::Boolean(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            Self::Timestamp(v) => ToSqlOutput::Owned(Value::Text(format_timestamp(v))),
            Self::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Integer(v) => serializer.serialize_i64(*v),
            Self::Real(v) if v.is_finite() => serializer.serialize_f64(*v),
            Self::Real(v) => Err(ser::Error::custom(format!(
                "real value `{v}` is not JSON-representable"
            ))),
            Self::Text(v) => serializer.serialize_str(v),
            Self::Boolean(v) => serializer.serialize_bool(*v),
            Self::Timestamp(v) => serializer.serialize_str(&format_timestamp(v)),
            Self::Blob(_) => Err(ser::Error::custom("blob values are not JSON-representable")),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldValueVisitor)
    }
}

struct FieldValueVisitor;

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar JSON value (null, bool, number or string)")
    }

    fn visit_unit<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<FieldValue, E> {
        Ok(FieldValue::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<FieldValue, E> {
        Ok(FieldValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<FieldValue, E> {
        i64::try_from(v)
            .map(FieldValue::Integer)
            .map_err(|_| E::custom(format!("integer `{v}` does not fit in i64")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<FieldValue, E> {
        Ok(FieldValue::Real(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(v))
    }
}

/// Column name to value mapping that remembers insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`FieldMap::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a value, returning the previous one.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| *key == name) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((name, value));
        None
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn integer(&self, name: &str) -> TransformResult<i64> {
        required(name, self.opt_integer(name)?)
    }

    pub fn opt_integer(&self, name: &str) -> TransformResult<Option<i64>> {
        match self.present(name) {
            None => Ok(None),
            Some(FieldValue::Integer(v)) => Ok(Some(*v)),
            Some(other) => Err(invalid(name, "integer", other)),
        }
    }

    pub fn real(&self, name: &str) -> TransformResult<f64> {
        required(name, self.opt_real(name)?)
    }

    pub fn opt_real(&self, name: &str) -> TransformResult<Option<f64>> {
        match self.present(name) {
            None => Ok(None),
            Some(FieldValue::Real(v)) => Ok(Some(*v)),
            Some(FieldValue::Integer(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(invalid(name, "real", other)),
        }
    }

    pub fn text(&self, name: &str) -> TransformResult<String> {
        required(name, self.opt_text(name)?)
    }

    pub fn opt_text(&self, name: &str) -> TransformResult<Option<String>> {
        match self.present(name) {
            None => Ok(None),
            Some(FieldValue::Text(v)) => Ok(Some(v.clone())),
            Some(other) => Err(invalid(name, "text", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> TransformResult<bool> {
        required(name, self.opt_boolean(name)?)
    }

    /// Accepts native booleans and SQLite's `0`/`1` integers.
    pub fn opt_boolean(&self, name: &str) -> TransformResult<Option<bool>> {
        match self.present(name) {
            None => Ok(None),
            Some(FieldValue::Boolean(v)) => Ok(Some(*v)),
            Some(FieldValue::Integer(0)) => Ok(Some(false)),
            Some(FieldValue::Integer(1)) => Ok(Some(true)),
            Some(other) => Err(invalid(name, "boolean", other)),
        }
    }

    pub fn timestamp(&self, name: &str) -> TransformResult<Timestamp> {
        required(name, self.opt_timestamp(name)?)
    }

    /// Accepts native timestamps and ISO-8601 text.
    pub fn opt_timestamp(&self, name: &str) -> TransformResult<Option<Timestamp>> {
        match self.present(name) {
            None => Ok(None),
            Some(FieldValue::Timestamp(v)) => Ok(Some(*v)),
            Some(FieldValue::Text(text)) => parse_timestamp(text)
                .map(Some)
                .ok_or_else(|| TransformError::InvalidValue {
                    field: name.to_string(),
                    expected: "timestamp",
                    found: format!("text `{text}`"),
                }),
            Some(other) => Err(invalid(name, "timestamp", other)),
        }
    }

    pub fn blob(&self, name: &str) -> TransformResult<Vec<u8>> {
        required(name, self.opt_blob(name)?)
    }

    pub fn opt_blob(&self, name: &str) -> TransformResult<Option<Vec<u8>>> {
        match self.present(name) {
            None => Ok(None),
            Some(FieldValue::Blob(v)) => Ok(Some(v.clone())),
            Some(other) => Err(invalid(name, "blob", other)),
        }
    }

    fn present(&self, name: &str) -> Option<&FieldValue> {
        self.get(name).filter(|value| !value.is_null())
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldMapVisitor)
    }
}

struct FieldMapVisitor;

impl<'de> Visitor<'de> for FieldMapVisitor {
    type Value = FieldMap;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object of scalar field values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
        let mut map = FieldMap::new();
        while let Some((key, value)) = access.next_entry::<String, FieldValue>()? {
            map.insert(key, value);
        }
        Ok(map)
    }
}

fn required<T>(name: &str, value: Option<T>) -> TransformResult<T> {
    value.ok_or_else(|| TransformError::MissingField {
        field: name.to_string(),
    })
}

fn invalid(name: &str, expected: &'static str, found: &FieldValue) -> TransformError {
    TransformError::InvalidValue {
        field: name.to_string(),
        expected,
        found: found.kind_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldMap, FieldValue};
    use crate::transform::TransformError;

    #[test]
    fn insert_replaces_in_place_and_keeps_order() {
        let mut map = FieldMap::new().with("b", 1_i64).with("a", "x");
        let previous = map.insert("b", 2_i64);

        assert_eq!(previous, Some(FieldValue::Integer(1)));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(map.integer("b").unwrap(), 2);
    }

    #[test]
    fn getters_coerce_storage_encodings() {
        let map = FieldMap::new()
            .with("flag", 1_i64)
            .with("when", "2024-01-02T03:04:05.000006")
            .with("ratio", 3_i64);

        assert!(map.boolean("flag").unwrap());
        assert_eq!(
            map.timestamp("when").unwrap().to_string(),
            "2024-01-02 03:04:05.000006"
        );
        assert_eq!(map.real("ratio").unwrap(), 3.0);
    }

    #[test]
    fn null_reads_as_none_and_missing_required_fails() {
        let map = FieldMap::new().with("nickname", FieldValue::Null);

        assert_eq!(map.opt_text("nickname").unwrap(), None);
        let err = map.text("nickname").unwrap_err();
        assert!(matches!(err, TransformError::MissingField { field } if field == "nickname"));
    }

    #[test]
    fn wrong_type_is_reported_with_both_kinds() {
        let map = FieldMap::new().with("age", "old");
        let err = map.integer("age").unwrap_err();
        assert!(matches!(
            err,
            TransformError::InvalidValue { expected: "integer", ref found, .. } if found == "text"
        ));
    }
}
