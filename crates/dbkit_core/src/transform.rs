//! Stateless conversion between records, field maps and JSON text.
//!
//! # Responsibility
//! - Flatten a record into an ordered `FieldMap` and back.
//! - Render maps as JSON with ISO-8601 timestamps.
//!
//! # Invariants
//! - Map and JSON key order equals record declaration order.
//! - Keys a record type does not declare are rejected, not ignored.
//! - `json_to_map` keeps timestamps as text; typed reconstruction
//!   (`map_to_record`, `json_to_record`) parses them back.

use crate::model::{
    FieldMap, Record, RecordDescriptor, CREATED_AT_COLUMN, DELETED_AT_COLUMN, ID_COLUMN,
    UPDATED_AT_COLUMN,
};
use thiserror::Error;

pub type TransformResult<T> = Result<T, TransformError>;

/// Conversion failures between records, maps and JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The input names a column the record type does not declare.
    #[error("`{table}` does not declare field `{field}`")]
    SchemaMismatch { table: &'static str, field: String },
    #[error("required field `{field}` is missing")]
    MissingField { field: String },
    #[error("field `{field}` expected {expected}, found {found}")]
    InvalidValue {
        field: String,
        expected: &'static str,
        found: String,
    },
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Returns the record's current values keyed by column name.
pub fn record_to_map<R: Record>(record: &R) -> FieldMap {
    let meta = record.meta();
    let values = record.values();
    debug_assert_eq!(values.len(), R::FIELDS.len(), "{} values/FIELDS", R::TABLE);

    let mut map = FieldMap::new()
        .with(ID_COLUMN, meta.id)
        .with(CREATED_AT_COLUMN, meta.created_at)
        .with(UPDATED_AT_COLUMN, meta.updated_at);
    for (field, value) in R::FIELDS.iter().zip(values) {
        map.insert(field.name, value);
    }
    if R::SOFT_DELETABLE {
        map.insert(DELETED_AT_COLUMN, meta.deleted_at);
    }
    map
}

/// Serializes a record to JSON text.
///
/// # Errors
/// - `Serialization` when a value (blob, non-finite real) has no JSON form.
pub fn record_to_json<R: Record>(record: &R) -> TransformResult<String> {
    map_to_json(&record_to_map(record))
}

/// Builds a new record from a field map.
///
/// Lifecycle columns present in the map are carried over, so a map produced
/// by [`record_to_map`] reproduces the original record.
///
/// # Errors
/// - `SchemaMismatch` when the map contains an undeclared key.
/// - `MissingField`/`InvalidValue` from the record's own field parsing.
pub fn map_to_record<R: Record>(map: &FieldMap) -> TransformResult<R> {
    let descriptor = RecordDescriptor::of::<R>();
    if let Some(unknown) = map.keys().find(|key| !descriptor.has_column(key)) {
        return Err(TransformError::SchemaMismatch {
            table: R::TABLE,
            field: unknown.to_string(),
        });
    }

    let mut record = R::from_fields(map)?;
    let meta = record.meta_mut();
    meta.id = map.opt_integer(ID_COLUMN)?;
    meta.created_at = map.opt_timestamp(CREATED_AT_COLUMN)?;
    meta.updated_at = map.opt_timestamp(UPDATED_AT_COLUMN)?;
    meta.deleted_at = if R::SOFT_DELETABLE {
        map.opt_timestamp(DELETED_AT_COLUMN)?
    } else {
        None
    };
    Ok(record)
}

pub fn json_to_record<R: Record>(json: &str) -> TransformResult<R> {
    map_to_record(&json_to_map(json)?)
}

/// Parses a JSON object into a field map; timestamps stay text.
pub fn json_to_map(json: &str) -> TransformResult<FieldMap> {
    serde_json::from_str(json).map_err(|err| TransformError::Serialization(err.to_string()))
}

pub fn map_to_json(map: &FieldMap) -> TransformResult<String> {
    serde_json::to_string(map).map_err(|err| TransformError::Serialization(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{
        json_to_map, json_to_record, map_to_json, map_to_record, record_to_json, record_to_map,
        TransformError,
    };
    use crate::model::{FieldDef, FieldMap, FieldValue, Record, RecordMeta, Timestamp};
    use crate::transform::TransformResult;
    use chrono::NaiveDate;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        meta: RecordMeta,
        title: String,
        pinned: bool,
        due: Option<Timestamp>,
        attachment: Option<Vec<u8>>,
    }

    impl Record for Note {
        const TABLE: &'static str = "note";
        const FIELDS: &'static [FieldDef] = &[
            FieldDef::text("title"),
            FieldDef::boolean("pinned"),
            FieldDef::timestamp("due").nullable(),
            FieldDef::blob("attachment").nullable(),
        ];

        fn meta(&self) -> &RecordMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut RecordMeta {
            &mut self.meta
        }

        fn values(&self) -> Vec<FieldValue> {
            vec![
                self.title.as_str().into(),
                self.pinned.into(),
                self.due.into(),
                self.attachment.clone().into(),
            ]
        }

        fn from_fields(fields: &FieldMap) -> TransformResult<Self> {
            Ok(Self {
                meta: RecordMeta::default(),
                title: fields.text("title")?,
                pinned: fields.boolean("pinned")?,
                due: fields.opt_timestamp("due")?,
                attachment: fields.opt_blob("attachment")?,
            })
        }
    }

    fn stamp(hour: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_micro_opt(hour, 30, 0, 250)
            .unwrap()
    }

    fn saved_note() -> Note {
        Note {
            meta: RecordMeta {
                id: Some(7),
                created_at: Some(stamp(8)),
                updated_at: Some(stamp(9)),
                deleted_at: None,
            },
            title: "groceries".to_string(),
            pinned: true,
            due: Some(stamp(18)),
            attachment: None,
        }
    }

    #[test]
    fn record_to_map_uses_declaration_order() {
        let map = record_to_map(&saved_note());
        assert_eq!(
            map.keys().collect::<Vec<_>>(),
            vec![
                "id",
                "created_at",
                "updated_at",
                "title",
                "pinned",
                "due",
                "attachment",
                "deleted_at"
            ]
        );
        assert_eq!(map.get("id"), Some(&FieldValue::Integer(7)));
    }

    #[test]
    fn map_round_trip_reproduces_record() {
        let note = saved_note();
        let rebuilt: Note = map_to_record(&record_to_map(&note)).unwrap();
        assert_eq!(rebuilt, note);
    }

    #[test]
    fn record_to_json_renders_iso_timestamps_in_order() {
        let json = record_to_json(&saved_note()).unwrap();
        assert_eq!(
            json,
            r#"{"id":7,"created_at":"2024-05-01T08:30:00.000250","updated_at":"2024-05-01T09:30:00.000250","title":"groceries","pinned":true,"due":"2024-05-01T18:30:00.000250","attachment":null,"deleted_at":null}"#
        );
    }

    #[test]
    fn json_to_map_keeps_timestamps_as_text() {
        let json = record_to_json(&saved_note()).unwrap();
        let map = json_to_map(&json).unwrap();
        assert_eq!(
            map.get("created_at"),
            Some(&FieldValue::Text("2024-05-01T08:30:00.000250".to_string()))
        );
        assert_eq!(map_to_json(&map).unwrap(), json);
    }

    #[test]
    fn json_to_record_parses_timestamps_back() {
        let note = saved_note();
        let rebuilt: Note = json_to_record(&record_to_json(&note).unwrap()).unwrap();
        assert_eq!(rebuilt, note);
    }

    #[test]
    fn blob_values_fail_json_serialization() {
        let mut note = saved_note();
        note.attachment = Some(vec![0xde, 0xad]);
        let err = record_to_json(&note).unwrap_err();
        assert!(matches!(err, TransformError::Serialization(message) if message.contains("blob")));
    }

    #[test]
    fn non_finite_reals_fail_json_serialization() {
        let map = FieldMap::new().with("ratio", f64::NAN);
        assert!(matches!(
            map_to_json(&map),
            Err(TransformError::Serialization(_))
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let map = record_to_map(&saved_note()).with("color", "blue");
        let err = map_to_record::<Note>(&map).unwrap_err();
        assert_eq!(
            err,
            TransformError::SchemaMismatch {
                table: "note",
                field: "color".to_string()
            }
        );
    }

    #[test]
    fn unsaved_map_builds_unsaved_record() {
        let map = FieldMap::new().with("title", "draft").with("pinned", false);
        let note: Note = map_to_record(&map).unwrap();
        assert!(!note.meta.is_saved());
        assert_eq!(note.title, "draft");
        assert_eq!(note.due, None);
    }

    #[test]
    fn missing_required_field_is_reported() {
        let map = FieldMap::new().with("pinned", true);
        let err = map_to_record::<Note>(&map).unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingField {
                field: "title".to_string()
            }
        );
    }

    #[test]
    fn nested_json_is_rejected() {
        let err = json_to_map(r#"{"title": ["a", "b"]}"#).unwrap_err();
        assert!(matches!(err, TransformError::Serialization(_)));
    }
}
