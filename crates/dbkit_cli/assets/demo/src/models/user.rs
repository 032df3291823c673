//! `User` record stored in the `user` table.

use dbkit_core::{FieldDef, FieldMap, FieldValue, Record, RecordMeta, TransformResult};

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub meta: RecordMeta,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::default(),
            username: username.into(),
            email: email.into(),
            full_name: None,
            is_active: true,
        }
    }
}

impl Record for User {
    const TABLE: &'static str = "user";
    const FIELDS: &'static [FieldDef] = &[
        FieldDef::text("username").unique(),
        FieldDef::text("email").unique(),
        FieldDef::text("full_name").nullable(),
        FieldDef::boolean("is_active"),
    ];

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.username.as_str().into(),
            self.email.as_str().into(),
            self.full_name.clone().into(),
            self.is_active.into(),
        ]
    }

    fn from_fields(fields: &FieldMap) -> TransformResult<Self> {
        Ok(Self {
            meta: RecordMeta::default(),
            username: fields.text("username")?,
            email: fields.text("email")?,
            full_name: fields.opt_text("full_name")?,
            is_active: fields.boolean("is_active")?,
        })
    }
}
