//! `Product` record stored in the `product` table.

use dbkit_core::{FieldDef, FieldMap, FieldValue, Record, RecordMeta, TransformResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub meta: RecordMeta,
    pub name: String,
    pub description: Option<String>,
    /// Price in cents.
    pub price: i64,
    pub user_id: Option<i64>,
}

impl Product {
    pub fn new(name: impl Into<String>, price: i64) -> Self {
        Self {
            meta: RecordMeta::default(),
            name: name.into(),
            description: None,
            price,
            user_id: None,
        }
    }
}

impl Record for Product {
    const TABLE: &'static str = "product";
    const FIELDS: &'static [FieldDef] = &[
        FieldDef::text("name"),
        FieldDef::text("description").nullable(),
        FieldDef::integer("price"),
        FieldDef::integer("user_id").nullable().references("user"),
    ];

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.name.as_str().into(),
            self.description.clone().into(),
            self.price.into(),
            self.user_id.into(),
        ]
    }

    fn from_fields(fields: &FieldMap) -> TransformResult<Self> {
        Ok(Self {
            meta: RecordMeta::default(),
            name: fields.text("name")?,
            description: fields.opt_text("description")?,
            price: fields.integer("price")?,
            user_id: fields.opt_integer("user_id")?,
        })
    }
}
