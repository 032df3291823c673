#![allow(dead_code)]

use dbkit_core::{
    Database, FieldDef, FieldMap, FieldValue, Record, RecordMeta, RepoResult, Repository,
    RepositoryDef, TransformResult,
};

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub meta: RecordMeta,
    pub username: String,
    pub full_name: Option<String>,
    pub email: String,
}

impl User {
    pub fn new(username: &str) -> Self {
        Self {
            meta: RecordMeta::default(),
            username: username.to_string(),
            full_name: None,
            email: format!("{username}@example.com"),
        }
    }
}

impl Record for User {
    const TABLE: &'static str = "user";
    const FIELDS: &'static [FieldDef] = &[
        FieldDef::text("username").unique(),
        FieldDef::text("full_name").nullable(),
        FieldDef::text("email"),
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
            self.full_name.clone().into(),
            self.email.as_str().into(),
        ]
    }

    fn from_fields(fields: &FieldMap) -> TransformResult<Self> {
        Ok(Self {
            meta: RecordMeta::default(),
            username: fields.text("username")?,
            full_name: fields.opt_text("full_name")?,
            email: fields.text("email")?,
        })
    }
}

/// Domain repository that always soft-deletes.
#[derive(Debug)]
pub struct UserRepository<'conn> {
    base: Repository<'conn, User>,
}

impl<'conn> RepositoryDef<'conn> for UserRepository<'conn> {
    type Record = User;
    const SOFT_DELETE: Option<bool> = Some(true);

    fn from_base(base: Repository<'conn, User>) -> Self {
        Self { base }
    }

    fn base(&self) -> &Repository<'conn, User> {
        &self.base
    }
}

impl UserRepository<'_> {
    pub fn find_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self.base.get_by_field("username", username, false)?.pop())
    }
}

/// Append-only record without a `deleted_at` column.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub meta: RecordMeta,
    pub message: String,
    pub user_id: Option<i64>,
}

impl AuditEntry {
    pub fn new(message: &str) -> Self {
        Self {
            meta: RecordMeta::default(),
            message: message.to_string(),
            user_id: None,
        }
    }
}

impl Record for AuditEntry {
    const TABLE: &'static str = "audit_entry";
    const FIELDS: &'static [FieldDef] = &[
        FieldDef::text("message"),
        FieldDef::integer("user_id").nullable().references("user"),
    ];
    const SOFT_DELETABLE: bool = false;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![self.message.as_str().into(), self.user_id.into()]
    }

    fn from_fields(fields: &FieldMap) -> TransformResult<Self> {
        Ok(Self {
            meta: RecordMeta::default(),
            message: fields.text("message")?,
            user_id: fields.opt_integer("user_id")?,
        })
    }
}

pub const USER_KEY: &str = "user_repo";
pub const AUDIT_KEY: &str = "audit_repo";

/// In-memory database with both record types registered and created.
pub fn database(soft_delete_default: bool) -> Database {
    let mut db = Database::new();
    db.configure_in_memory(soft_delete_default).unwrap();
    db.register::<UserRepository>(USER_KEY).unwrap();
    db.register::<Repository<AuditEntry>>(AUDIT_KEY).unwrap();
    db.create_tables().unwrap();
    db
}

pub fn usernames(users: &[User]) -> Vec<&str> {
    users.iter().map(|user| user.username.as_str()).collect()
}
