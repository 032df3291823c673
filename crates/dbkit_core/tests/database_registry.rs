mod common;

use common::{database, AuditEntry, User, UserRepository, AUDIT_KEY, USER_KEY};
use dbkit_core::{
    Database, DatabaseConfig, DbError, FieldDef, FieldMap, FieldValue, Record, RecordMeta,
    RepoError, Repository, RepositoryDef, TransformResult,
};

#[test]
fn connection_dependent_calls_fail_before_configure() {
    let mut db = Database::new();
    db.register::<UserRepository>(USER_KEY).unwrap();

    assert!(!db.is_bound(USER_KEY));
    assert!(matches!(db.create_tables(), Err(DbError::NotConfigured)));
    assert!(matches!(
        db.repository::<UserRepository>(USER_KEY),
        Err(RepoError::Db(DbError::NotConfigured))
    ));
}

#[test]
fn configure_binds_earlier_registrations() {
    let mut db = Database::new();
    db.register::<UserRepository>(USER_KEY).unwrap();
    db.configure_in_memory(false).unwrap();
    assert!(db.is_bound(USER_KEY));

    db.register::<Repository<AuditEntry>>(AUDIT_KEY).unwrap();
    assert!(db.is_bound(AUDIT_KEY));
    assert!(!db.is_bound("nothing"));
}

#[test]
fn registration_is_last_write_wins_in_first_registration_order() {
    let mut db = Database::new();
    db.register::<UserRepository>("first").unwrap();
    db.register::<Repository<User>>("shared").unwrap();
    db.register::<Repository<AuditEntry>>("shared").unwrap();

    assert_eq!(db.bindings().len(), 2);
    assert_eq!(db.get_model("shared").unwrap().table, "audit_entry");
    assert!(db.get_repository("shared").unwrap().contains("AuditEntry"));
    assert_eq!(
        db.models().map(|(key, _)| key).collect::<Vec<_>>(),
        vec!["first", "shared"]
    );
    assert_eq!(db.repositories().count(), 2);
    assert!(db.get_model("missing").is_none());
    assert!(db.get_repository("missing").is_none());
}

#[test]
fn create_tables_is_idempotent() {
    let mut db = database(true);
    db.create_tables().unwrap();

    let users: UserRepository = db.repository(USER_KEY).unwrap();
    users.base().create(User::new("alice")).unwrap();
    drop(users);

    db.create_tables().unwrap();
    let tables = db
        .execute_sql(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name;",
            [],
        )
        .unwrap();
    assert_eq!(
        tables,
        vec![
            vec![FieldValue::Text("audit_entry".to_string())],
            vec![FieldValue::Text("user".to_string())],
        ]
    );
    let count = db
        .execute_sql_single("SELECT COUNT(*) FROM \"user\";", [])
        .unwrap();
    assert_eq!(count, Some(vec![FieldValue::Integer(1)]));
}

#[test]
fn repository_lookup_checks_key_and_type() {
    let db = database(true);

    let err = db.repository::<UserRepository>("unknown").unwrap_err();
    assert!(matches!(err, RepoError::Db(DbError::UnknownKey(ref key)) if key == "unknown"));

    let err = db.repository::<Repository<User>>(USER_KEY).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Db(DbError::BindingMismatch { ref key, .. }) if key == USER_KEY
    ));
}

#[test]
fn soft_delete_follows_repository_then_registry_default() {
    let mut db = Database::new();
    db.configure_in_memory(false).unwrap();
    db.register::<Repository<User>>("plain_users").unwrap();
    db.register::<UserRepository>(USER_KEY).unwrap();
    db.create_tables().unwrap();

    let plain: Repository<User> = db.repository("plain_users").unwrap();
    assert!(!plain.soft_delete_enabled());
    let users: UserRepository = db.repository(USER_KEY).unwrap();
    assert!(users.base().soft_delete_enabled());

    let db = database(true);
    let audit: Repository<AuditEntry> = db.repository(AUDIT_KEY).unwrap();
    assert!(!audit.soft_delete_enabled());
    assert!(db.soft_delete_default());
}

#[test]
fn disconnect_keeps_registrations() {
    let mut db = database(true);
    db.disconnect().unwrap();

    assert!(!db.is_connected());
    assert!(matches!(db.connection(), Err(DbError::NotConfigured)));
    assert_eq!(db.models().count(), 2);
    assert!(db.is_bound(USER_KEY));
    db.disconnect().unwrap();

    db.connect().unwrap();
    assert!(db.is_connected());
    db.create_tables().unwrap();
    let users: UserRepository = db.repository(USER_KEY).unwrap();
    assert_eq!(users.base().count(true).unwrap(), 0);
}

#[test]
fn file_database_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    let mut db = Database::new();
    db.configure(&path, true).unwrap();
    db.register::<UserRepository>(USER_KEY).unwrap();
    db.create_tables().unwrap();
    {
        let users: UserRepository = db.repository(USER_KEY).unwrap();
        users.base().create(User::new("alice")).unwrap();
    }

    db.disconnect().unwrap();
    db.connect().unwrap();

    let users: UserRepository = db.repository(USER_KEY).unwrap();
    assert_eq!(
        users.find_by_username("alice").unwrap().unwrap().meta.id,
        Some(1)
    );
    assert!(db.to_string().contains("app.db"));
}

#[test]
fn open_from_toml_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.db");
    let config = DatabaseConfig::from_toml_str(&format!(
        "path = '{}'\nsoft_delete_default = true\nbusy_timeout_ms = 100\n",
        path.display()
    ))
    .unwrap();

    let mut db = Database::open(&config).unwrap();
    assert_eq!(db.config(), Some(&config));
    assert!(db.soft_delete_default());
    db.register::<Repository<User>>("users").unwrap();
    db.create_tables().unwrap();

    let users: Repository<User> = db.repository("users").unwrap();
    assert!(users.soft_delete_enabled());
    assert!(path.exists());
}

#[test]
fn transaction_rolls_back_repository_writes() {
    let db = database(true);
    let users: UserRepository = db.repository(USER_KEY).unwrap();

    let result: Result<(), RepoError> = db.transaction(|_| {
        users.base().create(User::new("alice"))?;
        users.base().create(User::new("bob"))?;
        Err(RepoError::SoftDeleteDisabled("user"))
    });
    assert!(result.is_err());
    assert_eq!(users.base().count(true).unwrap(), 0);

    db.transaction(|_| -> Result<(), RepoError> {
        users.base().create(User::new("carol"))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(users.base().count(false).unwrap(), 1);
}

#[derive(Debug)]
struct Shadow {
    meta: RecordMeta,
}

impl Record for Shadow {
    const TABLE: &'static str = "shadow";
    const FIELDS: &'static [FieldDef] = &[FieldDef::timestamp("created_at")];

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![self.meta.created_at.into()]
    }

    fn from_fields(_fields: &FieldMap) -> TransformResult<Self> {
        Ok(Self {
            meta: RecordMeta::default(),
        })
    }
}

#[test]
fn register_rejects_reserved_field_names() {
    let mut db = Database::new();
    let err = db.register::<Repository<Shadow>>("shadow").unwrap_err();
    assert!(
        matches!(err, DbError::InvalidSchema { table: "shadow", ref reason } if reason.contains("reserved"))
    );
    assert!(db.bindings().is_empty());
}

#[test]
fn display_summarises_state() {
    let db = database(false);
    assert_eq!(
        db.to_string(),
        "Database(db=:memory:, models=2, repositories=2, soft_delete=false)"
    );
}
