//! Repository for `User` records.

use crate::models::user::User;
use dbkit_core::{RepoResult, Repository, RepositoryDef};

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
    pub fn get_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self.base.get_by_field("username", username, false)?.pop())
    }

    pub fn get_active(&self) -> RepoResult<Vec<User>> {
        self.base.get_by_field("is_active", true, false)
    }

    pub fn deactivate(&self, id: i64) -> RepoResult<usize> {
        self.base.update(id, ("is_active", false))
    }
}
