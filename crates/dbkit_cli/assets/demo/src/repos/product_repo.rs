//! Repository for `Product` records.

use crate::models::product::Product;
use dbkit_core::{RepoResult, Repository, RepositoryDef};

#[derive(Debug)]
pub struct ProductRepository<'conn> {
    base: Repository<'conn, Product>,
}

impl<'conn> RepositoryDef<'conn> for ProductRepository<'conn> {
    type Record = Product;

    fn from_base(base: Repository<'conn, Product>) -> Self {
        Self { base }
    }

    fn base(&self) -> &Repository<'conn, Product> {
        &self.base
    }
}

impl ProductRepository<'_> {
    /// All products owned by one user.
    pub fn get_by_user(&self, user_id: i64) -> RepoResult<Vec<Product>> {
        self.base.get_by_field("user_id", user_id, false)
    }
}
