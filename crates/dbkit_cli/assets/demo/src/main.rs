//! Walk-through of the dbkit_core workflow.

mod models;
mod repos;

use dbkit_core::transform::record_to_json;
use dbkit_core::{Database, RepoError, RepositoryDef};
use models::product::Product;
use models::user::User;
use repos::product_repo::ProductRepository;
use repos::user_repo::UserRepository;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::new();
    db.configure("./app.db", true)?;
    db.register::<UserRepository>("user_repo")?;
    db.register::<ProductRepository>("product_repo")?;
    db.create_tables()?;
    println!("{db}");

    let users: UserRepository = db.repository("user_repo")?;
    let products: ProductRepository = db.repository("product_repo")?;

    for column in users.base().get_column_info("user") {
        println!("column {} {} not_null={}", column.name, column.data_type, column.not_null);
    }

    let alice = match users.get_by_username("alice")? {
        Some(existing) => existing,
        None => users.base().create(User::new("alice", "alice@example.com"))?,
    };
    let alice_id = alice.meta.id.ok_or("created user has no id")?;
    println!("user: {}", record_to_json(&alice)?);

    // Both products or neither.
    db.transaction(|_| -> Result<(), RepoError> {
        let mut lamp = Product::new("Lamp", 2_999);
        lamp.user_id = Some(alice_id);
        let mut desk = Product::new("Desk", 14_900);
        desk.user_id = Some(alice_id);
        products.base().create_many(vec![lamp, desk])?;
        Ok(())
    })?;

    let owned = products.get_by_user(alice_id)?;
    println!("alice owns {} products", owned.len());

    if let Some(first) = owned.first().and_then(|product| product.meta.id) {
        products.base().update(first, ("price", 4_999_i64))?;
        products.base().delete(first)?;
        println!(
            "after delete: {} visible, {} including deleted",
            products.base().count(false)?,
            products.base().count(true)?
        );
        products.base().restore(first)?;
    }

    for user in users.get_active()? {
        println!("active user: {}", user.username);
    }
    Ok(())
}
