//! Record types.

pub mod product;
pub mod user;
