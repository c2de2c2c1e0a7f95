//! Postgres-backed stores. Each store owns the SQL for one aggregate;
//! the algorithms they apply live in `crate::domain`.

pub mod carts;
pub mod categories;
pub mod orders;
pub mod products;

pub use carts::{CartStore, CartView};
pub use categories::{CategoryStore, NewCategory};
pub use orders::OrderStore;
pub use products::{NewProduct, ProductStore};
