//! Domain aggregates and the pure algorithms behind the stores.

pub mod cart;
pub mod category;
pub mod order;
pub mod product;

pub use cart::{Cart, CartLine, CartStatus, LineItem};
pub use category::Category;
pub use order::{Order, OrderStatus};
pub use product::{Product, ProductImage};
