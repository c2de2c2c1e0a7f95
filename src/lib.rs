//! Storefront service core.
//!
//! Catalogue browsing, category navigation, shopping cart and wish list,
//! checkout against an external payment gateway, and order placement.
//! Rendering, authentication and the payment gateway itself are external
//! collaborators; everything here speaks plain data structures.

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod http;
pub mod payment;
pub mod reviews;
pub mod slug;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use crate::payment::PaymentGateway;
use crate::reviews::ReviewsProvider;
use crate::store::{CartStore, CategoryStore, OrderStore, ProductStore};

#[derive(Clone)]
pub struct AppState {
    pub categories: Arc<CategoryStore>,
    pub products: Arc<ProductStore>,
    pub carts: Arc<CartStore>,
    pub orders: Arc<OrderStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub reviews: Arc<dyn ReviewsProvider>,
    pub nats: Option<async_nats::Client>,
    pub capture_timeout: Duration,
}

impl AppState {
    pub fn new(
        db: sqlx::PgPool,
        gateway: Arc<dyn PaymentGateway>,
        nats: Option<async_nats::Client>,
        capture_timeout: Duration,
    ) -> Self {
        Self {
            categories: Arc::new(CategoryStore::new(db.clone())),
            products: Arc::new(ProductStore::new(db.clone())),
            carts: Arc::new(CartStore::new(db.clone())),
            orders: Arc::new(OrderStore::new(db.clone())),
            gateway,
            reviews: Arc::new(reviews::PgReviews::new(db)),
            nats,
            capture_timeout,
        }
    }
}
