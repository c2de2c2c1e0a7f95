//! Store behavior against a real database: the uniqueness invariants the
//! schema enforces, cart get-or-create semantics, path allocation after
//! deletions, and checkout compensation.
//!
//! Each test gets its own migrated database via `#[sqlx::test]`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use storefront::domain::cart::CartStatus;
use storefront::payment::{PaymentError, PaymentGateway};
use storefront::store::carts::CartStore;
use storefront::store::categories::{CategoryStore, NewCategory};
use storefront::store::orders::OrderStore;
use storefront::store::products::{NewProduct, ProductStore};

fn product(name: &str, price: i64) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        slug: None,
        price,
        description: String::new(),
        sku: format!("SKU-{name}"),
        tags: String::new(),
        is_public: true,
        is_discountable: false,
    }
}

fn category(name: &str) -> NewCategory {
    NewCategory {
        name: name.to_string(),
        slug: None,
        description: String::new(),
        meta_title: None,
        meta_description: None,
        image: None,
        is_public: true,
    }
}

#[sqlx::test]
async fn get_or_create_returns_one_cart_per_owner_and_status(pool: PgPool) {
    let carts = CartStore::new(pool);
    let owner = Uuid::now_v7();

    let first = carts.get_or_create(owner, CartStatus::Open).await.unwrap();
    let second = carts.get_or_create(owner, CartStatus::Open).await.unwrap();
    assert_eq!(first.cart.id, second.cart.id);

    // The wish list is a separate cart under the same owner.
    let saved = carts.get_or_create(owner, CartStatus::Saved).await.unwrap();
    assert_ne!(saved.cart.id, first.cart.id);
}

#[sqlx::test]
async fn adding_a_product_twice_overwrites_the_quantity(pool: PgPool) {
    let products = ProductStore::new(pool.clone());
    let carts = CartStore::new(pool);
    let shoes = products.create(product("Shoes", 500)).await.unwrap();
    let owner = Uuid::now_v7();

    let mut view = carts.get_or_create(owner, CartStatus::Open).await.unwrap();
    carts.add_line(&mut view, shoes.id, 2).await.unwrap();
    carts.add_line(&mut view, shoes.id, 5).await.unwrap();

    let lines = view.lines(&carts).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].line.quantity, 5);
    assert_eq!(view.total_price(&carts).await.unwrap(), 2500);
}

#[sqlx::test]
async fn frozen_cart_rejects_line_changes(pool: PgPool) {
    let products = ProductStore::new(pool.clone());
    let carts = CartStore::new(pool);
    let shoes = products.create(product("Shoes", 500)).await.unwrap();
    let owner = Uuid::now_v7();

    let mut view = carts.get_or_create(owner, CartStatus::Open).await.unwrap();
    carts.add_line(&mut view, shoes.id, 1).await.unwrap();
    carts.freeze(&mut view).await.unwrap();

    assert!(carts.add_line(&mut view, shoes.id, 2).await.is_err());
    assert!(carts.flush(&mut view).await.is_err());

    // Thawing reopens the cart for edits.
    carts.thaw(&mut view).await.unwrap();
    carts.add_line(&mut view, shoes.id, 2).await.unwrap();
    assert_eq!(view.lines(&carts).await.unwrap()[0].line.quantity, 2);
}

#[sqlx::test]
async fn child_steps_are_not_reused_after_sibling_delete(pool: PgPool) {
    let categories = CategoryStore::new(pool);
    let clothing = categories.insert(category("Clothing"), None).await.unwrap();
    let shoes = categories
        .insert(category("Shoes"), Some(clothing.id))
        .await
        .unwrap();
    let hats = categories
        .insert(category("Hats"), Some(clothing.id))
        .await
        .unwrap();

    categories.delete(shoes.id).await.unwrap();

    // Hats still holds step 0002; the next insert must not collide with
    // it even though the parent is back to one child.
    let socks = categories
        .insert(category("Socks"), Some(clothing.id))
        .await
        .unwrap();
    assert_ne!(socks.path, hats.path);
    assert!(socks.path > hats.path);
}

struct Approving;

#[async_trait]
impl PaymentGateway for Approving {
    async fn capture(&self, _reference: &str, _amount: i64) -> Result<(), PaymentError> {
        Ok(())
    }
}

#[sqlx::test]
async fn failed_order_placement_reopens_the_cart(pool: PgPool) {
    let products = ProductStore::new(pool.clone());
    let carts = CartStore::new(pool.clone());
    let orders = OrderStore::new(pool.clone());
    let shoes = products.create(product("Shoes", 500)).await.unwrap();
    let owner = Uuid::now_v7();

    let mut view = carts.get_or_create(owner, CartStatus::Open).await.unwrap();
    carts.add_line(&mut view, shoes.id, 1).await.unwrap();

    // Occupy the cart's order slot so placement hits the unique index
    // after the capture and freeze succeed.
    sqlx::query(
        "INSERT INTO orders (id, order_number, customer_id, cart_id, status, date_created) \
         VALUES ($1, 'ORD-00000001', $2, $3, 'shipping_pending', NOW())",
    )
    .bind(Uuid::now_v7())
    .bind(owner)
    .bind(view.cart.id)
    .execute(&pool)
    .await
    .unwrap();

    let result = orders
        .checkout(
            &carts,
            &Approving,
            std::time::Duration::from_secs(1),
            owner,
            &mut view,
            "pay_1",
        )
        .await;
    assert!(result.is_err());

    // The cart must not stay frozen; the customer can edit and retry.
    let cart = carts.get(view.cart.id).await.unwrap();
    assert_eq!(cart.status, CartStatus::Open);
}
