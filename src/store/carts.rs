//! Cart engine: get-or-create semantics, the edit gate, and the
//! request-scoped line cache.

use sqlx::PgPool;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::domain::cart::{self, Cart, CartLine, CartStatus, LineItem};
use crate::domain::product::Product;
use crate::error::{Result, ShopError};

pub struct CartStore {
    pool: PgPool,
}

/// Point-in-time view of one cart for the duration of a request.
///
/// Lines are loaded at most once per view instance so that downstream
/// pricing code can annotate them without a re-fetch dropping the
/// annotations; `flush` invalidates the cache along with the rows.
pub struct CartView {
    pub cart: Cart,
    lines: OnceCell<Vec<LineItem>>,
}

impl CartView {
    fn new(cart: Cart) -> Self {
        Self {
            cart,
            lines: OnceCell::new(),
        }
    }

    pub async fn lines(&self, store: &CartStore) -> Result<&[LineItem]> {
        let items = self
            .lines
            .get_or_try_init(|| store.fetch_lines(self.cart.id))
            .await?;
        Ok(items.as_slice())
    }

    pub async fn total_price(&self, store: &CartStore) -> Result<i64> {
        Ok(cart::total_price(self.lines(store).await?))
    }

    pub async fn item_count(&self, store: &CartStore) -> Result<i64> {
        Ok(cart::item_count(self.lines(store).await?))
    }

    pub async fn is_empty(&self, store: &CartStore) -> Result<bool> {
        Ok(self.lines(store).await?.is_empty())
    }

    fn invalidate(&mut self) {
        self.lines = OnceCell::new();
    }
}

impl CartStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Cart> {
        sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ShopError::NotFound("cart"))
    }

    /// View over an existing cart regardless of status; callers that need
    /// a frozen cart (abandoning a checkout) cannot go through the
    /// owner-keyed `get_or_create`.
    pub async fn load(&self, id: Uuid) -> Result<CartView> {
        Ok(CartView::new(self.get(id).await?))
    }

    /// Idempotent lookup: the first call for an (owner, status) pair
    /// creates the cart, later calls return the same row. A lost race on
    /// the unique index is benign and resolves to the winner's row.
    pub async fn get_or_create(&self, owner: Uuid, status: CartStatus) -> Result<CartView> {
        debug_assert!(status.is_editable(), "only open/saved carts are keyed by owner");
        let inserted: std::result::Result<Option<Cart>, sqlx::Error> = sqlx::query_as::<_, Cart>(
            "INSERT INTO carts (id, owner_id, status, date_created) VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (owner_id, status) WHERE status IN ('open', 'saved') DO NOTHING \
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(owner)
        .bind(status)
        .fetch_optional(&self.pool)
        .await;
        match inserted {
            Ok(Some(cart)) => return Ok(CartView::new(cart)),
            Ok(None) => {}
            Err(e) => {
                let e = ShopError::from(e);
                if !e.is_unique_violation() {
                    return Err(e);
                }
            }
        }
        let cart = sqlx::query_as::<_, Cart>(
            "SELECT * FROM carts WHERE owner_id = $1 AND status = $2",
        )
        .bind(owner)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(CartView::new(cart))
    }

    async fn fetch_lines(&self, cart_id: Uuid) -> Result<Vec<LineItem>> {
        let lines: Vec<CartLine> = sqlx::query_as(
            "SELECT * FROM cart_lines WHERE cart_id = $1 ORDER BY date_created",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;
        let products: Vec<Product> = sqlx::query_as(
            "SELECT p.* FROM products p JOIN cart_lines l ON l.product_id = p.id \
             WHERE l.cart_id = $1",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;
        let mut by_id: std::collections::HashMap<Uuid, Product> =
            products.into_iter().map(|p| (p.id, p)).collect();
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = by_id
                .remove(&line.product_id)
                .ok_or(ShopError::NotFound("product"))?;
            items.push(LineItem { line, product });
        }
        Ok(items)
    }

    /// Adds a product to an editable cart. A line for the same product is
    /// overwritten with the given quantity, not incremented.
    pub async fn add_line(
        &self,
        view: &mut CartView,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartLine> {
        view.cart.ensure_editable()?;
        if quantity <= 0 {
            return Err(ShopError::Invalid("quantity must be positive".to_string()));
        }
        let line: CartLine = sqlx::query_as(
            "INSERT INTO cart_lines (id, cart_id, product_id, quantity, date_created, date_updated) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) \
             ON CONFLICT (cart_id, product_id) \
             DO UPDATE SET quantity = EXCLUDED.quantity, date_updated = NOW() \
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(view.cart.id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;
        view.invalidate();
        Ok(line)
    }

    pub async fn remove_line(&self, view: &mut CartView, product_id: Uuid) -> Result<()> {
        view.cart.ensure_editable()?;
        let done = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2")
            .bind(view.cart.id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(ShopError::NotFound("cart line"));
        }
        view.invalidate();
        Ok(())
    }

    /// Deletes every line. Refused while the cart is frozen for checkout.
    pub async fn flush(&self, view: &mut CartView) -> Result<()> {
        if view.cart.status == CartStatus::Frozen {
            return Err(ShopError::permission_denied(
                "cannot flush a frozen cart".to_string(),
            ));
        }
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
            .bind(view.cart.id)
            .execute(&self.pool)
            .await?;
        view.invalidate();
        Ok(())
    }

    pub async fn freeze(&self, view: &mut CartView) -> Result<()> {
        view.cart.freeze()?;
        self.persist_status(&view.cart).await
    }

    pub async fn thaw(&self, view: &mut CartView) -> Result<()> {
        view.cart.thaw()?;
        self.persist_status(&view.cart).await
    }

    pub async fn submit(&self, view: &mut CartView) -> Result<()> {
        view.cart.submit()?;
        self.persist_status(&view.cart).await
    }

    async fn persist_status(&self, cart: &Cart) -> Result<()> {
        sqlx::query("UPDATE carts SET status = $2, date_submitted = $3 WHERE id = $1")
            .bind(cart.id)
            .bind(cart.status)
            .bind(cart.date_submitted)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
