//! Order workflow: binding a frozen cart to a customer and driving the
//! externally-owned status progression.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::cart::CartStatus;
use crate::domain::order::{new_order_number, Order, OrderStatus};
use crate::error::{Result, ShopError};
use crate::payment::{capture_with_timeout, PaymentGateway};
use crate::store::carts::{CartStore, CartView};

pub struct OrderStore {
    pool: PgPool,
}

impl OrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Order> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ShopError::NotFound("order"))
    }

    pub async fn list_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>> {
        Ok(sqlx::query_as(
            "SELECT * FROM orders WHERE customer_id = $1 ORDER BY date_created DESC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Binds a frozen cart to its owner as an order in `ShippingPending`.
    /// The cart must belong to the customer and must be frozen; the cart's
    /// own frozen-status guard is what keeps the order's lines immutable
    /// from here on.
    pub async fn place_order(&self, customer_id: Uuid, view: &CartView) -> Result<Order> {
        if view.cart.owner_id != Some(customer_id) {
            return Err(ShopError::permission_denied(
                "cart does not belong to this customer".to_string(),
            ));
        }
        if view.cart.status != CartStatus::Frozen {
            return Err(ShopError::permission_denied(format!(
                "cannot place an order for a {} cart",
                view.cart.status.as_str()
            )));
        }
        let order: Order = sqlx::query_as(
            "INSERT INTO orders (id, order_number, customer_id, cart_id, status, date_created) \
             VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(new_order_number())
        .bind(customer_id)
        .bind(view.cart.id)
        .bind(OrderStatus::ShippingPending)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(order = %order.id, number = %order.order_number, "order placed");
        Ok(order)
    }

    /// Externally driven fulfillment update; no transition table is
    /// enforced, any status may follow any other.
    pub async fn set_status(&self, id: Uuid, status: OrderStatus) -> Result<Order> {
        sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ShopError::NotFound("order"))
    }

    /// Checkout: capture the payment, then freeze the cart, place the
    /// order and submit the cart. A declined, failed or timed-out capture
    /// surfaces as `PaymentFailure` and creates nothing.
    pub async fn checkout(
        &self,
        carts: &CartStore,
        gateway: &dyn PaymentGateway,
        capture_timeout: std::time::Duration,
        customer_id: Uuid,
        view: &mut CartView,
        payment_reference: &str,
    ) -> Result<Order> {
        if view.cart.owner_id != Some(customer_id) {
            return Err(ShopError::permission_denied(
                "cart does not belong to this customer".to_string(),
            ));
        }
        if view.is_empty(carts).await? {
            return Err(ShopError::Invalid("cart is empty".to_string()));
        }
        let amount = view.total_price(carts).await?;

        capture_with_timeout(gateway, payment_reference, amount, capture_timeout)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, reference = payment_reference, "payment capture failed");
                ShopError::from(e)
            })?;

        carts.freeze(view).await?;
        let order = match self.place_order(customer_id, view).await {
            Ok(order) => order,
            Err(e) => {
                // The payment is captured but no order exists; the cart
                // must not stay frozen or the customer can never edit or
                // retry it.
                if let Err(thaw_err) = carts.thaw(view).await {
                    tracing::error!(
                        cart = %view.cart.id,
                        error = %thaw_err,
                        "cart left frozen after failed order placement"
                    );
                }
                return Err(e);
            }
        };
        carts.submit(view).await?;
        Ok(order)
    }
}
