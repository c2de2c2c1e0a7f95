//! Domain events published to NATS when a client is configured.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ShopEvent {
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        customer_id: Uuid,
        total: i64,
    },
    OrderStatusChanged {
        order_id: Uuid,
        status: String,
    },
}

impl ShopEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "shop.orders.placed",
            Self::OrderStatusChanged { .. } => "shop.orders.status",
        }
    }
}

/// Best-effort publish; the storefront never fails a request because the
/// event bus is down.
pub async fn publish(nats: &Option<async_nats::Client>, event: ShopEvent) {
    let Some(client) = nats else { return };
    let payload = match serde_json::to_vec(&event) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize event");
            return;
        }
    };
    if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
        tracing::warn!(error = %e, subject = event.subject(), "event publish failed");
    }
}
