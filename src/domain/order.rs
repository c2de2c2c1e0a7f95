//! Orders: an immutable purchase record bound to a frozen cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    ShippingPending,
    Shipped,
    Cancelled,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShippingPending => "shipping_pending",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
            Self::Delivered => "delivered",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipping_pending" => Ok(Self::ShippingPending),
            "shipped" => Ok(Self::Shipped),
            "cancelled" => Ok(Self::Cancelled),
            "delivered" => Ok(Self::Delivered),
            other => Err(format!("unknown order status {other:?}")),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for OrderStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for OrderStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> sqlx::encode::IsNull {
        <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderStatus {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
        Ok(raw.parse::<OrderStatus>()?)
    }
}

/// Status progression is externally driven by fulfillment and is not
/// validated against a transition table; any status may follow any other.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub cart_id: Uuid,
    pub status: OrderStatus,
    pub date_created: DateTime<Utc>,
}

/// Human-facing order reference, e.g. `ORD-00421337`.
pub fn new_order_number() -> String {
    format!("ORD-{:08}", rand::random::<u32>() % 100_000_000)
}
