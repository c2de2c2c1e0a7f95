//! Cart aggregate: the status state machine and line arithmetic.
//!
//! A wish list is the same entity with status `Saved`; nothing else
//! distinguishes it from a shopping cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ShopError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    Open,
    Saved,
    Frozen,
    Submitted,
}

impl CartStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Saved => "saved",
            Self::Frozen => "frozen",
            Self::Submitted => "submitted",
        }
    }

    /// Lines may only be created, updated or deleted in these states.
    pub fn is_editable(self) -> bool {
        matches!(self, Self::Open | Self::Saved)
    }
}

impl std::str::FromStr for CartStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "saved" => Ok(Self::Saved),
            "frozen" => Ok(Self::Frozen),
            "submitted" => Ok(Self::Submitted),
            other => Err(format!("unknown cart status {other:?}")),
        }
    }
}

// Stored as plain TEXT rather than a Postgres enum type.
impl sqlx::Type<sqlx::Postgres> for CartStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for CartStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> sqlx::encode::IsNull {
        <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CartStatus {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
        Ok(raw.parse::<CartStatus>()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub status: CartStatus,
    pub date_created: DateTime<Utc>,
    pub date_submitted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartLine {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// A cart line joined with its product, as cached by `CartView`.
#[derive(Debug, Clone, Serialize)]
pub struct LineItem {
    pub line: CartLine,
    pub product: super::product::Product,
}

impl LineItem {
    pub fn line_price(&self) -> i64 {
        self.product.price * self.line.quantity as i64
    }
}

impl Cart {
    pub fn ensure_editable(&self) -> Result<()> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(ShopError::permission_denied(format!(
                "cart {} is {} and cannot be modified",
                self.id,
                self.status.as_str()
            )))
        }
    }

    /// Open/Saved -> Frozen, on checkout-payment confirmation.
    pub fn freeze(&mut self) -> Result<()> {
        if !self.status.is_editable() {
            return Err(ShopError::permission_denied(format!(
                "cannot freeze a {} cart",
                self.status.as_str()
            )));
        }
        self.status = CartStatus::Frozen;
        Ok(())
    }

    /// Frozen -> Open, on checkout abandonment.
    pub fn thaw(&mut self) -> Result<()> {
        if self.status != CartStatus::Frozen {
            return Err(ShopError::permission_denied(format!(
                "cannot thaw a {} cart",
                self.status.as_str()
            )));
        }
        self.status = CartStatus::Open;
        Ok(())
    }

    /// Frozen -> Submitted, on order creation. Lines are kept: the order
    /// references them in place rather than copying.
    pub fn submit(&mut self) -> Result<()> {
        if self.status != CartStatus::Frozen {
            return Err(ShopError::permission_denied(format!(
                "cannot submit a {} cart",
                self.status.as_str()
            )));
        }
        self.status = CartStatus::Submitted;
        self.date_submitted = Some(Utc::now());
        Ok(())
    }
}

/// Sum of `price * quantity` over a set of line items.
pub fn total_price(items: &[LineItem]) -> i64 {
    items.iter().map(LineItem::line_price).sum()
}

/// Total unit count across all lines.
pub fn item_count(items: &[LineItem]) -> i64 {
    items.iter().map(|i| i.line.quantity as i64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::Product;

    fn cart(status: CartStatus) -> Cart {
        Cart {
            id: Uuid::new_v4(),
            owner_id: Some(Uuid::new_v4()),
            status,
            date_created: Utc::now(),
            date_submitted: None,
        }
    }

    fn item(price: i64, quantity: i32) -> LineItem {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: "p".into(),
            slug: "p".into(),
            price,
            description: String::new(),
            sku: String::new(),
            tags: String::new(),
            is_public: true,
            is_discountable: true,
            rating: None,
            date_created: now,
            date_updated: now,
        };
        LineItem {
            line: CartLine {
                id: Uuid::new_v4(),
                cart_id: Uuid::new_v4(),
                product_id: product.id,
                quantity,
                date_created: now,
                date_updated: now,
            },
            product,
        }
    }

    #[test]
    fn open_and_saved_are_editable() {
        assert!(cart(CartStatus::Open).ensure_editable().is_ok());
        assert!(cart(CartStatus::Saved).ensure_editable().is_ok());
    }

    #[test]
    fn frozen_and_submitted_reject_edits() {
        for status in [CartStatus::Frozen, CartStatus::Submitted] {
            let err = cart(status).ensure_editable().unwrap_err();
            assert!(matches!(err, ShopError::PermissionDenied(_)));
        }
    }

    #[test]
    fn freeze_thaw_submit_cycle() {
        let mut c = cart(CartStatus::Open);
        c.freeze().unwrap();
        assert_eq!(c.status, CartStatus::Frozen);
        c.thaw().unwrap();
        assert_eq!(c.status, CartStatus::Open);
        c.freeze().unwrap();
        c.submit().unwrap();
        assert_eq!(c.status, CartStatus::Submitted);
        assert!(c.date_submitted.is_some());
    }

    #[test]
    fn saved_cart_freezes_too() {
        let mut c = cart(CartStatus::Saved);
        assert!(c.freeze().is_ok());
    }

    #[test]
    fn no_transitions_away_from_submitted() {
        let mut c = cart(CartStatus::Submitted);
        assert!(c.freeze().is_err());
        assert!(c.thaw().is_err());
        assert!(c.submit().is_err());
    }

    #[test]
    fn cannot_submit_or_thaw_open_cart() {
        let mut c = cart(CartStatus::Open);
        assert!(c.submit().is_err());
        assert!(c.thaw().is_err());
    }

    #[test]
    fn totals_sum_price_times_quantity() {
        let items = vec![item(500, 2), item(300, 1)];
        assert_eq!(total_price(&items), 1300);
        assert_eq!(item_count(&items), 3);
    }

    #[test]
    fn empty_cart_totals_zero() {
        assert_eq!(total_price(&[]), 0);
        assert_eq!(item_count(&[]), 0);
    }
}
