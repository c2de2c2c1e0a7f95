//! Payment gateway seam.
//!
//! The gateway itself is an external collaborator; the core only needs a
//! capture call that either confirms a charge or fails. Captures are
//! bounded by a timeout, and a timeout counts as a capture failure.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ShopError;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("capture declined: {0}")]
    Declined(String),

    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    #[error("capture timed out")]
    TimedOut,
}

impl From<PaymentError> for ShopError {
    fn from(e: PaymentError) -> Self {
        ShopError::PaymentFailure(e.to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Confirms a charge of `amount` (smallest currency unit) against a
    /// payment reference obtained client-side.
    async fn capture(&self, reference: &str, amount: i64) -> Result<(), PaymentError>;
}

/// Applies the capture timeout policy around any gateway.
pub async fn capture_with_timeout(
    gateway: &dyn PaymentGateway,
    reference: &str,
    amount: i64,
    timeout: Duration,
) -> Result<(), PaymentError> {
    match tokio::time::timeout(timeout, gateway.capture(reference, amount)).await {
        Ok(result) => result,
        Err(_) => Err(PaymentError::TimedOut),
    }
}

/// Config-driven gateway for development and smoke environments: approves
/// everything when enabled, declines everything otherwise.
pub struct EnvGateway {
    pub auto_approve: bool,
}

#[async_trait]
impl PaymentGateway for EnvGateway {
    async fn capture(&self, reference: &str, amount: i64) -> Result<(), PaymentError> {
        if self.auto_approve {
            tracing::info!(reference, amount, "auto-approved capture");
            Ok(())
        } else {
            Err(PaymentError::Declined("no gateway configured".to_string()))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct Approving;

    #[async_trait]
    impl PaymentGateway for Approving {
        async fn capture(&self, _reference: &str, _amount: i64) -> Result<(), PaymentError> {
            Ok(())
        }
    }

    pub(crate) struct Declining;

    #[async_trait]
    impl PaymentGateway for Declining {
        async fn capture(&self, _reference: &str, _amount: i64) -> Result<(), PaymentError> {
            Err(PaymentError::Declined("insufficient funds".to_string()))
        }
    }

    pub(crate) struct Hanging;

    #[async_trait]
    impl PaymentGateway for Hanging {
        async fn capture(&self, _reference: &str, _amount: i64) -> Result<(), PaymentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn capture_passes_through() {
        assert!(
            capture_with_timeout(&Approving, "pay_1", 1300, Duration::from_secs(1))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn decline_is_an_error() {
        let err = capture_with_timeout(&Declining, "pay_1", 1300, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Declined(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let err = capture_with_timeout(&Hanging, "pay_1", 1300, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::TimedOut));
    }

    #[tokio::test]
    async fn env_gateway_declines_by_default() {
        let gw = EnvGateway { auto_approve: false };
        assert!(gw.capture("pay_1", 100).await.is_err());
        let gw = EnvGateway { auto_approve: true };
        assert!(gw.capture("pay_1", 100).await.is_ok());
    }
}
