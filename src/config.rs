//! Environment-driven configuration, read once at startup.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub payment_capture_timeout: Duration,
    /// Dev/test switch for the built-in gateway: approve every capture.
    pub payment_auto_approve: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse()?;
        let nats_url = std::env::var("NATS_URL").ok();
        let timeout_secs: u64 = std::env::var("PAYMENT_CAPTURE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let payment_auto_approve = std::env::var("PAYMENT_AUTO_APPROVE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Self {
            database_url,
            port,
            nats_url,
            payment_capture_timeout: Duration::from_secs(timeout_secs),
            payment_auto_approve,
        })
    }
}
