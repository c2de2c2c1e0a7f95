//! Storefront - self-hosted storefront service.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::config::Config;
use storefront::payment::EnvGateway;
use storefront::{http, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events disabled");
                None
            }
        },
        None => None,
    };

    let gateway = Arc::new(EnvGateway {
        auto_approve: config.payment_auto_approve,
    });
    let state = AppState::new(db, gateway, nats, config.payment_capture_timeout);

    let app = http::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("storefront listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
