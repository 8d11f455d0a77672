use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shiplog::classify::Classifier;
use shiplog::github::{GitHubClient, DEFAULT_API_URL};
use shiplog::rate_limit::RateLimiter;
use shiplog::sync::SyncLocks;
use shiplog::{routes, store, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://shiplog.db".into());
    let github_api_url =
        std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());

    let options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    store::init_schema(&pool).await?;
    tracing::info!("Connected to SQLite database");

    let state = AppState {
        db: pool,
        host: Arc::new(GitHubClient::new(github_api_url)?),
        classifier: Arc::new(Classifier::new()),
        // Public widget API quota: 60 requests per caller per minute.
        rate_limiter: Arc::new(RateLimiter::new(60, Duration::from_secs(60))),
        sync_locks: Arc::new(SyncLocks::new()),
    };

    let app = routes::router(state);

    let addr = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("shiplog listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
