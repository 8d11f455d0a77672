use std::sync::Arc;

use sqlx::SqlitePool;

pub mod classify;
pub mod error;
pub mod github;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod store;
pub mod sync;

use classify::Classifier;
use github::SourceHost;
use rate_limit::RateLimiter;
use sync::SyncLocks;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub host: Arc<dyn SourceHost>,
    pub classifier: Arc<Classifier>,
    pub rate_limiter: Arc<RateLimiter>,
    pub sync_locks: Arc<SyncLocks>,
}
