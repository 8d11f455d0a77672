#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use shiplog::classify::Classifier;
use shiplog::error::AppError;
use shiplog::github::{Repository, RepositoryOwner, SourceHost};
use shiplog::models::{ChangeType, ParsedCommit, RawCommit};
use shiplog::rate_limit::RateLimiter;
use shiplog::store;
use shiplog::sync::SyncLocks;
use shiplog::AppState;

/// In-memory stand-in for the GitHub API.
pub struct FakeHost {
    pub commits: Mutex<Vec<RawCommit>>,
    pub repositories: Vec<Repository>,
    /// When set, `since` is ignored and the full commit list is returned on
    /// every fetch, so reruns see the same upstream page again.
    pub ignore_since: bool,
    /// When set, every fetch fails like an unreachable host.
    pub fail_fetch: bool,
}

impl FakeHost {
    pub fn new(commits: Vec<RawCommit>) -> Self {
        Self {
            commits: Mutex::new(commits),
            repositories: Vec::new(),
            ignore_since: false,
            fail_fetch: false,
        }
    }
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn recent_commits(
        &self,
        _token: &str,
        _owner: &str,
        _repo: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawCommit>, AppError> {
        if self.fail_fetch {
            return Err(AppError::Upstream("host unreachable".to_string()));
        }

        let commits = self.commits.lock().unwrap();
        let since = if self.ignore_since { None } else { since };
        Ok(commits
            .iter()
            .filter(|commit| since.map_or(true, |bound| commit.author_date >= bound))
            .cloned()
            .collect())
    }

    async fn user_repositories(&self, _token: &str) -> Result<Vec<Repository>, AppError> {
        if self.fail_fetch {
            return Err(AppError::Upstream("host unreachable".to_string()));
        }
        Ok(self.repositories.clone())
    }
}

pub fn commit(hash: &str, message: &str) -> RawCommit {
    RawCommit {
        hash: hash.to_string(),
        message: message.to_string(),
        author_name: "Ada".to_string(),
        author_date: Utc::now() - ChronoDuration::hours(1),
        author_avatar: None,
    }
}

pub fn parsed(hash: &str, title: &str, change_type: ChangeType) -> ParsedCommit {
    ParsedCommit {
        hash: hash.to_string(),
        change_type,
        title: title.to_string(),
        description: None,
        author_name: "Ada".to_string(),
        author_avatar: None,
        date: Utc::now(),
    }
}

pub fn repository(owner: &str, name: &str) -> Repository {
    Repository {
        id: 1,
        name: name.to_string(),
        full_name: format!("{owner}/{name}"),
        owner: RepositoryOwner {
            login: owner.to_string(),
        },
        description: None,
        private: false,
    }
}

pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    store::init_schema(&pool).await.unwrap();
    pool
}

pub fn app_state(pool: SqlitePool, host: Arc<FakeHost>) -> AppState {
    AppState {
        db: pool,
        host,
        classifier: Arc::new(Classifier::new()),
        rate_limiter: Arc::new(RateLimiter::new(60, Duration::from_secs(60))),
        sync_locks: Arc::new(SyncLocks::new()),
    }
}
