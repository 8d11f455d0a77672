use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::RawCommit;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Single page, no further pagination: very active repositories only see
/// their most recent page per sync.
const PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Seam over the source-control host. The sync orchestrator and the routes
/// only see this trait, so tests can swap in an in-memory fake.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Latest page of default-branch commits, newest first as returned by
    /// the host, optionally bounded below by `since`. An empty page is a
    /// valid non-error result.
    async fn recent_commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawCommit>, AppError>;

    /// Repositories the token's user can access, most recently updated first.
    async fn user_repositories(&self, token: &str) -> Result<Vec<Repository>, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: RepositoryOwner,
    pub description: Option<String>,
    pub private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
}

// Wire shape of GET /repos/{owner}/{repo}/commits.
#[derive(Debug, Deserialize)]
struct CommitPayload {
    sha: String,
    commit: CommitDetails,
    author: Option<AccountRef>,
}

#[derive(Debug, Deserialize)]
struct CommitDetails {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AccountRef {
    avatar_url: Option<String>,
}

impl From<CommitPayload> for RawCommit {
    fn from(payload: CommitPayload) -> Self {
        let (author_name, author_date) = match payload.commit.author {
            Some(author) => (author.name, author.date),
            None => ("Unknown".to_string(), Utc::now()),
        };
        RawCommit {
            hash: payload.sha,
            message: payload.commit.message,
            author_name,
            author_date,
            author_avatar: payload.author.and_then(|account| account.avatar_url),
        }
    }
}

/// GitHub REST API client. Tokens are per-user and passed per call.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("shiplog/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("{url} returned {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid response from {url}: {e}")))
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn recent_commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawCommit>, AppError> {
        let url = format!("{}/repos/{}/{}/commits", self.base_url, owner, repo);

        let mut query = vec![("per_page", PAGE_SIZE.to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_rfc3339()));
        }

        let page: Vec<CommitPayload> = self.get_json(&url, token, &query).await?;
        tracing::debug!("fetched {} commits from {}/{}", page.len(), owner, repo);

        Ok(page.into_iter().map(RawCommit::from).collect())
    }

    async fn user_repositories(&self, token: &str) -> Result<Vec<Repository>, AppError> {
        let url = format!("{}/user/repos", self.base_url);
        let query = [
            ("sort", "updated".to_string()),
            ("per_page", PAGE_SIZE.to_string()),
        ];
        self.get_json(&url, token, &query).await
    }
}
