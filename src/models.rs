use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic change category of a changelog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Feat,
    Fix,
    Improvement,
}

impl ChangeType {
    /// Lowercase label used by the public widget API.
    pub fn widget_label(&self) -> &'static str {
        match self {
            ChangeType::Feat => "feat",
            ChangeType::Fix => "fix",
            ChangeType::Improvement => "improvement",
        }
    }
}

/// Publication state of a changelog entry. Sync always creates drafts;
/// only an explicit user edit publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    Draft,
    Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum PlanTier {
    Free,
    Pro,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub login: String,
    pub session_token: String,
    pub github_token: Option<String>,
    pub plan: PlanTier,
    pub created_at: DateTime<Utc>,
}

/// One tracked source repository.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub repo_full_name: String,
    pub api_key: String,
    pub theme_color: String,
    pub position: String,
    /// Checkpoint: the instant the last successful sync finished. None
    /// means the next sync fetches from the beginning of history.
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One draft or published change description.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub status: EntryStatus,
    /// Dedup key, unique per project.
    pub commit_hash: String,
    pub author_name: Option<String>,
    pub author_avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Stamped on the first transition to Published and never cleared.
    pub published_at: Option<DateTime<Utc>>,
}

/// Commit as fetched from the source-control host. Lives only for the
/// duration of a sync run, never persisted.
#[derive(Debug, Clone)]
pub struct RawCommit {
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_date: DateTime<Utc>,
    pub author_avatar: Option<String>,
}

/// Classifier output for one accepted commit. Becomes a draft
/// `ChangelogEntry` if it survives the dedup gate.
#[derive(Debug, Clone)]
pub struct ParsedCommit {
    pub hash: String,
    pub change_type: ChangeType,
    pub title: String,
    pub description: Option<String>,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub date: DateTime<Utc>,
}
