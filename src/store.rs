use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    ChangeType, ChangelogEntry, EntryStatus, ParsedCommit, PlanTier, Project, User,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    login TEXT NOT NULL UNIQUE,
    session_token TEXT NOT NULL UNIQUE,
    github_token TEXT,
    plan TEXT NOT NULL DEFAULT 'FREE',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    repo_owner TEXT NOT NULL,
    repo_name TEXT NOT NULL,
    repo_full_name TEXT NOT NULL,
    api_key TEXT NOT NULL UNIQUE,
    theme_color TEXT NOT NULL DEFAULT '#0ea5e9',
    position TEXT NOT NULL DEFAULT 'bottom-right',
    last_sync_at TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, repo_full_name)
);

CREATE TABLE IF NOT EXISTS changelog_entries (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT,
    change_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'DRAFT',
    commit_hash TEXT NOT NULL,
    author_name TEXT,
    author_avatar TEXT,
    created_at TEXT NOT NULL,
    published_at TEXT,
    UNIQUE (project_id, commit_hash)
);
"#;

pub async fn init_schema(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Users

pub async fn create_user(
    pool: &SqlitePool,
    login: &str,
    session_token: &str,
    github_token: Option<&str>,
    plan: PlanTier,
) -> Result<User, AppError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO users (id, login, session_token, github_token, plan, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(login)
    .bind(session_token)
    .bind(github_token)
    .bind(plan)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    user_by_id(pool, &id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("user vanished after insert")))
}

pub async fn user_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn user_by_session_token(
    pool: &SqlitePool,
    session_token: &str,
) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE session_token = ?")
        .bind(session_token)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

// ---------------------------------------------------------------------------
// Projects

/// Project row plus its changelog entry count, for the dashboard listing.
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithCount {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub project: Project,
    pub entry_count: i64,
}

pub async fn create_project(
    pool: &SqlitePool,
    user_id: &str,
    repo_owner: &str,
    repo_name: &str,
    repo_full_name: &str,
    theme_color: Option<&str>,
) -> Result<Project, AppError> {
    let id = Uuid::new_v4().to_string();
    let api_key = Uuid::new_v4().simple().to_string();

    // The (user_id, repo_full_name) unique index is the source of truth for
    // "already tracked"; two concurrent creates both land here and the
    // loser gets a clean conflict instead of a constraint blowup.
    let inserted = sqlx::query(
        "INSERT INTO projects
            (id, user_id, repo_owner, repo_name, repo_full_name, api_key, theme_color, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(repo_owner)
    .bind(repo_name)
    .bind(repo_full_name)
    .bind(&api_key)
    .bind(theme_color.unwrap_or("#0ea5e9"))
    .bind(Utc::now())
    .execute(pool)
    .await;

    if let Err(err) = inserted {
        if let sqlx::Error::Database(db_err) = &err {
            if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                return Err(AppError::Conflict("repository is already tracked".to_string()));
            }
        }
        return Err(err.into());
    }

    project_by_id(pool, &id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("project vanished after insert")))
}

pub async fn project_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Project>, AppError> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(project)
}

pub async fn project_by_api_key(
    pool: &SqlitePool,
    api_key: &str,
) -> Result<Option<Project>, AppError> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE api_key = ?")
        .bind(api_key)
        .fetch_optional(pool)
        .await?;
    Ok(project)
}

pub async fn projects_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<ProjectWithCount>, AppError> {
    let projects = sqlx::query_as::<_, ProjectWithCount>(
        "SELECT p.*,
                (SELECT COUNT(*) FROM changelog_entries e WHERE e.project_id = p.id) AS entry_count
         FROM projects p
         WHERE p.user_id = ?
         ORDER BY p.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(projects)
}

pub async fn delete_project(pool: &SqlitePool, id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Advances the sync checkpoint. Called exactly once per completed sync.
pub async fn touch_last_sync(
    pool: &SqlitePool,
    project_id: &str,
    instant: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query("UPDATE projects SET last_sync_at = ? WHERE id = ?")
        .bind(instant)
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Changelog entries

pub async fn entry_by_id(pool: &SqlitePool, id: &str) -> Result<Option<ChangelogEntry>, AppError> {
    let entry = sqlx::query_as::<_, ChangelogEntry>("SELECT * FROM changelog_entries WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(entry)
}

pub async fn entries_for_project(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<ChangelogEntry>, AppError> {
    let entries = sqlx::query_as::<_, ChangelogEntry>(
        "SELECT * FROM changelog_entries WHERE project_id = ? ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Published entries only, newest-published-first, for the public API.
pub async fn published_entries(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<ChangelogEntry>, AppError> {
    let entries = sqlx::query_as::<_, ChangelogEntry>(
        "SELECT * FROM changelog_entries
         WHERE project_id = ? AND status = 'PUBLISHED'
         ORDER BY published_at DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Dedup gate: has this commit already been imported for this project?
pub async fn entry_exists(
    pool: &SqlitePool,
    project_id: &str,
    commit_hash: &str,
) -> Result<bool, AppError> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM changelog_entries WHERE project_id = ? AND commit_hash = ?")
            .bind(project_id)
            .bind(commit_hash)
            .fetch_optional(pool)
            .await?;
    Ok(existing.is_some())
}

/// Inserts a draft entry for an accepted commit. Returns false when a
/// concurrent sync won the race on (project_id, commit_hash).
pub async fn insert_draft_entry(
    pool: &SqlitePool,
    project_id: &str,
    commit: &ParsedCommit,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "INSERT INTO changelog_entries
            (id, project_id, title, description, change_type, status,
             commit_hash, author_name, author_avatar, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (project_id, commit_hash) DO NOTHING",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(project_id)
    .bind(&commit.title)
    .bind(&commit.description)
    .bind(commit.change_type)
    .bind(EntryStatus::Draft)
    .bind(&commit.hash)
    .bind(&commit.author_name)
    .bind(&commit.author_avatar)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Applies a user edit. `published_at` is decided by the caller: stamped on
/// the first transition to Published, retained on every later transition.
pub async fn update_entry(
    pool: &SqlitePool,
    id: &str,
    title: &str,
    description: Option<&str>,
    change_type: ChangeType,
    status: EntryStatus,
    published_at: Option<DateTime<Utc>>,
) -> Result<ChangelogEntry, AppError> {
    sqlx::query(
        "UPDATE changelog_entries
         SET title = ?, description = ?, change_type = ?, status = ?, published_at = ?
         WHERE id = ?",
    )
    .bind(title)
    .bind(description)
    .bind(change_type)
    .bind(status)
    .bind(published_at)
    .bind(id)
    .execute(pool)
    .await?;

    entry_by_id(pool, id)
        .await?
        .ok_or(AppError::NotFound("changelog entry"))
}

pub async fn delete_entry(pool: &SqlitePool, id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM changelog_entries WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
