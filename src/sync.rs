use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::classify::Classifier;
use crate::error::AppError;
use crate::github::SourceHost;
use crate::store;

/// Result of one sync invocation. `total` is the number of commits fetched,
/// `skipped` counts dedup hits only; merge and unclassifiable commits are
/// excluded without being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub created: u32,
    pub skipped: u32,
    pub total: u32,
}

/// Fetch commits since the project's checkpoint, classify them, gate on the
/// per-project dedup key and persist the survivors as draft entries, then
/// advance the checkpoint.
///
/// The checkpoint moves exactly once, unconditionally, after the whole page
/// has been processed; a sync that fails earlier leaves it untouched and is
/// safe to retry in full.
pub async fn sync_project(
    db: &SqlitePool,
    host: &dyn SourceHost,
    classifier: &Classifier,
    project_id: &str,
    user_id: &str,
    token: &str,
) -> Result<SyncOutcome, AppError> {
    let project = store::project_by_id(db, project_id)
        .await?
        .ok_or(AppError::NotFound("project"))?;

    if project.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let commits = host
        .recent_commits(token, &project.repo_owner, &project.repo_name, project.last_sync_at)
        .await?;

    let total = commits.len() as u32;
    tracing::info!("fetched {} commits for {}", total, project.repo_full_name);

    let mut created = 0u32;
    let mut skipped = 0u32;

    for commit in &commits {
        if Classifier::is_excluded(commit) {
            continue;
        }

        let Some(parsed) = classifier.classify(commit) else {
            continue;
        };

        if store::entry_exists(db, &project.id, &parsed.hash).await? {
            tracing::debug!("commit {} already imported, skipping", parsed.hash);
            skipped += 1;
            continue;
        }

        if store::insert_draft_entry(db, &project.id, &parsed).await? {
            created += 1;
        } else {
            // Lost a race against a concurrent insert of the same hash.
            skipped += 1;
        }
    }

    store::touch_last_sync(db, &project.id, Utc::now()).await?;

    tracing::info!(
        "sync finished for {}: created={} skipped={} total={}",
        project.repo_full_name,
        created,
        skipped,
        total
    );

    Ok(SyncOutcome { created, skipped, total })
}

/// One async mutex per project id. The sync handler holds the project's
/// mutex across the whole orchestrator run, so two concurrent syncs of the
/// same project serialize instead of racing on the checkpoint.
///
/// The table holds only in-flight locks: every `lock_for` call first drops
/// entries nobody else is holding, so requests for bogus project ids cannot
/// grow it without bound.
#[derive(Default)]
pub struct SyncLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SyncLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut inner = self.inner.lock().expect("sync lock table poisoned");
        // Strong count 1 means only the table itself still holds the lock.
        inner.retain(|_, lock| Arc::strong_count(lock) > 1);
        inner.entry(project_id.to_string()).or_default().clone()
    }
}
