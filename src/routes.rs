use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::models::{ChangeType, ChangelogEntry, EntryStatus, PlanTier, Project, User};
use crate::{store, sync, AppState};

pub fn router(state: AppState) -> Router {
    // The widget API is the only cross-origin surface: any origin, GET and
    // OPTIONS only.
    let public = Router::new()
        .route("/api/v1/logs", get(public_logs))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(Any),
        );

    Router::new()
        .route("/health", get(health))
        .route("/api/projects", post(create_project).get(list_projects))
        .route("/api/projects/:id", get(get_project).delete(delete_project))
        .route("/api/projects/:id/changelogs", get(list_project_entries))
        .route(
            "/api/changelog/:id",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
        .route("/api/sync", post(sync_project))
        .route("/api/repositories", get(list_repositories))
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Resolves the bearer session token to a user. Token issuance lives
/// outside this service; here a session is just an opaque credential.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized("missing session token"))?;

    store::user_by_session_token(&state.db, token)
        .await?
        .ok_or(AppError::Unauthorized("invalid session token"))
}

/// Existence is checked before ownership, so an unknown id is 404 and a
/// foreign id is 403, consistently across all project endpoints.
async fn load_owned_project(
    state: &AppState,
    project_id: &str,
    user_id: &str,
) -> Result<Project, AppError> {
    let project = store::project_by_id(&state.db, project_id)
        .await?
        .ok_or(AppError::NotFound("project"))?;

    if project.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    Ok(project)
}

/// Ownership of an entry goes through its parent project.
async fn load_owned_entry(
    state: &AppState,
    entry_id: &str,
    user_id: &str,
) -> Result<ChangelogEntry, AppError> {
    let entry = store::entry_by_id(&state.db, entry_id)
        .await?
        .ok_or(AppError::NotFound("changelog entry"))?;

    let project = store::project_by_id(&state.db, &entry.project_id)
        .await?
        .ok_or(AppError::NotFound("project"))?;

    if project.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    Ok(entry)
}

// ---------------------------------------------------------------------------
// Projects

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectRequest {
    repo_name: Option<String>,
    repo_owner: Option<String>,
    repo_full_name: Option<String>,
    theme_color: Option<String>,
}

async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateProjectRequest>,
) -> Result<Json<Project>, AppError> {
    let user = authenticate(&state, &headers).await?;

    let required = |field: Option<String>, name: &str| {
        field
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    };

    let repo_name = required(request.repo_name, "repoName")?;
    let repo_owner = required(request.repo_owner, "repoOwner")?;
    let repo_full_name = required(request.repo_full_name, "repoFullName")?;

    let project = store::create_project(
        &state.db,
        &user.id,
        &repo_owner,
        &repo_name,
        &repo_full_name,
        request.theme_color.as_deref(),
    )
    .await?;

    tracing::info!("project {} created for {}", project.repo_full_name, user.login);
    Ok(Json(project))
}

async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<store::ProjectWithCount>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let projects = store::projects_for_user(&state.db, &user.id).await?;
    Ok(Json(projects))
}

async fn get_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Project>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let project = load_owned_project(&state, &id, &user.id).await?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let project = load_owned_project(&state, &id, &user.id).await?;

    // Cascades to the project's changelog entries.
    store::delete_project(&state.db, &project.id).await?;

    tracing::info!("project {} deleted by {}", project.repo_full_name, user.login);
    Ok(Json(json!({ "success": true })))
}

async fn list_project_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChangelogEntry>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let project = load_owned_project(&state, &id, &user.id).await?;
    let entries = store::entries_for_project(&state.db, &project.id).await?;
    Ok(Json(entries))
}

// ---------------------------------------------------------------------------
// Changelog entries

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateEntryRequest {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    change_type: Option<ChangeType>,
    status: Option<EntryStatus>,
}

async fn get_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ChangelogEntry>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let entry = load_owned_entry(&state, &id, &user.id).await?;
    Ok(Json(entry))
}

async fn update_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateEntryRequest>,
) -> Result<Json<ChangelogEntry>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let entry = load_owned_entry(&state, &id, &user.id).await?;

    let title = request.title.filter(|t| !t.is_empty()).unwrap_or(entry.title);
    let description = request.description.or(entry.description);
    let change_type = request.change_type.unwrap_or(entry.change_type);
    let status = request.status.unwrap_or(entry.status);

    // The publish timestamp is stamped exactly once, on the first
    // transition to Published. Un-publishing retains it.
    let published_at = match (status, entry.published_at) {
        (EntryStatus::Published, None) => Some(Utc::now()),
        (_, existing) => existing,
    };

    let updated = store::update_entry(
        &state.db,
        &id,
        &title,
        description.as_deref(),
        change_type,
        status,
        published_at,
    )
    .await?;

    Ok(Json(updated))
}

async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let entry = load_owned_entry(&state, &id, &user.id).await?;
    store::delete_entry(&state.db, &entry.id).await?;
    Ok(Json(json!({ "success": true })))
}

// ---------------------------------------------------------------------------
// Sync

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    project_id: Option<String>,
}

async fn sync_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SyncRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = authenticate(&state, &headers).await?;

    let project_id = request
        .project_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("projectId is required".to_string()))?;

    let token = user
        .github_token
        .ok_or(AppError::Unauthorized("no source-control credential on file"))?;

    // Serialize concurrent syncs of the same project.
    let lock = state.sync_locks.lock_for(&project_id);
    let _guard = lock.lock().await;

    let outcome = sync::sync_project(
        &state.db,
        state.host.as_ref(),
        &state.classifier,
        &project_id,
        &user.id,
        &token,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "created": outcome.created,
        "skipped": outcome.skipped,
        "total": outcome.total,
    })))
}

// ---------------------------------------------------------------------------
// Repositories

async fn list_repositories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<crate::github::Repository>>, AppError> {
    let user = authenticate(&state, &headers).await?;

    let token = user
        .github_token
        .ok_or(AppError::Unauthorized("no source-control credential on file"))?;

    let repositories = state.host.user_repositories(&token).await?;
    Ok(Json(repositories))
}

// ---------------------------------------------------------------------------
// Public widget API

#[derive(Debug, Deserialize)]
struct LogsQuery {
    key: Option<String>,
}

async fn public_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> Result<Response, AppError> {
    let caller = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .unwrap_or("unknown");

    if !state.rate_limiter.check(caller) {
        return Err(AppError::RateLimited);
    }

    let api_key = query
        .key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AppError::Validation("key parameter is required".to_string()))?;

    // Unknown keys are a plain 404 with no hint about which keys exist.
    let project = store::project_by_api_key(&state.db, &api_key)
        .await?
        .ok_or(AppError::NotFound("project"))?;

    let owner = store::user_by_id(&state.db, &project.user_id)
        .await?
        .ok_or(AppError::NotFound("project"))?;

    let mut entries = store::published_entries(&state.db, &project.id).await?;

    let free_tier = owner.plan == PlanTier::Free;
    if free_tier {
        entries.truncate(10);
    }

    let logs: Vec<serde_json::Value> = entries
        .iter()
        .map(|entry| {
            let date = entry.published_at.unwrap_or(entry.created_at);
            json!({
                "id": entry.id,
                "type": entry.change_type.widget_label(),
                "title": entry.title,
                "description": entry.description,
                "date": date.format("%Y-%m-%d").to_string(),
            })
        })
        .collect();

    let body = json!({
        "color": project.theme_color,
        "position": project.position,
        "showBranding": free_tier,
        "logs": logs,
    });

    Ok((
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(body),
    )
        .into_response())
}
