use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::web::{ApiError, ApiMessage, AppState, json_error, models::SubjectRow};

const LIST_SQL: &str = "SELECT s.id, s.name, s.description, s.created_at, s.updated_at,
            COUNT(sy.id) AS system_count
     FROM subjects s
     LEFT JOIN systems sy ON sy.subject_id = s.id";

#[derive(Deserialize)]
pub struct SubjectCreate {
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
pub struct SubjectDeleteQuery {
    id: Option<String>,
}

pub async fn list_subjects(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubjectRow>>, (StatusCode, Json<ApiError>)> {
    let sql = format!("{LIST_SQL} GROUP BY s.id ORDER BY s.created_at DESC");
    let subjects = sqlx::query_as::<_, SubjectRow>(&sql)
        .fetch_all(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to list subjects");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch subjects")
        })?;

    Ok(Json(subjects))
}

pub async fn create_subject(
    State(state): State<AppState>,
    Json(body): Json<SubjectCreate>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Subject name is required"))?
        .to_string();
    let description = clean_optional(body.description);

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO subjects (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&name)
    .bind(&description)
    .bind(now)
    .bind(now)
    .execute(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to insert subject");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create subject")
    })?;

    let subject = fetch_subject(&state, &id).await?;
    Ok((StatusCode::CREATED, Json(subject)))
}

pub async fn delete_subject(
    State(state): State<AppState>,
    Query(query): Query<SubjectDeleteQuery>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiError>)> {
    let id = query
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Subject ID is required"))?;

    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM subjects WHERE id = ?")
        .bind(&id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up subject");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete subject")
        })?;
    if exists.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "Subject not found"));
    }

    // descendants go with it via cascade
    sqlx::query("DELETE FROM subjects WHERE id = ?")
        .bind(&id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete subject");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete subject")
        })?;

    Ok(Json(ApiMessage::new("Subject deleted successfully")))
}

async fn fetch_subject(
    state: &AppState,
    id: &str,
) -> Result<SubjectRow, (StatusCode, Json<ApiError>)> {
    let sql = format!("{LIST_SQL} WHERE s.id = ? GROUP BY s.id");
    sqlx::query_as::<_, SubjectRow>(&sql)
        .bind(id)
        .fetch_one(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to load subject after write");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch subject")
        })
}

pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
