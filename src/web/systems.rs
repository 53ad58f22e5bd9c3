use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::web::{
    ApiError, ApiMessage, AppState, json_error, models::SystemRow, subjects::clean_optional,
};

const LIST_SQL: &str = "SELECT sy.id, sy.name, sy.description, sy.subject_id, su.name AS subject_name,
            sy.created_at, sy.updated_at, COUNT(m.id) AS marks_count
     FROM systems sy
     JOIN subjects su ON su.id = sy.subject_id
     LEFT JOIN marks m ON m.system_id = sy.id";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemQuery {
    subject_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemCreate {
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    subject_id: Option<String>,
}

#[derive(Deserialize)]
pub struct SystemDeleteQuery {
    id: Option<String>,
}

pub async fn list_systems(
    State(state): State<AppState>,
    Query(query): Query<SystemQuery>,
) -> Result<Json<Vec<SystemRow>>, (StatusCode, Json<ApiError>)> {
    let systems = match query.subject_id {
        Some(subject_id) => {
            let sql =
                format!("{LIST_SQL} WHERE sy.subject_id = ? GROUP BY sy.id ORDER BY sy.created_at DESC");
            sqlx::query_as::<_, SystemRow>(&sql)
                .bind(subject_id)
                .fetch_all(state.pool_ref())
                .await
        }
        None => {
            let sql = format!("{LIST_SQL} GROUP BY sy.id ORDER BY sy.created_at DESC");
            sqlx::query_as::<_, SystemRow>(&sql)
                .fetch_all(state.pool_ref())
                .await
        }
    }
    .map_err(|err| {
        error!(?err, "failed to list systems");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch systems")
    })?;

    Ok(Json(systems))
}

pub async fn create_system(
    State(state): State<AppState>,
    Json(body): Json<SystemCreate>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "System name is required"))?
        .to_string();
    let subject_id = body
        .subject_id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Subject ID is required"))?;

    let subject: Option<String> = sqlx::query_scalar("SELECT id FROM subjects WHERE id = ?")
        .bind(&subject_id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up subject");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create system")
        })?;
    if subject.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "Subject not found"));
    }

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO systems (id, name, description, subject_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&name)
    .bind(clean_optional(body.description))
    .bind(&subject_id)
    .bind(now)
    .bind(now)
    .execute(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to insert system");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create system")
    })?;

    let sql = format!("{LIST_SQL} WHERE sy.id = ? GROUP BY sy.id");
    let system = sqlx::query_as::<_, SystemRow>(&sql)
        .bind(&id)
        .fetch_one(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to load system after write");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch system")
        })?;

    Ok((StatusCode::CREATED, Json(system)))
}

pub async fn delete_system(
    State(state): State<AppState>,
    Query(query): Query<SystemDeleteQuery>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiError>)> {
    let id = query
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "System ID is required"))?;

    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM systems WHERE id = ?")
        .bind(&id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up system");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete system")
        })?;
    if exists.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "System not found"));
    }

    sqlx::query("DELETE FROM systems WHERE id = ?")
        .bind(&id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete system");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete system")
        })?;

    Ok(Json(ApiMessage::new("System deleted successfully")))
}
