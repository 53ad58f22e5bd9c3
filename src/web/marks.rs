use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::error;
use uuid::Uuid;

use crate::web::{
    ApiError, ApiMessage, AppState, json_error, models::MarksRow, subjects::clean_optional,
};

const LIST_SQL: &str = "SELECT m.id, m.value, m.description, m.system_id, sy.subject_id,
            sy.name AS system_name, m.created_at, m.updated_at, COUNT(q.id) AS question_count
     FROM marks m
     JOIN systems sy ON sy.id = m.system_id
     LEFT JOIN questions q ON q.marks_id = m.id";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksQuery {
    id: Option<String>,
    system_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksCreate {
    value: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    system_id: Option<String>,
}

#[derive(Deserialize)]
pub struct MarksUpdate {
    id: Option<String>,
    value: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
pub struct MarksDeleteQuery {
    id: Option<String>,
}

pub async fn list_marks(
    State(state): State<AppState>,
    Query(query): Query<MarksQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ApiError>)> {
    if let Some(id) = query.id {
        let sql = format!("{LIST_SQL} WHERE m.id = ? GROUP BY m.id");
        let marks = sqlx::query_as::<_, MarksRow>(&sql)
            .bind(&id)
            .fetch_optional(state.pool_ref())
            .await
            .map_err(|err| {
                error!(?err, "failed to fetch marks");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch marks")
            })?
            .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Marks not found"))?;
        return Ok(Json(to_value(&marks)?));
    }

    let rows = match query.system_id {
        Some(system_id) => {
            let sql = format!("{LIST_SQL} WHERE m.system_id = ? GROUP BY m.id ORDER BY m.value ASC");
            sqlx::query_as::<_, MarksRow>(&sql)
                .bind(system_id)
                .fetch_all(state.pool_ref())
                .await
        }
        None => {
            let sql = format!("{LIST_SQL} GROUP BY m.id ORDER BY m.value ASC");
            sqlx::query_as::<_, MarksRow>(&sql)
                .fetch_all(state.pool_ref())
                .await
        }
    }
    .map_err(|err| {
        error!(?err, "failed to list marks");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch marks")
    })?;

    Ok(Json(to_value(&rows)?))
}

pub async fn create_marks(
    State(state): State<AppState>,
    Json(body): Json<MarksCreate>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let value = body.value.ok_or_else(|| {
        json_error(
            StatusCode::BAD_REQUEST,
            "Marks value is required and must be a number",
        )
    })?;
    let system_id = body
        .system_id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "System ID is required"))?;

    let system: Option<String> = sqlx::query_scalar("SELECT id FROM systems WHERE id = ?")
        .bind(&system_id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up system");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create marks")
        })?;
    if system.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "System not found"));
    }

    ensure_value_free(state.pool_ref(), &system_id, value, None).await?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO marks (id, value, description, system_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(value)
    .bind(clean_optional(body.description))
    .bind(&system_id)
    .bind(now)
    .bind(now)
    .execute(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to insert marks");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create marks")
    })?;

    let marks = fetch_marks(&state, &id).await?;
    Ok((StatusCode::CREATED, Json(marks)))
}

pub async fn update_marks(
    State(state): State<AppState>,
    Json(body): Json<MarksUpdate>,
) -> Result<Json<MarksRow>, (StatusCode, Json<ApiError>)> {
    let id = body
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Marks ID is required"))?;

    let existing = sqlx::query_as::<_, (i64, String, Option<String>)>(
        "SELECT value, system_id, description FROM marks WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to look up marks");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update marks")
    })?;
    let Some((existing_value, system_id, existing_description)) = existing else {
        return Err(json_error(StatusCode::NOT_FOUND, "Marks not found"));
    };

    let value = body.value.unwrap_or(existing_value);
    if value != existing_value {
        ensure_value_free(state.pool_ref(), &system_id, value, Some(&id)).await?;
    }
    let description = match body.description {
        Some(description) => clean_optional(Some(description)),
        None => existing_description,
    };

    sqlx::query("UPDATE marks SET value = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(value)
        .bind(&description)
        .bind(chrono::Utc::now())
        .bind(&id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to update marks");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update marks")
        })?;

    let marks = fetch_marks(&state, &id).await?;
    Ok(Json(marks))
}

pub async fn delete_marks(
    State(state): State<AppState>,
    Query(query): Query<MarksDeleteQuery>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiError>)> {
    let id = query
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Marks ID is required"))?;

    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM marks WHERE id = ?")
        .bind(&id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up marks");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete marks")
        })?;
    if exists.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "Marks not found"));
    }

    sqlx::query("DELETE FROM marks WHERE id = ?")
        .bind(&id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete marks");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete marks")
        })?;

    Ok(Json(ApiMessage::new("Marks deleted successfully")))
}

/// Pre-check for the per-system uniqueness of a marks value.
async fn ensure_value_free(
    pool: &SqlitePool,
    system_id: &str,
    value: i64,
    exclude_id: Option<&str>,
) -> Result<(), (StatusCode, Json<ApiError>)> {
    let duplicate: Option<String> = sqlx::query_scalar(
        "SELECT id FROM marks WHERE system_id = ? AND value = ? AND id != ?",
    )
    .bind(system_id)
    .bind(value)
    .bind(exclude_id.unwrap_or(""))
    .fetch_optional(pool)
    .await
    .map_err(|err| {
        error!(?err, "failed to check marks uniqueness");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save marks")
    })?;

    if duplicate.is_some() {
        return Err(json_error(
            StatusCode::CONFLICT,
            format!("Marks with value {value} already exists for this system"),
        ));
    }
    Ok(())
}

async fn fetch_marks(state: &AppState, id: &str) -> Result<MarksRow, (StatusCode, Json<ApiError>)> {
    let sql = format!("{LIST_SQL} WHERE m.id = ? GROUP BY m.id");
    sqlx::query_as::<_, MarksRow>(&sql)
        .bind(id)
        .fetch_one(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to load marks after write");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch marks")
        })
}

fn to_value<T: serde::Serialize>(
    value: &T,
) -> Result<serde_json::Value, (StatusCode, Json<ApiError>)> {
    serde_json::to_value(value).map_err(|err| {
        error!(?err, "failed to serialize marks payload");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch marks")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn test_pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let now = Utc::now();
        sqlx::query("INSERT INTO subjects (id, name, description, created_at, updated_at) VALUES ('sub-1', 'Pathology', NULL, ?, ?)")
            .bind(now).bind(now).execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO systems (id, name, description, subject_id, created_at, updated_at) VALUES ('sys-1', 'Cardiovascular', NULL, 'sub-1', ?, ?)")
            .bind(now).bind(now).execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO marks (id, value, description, system_id, created_at, updated_at) VALUES ('mk-1', 5, NULL, 'sys-1', ?, ?)")
            .bind(now).bind(now).execute(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn duplicate_value_in_system_is_a_conflict() {
        let pool = test_pool().await;

        let err = ensure_value_free(&pool, "sys-1", 5, None).await.unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);

        assert!(ensure_value_free(&pool, "sys-1", 10, None).await.is_ok());
    }

    #[tokio::test]
    async fn uniqueness_check_excludes_the_row_being_updated() {
        let pool = test_pool().await;

        // updating mk-1 while keeping its own value is not a conflict
        assert!(ensure_value_free(&pool, "sys-1", 5, Some("mk-1")).await.is_ok());
    }
}
