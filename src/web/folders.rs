use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::error;
use uuid::Uuid;

use crate::web::{
    ApiError, ApiMessage, AppState, json_error,
    models::{FileRow, FolderRow},
    questions::unlink_attached_files,
    subjects::clean_optional,
};

const DEFAULT_COLOR: &str = "blue";
const DEFAULT_ICON: &str = "folder";

const LIST_SQL: &str = "SELECT fo.id, fo.name, fo.description, fo.color, fo.icon, fo.question_id,
            fo.created_at, fo.updated_at, COUNT(f.id) AS file_count
     FROM folders fo
     LEFT JOIN files f ON f.folder_id = fo.id";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderQuery {
    id: Option<String>,
    question_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderCreate {
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    color: Option<String>,
    icon: Option<String>,
    question_id: Option<String>,
}

#[derive(Deserialize)]
pub struct FolderUpdate {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    color: Option<String>,
    icon: Option<String>,
}

#[derive(Deserialize)]
pub struct FolderDeleteQuery {
    id: Option<String>,
}

/// Folder with its contained files, for the detail view.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FolderDetail {
    #[serde(flatten)]
    folder: FolderRow,
    files: Vec<FileRow>,
}

pub async fn list_folders(
    State(state): State<AppState>,
    Query(query): Query<FolderQuery>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    if let Some(id) = query.id {
        let detail = fetch_folder_detail(&state, &id).await?;
        return Ok(Json(detail).into_response());
    }

    let rows = match query.question_id {
        Some(question_id) => {
            let sql = format!(
                "{LIST_SQL} WHERE fo.question_id = ? GROUP BY fo.id ORDER BY fo.created_at ASC"
            );
            sqlx::query_as::<_, FolderRow>(&sql)
                .bind(question_id)
                .fetch_all(state.pool_ref())
                .await
        }
        None => {
            let sql = format!("{LIST_SQL} GROUP BY fo.id ORDER BY fo.created_at DESC");
            sqlx::query_as::<_, FolderRow>(&sql)
                .fetch_all(state.pool_ref())
                .await
        }
    }
    .map_err(|err| {
        error!(?err, "failed to list folders");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch folders")
    })?;

    Ok(Json(rows).into_response())
}

pub async fn create_folder(
    State(state): State<AppState>,
    Json(body): Json<FolderCreate>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Folder name is required"))?
        .to_string();
    let question_id = body
        .question_id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Question ID is required"))?;

    let question: Option<String> = sqlx::query_scalar("SELECT id FROM questions WHERE id = ?")
        .bind(&question_id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up question");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create folder")
        })?;
    if question.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "Question not found"));
    }

    ensure_name_free(state.pool_ref(), &question_id, &name, None).await?;

    let color = non_empty_or(body.color, DEFAULT_COLOR);
    let icon = non_empty_or(body.icon, DEFAULT_ICON);

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO folders (id, name, description, color, icon, question_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&name)
    .bind(clean_optional(body.description))
    .bind(&color)
    .bind(&icon)
    .bind(&question_id)
    .bind(now)
    .bind(now)
    .execute(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to insert folder");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create folder")
    })?;

    let folder = fetch_folder(&state, &id).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

pub async fn update_folder(
    State(state): State<AppState>,
    Json(body): Json<FolderUpdate>,
) -> Result<Json<FolderRow>, (StatusCode, Json<ApiError>)> {
    let id = body
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Folder ID is required"))?;

    let existing = sqlx::query_as::<_, (String, String, Option<String>, String, String)>(
        "SELECT question_id, name, description, color, icon FROM folders WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to look up folder");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update folder")
    })?;
    let Some((question_id, existing_name, existing_description, existing_color, existing_icon)) =
        existing
    else {
        return Err(json_error(StatusCode::NOT_FOUND, "Folder not found"));
    };

    let name = match body.name {
        Some(name) => {
            let trimmed = name.trim().to_string();
            if trimmed.is_empty() {
                return Err(json_error(StatusCode::BAD_REQUEST, "Folder name is required"));
            }
            trimmed
        }
        None => existing_name.clone(),
    };
    if name != existing_name {
        ensure_name_free(state.pool_ref(), &question_id, &name, Some(&id)).await?;
    }

    let description = match body.description {
        Some(description) => clean_optional(Some(description)),
        None => existing_description,
    };
    let color = non_empty_or(body.color, &existing_color);
    let icon = non_empty_or(body.icon, &existing_icon);

    sqlx::query(
        "UPDATE folders SET name = ?, description = ?, color = ?, icon = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&name)
    .bind(&description)
    .bind(&color)
    .bind(&icon)
    .bind(chrono::Utc::now())
    .bind(&id)
    .execute(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update folder");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update folder")
    })?;

    let folder = fetch_folder(&state, &id).await?;
    Ok(Json(folder))
}

pub async fn delete_folder(
    State(state): State<AppState>,
    Query(query): Query<FolderDeleteQuery>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiError>)> {
    let id = query
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Folder ID is required"))?;

    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM folders WHERE id = ?")
        .bind(&id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up folder");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete folder")
        })?;
    if exists.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "Folder not found"));
    }

    unlink_attached_files(&state, "SELECT path FROM files WHERE folder_id = ?", &id).await;

    sqlx::query("DELETE FROM folders WHERE id = ?")
        .bind(&id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete folder");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete folder")
        })?;

    Ok(Json(ApiMessage::new("Folder deleted successfully")))
}

/// Pre-check for the per-question uniqueness of a folder name.
async fn ensure_name_free(
    pool: &SqlitePool,
    question_id: &str,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<(), (StatusCode, Json<ApiError>)> {
    let duplicate: Option<String> = sqlx::query_scalar(
        "SELECT id FROM folders WHERE question_id = ? AND name = ? AND id != ?",
    )
    .bind(question_id)
    .bind(name)
    .bind(exclude_id.unwrap_or(""))
    .fetch_optional(pool)
    .await
    .map_err(|err| {
        error!(?err, "failed to check folder uniqueness");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save folder")
    })?;

    if duplicate.is_some() {
        return Err(json_error(
            StatusCode::CONFLICT,
            "A folder with this name already exists for this question",
        ));
    }
    Ok(())
}

async fn fetch_folder(
    state: &AppState,
    id: &str,
) -> Result<FolderRow, (StatusCode, Json<ApiError>)> {
    let sql = format!("{LIST_SQL} WHERE fo.id = ? GROUP BY fo.id");
    sqlx::query_as::<_, FolderRow>(&sql)
        .bind(id)
        .fetch_one(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to load folder after write");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch folder")
        })
}

async fn fetch_folder_detail(
    state: &AppState,
    id: &str,
) -> Result<FolderDetail, (StatusCode, Json<ApiError>)> {
    let sql = format!("{LIST_SQL} WHERE fo.id = ? GROUP BY fo.id");
    let folder = sqlx::query_as::<_, FolderRow>(&sql)
        .bind(id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to fetch folder");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch folder")
        })?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Folder not found"))?;

    let files = sqlx::query_as::<_, FileRow>(
        "SELECT id, name, original_name, mime_type, size, path, question_id, folder_id,
                created_at, updated_at
         FROM files WHERE folder_id = ? ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch folder files");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch folder")
    })?;

    Ok(FolderDetail { folder, files })
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .to_string()
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
        sqlx::query(
            "INSERT INTO questions (id, title, content, terminologies, repeat_count, years_appeared,
                                    last_appeared_year, global_importance, calculated_score, marks_id,
                                    created_at, updated_at)
             VALUES ('q-1', 'Myocardial infarction', NULL, NULL, 1, '', NULL, 50, 25.0, 'mk-1', ?, ?)",
        )
        .bind(now).bind(now).execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO folders (id, name, description, color, icon, question_id, created_at, updated_at) VALUES ('fd-1', 'Diagrams', NULL, 'blue', 'folder', 'q-1', ?, ?)")
            .bind(now).bind(now).execute(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn duplicate_name_in_question_is_a_conflict() {
        let pool = test_pool().await;

        let err = ensure_name_free(&pool, "q-1", "Diagrams", None).await.unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);

        assert!(ensure_name_free(&pool, "q-1", "Notes", None).await.is_ok());
    }

    #[tokio::test]
    async fn uniqueness_check_excludes_the_row_being_updated() {
        let pool = test_pool().await;

        // renaming fd-1 to its current name is not a conflict
        assert!(ensure_name_free(&pool, "q-1", "Diagrams", Some("fd-1")).await.is_ok());
    }

    #[test]
    fn blank_colors_fall_back() {
        assert_eq!(non_empty_or(None, DEFAULT_COLOR), "blue");
        assert_eq!(non_empty_or(Some("  ".to_string()), DEFAULT_COLOR), "blue");
        assert_eq!(non_empty_or(Some("red".to_string()), DEFAULT_COLOR), "red");
    }
}
