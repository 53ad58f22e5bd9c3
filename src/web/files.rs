use std::path::Path;

use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::web::{
    ApiError, ApiMessage, AppState, json_error,
    models::FileRow,
    storage,
    uploads::{self, ALLOWED_TYPES_HINT},
};

const FILE_COLUMNS: &str = "id, name, original_name, mime_type, size, path, question_id, folder_id,
            created_at, updated_at";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileQuery {
    id: Option<String>,
    download: Option<String>,
    folder_id: Option<String>,
    question_id: Option<String>,
    root_only: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMove {
    id: Option<String>,
    // double Option: absent leaves the folder unchanged, null moves to root
    #[serde(default, deserialize_with = "deserialize_folder_field")]
    folder_id: Option<Option<String>>,
}

#[derive(Deserialize)]
pub struct FileDeleteQuery {
    id: Option<String>,
}

pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    if let Some(id) = &query.id {
        let file = fetch_file(&state, id)
            .await?
            .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "File not found"))?;

        if query.download.as_deref() == Some("true") {
            return download_file(&file).await;
        }
        return Ok(Json(file).into_response());
    }

    let rows = if let Some(folder_id) = query.folder_id {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE folder_id = ? ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, FileRow>(&sql)
            .bind(folder_id)
            .fetch_all(state.pool_ref())
            .await
    } else if let Some(question_id) = query.question_id {
        let sql = if query.root_only.as_deref() == Some("true") {
            format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE question_id = ? AND folder_id IS NULL ORDER BY created_at DESC"
            )
        } else {
            format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE question_id = ? ORDER BY created_at DESC"
            )
        };
        sqlx::query_as::<_, FileRow>(&sql)
            .bind(question_id)
            .fetch_all(state.pool_ref())
            .await
    } else {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files ORDER BY created_at DESC");
        sqlx::query_as::<_, FileRow>(&sql)
            .fetch_all(state.pool_ref())
            .await
    }
    .map_err(|err| {
        error!(?err, "failed to list files");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch files")
    })?;

    Ok(Json(rows).into_response())
}

pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let form = uploads::read_upload_form(multipart)
        .await
        .map_err(|err| json_error(StatusCode::BAD_REQUEST, err.message()))?;

    let incoming = form
        .file
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "No file provided"))?;
    let question_id = form
        .question_id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Question ID is required"))?;

    let question: Option<String> = sqlx::query_scalar("SELECT id FROM questions WHERE id = ?")
        .bind(&question_id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up question");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload file")
        })?;
    if question.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "Question not found"));
    }

    if let Some(folder_id) = &form.folder_id {
        ensure_folder_in_question(&state, folder_id, &question_id).await?;
    }

    if !uploads::is_allowed_type(&incoming.content_type) {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            format!(
                "File type \"{}\" is not allowed. {ALLOWED_TYPES_HINT}",
                incoming.content_type
            ),
        ));
    }

    let stored = uploads::store_upload(state.uploads_dir(), &incoming)
        .await
        .map_err(|err| {
            error!(%err, "failed to store upload");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload file")
        })?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    let insert = sqlx::query(
        "INSERT INTO files (id, name, original_name, mime_type, size, path, question_id,
                            folder_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&stored.stored_name)
    .bind(&incoming.original_name)
    .bind(&incoming.content_type)
    .bind(stored.size as i64)
    .bind(stored.stored_path.to_string_lossy().into_owned())
    .bind(&question_id)
    .bind(&form.folder_id)
    .bind(now)
    .bind(now)
    .execute(state.pool_ref())
    .await;

    if let Err(err) = insert {
        error!(?err, "failed to insert file record");
        // stored blob would otherwise be orphaned
        if let Err(err) = tokio::fs::remove_file(&stored.stored_path).await {
            warn!(?err, "failed to remove orphaned upload");
        }
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to upload file",
        ));
    }

    let file = fetch_file(&state, &id).await?.ok_or_else(|| {
        error!("uploaded file record missing after insert");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload file")
    })?;
    Ok((StatusCode::CREATED, Json(file)))
}

pub async fn move_file(
    State(state): State<AppState>,
    Json(body): Json<FileMove>,
) -> Result<Json<FileRow>, (StatusCode, Json<ApiError>)> {
    let id = body
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "File ID is required"))?;

    let existing = fetch_file(&state, &id)
        .await?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "File not found"))?;

    let folder_id = match body.folder_id {
        Some(folder_id) => folder_id,
        None => existing.folder_id.clone(),
    };
    if let Some(folder_id) = &folder_id {
        ensure_folder_in_question(&state, folder_id, &existing.question_id).await?;
    }

    sqlx::query("UPDATE files SET folder_id = ?, updated_at = ? WHERE id = ?")
        .bind(&folder_id)
        .bind(chrono::Utc::now())
        .bind(&id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to update file");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update file")
        })?;

    let file = fetch_file(&state, &id)
        .await?
        .ok_or_else(|| json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch file"))?;
    Ok(Json(file))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Query(query): Query<FileDeleteQuery>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiError>)> {
    let id = query
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "File ID is required"))?;

    let file = fetch_file(&state, &id)
        .await?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "File not found"))?;

    if let Err(err) = tokio::fs::remove_file(&file.path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(?err, file = %file.path, "failed to remove stored file");
        }
    }

    sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(&id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete file");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete file")
        })?;

    Ok(Json(ApiMessage::new("File deleted successfully")))
}

async fn download_file(file: &FileRow) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let path = Path::new(&file.path);
    if !matches!(tokio::fs::try_exists(path).await, Ok(true)) {
        return Err(json_error(StatusCode::NOT_FOUND, "File not found on disk"));
    }

    let download_name = sanitize_filename::sanitize(&file.original_name);
    storage::stream_file(path, &download_name, &file.mime_type).await
}

async fn ensure_folder_in_question(
    state: &AppState,
    folder_id: &str,
    question_id: &str,
) -> Result<(), (StatusCode, Json<ApiError>)> {
    let owner: Option<String> = sqlx::query_scalar("SELECT question_id FROM folders WHERE id = ?")
        .bind(folder_id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up folder");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file")
        })?;

    match owner {
        None => Err(json_error(StatusCode::NOT_FOUND, "Folder not found")),
        Some(owner) if owner != question_id => Err(json_error(
            StatusCode::BAD_REQUEST,
            "Folder does not belong to this question",
        )),
        Some(_) => Ok(()),
    }
}

async fn fetch_file(
    state: &AppState,
    id: &str,
) -> Result<Option<FileRow>, (StatusCode, Json<ApiError>)> {
    sqlx::query_as::<_, FileRow>(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?"))
        .bind(id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to fetch file");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch file")
        })
}

// Accepts a string, the literal string "null", or JSON null; the dashboard
// sends "null" when dragging a file back to the question root.
fn deserialize_folder_field<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(Some(value.filter(|v| {
        let trimmed = v.trim();
        !trimmed.is_empty() && trimmed != "null"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_body_distinguishes_absent_null_and_named_folder() {
        let absent: FileMove = serde_json::from_str(r#"{"id":"fl-1"}"#).unwrap();
        assert_eq!(absent.folder_id, None);

        let to_root: FileMove = serde_json::from_str(r#"{"id":"fl-1","folderId":null}"#).unwrap();
        assert_eq!(to_root.folder_id, Some(None));

        let quirk: FileMove = serde_json::from_str(r#"{"id":"fl-1","folderId":"null"}"#).unwrap();
        assert_eq!(quirk.folder_id, Some(None));

        let named: FileMove = serde_json::from_str(r#"{"id":"fl-1","folderId":"fd-9"}"#).unwrap();
        assert_eq!(named.folder_id, Some(Some("fd-9".to_string())));
    }
}
