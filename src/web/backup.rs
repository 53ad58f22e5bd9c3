use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::backup::{self, RestoreStats, SnapshotData, SnapshotFile, SnapshotKind};
use crate::web::{
    ApiError, AppState,
    data::{self, EntityCounts},
    json_error, storage,
};

#[derive(Deserialize)]
pub struct BackupQuery {
    action: Option<String>,
    backup: Option<String>,
}

#[derive(Deserialize)]
pub struct BackupDeleteQuery {
    backup: Option<String>,
}

#[derive(Deserialize)]
pub struct RestoreRequest {
    data: Option<SnapshotData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupStatus {
    database: DatabaseInfo,
    uploads: UploadsInfo,
    counts: EntityCounts,
    backups: Vec<SnapshotFile>,
}

#[derive(Serialize)]
struct DatabaseInfo {
    exists: bool,
    size: u64,
    path: String,
}

#[derive(Serialize)]
struct UploadsInfo {
    count: u64,
    size: u64,
    path: String,
}

#[derive(Serialize)]
pub struct RestoreResponse {
    success: bool,
    message: String,
    stats: RestoreStats,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    success: bool,
    message: String,
}

pub async fn backup_get(
    State(state): State<AppState>,
    Query(query): Query<BackupQuery>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    match query.action.as_deref() {
        Some("status") => backup_status(&state).await,
        Some("export") => export_backup(&state).await,
        _ => match query.backup {
            Some(name) => download_backup(&state, &name).await,
            None => Err(json_error(StatusCode::BAD_REQUEST, "Invalid action")),
        },
    }
}

async fn backup_status(state: &AppState) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let counts = data::entity_counts(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to count entities for backup status");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Backup failed")
        })?;

    let db_size = tokio::fs::metadata(state.db_path())
        .await
        .map(|metadata| metadata.len())
        .ok();
    let (uploads_count, uploads_size) = storage::dir_stats(state.uploads_dir()).await;

    let backups = state.snapshots().list().await.map_err(|err| {
        error!(?err, "failed to list snapshots");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Backup failed")
    })?;

    Ok(Json(BackupStatus {
        database: DatabaseInfo {
            exists: db_size.is_some(),
            size: db_size.unwrap_or(0),
            path: state.db_path().display().to_string(),
        },
        uploads: UploadsInfo {
            count: uploads_count,
            size: uploads_size,
            path: state.uploads_dir().display().to_string(),
        },
        counts,
        backups,
    })
    .into_response())
}

async fn export_backup(state: &AppState) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let (envelope, file) =
        backup::create_snapshot(state.pool_ref(), state.snapshots(), SnapshotKind::Manual)
            .await
            .map_err(|err| {
                error!(?err, "manual snapshot failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Backup failed")
            })?;

    let body = serde_json::to_vec_pretty(&envelope).map_err(|err| {
        error!(?err, "failed to serialize snapshot for download");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Backup failed")
    })?;

    Ok(json_attachment(&file.name, body))
}

async fn download_backup(
    state: &AppState,
    name: &str,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let bytes = state
        .snapshots()
        .read(name)
        .await
        .map_err(|err| {
            error!(?err, "failed to read snapshot");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Backup failed")
        })?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Backup not found"))?;

    Ok(json_attachment(name, bytes))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    Json(body): Json<RestoreRequest>,
) -> Result<Json<RestoreResponse>, (StatusCode, Json<ApiError>)> {
    let data = body
        .data
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "No data provided"))?;

    let stats = backup::apply_snapshot(state.pool_ref(), &data)
        .await
        .map_err(|err| {
            error!(?err, "snapshot import failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Import failed")
        })?;

    Ok(Json(RestoreResponse {
        success: true,
        message: "Data imported successfully".to_string(),
        stats,
    }))
}

pub async fn delete_backup(
    State(state): State<AppState>,
    Query(query): Query<BackupDeleteQuery>,
) -> Result<Json<DeleteResponse>, (StatusCode, Json<ApiError>)> {
    let name = query
        .backup
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Backup name required"))?;

    let removed = state.snapshots().delete(&name).await.map_err(|err| {
        error!(?err, "failed to delete snapshot");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Delete failed")
    })?;
    if !removed {
        return Err(json_error(StatusCode::NOT_FOUND, "Backup not found"));
    }

    Ok(Json(DeleteResponse {
        success: true,
        message: "Backup deleted".to_string(),
    }))
}

fn json_attachment(name: &str, body: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{name}\"");
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}
