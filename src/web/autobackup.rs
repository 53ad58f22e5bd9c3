use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::backup::{
    self, CheckOutcome, SnapshotFile,
    config::{self, BackupConfig, ConfigUpdate},
};
use crate::web::{ApiError, AppState, json_error};

#[derive(Deserialize)]
pub struct AutoBackupQuery {
    action: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigView {
    config: BackupConfig,
    auto_backups: Vec<SnapshotFile>,
    should_backup: bool,
    current_time: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckSkipped {
    needs_backup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_backup: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_backup: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckCompleted {
    needs_backup: bool,
    backup_created: bool,
    backup: SnapshotFile,
    config: BackupConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckFailed {
    needs_backup: bool,
    backup_created: bool,
    error: String,
}

#[derive(Serialize)]
struct ForcedBackup {
    success: bool,
    backup: SnapshotFile,
    config: BackupConfig,
}

#[derive(Serialize)]
pub struct ConfigSaved {
    success: bool,
    config: BackupConfig,
}

pub async fn autobackup_get(
    State(state): State<AppState>,
    Query(query): Query<AutoBackupQuery>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    match query.action.as_deref() {
        Some("config") | None => config_view(&state).await,
        Some("check") => run_check(&state).await,
        Some("now") => run_now(&state).await,
        Some(_) => Err(json_error(StatusCode::BAD_REQUEST, "Invalid action")),
    }
}

async fn config_view(state: &AppState) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let config = config::load(state.backup_config_path()).await;
    let auto_backups = state.snapshots().list_auto().await.map_err(|err| {
        error!(?err, "failed to list automatic snapshots");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to process auto-backup",
        )
    })?;

    let now = Utc::now();
    // unlike the check, the status view only flags a backup as pending when
    // a deadline has actually been armed
    let should_backup = config.auto_backup_enabled
        && config.next_backup.is_some_and(|next| now >= next);

    Ok(Json(ConfigView {
        config,
        auto_backups,
        should_backup,
        current_time: now,
    })
    .into_response())
}

async fn run_check(state: &AppState) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let outcome = backup::run_check(
        state.pool_ref(),
        state.snapshots(),
        state.backup_config_path(),
    )
    .await;

    let response = match outcome {
        CheckOutcome::Disabled => Json(CheckSkipped {
            needs_backup: false,
            message: Some("Auto-backup disabled".to_string()),
            last_backup: None,
            next_backup: None,
        })
        .into_response(),
        CheckOutcome::NotDue {
            last_backup,
            next_backup,
        } => Json(CheckSkipped {
            needs_backup: false,
            message: None,
            last_backup,
            next_backup,
        })
        .into_response(),
        CheckOutcome::Completed { backup, config } => Json(CheckCompleted {
            needs_backup: true,
            backup_created: true,
            backup,
            config,
        })
        .into_response(),
        CheckOutcome::Failed { error } => Json(CheckFailed {
            needs_backup: true,
            backup_created: false,
            error,
        })
        .into_response(),
    };

    Ok(response)
}

async fn run_now(state: &AppState) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let (backup, config) = backup::run_forced(
        state.pool_ref(),
        state.snapshots(),
        state.backup_config_path(),
    )
    .await
    .map_err(|err| {
        error!(?err, "forced snapshot failed");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    })?;

    Ok(Json(ForcedBackup {
        success: true,
        backup,
        config,
    })
    .into_response())
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigSaved>, (StatusCode, Json<ApiError>)> {
    let path = state.backup_config_path();
    let mut config = config::load(path).await;
    config.apply_update(&update, Utc::now());

    config::save(path, &config).await.map_err(|err| {
        error!(?err, "failed to persist backup config");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update config")
    })?;

    Ok(Json(ConfigSaved {
        success: true,
        config,
    }))
}
