use std::path::Path;

use axum::Json;
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::web::{ApiError, json_error};

/// Stream a stored file with a standard attachment disposition.
pub async fn stream_file(
    path: &Path,
    filename: &str,
    content_type: &str,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        error!(?err, file = %path.display(), "failed to read download file");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file")
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    let disposition = format!("attachment; filename=\"{}\"", filename);
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|_| json_error(StatusCode::INTERNAL_SERVER_ERROR, "Invalid download header"))?;
    headers.insert(axum::http::header::CONTENT_DISPOSITION, disposition);

    Ok((headers, bytes).into_response())
}

/// Number of regular files in a directory and their combined size. A missing
/// directory reads as empty.
pub async fn dir_stats(path: &Path) -> (u64, u64) {
    let mut count = 0u64;
    let mut size = 0u64;

    let Ok(mut entries) = tokio::fs::read_dir(path).await else {
        return (count, size);
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(metadata) = entry.metadata().await {
            if metadata.is_file() {
                count += 1;
                size += metadata.len();
            }
        }
    }

    (count, size)
}
