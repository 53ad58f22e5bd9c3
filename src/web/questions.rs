use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::scoring;
use crate::web::{
    ApiError, ApiMessage, AppState, json_error,
    models::{FeaturedQuestionRow, FileRow, MarksRef, QuestionListRow, QuestionRow},
    subjects::clean_optional,
};

const QUESTION_COLUMNS: &str = "id, title, content, terminologies, repeat_count, years_appeared,
            last_appeared_year, global_importance, calculated_score, marks_id,
            created_at, updated_at";

const LIST_SQL: &str = "SELECT q.id, q.title, q.content, q.terminologies, q.repeat_count,
            q.years_appeared, q.last_appeared_year, q.global_importance, q.calculated_score,
            q.marks_id, q.created_at, q.updated_at, COUNT(f.id) AS file_count
     FROM questions q
     LEFT JOIN files f ON f.question_id = q.id";

const FEATURED_SQL: &str = "SELECT q.id, q.title, q.repeat_count, q.calculated_score,
            q.global_importance, q.years_appeared, m.value AS marks_value,
            sy.name AS system_name, su.name AS subject_name, COUNT(f.id) AS file_count
     FROM questions q
     JOIN marks m ON m.id = q.marks_id
     JOIN systems sy ON sy.id = m.system_id
     JOIN subjects su ON su.id = sy.subject_id
     LEFT JOIN files f ON f.question_id = q.id";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionQuery {
    id: Option<String>,
    marks_id: Option<String>,
    subject_id: Option<String>,
    featured: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCreate {
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    terminologies: Option<String>,
    marks_id: Option<String>,
    repeat_count: Option<i64>,
    years_appeared: Option<String>,
    global_importance: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionUpdate {
    id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    terminologies: Option<String>,
    repeat_count: Option<i64>,
    years_appeared: Option<String>,
    global_importance: Option<i64>,
}

#[derive(Deserialize)]
pub struct QuestionDeleteQuery {
    id: Option<String>,
}

/// Question with its marks reference and attached files, for the detail view.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestionDetail {
    #[serde(flatten)]
    question: QuestionRow,
    marks: MarksRef,
    files: Vec<FileRow>,
}

pub async fn list_questions(
    State(state): State<AppState>,
    Query(query): Query<QuestionQuery>,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    // top questions of one subject, for the dashboard's featured panel
    if let (Some(subject_id), Some("true")) = (query.subject_id.as_deref(), query.featured.as_deref())
    {
        let featured = featured_questions(state.pool_ref(), Some(subject_id), 30).await?;
        return Ok(Json(featured).into_response());
    }

    if let Some(id) = query.id {
        let detail = fetch_question_detail(&state, &id).await?;
        return Ok(Json(detail).into_response());
    }

    let rows = match query.marks_id {
        Some(marks_id) => {
            let sql = format!(
                "{LIST_SQL} WHERE q.marks_id = ? GROUP BY q.id
                 ORDER BY q.calculated_score DESC, q.created_at DESC"
            );
            sqlx::query_as::<_, QuestionListRow>(&sql)
                .bind(marks_id)
                .fetch_all(state.pool_ref())
                .await
        }
        None => {
            let sql = format!("{LIST_SQL} GROUP BY q.id ORDER BY q.created_at DESC");
            sqlx::query_as::<_, QuestionListRow>(&sql)
                .fetch_all(state.pool_ref())
                .await
        }
    }
    .map_err(|err| {
        error!(?err, "failed to list questions");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch questions")
    })?;

    Ok(Json(rows).into_response())
}

pub async fn create_question(
    State(state): State<AppState>,
    Json(body): Json<QuestionCreate>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let title = body
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Question title is required"))?
        .to_string();
    let marks_id = body
        .marks_id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Marks ID is required"))?;

    let marks: Option<String> = sqlx::query_scalar("SELECT id FROM marks WHERE id = ?")
        .bind(&marks_id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up marks");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create question")
        })?;
    if marks.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "Marks not found"));
    }

    let repeat_count = body.repeat_count.unwrap_or(1).max(1);
    let years_appeared = body.years_appeared.unwrap_or_default();
    let global_importance = body.global_importance.unwrap_or(50).clamp(0, 100);

    let calculated_score = scoring::importance_score(repeat_count, &years_appeared, global_importance);
    let last_appeared_year = scoring::last_appeared_year(&years_appeared);

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO questions (id, title, content, terminologies, repeat_count, years_appeared,
                                last_appeared_year, global_importance, calculated_score, marks_id,
                                created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&title)
    .bind(clean_optional(body.content))
    .bind(clean_optional(body.terminologies))
    .bind(repeat_count)
    .bind(&years_appeared)
    .bind(last_appeared_year)
    .bind(global_importance)
    .bind(calculated_score)
    .bind(&marks_id)
    .bind(now)
    .bind(now)
    .execute(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to insert question");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create question")
    })?;

    let question = fetch_question(&state, &id).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn update_question(
    State(state): State<AppState>,
    Json(body): Json<QuestionUpdate>,
) -> Result<Json<QuestionRow>, (StatusCode, Json<ApiError>)> {
    let id = body
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Question ID is required"))?;

    let existing = sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?"
    ))
    .bind(&id)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to look up question");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update question")
    })?
    .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Question not found"))?;

    let title = match body.title {
        Some(title) => {
            let trimmed = title.trim().to_string();
            if trimmed.is_empty() {
                return Err(json_error(StatusCode::BAD_REQUEST, "Question title is required"));
            }
            trimmed
        }
        None => existing.title,
    };
    let content = match body.content {
        Some(content) => clean_optional(Some(content)),
        None => existing.content,
    };
    let terminologies = match body.terminologies {
        Some(terminologies) => clean_optional(Some(terminologies)),
        None => existing.terminologies,
    };
    let repeat_count = body.repeat_count.unwrap_or(existing.repeat_count).max(1);
    let years_appeared = body.years_appeared.unwrap_or(existing.years_appeared);
    let global_importance = body
        .global_importance
        .unwrap_or(existing.global_importance)
        .clamp(0, 100);

    // derived fields always follow the tracking inputs
    let calculated_score = scoring::importance_score(repeat_count, &years_appeared, global_importance);
    let last_appeared_year = scoring::last_appeared_year(&years_appeared);

    sqlx::query(
        "UPDATE questions SET title = ?, content = ?, terminologies = ?, repeat_count = ?,
                years_appeared = ?, last_appeared_year = ?, global_importance = ?,
                calculated_score = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&title)
    .bind(&content)
    .bind(&terminologies)
    .bind(repeat_count)
    .bind(&years_appeared)
    .bind(last_appeared_year)
    .bind(global_importance)
    .bind(calculated_score)
    .bind(chrono::Utc::now())
    .bind(&id)
    .execute(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update question");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update question")
    })?;

    let question = fetch_question(&state, &id).await?;
    Ok(Json(question))
}

pub async fn delete_question(
    State(state): State<AppState>,
    Query(query): Query<QuestionDeleteQuery>,
) -> Result<Json<ApiMessage>, (StatusCode, Json<ApiError>)> {
    let id = query
        .id
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Question ID is required"))?;

    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM questions WHERE id = ?")
        .bind(&id)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to look up question");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete question")
        })?;
    if exists.is_none() {
        return Err(json_error(StatusCode::NOT_FOUND, "Question not found"));
    }

    unlink_attached_files(&state, "SELECT path FROM files WHERE question_id = ?", &id).await;

    // file rows go with it via cascade
    sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(&id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete question");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete question")
        })?;

    Ok(Json(ApiMessage::new("Question deleted successfully")))
}

/// Highest-scoring questions, optionally limited to one subject.
pub(crate) async fn featured_questions(
    pool: &SqlitePool,
    subject_id: Option<&str>,
    limit: i64,
) -> Result<Vec<FeaturedQuestionRow>, (StatusCode, Json<ApiError>)> {
    let rows = match subject_id {
        Some(subject_id) => {
            let sql = format!(
                "{FEATURED_SQL} WHERE su.id = ? GROUP BY q.id
                 ORDER BY q.calculated_score DESC, q.repeat_count DESC LIMIT ?"
            );
            sqlx::query_as::<_, FeaturedQuestionRow>(&sql)
                .bind(subject_id)
                .bind(limit)
                .fetch_all(pool)
                .await
        }
        None => {
            let sql = format!(
                "{FEATURED_SQL} GROUP BY q.id
                 ORDER BY q.calculated_score DESC, q.repeat_count DESC LIMIT ?"
            );
            sqlx::query_as::<_, FeaturedQuestionRow>(&sql)
                .bind(limit)
                .fetch_all(pool)
                .await
        }
    };

    rows.map_err(|err| {
        error!(?err, "failed to list featured questions");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch questions")
    })
}

/// Remove stored blobs for a set of file rows before their records are
/// cascade-deleted. Disk errors are logged, never fatal.
pub(crate) async fn unlink_attached_files(state: &AppState, sql: &str, id: &str) {
    let paths: Vec<String> = match sqlx::query_scalar(sql)
        .bind(id)
        .fetch_all(state.pool_ref())
        .await
    {
        Ok(paths) => paths,
        Err(err) => {
            warn!(?err, "failed to list attached files for cleanup");
            return;
        }
    };

    for path in paths {
        if let Err(err) = tokio::fs::remove_file(&path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(?err, file = %path, "failed to remove stored file");
            }
        }
    }
}

async fn fetch_question(
    state: &AppState,
    id: &str,
) -> Result<QuestionRow, (StatusCode, Json<ApiError>)> {
    sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?"
    ))
    .bind(id)
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to load question after write");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch question")
    })
}

async fn fetch_question_detail(
    state: &AppState,
    id: &str,
) -> Result<QuestionDetail, (StatusCode, Json<ApiError>)> {
    let question = sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch question");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch question")
    })?
    .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Question not found"))?;

    let marks = sqlx::query_as::<_, MarksRef>("SELECT id, value, system_id FROM marks WHERE id = ?")
        .bind(&question.marks_id)
        .fetch_one(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to fetch marks for question");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch question")
        })?;

    let files = sqlx::query_as::<_, FileRow>(
        "SELECT id, name, original_name, mime_type, size, path, question_id, folder_id,
                created_at, updated_at
         FROM files WHERE question_id = ? ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch question files");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch question")
    })?;

    Ok(QuestionDetail {
        question,
        marks,
        files,
    })
}
