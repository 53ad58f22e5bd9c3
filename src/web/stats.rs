use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::error;

use crate::web::{
    ApiError, AppState,
    data::{self, EntityCounts},
    json_error,
    models::{FeaturedQuestionRow, RecentQuestionRow, RecentSubjectRow},
    questions::featured_questions,
};

const RECENT_LIMIT: i64 = 5;
const FEATURED_LIMIT: i64 = 10;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    counts: StatsCounts,
    importance: ImportanceStats,
    recent_activity: RecentActivity,
    featured_questions: Vec<FeaturedQuestionRow>,
}

#[derive(Serialize)]
struct StatsCounts {
    #[serde(flatten)]
    entities: EntityCounts,
    storage: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportanceStats {
    avg_score: f64,
    high_importance_count: i64,
    critical_count: i64,
    repeated_questions: i64,
    total_repeats: i64,
}

#[derive(Serialize)]
struct RecentActivity {
    subjects: Vec<RecentSubjectRow>,
    questions: Vec<RecentQuestionRow>,
}

/// Aggregates for the dashboard landing view.
pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, (StatusCode, Json<ApiError>)> {
    let pool = state.pool_ref();

    let entities = data::entity_counts(pool).await.map_err(stats_error)?;
    let storage = data::stored_file_bytes(pool).await.map_err(stats_error)?;

    let avg_score: f64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(AVG(calculated_score), 0) AS REAL) FROM questions",
    )
    .fetch_one(pool)
    .await
    .map_err(stats_error)?;
    let high_importance_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE calculated_score >= 60")
            .fetch_one(pool)
            .await
            .map_err(stats_error)?;
    let critical_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE calculated_score >= 80")
            .fetch_one(pool)
            .await
            .map_err(stats_error)?;
    let (repeated_questions, total_repeats): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), CAST(COALESCE(SUM(repeat_count), 0) AS INTEGER)
         FROM questions WHERE repeat_count > 1",
    )
    .fetch_one(pool)
    .await
    .map_err(stats_error)?;

    let subjects = sqlx::query_as::<_, RecentSubjectRow>(
        "SELECT id, name, created_at FROM subjects ORDER BY created_at DESC LIMIT ?",
    )
    .bind(RECENT_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(stats_error)?;

    let questions = sqlx::query_as::<_, RecentQuestionRow>(
        "SELECT q.id, q.title, q.created_at, q.repeat_count, q.calculated_score,
                m.value AS marks_value, sy.name AS system_name, su.name AS subject_name
         FROM questions q
         JOIN marks m ON m.id = q.marks_id
         JOIN systems sy ON sy.id = m.system_id
         JOIN subjects su ON su.id = sy.subject_id
         ORDER BY q.created_at DESC LIMIT ?",
    )
    .bind(RECENT_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(stats_error)?;

    let featured = featured_questions(pool, None, FEATURED_LIMIT).await?;

    Ok(Json(StatsResponse {
        counts: StatsCounts { entities, storage },
        importance: ImportanceStats {
            avg_score: (avg_score * 10.0).round() / 10.0,
            high_importance_count,
            critical_count,
            repeated_questions,
            total_repeats,
        },
        recent_activity: RecentActivity {
            subjects,
            questions,
        },
        featured_questions: featured,
    }))
}

fn stats_error(err: sqlx::Error) -> (StatusCode, Json<ApiError>) {
    error!(?err, "failed to compute statistics");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch statistics")
}
