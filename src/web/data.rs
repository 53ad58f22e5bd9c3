use serde::Serialize;
use sqlx::SqlitePool;
use tokio::try_join;

/// Row counts for every entity type in the catalog.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EntityCounts {
    pub subjects: i64,
    pub systems: i64,
    pub marks: i64,
    pub questions: i64,
    pub folders: i64,
    pub files: i64,
}

pub async fn entity_counts(pool: &SqlitePool) -> sqlx::Result<EntityCounts> {
    let (subjects, systems, marks, questions, folders, files) = try_join!(
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subjects").fetch_one(pool),
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM systems").fetch_one(pool),
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM marks").fetch_one(pool),
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions").fetch_one(pool),
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM folders").fetch_one(pool),
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files").fetch_one(pool),
    )?;

    Ok(EntityCounts {
        subjects,
        systems,
        marks,
        questions,
        folders,
        files,
    })
}

/// Total bytes of uploaded files as recorded in the catalog.
pub async fn stored_file_bytes(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT CAST(COALESCE(SUM(size), 0) AS INTEGER) FROM files")
        .fetch_one(pool)
        .await
}
