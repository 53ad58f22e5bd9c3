use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;
use uuid::Uuid;

use crate::backup::SnapshotStore;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/examdesk.db";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_BACKUP_DIR: &str = "backups";
const BACKUP_CONFIG_FILE: &str = "config.json";

const SEED_SUBJECTS: &[(&str, &str)] = &[
    (
        "Pathology",
        "Study of disease processes, their causes, and effects on the body",
    ),
    (
        "Pharmacology",
        "Study of drugs, their actions, uses, and adverse effects",
    ),
    (
        "Microbiology",
        "Study of microorganisms causing human diseases",
    ),
];

#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
    db_path: PathBuf,
    uploads_dir: PathBuf,
    snapshots: SnapshotStore,
    backup_config_path: PathBuf,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let uploads_dir =
            PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| DEFAULT_UPLOAD_DIR.to_string()));
        let backup_dir =
            PathBuf::from(env::var("BACKUP_DIR").unwrap_or_else(|_| DEFAULT_BACKUP_DIR.to_string()));

        let options = SqliteConnectOptions::from_str(&database_url)
            .with_context(|| format!("invalid DATABASE_URL {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let db_path = database_file_path(&database_url);
        if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create database directory {}", parent.display()))?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open SQLite database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        tokio::fs::create_dir_all(&uploads_dir)
            .await
            .with_context(|| format!("failed to create upload directory {}", uploads_dir.display()))?;
        tokio::fs::create_dir_all(&backup_dir)
            .await
            .with_context(|| format!("failed to create backup directory {}", backup_dir.display()))?;

        Ok(Self {
            pool,
            db_path,
            uploads_dir,
            backup_config_path: backup_dir.join(BACKUP_CONFIG_FILE),
            snapshots: SnapshotStore::new(backup_dir),
        })
    }

    /// Seed the default subjects into an empty catalog. Idempotent, safe to
    /// call on every startup.
    pub async fn ensure_seed_subjects(&self) -> Result<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subjects")
            .fetch_one(&self.pool)
            .await
            .context("failed to count subjects")?;
        if count > 0 {
            return Ok(());
        }

        let now = Utc::now();
        for (name, description) in SEED_SUBJECTS {
            sqlx::query(
                "INSERT INTO subjects (id, name, description, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(name)
            .bind(description)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert seed subject {name}"))?;
        }

        info!(subjects = SEED_SUBJECTS.len(), "seeded default subjects");
        Ok(())
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub fn pool_ref(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn backup_config_path(&self) -> &Path {
        &self.backup_config_path
    }
}

// Filesystem path of the database file named by a sqlite URL, for the
// backup status report.
fn database_file_path(url: &str) -> PathBuf {
    let trimmed = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let without_params = trimmed.split('?').next().unwrap_or(trimmed);
    PathBuf::from(without_params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_file_path_strips_scheme_and_params() {
        assert_eq!(
            database_file_path("sqlite://data/examdesk.db?mode=rwc"),
            PathBuf::from("data/examdesk.db")
        );
        assert_eq!(
            database_file_path("sqlite:examdesk.db"),
            PathBuf::from("examdesk.db")
        );
    }
}
