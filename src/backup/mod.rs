use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

pub mod config;
pub mod scheduler;

pub use config::BackupConfig;

pub const SNAPSHOT_VERSION: &str = "1.0";

const AUTO_PREFIX: &str = "auto-backup-";
const MANUAL_PREFIX: &str = "backup-";
const SNAPSHOT_EXT: &str = ".json";
const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// Class of snapshot. Only automatic snapshots are subject to rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Manual,
    Auto,
}

impl SnapshotKind {
    fn file_prefix(self) -> &'static str {
        match self {
            SnapshotKind::Manual => MANUAL_PREFIX,
            SnapshotKind::Auto => AUTO_PREFIX,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SnapshotKind::Manual => "manual",
            SnapshotKind::Auto => "auto-backup",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SystemRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub subject_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MarksRecord {
    pub id: String,
    pub value: i64,
    pub description: Option<String>,
    pub system_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub terminologies: Option<String>,
    pub repeat_count: i64,
    pub years_appeared: String,
    pub last_appeared_year: Option<i64>,
    pub global_importance: i64,
    pub calculated_score: f64,
    pub marks_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: String,
    pub question_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub question_id: String,
    pub folder_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Catalog payload of a snapshot. Missing arrays deserialize as empty so
/// partial snapshots import cleanly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotData {
    #[serde(default)]
    pub subjects: Vec<SubjectRecord>,
    #[serde(default)]
    pub systems: Vec<SystemRecord>,
    #[serde(default)]
    pub marks: Vec<MarksRecord>,
    #[serde(default)]
    pub questions: Vec<QuestionRecord>,
    #[serde(default)]
    pub folders: Vec<FolderRecord>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEnvelope {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub data: SnapshotData,
}

/// Listing entry for a snapshot file on disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFile {
    pub name: String,
    pub size: u64,
    pub date: DateTime<Utc>,
}

/// Per-entity record counts processed by a restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreStats {
    pub subjects: u64,
    pub systems: u64,
    pub marks: u64,
    pub questions: u64,
    pub folders: u64,
    pub files: u64,
}

/// Directory of JSON snapshot files with timestamp-derived, lexically
/// sortable names.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn write(
        &self,
        envelope: &SnapshotEnvelope,
        kind: SnapshotKind,
    ) -> Result<SnapshotFile> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create snapshot directory {}", self.root.display()))?;

        let body = serde_json::to_string_pretty(envelope).context("failed to serialize snapshot")?;
        let name = self.unused_name(kind, envelope.exported_at).await;
        let path = self.root.join(&name);
        tokio::fs::write(&path, body.as_bytes())
            .await
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;

        Ok(SnapshotFile {
            name,
            size: body.len() as u64,
            date: envelope.exported_at,
        })
    }

    // Timestamp-derived names collide only within the same millisecond; a
    // numeric suffix keeps concurrent writers apart.
    async fn unused_name(&self, kind: SnapshotKind, exported_at: DateTime<Utc>) -> String {
        let stem = format!("{}{}", kind.file_prefix(), file_timestamp(exported_at));
        let candidate = format!("{stem}{SNAPSHOT_EXT}");
        if !matches!(tokio::fs::try_exists(self.root.join(&candidate)).await, Ok(true)) {
            return candidate;
        }
        let mut counter = 1usize;
        loop {
            let attempt = format!("{stem}_{counter}{SNAPSHOT_EXT}");
            if !matches!(tokio::fs::try_exists(self.root.join(&attempt)).await, Ok(true)) {
                return attempt;
            }
            counter += 1;
        }
    }

    /// All snapshots, newest first.
    pub async fn list(&self) -> Result<Vec<SnapshotFile>> {
        self.list_filtered(|_| true).await
    }

    /// Automatic snapshots only, newest first.
    pub async fn list_auto(&self) -> Result<Vec<SnapshotFile>> {
        self.list_filtered(|name| name.starts_with(AUTO_PREFIX)).await
    }

    async fn list_filtered(&self, keep: impl Fn(&str) -> bool) -> Result<Vec<SnapshotFile>> {
        let mut snapshots = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read snapshot directory {}", self.root.display())
                });
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to read snapshot directory entry")?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_snapshot_name(&name) || !keep(&name) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(?err, file = %name, "failed to stat snapshot file");
                    continue;
                }
            };
            let date = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            snapshots.push(SnapshotFile {
                name,
                size: metadata.len(),
                date,
            });
        }

        snapshots.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(snapshots)
    }

    /// Read a named snapshot. Returns `None` for unknown or unsafe names.
    pub async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if !is_safe_name(name) {
            return Ok(None);
        }
        match tokio::fs::read(self.root.join(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read snapshot {name}")),
        }
    }

    /// Delete a named snapshot. Returns `false` when it does not exist.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        if !is_safe_name(name) {
            return Ok(false);
        }
        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed to delete snapshot {name}")),
        }
    }

    /// Rotate automatic snapshots: drop those older than `retention_days`,
    /// then the oldest excess beyond `max_backups`. Manual snapshots are
    /// never touched. Age is taken from the timestamp embedded in the
    /// filename; files with unparseable names are left alone.
    pub async fn prune(
        &self,
        retention_days: i64,
        max_backups: usize,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut automatic: Vec<(String, DateTime<Utc>)> = Vec::new();
        for snapshot in self.list_auto().await? {
            if let Some(stamp) = parse_file_timestamp(&snapshot.name) {
                automatic.push((snapshot.name, stamp));
            }
        }
        // newest first
        automatic.sort_by(|a, b| b.1.cmp(&a.1));

        let cutoff = now - Duration::days(retention_days);
        let mut removed = 0usize;
        let mut survivors = Vec::new();
        for (name, stamp) in automatic {
            if stamp < cutoff {
                self.remove_pruned(&name, &mut removed).await;
            } else {
                survivors.push(name);
            }
        }

        for name in survivors.iter().skip(max_backups) {
            self.remove_pruned(name, &mut removed).await;
        }

        Ok(removed)
    }

    async fn remove_pruned(&self, name: &str, removed: &mut usize) {
        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => *removed += 1,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(?err, file = %name, "failed to remove expired snapshot"),
        }
    }
}

fn is_snapshot_name(name: &str) -> bool {
    name.ends_with(SNAPSHOT_EXT)
        && (name.starts_with(AUTO_PREFIX) || name.starts_with(MANUAL_PREFIX))
}

// Snapshot names never contain path separators; reject anything that could
// escape the store directory.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

fn file_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

fn parse_file_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let stem = name
        .strip_prefix(AUTO_PREFIX)
        .or_else(|| name.strip_prefix(MANUAL_PREFIX))?
        .strip_suffix(SNAPSHOT_EXT)?;
    // drop any collision suffix after the trailing Z
    let end = stem.find('Z')?;
    let stamp = &stem[..=end];
    NaiveDateTime::parse_from_str(stamp, FILE_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Read the full catalog as flat snapshot records.
pub async fn collect_snapshot_data(pool: &SqlitePool) -> Result<SnapshotData> {
    let subjects = sqlx::query_as::<_, SubjectRecord>(
        "SELECT id, name, description, created_at, updated_at FROM subjects",
    )
    .fetch_all(pool)
    .await
    .context("failed to read subjects for snapshot")?;

    let systems = sqlx::query_as::<_, SystemRecord>(
        "SELECT id, name, description, subject_id, created_at, updated_at FROM systems",
    )
    .fetch_all(pool)
    .await
    .context("failed to read systems for snapshot")?;

    let marks = sqlx::query_as::<_, MarksRecord>(
        "SELECT id, value, description, system_id, created_at, updated_at FROM marks",
    )
    .fetch_all(pool)
    .await
    .context("failed to read marks for snapshot")?;

    let questions = sqlx::query_as::<_, QuestionRecord>(
        "SELECT id, title, content, terminologies, repeat_count, years_appeared,
                last_appeared_year, global_importance, calculated_score, marks_id,
                created_at, updated_at
         FROM questions",
    )
    .fetch_all(pool)
    .await
    .context("failed to read questions for snapshot")?;

    let folders = sqlx::query_as::<_, FolderRecord>(
        "SELECT id, name, description, color, icon, question_id, created_at, updated_at
         FROM folders",
    )
    .fetch_all(pool)
    .await
    .context("failed to read folders for snapshot")?;

    let files = sqlx::query_as::<_, FileRecord>(
        "SELECT id, name, original_name, mime_type, size, path, question_id, folder_id,
                created_at, updated_at
         FROM files",
    )
    .fetch_all(pool)
    .await
    .context("failed to read files for snapshot")?;

    Ok(SnapshotData {
        subjects,
        systems,
        marks,
        questions,
        folders,
        files,
    })
}

/// Export the catalog and persist it to the snapshot store.
pub async fn create_snapshot(
    pool: &SqlitePool,
    store: &SnapshotStore,
    kind: SnapshotKind,
) -> Result<(SnapshotEnvelope, SnapshotFile)> {
    let data = collect_snapshot_data(pool).await?;
    let envelope = SnapshotEnvelope {
        version: SNAPSHOT_VERSION.to_string(),
        exported_at: Utc::now(),
        kind: Some(kind.label().to_string()),
        data,
    };
    let file = store.write(&envelope, kind).await?;
    Ok((envelope, file))
}

/// Upsert all snapshot records into the store, keyed on their original ids,
/// in dependency order. Runs as a single transaction: either every pass
/// commits or none do. Applying the same snapshot twice is a no-op.
pub async fn apply_snapshot(pool: &SqlitePool, data: &SnapshotData) -> Result<RestoreStats> {
    let mut tx = pool.begin().await.context("failed to begin restore transaction")?;
    let now = Utc::now();
    let mut stats = RestoreStats::default();

    for subject in &data.subjects {
        sqlx::query(
            "INSERT INTO subjects (id, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 updated_at = ?",
        )
        .bind(&subject.id)
        .bind(&subject.name)
        .bind(&subject.description)
        .bind(subject.created_at.unwrap_or(now))
        .bind(subject.updated_at.unwrap_or(now))
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert subject {}", subject.id))?;
        stats.subjects += 1;
    }

    for system in &data.systems {
        sqlx::query(
            "INSERT INTO systems (id, name, description, subject_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 updated_at = ?",
        )
        .bind(&system.id)
        .bind(&system.name)
        .bind(&system.description)
        .bind(&system.subject_id)
        .bind(system.created_at.unwrap_or(now))
        .bind(system.updated_at.unwrap_or(now))
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert system {}", system.id))?;
        stats.systems += 1;
    }

    for marks in &data.marks {
        sqlx::query(
            "INSERT INTO marks (id, value, description, system_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 value = excluded.value,
                 description = excluded.description,
                 updated_at = ?",
        )
        .bind(&marks.id)
        .bind(marks.value)
        .bind(&marks.description)
        .bind(&marks.system_id)
        .bind(marks.created_at.unwrap_or(now))
        .bind(marks.updated_at.unwrap_or(now))
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert marks {}", marks.id))?;
        stats.marks += 1;
    }

    for question in &data.questions {
        sqlx::query(
            "INSERT INTO questions (id, title, content, terminologies, repeat_count,
                                    years_appeared, last_appeared_year, global_importance,
                                    calculated_score, marks_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 content = excluded.content,
                 terminologies = excluded.terminologies,
                 repeat_count = excluded.repeat_count,
                 years_appeared = excluded.years_appeared,
                 last_appeared_year = excluded.last_appeared_year,
                 global_importance = excluded.global_importance,
                 calculated_score = excluded.calculated_score,
                 updated_at = ?",
        )
        .bind(&question.id)
        .bind(&question.title)
        .bind(&question.content)
        .bind(&question.terminologies)
        .bind(question.repeat_count)
        .bind(&question.years_appeared)
        .bind(question.last_appeared_year)
        .bind(question.global_importance)
        .bind(question.calculated_score)
        .bind(&question.marks_id)
        .bind(question.created_at.unwrap_or(now))
        .bind(question.updated_at.unwrap_or(now))
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert question {}", question.id))?;
        stats.questions += 1;
    }

    for folder in &data.folders {
        sqlx::query(
            "INSERT INTO folders (id, name, description, color, icon, question_id,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 color = excluded.color,
                 icon = excluded.icon,
                 updated_at = ?",
        )
        .bind(&folder.id)
        .bind(&folder.name)
        .bind(&folder.description)
        .bind(&folder.color)
        .bind(&folder.icon)
        .bind(&folder.question_id)
        .bind(folder.created_at.unwrap_or(now))
        .bind(folder.updated_at.unwrap_or(now))
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert folder {}", folder.id))?;
        stats.folders += 1;
    }

    for file in &data.files {
        sqlx::query(
            "INSERT INTO files (id, name, original_name, mime_type, size, path,
                                question_id, folder_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 original_name = excluded.original_name,
                 folder_id = excluded.folder_id,
                 updated_at = ?",
        )
        .bind(&file.id)
        .bind(&file.name)
        .bind(&file.original_name)
        .bind(&file.mime_type)
        .bind(file.size)
        .bind(&file.path)
        .bind(&file.question_id)
        .bind(&file.folder_id)
        .bind(file.created_at.unwrap_or(now))
        .bind(file.updated_at.unwrap_or(now))
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert file {}", file.id))?;
        stats.files += 1;
    }

    tx.commit().await.context("failed to commit restore transaction")?;
    Ok(stats)
}

/// Result of an auto-backup check.
#[derive(Debug)]
pub enum CheckOutcome {
    Disabled,
    NotDue {
        last_backup: Option<DateTime<Utc>>,
        next_backup: Option<DateTime<Utc>>,
    },
    Completed {
        backup: SnapshotFile,
        config: BackupConfig,
    },
    Failed {
        error: String,
    },
}

/// Run one auto-backup check: if a backup is due, export, advance the
/// schedule, and prune. Export failures never propagate past here.
pub async fn run_check(
    pool: &SqlitePool,
    store: &SnapshotStore,
    config_path: &Path,
) -> CheckOutcome {
    let mut config = config::load(config_path).await;
    if !config.auto_backup_enabled {
        return CheckOutcome::Disabled;
    }

    let now = Utc::now();
    if !config.is_due(now) {
        return CheckOutcome::NotDue {
            last_backup: config.last_backup,
            next_backup: config.next_backup,
        };
    }

    match create_snapshot(pool, store, SnapshotKind::Auto).await {
        Ok((_, backup)) => {
            config.mark_completed(now);
            if let Err(err) = config::save(config_path, &config).await {
                warn!(?err, "failed to persist backup config after export");
            }
            prune_quietly(store, &config, now).await;
            CheckOutcome::Completed { backup, config }
        }
        Err(err) => {
            error!(?err, "automatic snapshot failed");
            CheckOutcome::Failed {
                error: format!("{err:#}"),
            }
        }
    }
}

/// Force an automatic backup regardless of schedule, then advance it.
pub async fn run_forced(
    pool: &SqlitePool,
    store: &SnapshotStore,
    config_path: &Path,
) -> Result<(SnapshotFile, BackupConfig)> {
    let (_, backup) = create_snapshot(pool, store, SnapshotKind::Auto).await?;
    let now = Utc::now();
    let mut config = config::load(config_path).await;
    config.mark_completed(now);
    config::save(config_path, &config).await?;
    prune_quietly(store, &config, now).await;
    Ok((backup, config))
}

async fn prune_quietly(store: &SnapshotStore, config: &BackupConfig, now: DateTime<Utc>) {
    match store.prune(config.retention_days, config.max_backups, now).await {
        Ok(removed) if removed > 0 => info!(removed, "pruned automatic snapshots"),
        Ok(_) => {}
        Err(err) => warn!(?err, "failed to prune automatic snapshots"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use tempfile::tempdir;

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
        pool
    }

    async fn seed_catalog(pool: &SqlitePool) {
        let now = Utc::now();
        sqlx::query("INSERT INTO subjects (id, name, description, created_at, updated_at) VALUES ('sub-1', 'Pathology', NULL, ?, ?)")
            .bind(now).bind(now).execute(pool).await.unwrap();
        sqlx::query("INSERT INTO systems (id, name, description, subject_id, created_at, updated_at) VALUES ('sys-1', 'Cardiovascular', NULL, 'sub-1', ?, ?)")
            .bind(now).bind(now).execute(pool).await.unwrap();
        sqlx::query("INSERT INTO marks (id, value, description, system_id, created_at, updated_at) VALUES ('mk-1', 5, 'short notes', 'sys-1', ?, ?)")
            .bind(now).bind(now).execute(pool).await.unwrap();
        sqlx::query(
            "INSERT INTO questions (id, title, content, terminologies, repeat_count, years_appeared,
                                    last_appeared_year, global_importance, calculated_score, marks_id,
                                    created_at, updated_at)
             VALUES ('q-1', 'Myocardial infarction', NULL, NULL, 3, '2019,2021', 2021, 80, 92.5, 'mk-1', ?, ?)",
        )
        .bind(now).bind(now).execute(pool).await.unwrap();
        sqlx::query("INSERT INTO folders (id, name, description, color, icon, question_id, created_at, updated_at) VALUES ('fd-1', 'Diagrams', NULL, 'blue', 'folder', 'q-1', ?, ?)")
            .bind(now).bind(now).execute(pool).await.unwrap();
        sqlx::query(
            "INSERT INTO files (id, name, original_name, mime_type, size, path, question_id, folder_id, created_at, updated_at)
             VALUES ('fl-1', '1700000000000-abc123.pdf', 'ecg.pdf', 'application/pdf', 1024, 'uploads/1700000000000-abc123.pdf', 'q-1', 'fd-1', ?, ?)",
        )
        .bind(now).bind(now).execute(pool).await.unwrap();
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn round_trip_preserves_catalog() {
        let source = test_pool().await;
        seed_catalog(&source).await;

        let data = collect_snapshot_data(&source).await.unwrap();
        let target = test_pool().await;
        let stats = apply_snapshot(&target, &data).await.unwrap();

        assert_eq!(stats.subjects, 1);
        assert_eq!(stats.files, 1);
        for table in ["subjects", "systems", "marks", "questions", "folders", "files"] {
            assert_eq!(count(&source, table).await, count(&target, table).await);
        }

        let restored = collect_snapshot_data(&target).await.unwrap();
        assert_eq!(restored.questions[0].calculated_score, 92.5);
        assert_eq!(restored.questions[0].years_appeared, "2019,2021");
        assert_eq!(restored.files[0].folder_id.as_deref(), Some("fd-1"));
    }

    #[tokio::test]
    async fn restore_is_idempotent() {
        let pool = test_pool().await;
        seed_catalog(&pool).await;
        let data = collect_snapshot_data(&pool).await.unwrap();

        apply_snapshot(&pool, &data).await.unwrap();
        apply_snapshot(&pool, &data).await.unwrap();

        for table in ["subjects", "systems", "marks", "questions", "folders", "files"] {
            assert_eq!(count(&pool, table).await, 1, "duplicate rows in {table}");
        }
    }

    #[tokio::test]
    async fn failed_restore_applies_nothing() {
        let pool = test_pool().await;
        let data = SnapshotData {
            subjects: vec![SubjectRecord {
                id: "sub-1".into(),
                name: "Pathology".into(),
                description: None,
                created_at: None,
                updated_at: None,
            }],
            files: vec![FileRecord {
                id: "fl-1".into(),
                name: "x.pdf".into(),
                original_name: "x.pdf".into(),
                mime_type: "application/pdf".into(),
                size: 1,
                path: "uploads/x.pdf".into(),
                question_id: "missing-question".into(),
                folder_id: None,
                created_at: None,
                updated_at: None,
            }],
            ..SnapshotData::default()
        };

        assert!(apply_snapshot(&pool, &data).await.is_err());
        assert_eq!(count(&pool, "subjects").await, 0);
        assert_eq!(count(&pool, "files").await, 0);
    }

    #[tokio::test]
    async fn snapshot_names_are_sortable_and_typed() {
        let pool = test_pool().await;
        seed_catalog(&pool).await;
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let (envelope, file) = create_snapshot(&pool, &store, SnapshotKind::Auto)
            .await
            .unwrap();
        assert!(file.name.starts_with("auto-backup-"));
        assert!(file.name.ends_with(".json"));
        assert!(!file.name.contains(':'));
        assert_eq!(envelope.kind.as_deref(), Some("auto-backup"));
        assert_eq!(envelope.version, SNAPSHOT_VERSION);

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, file.name);

        let body = store.read(&file.name).await.unwrap().unwrap();
        let parsed: SnapshotEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.data.subjects.len(), 1);
    }

    #[tokio::test]
    async fn read_rejects_traversal_names() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.read("../etc/passwd").await.unwrap().is_none());
        assert!(store.read("a/b.json").await.unwrap().is_none());
        assert!(!store.delete("../config.json").await.unwrap());
    }

    #[test]
    fn file_timestamps_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 45).unwrap()
            + Duration::milliseconds(123);
        let name = format!("auto-backup-{}.json", file_timestamp(at));
        assert_eq!(name, "auto-backup-2024-03-09T14-30-45-123Z.json");
        assert_eq!(parse_file_timestamp(&name), Some(at));
        // collision suffix is ignored when parsing
        let suffixed = "auto-backup-2024-03-09T14-30-45-123Z_1.json";
        assert_eq!(parse_file_timestamp(suffixed), Some(at));
        assert_eq!(parse_file_timestamp("auto-backup-garbage.json"), None);
    }

    #[tokio::test]
    async fn prune_applies_retention_then_cap() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let names = [
            "auto-backup-2024-01-01T00-00-00-000Z.json", // past retention
            "auto-backup-2024-05-20T00-00-00-000Z.json",
            "auto-backup-2024-05-25T00-00-00-000Z.json",
            "auto-backup-2024-05-30T00-00-00-000Z.json",
            "backup-2024-01-01T00-00-00-000Z.json", // manual, never pruned
        ];
        for name in names {
            std::fs::write(dir.path().join(name), b"{}").unwrap();
        }

        let removed = store.prune(30, 2, now).await.unwrap();
        assert_eq!(removed, 2);

        let remaining: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert!(remaining.contains(&"auto-backup-2024-05-30T00-00-00-000Z.json".to_string()));
        assert!(remaining.contains(&"auto-backup-2024-05-25T00-00-00-000Z.json".to_string()));
        assert!(remaining.contains(&"backup-2024-01-01T00-00-00-000Z.json".to_string()));
        assert_eq!(remaining.len(), 3);
    }
}
