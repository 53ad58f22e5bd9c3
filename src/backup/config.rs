use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const MIN_INTERVAL_MINUTES: i64 = 5;
pub const MAX_INTERVAL_MINUTES: i64 = 1440;
pub const MIN_MAX_BACKUPS: i64 = 1;
pub const MAX_MAX_BACKUPS: i64 = 100;
pub const MIN_RETENTION_DAYS: i64 = 1;
pub const MAX_RETENTION_DAYS: i64 = 365;

/// Persisted auto-backup schedule. Lives as a small JSON file next to the
/// snapshots; an unreadable file falls back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupConfig {
    pub auto_backup_enabled: bool,
    /// Minutes between automatic backups.
    pub backup_interval: i64,
    pub last_backup: Option<DateTime<Utc>>,
    pub next_backup: Option<DateTime<Utc>>,
    pub max_backups: usize,
    pub retention_days: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            auto_backup_enabled: true,
            backup_interval: 30,
            last_backup: None,
            next_backup: None,
            max_backups: 20,
            retention_days: 30,
        }
    }
}

/// Partial config update accepted over the API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub auto_backup_enabled: Option<bool>,
    pub backup_interval: Option<i64>,
    pub max_backups: Option<i64>,
    pub retention_days: Option<i64>,
}

impl BackupConfig {
    /// Apply a partial update, clamping numeric fields to their allowed
    /// ranges, then reconcile the schedule: enabling arms `next_backup`,
    /// disabling clears it.
    pub fn apply_update(&mut self, update: &ConfigUpdate, now: DateTime<Utc>) {
        if let Some(enabled) = update.auto_backup_enabled {
            self.auto_backup_enabled = enabled;
        }
        if let Some(interval) = update.backup_interval {
            self.backup_interval = interval.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
        }
        if let Some(max_backups) = update.max_backups {
            self.max_backups = max_backups.clamp(MIN_MAX_BACKUPS, MAX_MAX_BACKUPS) as usize;
        }
        if let Some(retention) = update.retention_days {
            self.retention_days = retention.clamp(MIN_RETENTION_DAYS, MAX_RETENTION_DAYS);
        }

        if self.auto_backup_enabled {
            if self.next_backup.is_none() {
                self.next_backup = Some(now + Duration::minutes(self.backup_interval));
            }
        } else {
            self.next_backup = None;
        }
    }

    /// A backup is due while enabled and the deadline is unset or reached.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.auto_backup_enabled && self.next_backup.is_none_or(|next| now >= next)
    }

    /// Record a successful backup and schedule the next one.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.last_backup = Some(now);
        self.next_backup = Some(now + Duration::minutes(self.backup_interval));
    }
}

pub async fn load(path: &Path) -> BackupConfig {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(config) => config,
            Err(err) => {
                warn!(?err, path = %path.display(), "backup config unreadable, using defaults");
                BackupConfig::default()
            }
        },
        Err(_) => BackupConfig::default(),
    }
}

pub async fn save(path: &Path, config: &BackupConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(config).context("failed to serialize backup config")?;
    tokio::fs::write(path, body.as_bytes())
        .await
        .with_context(|| format!("failed to write backup config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn enabling_arms_the_schedule() {
        let now = Utc::now();
        let mut config = BackupConfig {
            auto_backup_enabled: false,
            next_backup: None,
            ..BackupConfig::default()
        };

        config.apply_update(
            &ConfigUpdate {
                auto_backup_enabled: Some(true),
                ..ConfigUpdate::default()
            },
            now,
        );

        assert_eq!(config.next_backup, Some(now + Duration::minutes(30)));
    }

    #[test]
    fn disabling_clears_the_schedule() {
        let now = Utc::now();
        let mut config = BackupConfig::default();
        config.mark_completed(now);
        assert!(config.next_backup.is_some());

        config.apply_update(
            &ConfigUpdate {
                auto_backup_enabled: Some(false),
                ..ConfigUpdate::default()
            },
            now,
        );

        assert!(!config.auto_backup_enabled);
        assert_eq!(config.next_backup, None);
    }

    #[test]
    fn updates_are_clamped() {
        let now = Utc::now();
        let mut config = BackupConfig::default();
        config.apply_update(
            &ConfigUpdate {
                backup_interval: Some(1),
                max_backups: Some(5000),
                retention_days: Some(0),
                ..ConfigUpdate::default()
            },
            now,
        );

        assert_eq!(config.backup_interval, MIN_INTERVAL_MINUTES);
        assert_eq!(config.max_backups, MAX_MAX_BACKUPS as usize);
        assert_eq!(config.retention_days, MIN_RETENTION_DAYS);
    }

    #[test]
    fn due_when_enabled_and_deadline_passed_or_unset() {
        let now = Utc::now();
        let mut config = BackupConfig::default();
        assert!(config.is_due(now), "unset deadline counts as due");

        config.mark_completed(now);
        assert!(!config.is_due(now));
        assert!(config.is_due(now + Duration::minutes(31)));
        assert_eq!(config.last_backup, Some(now));

        config.auto_backup_enabled = false;
        assert!(!config.is_due(now + Duration::minutes(31)));
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backups").join("config.json");

        let mut config = BackupConfig::default();
        config.mark_completed(Utc::now());
        save(&path, &config).await.unwrap();

        let loaded = load(&path).await;
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn corrupt_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"not json at all").await.unwrap();

        assert_eq!(load(&path).await, BackupConfig::default());
        assert_eq!(load(&dir.path().join("missing.json")).await, BackupConfig::default());
    }
}
