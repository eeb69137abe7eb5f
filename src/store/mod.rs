//! Durable storage for accumulated voice minutes and per-guild configuration.
//!
//! Accumulated minutes live in one JSON file per `(guild, year, month)` so a
//! reset is a single unlink rather than a filtered rewrite. Guild
//! configuration lives in a single `guild_configs.json` loaded at startup.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

pub mod period;

pub use period::{ParsePeriodError, Period};

const CONFIG_FILE: &str = "guild_configs.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Per-user entry inside a period record. Field names match the on-disk JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTotals {
    /// Last-seen display name, overwritten on every credit.
    pub username: String,
    pub total_minutes: u64,
}

/// All totals for one `(guild, period)` pair, keyed by user id.
pub type PeriodRecord = HashMap<u64, UserTotals>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_channel_id: Option<u64>,
}

/// Partial update for [`GuildConfig`]; unset fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct GuildConfigPatch {
    pub log_channel_id: Option<u64>,
}

pub struct Store {
    data_dir: PathBuf,
    // Credits into the same period must serialize (whole-file read-modify-write);
    // different periods proceed independently. Entries are kept for the process
    // lifetime: one per (guild, month) ever touched, so the map stays tiny.
    period_locks: Mutex<HashMap<(u64, Period), Arc<Mutex<()>>>>,
    configs: RwLock<HashMap<u64, GuildConfig>>,
}

impl Store {
    /// Opens the store, creating the data directory if needed and loading
    /// guild configurations. A missing config file is not an error.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config_path = data_dir.join(CONFIG_FILE);
        let configs: HashMap<u64, GuildConfig> = match tokio::fs::read(&config_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: config_path,
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No guild config file yet, starting empty");
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Store opened at {} ({} guild config(s) loaded)",
            data_dir.display(),
            configs.len()
        );

        Ok(Self {
            data_dir,
            period_locks: Mutex::new(HashMap::new()),
            configs: RwLock::new(configs),
        })
    }

    /// Adds `minutes` to a user's total for the given period, creating the
    /// period record if absent, and refreshes the stored display name.
    pub async fn credit_minutes(
        &self,
        guild_id: u64,
        user_id: u64,
        display_name: &str,
        minutes: u64,
        period: Period,
    ) -> Result<(), StoreError> {
        let lock = self.period_lock(guild_id, period).await;
        let _guard = lock.lock().await;

        let path = self.period_path(guild_id, period);
        let mut record: PeriodRecord = read_json_or_default(&path).await?;

        let entry = record.entry(user_id).or_insert_with(|| UserTotals {
            username: display_name.to_string(),
            total_minutes: 0,
        });
        entry.total_minutes += minutes;
        // Name may have changed since the last credit
        entry.username = display_name.to_string();

        write_json(&path, &record).await?;
        debug!("+{}m for {} in {}", minutes, display_name, path.display());
        Ok(())
    }

    /// Loads the accumulated totals for one period. A period that was never
    /// written returns an empty record, not an error.
    pub async fn load_period(
        &self,
        guild_id: u64,
        period: Period,
    ) -> Result<PeriodRecord, StoreError> {
        let lock = self.period_lock(guild_id, period).await;
        let _guard = lock.lock().await;
        read_json_or_default(&self.period_path(guild_id, period)).await
    }

    /// Removes one period's record entirely. Returns whether data existed.
    pub async fn delete_period(&self, guild_id: u64, period: Period) -> Result<bool, StoreError> {
        let lock = self.period_lock(guild_id, period).await;
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.period_path(guild_id, period)).await {
            Ok(()) => {
                info!("Deleted period {} for guild {}", period, guild_id);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the guild's configuration, defaulting to an empty one.
    pub async fn get_config(&self, guild_id: u64) -> GuildConfig {
        self.configs
            .read()
            .await
            .get(&guild_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Shallow-merges `patch` into the guild's configuration and persists the
    /// whole config map. The caller observes completion before replying.
    pub async fn set_config(
        &self,
        guild_id: u64,
        patch: GuildConfigPatch,
    ) -> Result<(), StoreError> {
        let mut configs = self.configs.write().await;
        let entry = configs.entry(guild_id).or_default();
        if let Some(channel) = patch.log_channel_id {
            entry.log_channel_id = Some(channel);
        }
        // Write lock held across the save so concurrent updates serialize
        write_json(&self.data_dir.join(CONFIG_FILE), &*configs).await
    }

    fn period_path(&self, guild_id: u64, period: Period) -> PathBuf {
        self.data_dir.join(format!(
            "{}_{}_{:02}.json",
            guild_id, period.year, period.month
        ))
    }

    async fn period_lock(&self, guild_id: u64, period: Period) -> Arc<Mutex<()>> {
        let mut locks = self.period_locks.lock().await;
        locks.entry((guild_id, period)).or_default().clone()
    }
}

async fn read_json_or_default<T: DeserializeOwned + Default>(
    path: &Path,
) -> Result<T, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Write-then-rename so a crash mid-write never leaves a truncated record.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(StoreError::Encode)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: u64 = 1000;
    const SEPT: Period = Period { year: 2025, month: 9 };

    async fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_credit_accumulates() {
        let (_dir, store) = open_store().await;
        for _ in 0..5 {
            store.credit_minutes(GUILD, 42, "Alice", 1, SEPT).await.unwrap();
        }
        let record = store.load_period(GUILD, SEPT).await.unwrap();
        assert_eq!(record[&42].total_minutes, 5);
        assert_eq!(record[&42].username, "Alice");
    }

    #[tokio::test]
    async fn test_credit_order_independent_across_users() {
        let (_dir, store) = open_store().await;
        store.credit_minutes(GUILD, 1, "Alice", 1, SEPT).await.unwrap();
        store.credit_minutes(GUILD, 2, "Bob", 1, SEPT).await.unwrap();
        store.credit_minutes(GUILD, 2, "Bob", 1, SEPT).await.unwrap();
        store.credit_minutes(GUILD, 1, "Alice", 1, SEPT).await.unwrap();

        let record = store.load_period(GUILD, SEPT).await.unwrap();
        assert_eq!(record[&1].total_minutes, 2);
        assert_eq!(record[&2].total_minutes, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_into_same_period_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).await.unwrap());

        // Interleaved read-modify-writes of the same period file must
        // serialize, for the same user and across users
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.credit_minutes(GUILD, 42, "Alice", 1, SEPT).await.unwrap();
            }));
        }
        for _ in 0..10 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.credit_minutes(GUILD, 7, "Bob", 1, SEPT).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let record = store.load_period(GUILD, SEPT).await.unwrap();
        assert_eq!(record[&42].total_minutes, 20);
        assert_eq!(record[&7].total_minutes, 10);
    }

    #[tokio::test]
    async fn test_credit_refreshes_display_name() {
        let (_dir, store) = open_store().await;
        store.credit_minutes(GUILD, 42, "OldNick", 1, SEPT).await.unwrap();
        store.credit_minutes(GUILD, 42, "NewNick", 1, SEPT).await.unwrap();
        let record = store.load_period(GUILD, SEPT).await.unwrap();
        assert_eq!(record[&42].username, "NewNick");
        assert_eq!(record[&42].total_minutes, 2);
    }

    #[tokio::test]
    async fn test_load_never_written_period_is_empty() {
        let (_dir, store) = open_store().await;
        let record = store.load_period(GUILD, SEPT).await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_load_is_empty() {
        let (_dir, store) = open_store().await;
        store.credit_minutes(GUILD, 42, "Alice", 3, SEPT).await.unwrap();
        assert!(store.delete_period(GUILD, SEPT).await.unwrap());
        assert!(store.load_period(GUILD, SEPT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_period_reports_false() {
        let (_dir, store) = open_store().await;
        assert!(!store.delete_period(GUILD, SEPT).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_leaves_other_periods_untouched() {
        let (_dir, store) = open_store().await;
        let oct = Period { year: 2025, month: 10 };
        store.credit_minutes(GUILD, 42, "Alice", 2, SEPT).await.unwrap();
        store.credit_minutes(GUILD, 42, "Alice", 7, oct).await.unwrap();

        assert!(store.delete_period(GUILD, SEPT).await.unwrap());

        assert!(store.load_period(GUILD, SEPT).await.unwrap().is_empty());
        let october = store.load_period(GUILD, oct).await.unwrap();
        assert_eq!(october[&42].total_minutes, 7);
    }

    #[tokio::test]
    async fn test_config_defaults_to_empty() {
        let (_dir, store) = open_store().await;
        assert_eq!(store.get_config(GUILD).await, GuildConfig::default());
    }

    #[tokio::test]
    async fn test_config_merge_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).await.unwrap();
            store
                .set_config(GUILD, GuildConfigPatch { log_channel_id: Some(777) })
                .await
                .unwrap();
            // An empty patch must not clear the stored value
            store
                .set_config(GUILD, GuildConfigPatch::default())
                .await
                .unwrap();
            assert_eq!(store.get_config(GUILD).await.log_channel_id, Some(777));
        }
        // Survives a restart
        let store = Store::open(dir.path()).await.unwrap();
        assert_eq!(store.get_config(GUILD).await.log_channel_id, Some(777));
    }

    #[tokio::test]
    async fn test_period_file_layout() {
        let (dir, store) = open_store().await;
        store.credit_minutes(GUILD, 42, "Alice", 1, SEPT).await.unwrap();
        assert!(dir.path().join("1000_2025_09.json").exists());
    }
}
