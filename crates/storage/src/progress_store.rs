use chrono::{DateTime, Utc};
use funnel_core::model::{ChatEntry, ModuleId, ProgressRecord, StepRef, PROGRESS_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::legacy::{
    LegacyFlags, LEGACY_KEYS, MODULE1_COMPLETED_AT_KEY, MODULE2_UNLOCKED_KEY, MODULE3_LOCKED_AT_KEY,
    MODULE3_LOCKED_KEY, MODULE3_UNLOCKED_KEY, UNLOCKED_LEVEL_KEY, VIP_UNLOCKED_KEY,
};
use crate::repository::{KeyValueStore, StorageError};

pub const PROGRESS_KEY: &str = "funnel_progress";
const CHAT_PREFIX: &str = "funnel_chat_";
const CHECKPOINT_PREFIX: &str = "funnel_checkpoint_";

#[must_use]
pub fn transcript_key(module: ModuleId) -> String {
    format!("{CHAT_PREFIX}{module}")
}

#[must_use]
pub fn typing_checkpoint_key(module: ModuleId) -> String {
    format!("{CHECKPOINT_PREFIX}{module}")
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

//
// ─── PERSISTED SHAPE ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRow {
    pub module: String,
    pub step: u32,
}

/// Persisted shape of a `ProgressRecord`.
///
/// Every field is optional so records written by older clients, or missing
/// fields, decode instead of failing. Module names stay strings here and are
/// validated in `into_record`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRow {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub current_module: Option<String>,
    #[serde(default)]
    pub current_step: Option<u32>,
    #[serde(default)]
    pub completed_steps: Vec<StepRow>,
    #[serde(default)]
    pub unlocked_level: Option<u32>,
    #[serde(default)]
    pub module_step_checkpoint: BTreeMap<String, u32>,
    #[serde(default)]
    pub first_access_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_interaction_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub module1_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub debug_mode: Option<bool>,
}

impl ProgressRow {
    #[must_use]
    pub fn from_record(record: &ProgressRecord) -> Self {
        Self {
            schema_version: Some(PROGRESS_SCHEMA_VERSION),
            current_module: Some(record.current_module().to_string()),
            current_step: Some(record.current_step()),
            completed_steps: record
                .completed_steps()
                .iter()
                .map(|step| StepRow {
                    module: step.module.to_string(),
                    step: step.step,
                })
                .collect(),
            unlocked_level: Some(record.unlocked_level()),
            module_step_checkpoint: record
                .module_step_checkpoints()
                .iter()
                .map(|(module, step)| (module.to_string(), *step))
                .collect(),
            first_access_at: Some(record.first_access_at()),
            last_interaction_at: Some(record.last_interaction_at()),
            module1_completed_at: record.module1_completed_at(),
            debug_mode: Some(record.debug_mode()),
        }
    }

    /// Timestamp the expiry window is measured from.
    #[must_use]
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.first_access_at.or(self.last_interaction_at)
    }

    /// Rehydrate into the domain record, filling gaps with defaults and
    /// refreshing `last_interaction_at` to `now`.
    #[must_use]
    pub fn into_record(self, now: DateTime<Utc>) -> ProgressRecord {
        let current_module = match self.current_module.as_deref() {
            None => ModuleId::Dashboard,
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!(%err, "stored current module unknown, falling back to dashboard");
                ModuleId::Dashboard
            }),
        };
        let completed_steps = self
            .completed_steps
            .into_iter()
            .filter_map(|row| {
                let module = row.module.parse::<ModuleId>().ok()?;
                Some(StepRef::new(module, row.step))
            })
            .collect();
        let module_step_checkpoint = self
            .module_step_checkpoint
            .into_iter()
            .filter_map(|(module, step)| Some((module.parse::<ModuleId>().ok()?, step)))
            .collect();

        ProgressRecord::from_persisted(
            current_module,
            self.current_step.unwrap_or(0),
            completed_steps,
            self.unlocked_level.unwrap_or(1),
            module_step_checkpoint,
            self.first_access_at.unwrap_or(now),
            now,
            self.module1_completed_at,
            self.debug_mode.unwrap_or(true),
        )
    }
}

/// Result of reading the progress key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredProgress {
    Missing,
    /// Present but not decodable; carries the decode error.
    Corrupt(String),
    Found(ProgressRow),
}

//
// ─── TYPED STORE ───────────────────────────────────────────────────────────────
//

/// Typed view over the key-value store for everything the funnel persists.
#[derive(Clone)]
pub struct ProgressStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    #[must_use]
    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the backend read fails. Undecodable JSON is
    /// reported as `StoredProgress::Corrupt`, not as an error.
    pub async fn load_progress(&self) -> Result<StoredProgress, StorageError> {
        let Some(raw) = self.kv.get(PROGRESS_KEY).await? else {
            return Ok(StoredProgress::Missing);
        };
        Ok(match serde_json::from_str::<ProgressRow>(&raw) {
            Ok(row) => StoredProgress::Found(row),
            Err(err) => StoredProgress::Corrupt(err.to_string()),
        })
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be encoded or written.
    pub async fn save_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string(&ProgressRow::from_record(record)).map_err(ser)?;
        self.kv.set(PROGRESS_KEY, &json).await
    }

    /// Cached transcript of `module`. Undecodable caches are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend read fails.
    pub async fn load_transcript(
        &self,
        module: ModuleId,
    ) -> Result<Option<Vec<ChatEntry>>, StorageError> {
        let Some(raw) = self.kv.get(&transcript_key(module)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(Some(entries)),
            Err(err) => {
                warn!(%module, %err, "discarding undecodable transcript cache");
                Ok(None)
            }
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the entries cannot be encoded or written.
    pub async fn save_transcript(
        &self,
        module: ModuleId,
        entries: &[ChatEntry],
    ) -> Result<(), StorageError> {
        let json = serde_json::to_string(entries).map_err(ser)?;
        self.kv.set(&transcript_key(module), &json).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the backend read fails.
    pub async fn load_typing_checkpoint(
        &self,
        module: ModuleId,
    ) -> Result<Option<usize>, StorageError> {
        let raw = self.kv.get(&typing_checkpoint_key(module)).await?;
        Ok(raw.and_then(|value| value.trim().parse().ok()))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn save_typing_checkpoint(
        &self,
        module: ModuleId,
        index: usize,
    ) -> Result<(), StorageError> {
        self.kv
            .set(&typing_checkpoint_key(module), &index.to_string())
            .await
    }

    /// Drop the cached transcript and typing checkpoint of one module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a removal fails.
    pub async fn clear_module(&self, module: ModuleId) -> Result<(), StorageError> {
        self.kv.remove(&transcript_key(module)).await?;
        self.kv.remove(&typing_checkpoint_key(module)).await
    }

    /// Mirror `level` into the legacy flag keys.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a write fails.
    pub async fn write_level_flags(&self, level: u32) -> Result<(), StorageError> {
        for (key, value) in LegacyFlags::for_level(level).entries() {
            self.kv.set(key, &value).await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if a read fails.
    pub async fn read_level_flags(&self) -> Result<LegacyFlags, StorageError> {
        let level = self.kv.get(UNLOCKED_LEVEL_KEY).await?;
        let module2 = self.kv.get(MODULE2_UNLOCKED_KEY).await?;
        let module3 = self.kv.get(MODULE3_UNLOCKED_KEY).await?;
        let vip = self.kv.get(VIP_UNLOCKED_KEY).await?;
        Ok(LegacyFlags::from_raw(
            level.as_deref(),
            module2.as_deref(),
            module3.as_deref(),
            vip.as_deref(),
        ))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn write_module1_anchor(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.kv
            .set(MODULE1_COMPLETED_AT_KEY, &at.to_rfc3339())
            .await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    pub async fn module1_anchor(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        read_timestamp(self.kv.as_ref(), MODULE1_COMPLETED_AT_KEY).await
    }

    /// Seal the final tier at `at`. A second call keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a read or write fails.
    pub async fn lock_final_tier(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>, StorageError> {
        if let Some(existing) = self.final_tier_lock().await? {
            return Ok(existing);
        }
        self.kv.set(MODULE3_LOCKED_KEY, "true").await?;
        self.kv.set(MODULE3_LOCKED_AT_KEY, &at.to_rfc3339()).await?;
        info!(locked_at = %at, "final tier locked");
        Ok(at)
    }

    /// When the final tier was sealed, if it was.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a read fails.
    pub async fn final_tier_lock(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let locked = self.kv.get(MODULE3_LOCKED_KEY).await?;
        if locked.as_deref().map(str::trim) != Some("true") {
            return Ok(None);
        }
        read_timestamp(self.kv.as_ref(), MODULE3_LOCKED_AT_KEY).await
    }

    /// Remove every transcript, typing checkpoint and legacy key, then write
    /// the legacy level back as 1.
    ///
    /// The progress record itself is left to the caller, which rewrites it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if listing, removing or writing fails.
    pub async fn clear_session(&self) -> Result<usize, StorageError> {
        let doomed: Vec<String> = self
            .kv
            .keys()
            .await?
            .into_iter()
            .filter(|key| {
                key.starts_with(CHAT_PREFIX)
                    || key.starts_with(CHECKPOINT_PREFIX)
                    || LEGACY_KEYS.contains(&key.as_str())
            })
            .collect();
        for key in &doomed {
            self.kv.remove(key).await?;
        }
        self.write_level_flags(1).await?;
        debug!(removed = doomed.len(), "session keys cleared");
        Ok(doomed.len())
    }
}

async fn read_timestamp(
    kv: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<DateTime<Utc>>, StorageError> {
    let Some(raw) = kv.get(key).await? else {
        return Ok(None);
    };
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(at) => Ok(Some(at.with_timezone(&Utc))),
        Err(err) => {
            warn!(key, %err, "ignoring unparseable timestamp");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use chrono::Duration;
    use funnel_core::time::fixed_now;

    fn store() -> ProgressStore {
        ProgressStore::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn progress_round_trips_through_json() {
        let store = store();
        let now = fixed_now();
        let mut record = ProgressRecord::new(now);
        record.advance_step(ModuleId::Module1, 5, now);
        record.mark_step_completed(ModuleId::Module1, 4, now);
        record.unlock_level(2, now);
        store.save_progress(&record).await.unwrap();

        let StoredProgress::Found(row) = store.load_progress().await.unwrap() else {
            panic!("expected stored progress");
        };
        assert_eq!(row.schema_version, Some(PROGRESS_SCHEMA_VERSION));
        let later = now + Duration::hours(2);
        let restored = row.into_record(later);
        assert_eq!(restored.checkpoint(ModuleId::Module1), 5);
        assert_eq!(restored.unlocked_level(), 2);
        assert!(restored.is_step_completed(ModuleId::Module1, 4));
        assert_eq!(restored.last_interaction_at(), later);
    }

    #[tokio::test]
    async fn corrupt_and_missing_progress_are_reported() {
        let store = store();
        assert_eq!(store.load_progress().await.unwrap(), StoredProgress::Missing);
        store.kv().set(PROGRESS_KEY, "{not json").await.unwrap();
        assert!(matches!(
            store.load_progress().await.unwrap(),
            StoredProgress::Corrupt(_)
        ));
    }

    #[test]
    fn sparse_row_fills_defaults() {
        let row: ProgressRow =
            serde_json::from_str(r#"{"current_module":"nowhere","unlocked_level":0}"#).unwrap();
        assert_eq!(row.reference_time(), None);
        let record = row.into_record(fixed_now());
        assert_eq!(record.current_module(), ModuleId::Dashboard);
        assert_eq!(record.unlocked_level(), 1);
        assert!(record.debug_mode());
        assert_eq!(record.first_access_at(), fixed_now());
    }

    #[tokio::test]
    async fn clear_session_removes_caches_and_resets_legacy_level() {
        let store = store();
        store
            .save_transcript(ModuleId::Module1, &[ChatEntry::bot("hi", None)])
            .await
            .unwrap();
        store.save_typing_checkpoint(ModuleId::Module1, 0).await.unwrap();
        store.write_level_flags(4).await.unwrap();
        store.lock_final_tier(fixed_now()).await.unwrap();
        store.kv().set("unrelated", "kept").await.unwrap();

        store.clear_session().await.unwrap();

        assert_eq!(store.load_transcript(ModuleId::Module1).await.unwrap(), None);
        assert_eq!(store.load_typing_checkpoint(ModuleId::Module1).await.unwrap(), None);
        assert_eq!(store.final_tier_lock().await.unwrap(), None);
        let flags = store.read_level_flags().await.unwrap();
        assert_eq!(flags, LegacyFlags::for_level(1));
        assert_eq!(store.kv().get("unrelated").await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn final_tier_lock_keeps_first_timestamp() {
        let store = store();
        let first = store.lock_final_tier(fixed_now()).await.unwrap();
        let second = store
            .lock_final_tier(fixed_now() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn undecodable_transcript_counts_as_absent() {
        let store = store();
        store
            .kv()
            .set(&transcript_key(ModuleId::Copilot), "[{]")
            .await
            .unwrap();
        assert_eq!(store.load_transcript(ModuleId::Copilot).await.unwrap(), None);
    }
}
