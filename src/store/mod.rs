pub mod embedded;
pub mod file;
pub mod lifecycle;
pub mod seed;
pub mod sql;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::constants::DEFAULT_DOMAIN;
use crate::srs::{
    selector, stats, CardSnapshot, CreateFlashcard, Flashcard, FlashcardPatch, InvalidMastery,
    Mastery, PresetDomain, StatsOverview,
};
use crate::validation;

pub use embedded::EmbeddedStore;
pub use file::JsonFileStore;
pub use sql::SqlStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("lock poisoned: {0}")]
    Poisoned(String),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    InvalidMastery(#[from] InvalidMastery),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    pub fn not_found(entity: &str, key: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn conflict(entity: &str, key: impl ToString) -> Self {
        Self::Conflict {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    /// 底层存储故障（而非业务规则错误）
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Sled(_)
                | Self::Sqlite(_)
                | Self::Io(_)
                | Self::Serialization(_)
                | Self::Poisoned(_)
                | Self::Migration { .. }
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Sql,
    Embedded,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::File, BackendKind::Sql, BackendKind::Embedded];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Sql => "sql",
            Self::Embedded => "embedded",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "sql" | "sqlite" => Ok(Self::Sql),
            "embedded" | "sled" => Ok(Self::Embedded),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// 每个后端实例共享的行为开关
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub default_domain: String,
    pub seed_sample_data: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            default_domain: DEFAULT_DOMAIN.to_string(),
            seed_sample_data: true,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_domain: config.storage.default_domain.clone(),
            seed_sample_data: config.storage.seed_sample_data,
        }
    }
}

/// 当前时间，截断到毫秒，三种后端存取后保持一致
pub fn timestamp_now() -> DateTime<Utc> {
    to_millis(Utc::now())
}

pub fn to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Persistence contract shared by every storage backend.
///
/// All methods lazily seed an empty store on first use. Absent ids are
/// reported as `None`/`false`, never as errors.
pub trait FlashcardRepository: Send + Sync {
    fn backend(&self) -> BackendKind;

    fn options(&self) -> &StoreOptions;

    fn get(&self, id: u64) -> Result<Option<Flashcard>, StoreError>;

    /// Newest-created first, ties by higher id first.
    fn list(&self) -> Result<Vec<Flashcard>, StoreError>;

    /// Inserts a fully specified card under a freshly assigned id.
    /// Timestamps are stored at millisecond precision.
    fn insert_snapshot(&self, snapshot: CardSnapshot) -> Result<Flashcard, StoreError>;

    /// `insert_snapshot` that also registers the card's domain as a preset
    /// domain. Both writes happen as one unit with respect to
    /// `delete_preset_domain`, so the card never lands in a deleted domain.
    fn insert_in_preset_domain(&self, snapshot: CardSnapshot) -> Result<Flashcard, StoreError>;

    fn update(&self, id: u64, patch: FlashcardPatch) -> Result<Option<Flashcard>, StoreError>;

    /// `update` that registers a supplied domain as a preset domain in the
    /// same unit as the card write. Absent ids register nothing.
    fn update_in_preset_domain(
        &self,
        id: u64,
        patch: FlashcardPatch,
    ) -> Result<Option<Flashcard>, StoreError>;

    fn delete(&self, id: u64) -> Result<bool, StoreError>;

    /// Removes every flashcard; preset domains are left alone.
    fn clear(&self) -> Result<(), StoreError>;

    /// Sets mastery, bumps review_count and reschedules in one atomic write.
    fn record_review(
        &self,
        id: u64,
        mastery: Mastery,
        now: DateTime<Utc>,
    ) -> Result<Option<Flashcard>, StoreError>;

    fn list_preset_domains(&self) -> Result<Vec<PresetDomain>, StoreError>;

    fn create_preset_domain(&self, name: &str) -> Result<PresetDomain, StoreError>;

    /// Create-if-absent; returns the existing domain instead of a conflict.
    fn ensure_preset_domain(&self, name: &str) -> Result<PresetDomain, StoreError>;

    fn update_preset_domain(&self, id: u64, name: &str)
        -> Result<Option<PresetDomain>, StoreError>;

    /// Deletes domain `id` and rewrites every card whose domain equals `name`
    /// to the default domain, all or nothing.
    fn delete_preset_domain(&self, id: u64, name: &str) -> Result<bool, StoreError>;

    fn clear_preset_domains(&self) -> Result<(), StoreError>;

    fn create(&self, input: CreateFlashcard) -> Result<Flashcard, StoreError> {
        let snapshot =
            validation::new_card_snapshot(input, &self.options().default_domain, timestamp_now())?;
        self.insert_snapshot(snapshot)
    }

    fn daily_random(&self, limit: usize) -> Result<Vec<Flashcard>, StoreError> {
        let cards = self.list()?;
        let mut rng = rand::thread_rng();
        Ok(selector::select_daily(cards, limit, Utc::now(), &mut rng))
    }

    fn stats(&self) -> Result<StatsOverview, StoreError> {
        Ok(stats::aggregate(&self.list()?))
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub type SharedRepository = Arc<dyn FlashcardRepository>;

pub fn open_backend(
    kind: BackendKind,
    config: &Config,
) -> Result<SharedRepository, StoreError> {
    let options = StoreOptions::from_config(config);
    let repo: SharedRepository = match kind {
        BackendKind::File => Arc::new(JsonFileStore::open(
            &config.storage.data_file_path,
            options,
        )?),
        BackendKind::Sql => Arc::new(SqlStore::open(&config.storage.sqlite_path, options)?),
        BackendKind::Embedded => {
            Arc::new(EmbeddedStore::open(&config.storage.sled_path, options)?)
        }
    };
    Ok(repo)
}

/// Opens the backend selected by `STORAGE_BACKEND`.
pub fn open_repository(config: &Config) -> Result<SharedRepository, StoreError> {
    let kind = config.storage.backend;
    let repo = open_backend(kind, config)?;
    tracing::info!(backend = %kind, "Storage backend opened");
    Ok(repo)
}

pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// 列表排序：创建时间降序，同一时间按 id 降序
pub(crate) fn newest_first(a: &Flashcard, b: &Flashcard) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// 预设领域排序：创建时间升序，同一时间按 id 升序
pub(crate) fn oldest_domain_first(a: &PresetDomain, b: &PresetDomain) -> std::cmp::Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}
