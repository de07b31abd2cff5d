//! 嵌入式 KV 后端（sled）。
//!
//! 卡片与预设领域各占一棵树，另有按创建时间的二级索引、领域名唯一索引
//! 和 meta 树（自增序列、schema 版本）。跨树写入全部走 sled 事务。

pub mod flashcards;
pub mod keys;
pub mod migrate;
pub mod preset_domains;
pub mod trees;

use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree,
};
use sled::Db;

use crate::srs::{CardSnapshot, Flashcard, FlashcardPatch, Mastery, PresetDomain};
use crate::store::lifecycle::Lifecycle;
use crate::store::{
    seed, timestamp_now, to_millis, BackendKind, FlashcardRepository, StoreError, StoreOptions,
};
use crate::validation;

pub(crate) type TxResult<T> = Result<T, ConflictableTransactionError<StoreError>>;

pub(crate) fn abort<T>(err: StoreError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

pub(crate) fn map_tx_err(e: TransactionError<StoreError>) -> StoreError {
    match e {
        TransactionError::Abort(store_err) => store_err,
        TransactionError::Storage(sled_err) => StoreError::Sled(sled_err),
    }
}

/// 在事务内递增 meta 树中的序列并返回新值（从 1 开始）
pub(crate) fn next_sequence(meta: &TransactionalTree, key: &str) -> TxResult<u64> {
    let current = match meta.get(key.as_bytes())? {
        Some(raw) => keys::decode_u64(&raw).or_else(abort)?,
        None => 0,
    };
    let next = current + 1;
    meta.insert(key.as_bytes(), keys::encode_u64(next))?;
    Ok(next)
}

#[derive(Debug)]
pub struct EmbeddedStore {
    db: Db,
    pub flashcards: sled::Tree,
    pub preset_domains: sled::Tree,
    pub meta: sled::Tree,
    // Secondary index trees
    pub flashcards_by_created_at: sled::Tree,
    pub preset_domain_names: sled::Tree,
    options: StoreOptions,
    lifecycle: Lifecycle,
    /// 卡片写操作持读锁，领域级联删除持写锁
    cascade_guard: RwLock<()>,
}

impl EmbeddedStore {
    pub fn open(sled_path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let db = sled::open(sled_path.as_ref())?;
        tracing::debug!(path = %sled_path.as_ref().display(), "Opened sled store");
        Self::from_db(db, options)
    }

    /// 进程退出即删除的临时库，供测试与迁移预演使用
    pub fn open_temporary(options: StoreOptions) -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, options)
    }

    fn from_db(db: Db, options: StoreOptions) -> Result<Self, StoreError> {
        let flashcards = db.open_tree(trees::FLASHCARDS)?;
        let preset_domains = db.open_tree(trees::PRESET_DOMAINS)?;
        let meta = db.open_tree(trees::META)?;
        let flashcards_by_created_at = db.open_tree(trees::FLASHCARDS_BY_CREATED_AT)?;
        let preset_domain_names = db.open_tree(trees::PRESET_DOMAIN_NAMES)?;

        let store = Self {
            db,
            flashcards,
            preset_domains,
            meta,
            flashcards_by_created_at,
            preset_domain_names,
            options,
            lifecycle: Lifecycle::new(),
            cascade_guard: RwLock::new(()),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    fn ensure_ready(&self) -> Result<(), StoreError> {
        self.lifecycle.ensure_ready(|| {
            let plan = seed::plan(
                self.flashcards.is_empty(),
                self.preset_domains.is_empty(),
                &self.options,
                timestamp_now(),
            );
            if plan.is_empty() {
                return Ok(());
            }
            let now = timestamp_now();
            for name in &plan.preset_domains {
                self.raw_ensure_domain(name, now)?;
            }
            for snapshot in &plan.cards {
                self.raw_insert_card(snapshot)?;
            }
            self.db.flush()?;
            tracing::info!(backend = "embedded", "Seeded empty store");
            Ok(())
        })
    }
}

impl FlashcardRepository for EmbeddedStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Embedded
    }

    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn get(&self, id: u64) -> Result<Option<Flashcard>, StoreError> {
        self.ensure_ready()?;
        self.raw_get_card(id)
    }

    fn list(&self) -> Result<Vec<Flashcard>, StoreError> {
        self.ensure_ready()?;
        self.raw_list_cards()
    }

    fn insert_snapshot(&self, snapshot: CardSnapshot) -> Result<Flashcard, StoreError> {
        self.ensure_ready()?;
        let _guard = self.cascade_guard.read()?;
        self.raw_insert_card(&snapshot.truncated_to_millis())
    }

    fn insert_in_preset_domain(&self, snapshot: CardSnapshot) -> Result<Flashcard, StoreError> {
        let domain = validation::normalize_domain_name(&snapshot.domain)?;
        self.ensure_ready()?;
        // 登记领域与写入卡片在同一个读锁区间内，级联删除无法插入其间
        let _guard = self.cascade_guard.read()?;
        self.raw_ensure_domain(&domain, timestamp_now())?;
        self.raw_insert_card(&snapshot.truncated_to_millis())
    }

    fn update(&self, id: u64, patch: FlashcardPatch) -> Result<Option<Flashcard>, StoreError> {
        let patch = validation::normalize_patch(patch, &self.options.default_domain)?;
        self.ensure_ready()?;
        let _guard = self.cascade_guard.read()?;
        self.raw_modify_card(id, |card| patch.apply_to(card))
    }

    fn update_in_preset_domain(
        &self,
        id: u64,
        patch: FlashcardPatch,
    ) -> Result<Option<Flashcard>, StoreError> {
        let patch = validation::normalize_patch(patch, &self.options.default_domain)?;
        let domain = patch
            .domain
            .as_deref()
            .map(validation::normalize_domain_name)
            .transpose()?;
        self.ensure_ready()?;
        let _guard = self.cascade_guard.read()?;
        if self.raw_get_card(id)?.is_none() {
            return Ok(None);
        }
        if let Some(domain) = &domain {
            self.raw_ensure_domain(domain, timestamp_now())?;
        }
        self.raw_modify_card(id, |card| patch.apply_to(card))
    }

    fn delete(&self, id: u64) -> Result<bool, StoreError> {
        self.ensure_ready()?;
        let _guard = self.cascade_guard.read()?;
        self.raw_delete_card(id)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.ensure_ready()?;
        let _guard = self.cascade_guard.read()?;
        self.raw_clear_cards()
    }

    fn record_review(
        &self,
        id: u64,
        mastery: Mastery,
        now: DateTime<Utc>,
    ) -> Result<Option<Flashcard>, StoreError> {
        self.ensure_ready()?;
        let _guard = self.cascade_guard.read()?;
        let next_review = to_millis(crate::srs::scheduler::next_review(now, mastery));
        self.raw_modify_card(id, |card| {
            card.mastery = mastery;
            card.review_count = card.review_count.saturating_add(1);
            card.next_review = next_review;
        })
    }

    fn list_preset_domains(&self) -> Result<Vec<PresetDomain>, StoreError> {
        self.ensure_ready()?;
        self.raw_list_domains()
    }

    fn create_preset_domain(&self, name: &str) -> Result<PresetDomain, StoreError> {
        let name = validation::normalize_domain_name(name)?;
        self.ensure_ready()?;
        self.raw_create_domain(&name, timestamp_now())
    }

    fn ensure_preset_domain(&self, name: &str) -> Result<PresetDomain, StoreError> {
        let name = validation::normalize_domain_name(name)?;
        self.ensure_ready()?;
        self.raw_ensure_domain(&name, timestamp_now())
    }

    fn update_preset_domain(
        &self,
        id: u64,
        name: &str,
    ) -> Result<Option<PresetDomain>, StoreError> {
        let name = validation::normalize_domain_name(name)?;
        self.ensure_ready()?;
        self.raw_rename_domain(id, &name)
    }

    fn delete_preset_domain(&self, id: u64, name: &str) -> Result<bool, StoreError> {
        self.ensure_ready()?;
        let _guard = self.cascade_guard.write()?;
        self.raw_delete_domain_cascade(id, name, &self.options.default_domain)
    }

    fn clear_preset_domains(&self) -> Result<(), StoreError> {
        self.ensure_ready()?;
        self.raw_clear_domains()
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
