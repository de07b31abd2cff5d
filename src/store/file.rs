//! 单个 JSON 文件后端。
//!
//! 整个文档常驻内存，所有操作在同一把 Mutex 下完成。每次修改先在副本上
//! 进行，写入临时文件并 rename 成功后才替换内存中的文档，因此写失败时
//! 内存与磁盘都保持旧状态。

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::srs::{scheduler, CardSnapshot, Flashcard, FlashcardPatch, Mastery, PresetDomain};
use crate::store::lifecycle::Lifecycle;
use crate::store::{
    newest_first, oldest_domain_first, seed, timestamp_now, to_millis, BackendKind,
    FlashcardRepository, StoreError, StoreOptions,
};
use crate::validation;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileDocument {
    #[serde(default)]
    next_card_id: u64,
    #[serde(default)]
    next_domain_id: u64,
    #[serde(default)]
    flashcards: Vec<Flashcard>,
    #[serde(default)]
    preset_domains: Vec<PresetDomain>,
}

/// 旧版数据文件是一个纯卡片数组
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Legacy(Vec<Flashcard>),
    Document(FileDocument),
}

impl FileDocument {
    fn normalize_counters(&mut self) {
        let max_card = self.flashcards.iter().map(|c| c.id).max().unwrap_or(0);
        let max_domain = self.preset_domains.iter().map(|d| d.id).max().unwrap_or(0);
        self.next_card_id = self.next_card_id.max(max_card + 1);
        self.next_domain_id = self.next_domain_id.max(max_domain + 1);
    }

    fn tap_normalize(mut self) -> Self {
        self.normalize_counters();
        self
    }

    fn allocate_card_id(&mut self) -> u64 {
        let id = self.next_card_id;
        self.next_card_id += 1;
        id
    }

    fn push_card(&mut self, snapshot: CardSnapshot) -> Flashcard {
        let card = Flashcard::from_snapshot(self.allocate_card_id(), snapshot.truncated_to_millis());
        self.flashcards.push(card.clone());
        card
    }

    fn push_domain(&mut self, name: String, created_at: DateTime<Utc>) -> PresetDomain {
        let domain = PresetDomain {
            id: self.next_domain_id,
            name,
            created_at,
        };
        self.next_domain_id += 1;
        self.preset_domains.push(domain.clone());
        domain
    }

    /// 返回领域以及是否新建
    fn ensure_domain(&mut self, name: String, created_at: DateTime<Utc>) -> (PresetDomain, bool) {
        if let Some(existing) = self.domain_by_name(&name) {
            return (existing.clone(), false);
        }
        (self.push_domain(name, created_at), true)
    }

    fn card_mut(&mut self, id: u64) -> Option<&mut Flashcard> {
        self.flashcards.iter_mut().find(|c| c.id == id)
    }

    fn domain_by_name(&self, name: &str) -> Option<&PresetDomain> {
        self.preset_domains.iter().find(|d| d.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Changed,
    Unchanged,
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    options: StoreOptions,
    doc: Mutex<FileDocument>,
    lifecycle: Lifecycle,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let doc = Self::load(&path)?;
        tracing::debug!(
            path = %path.display(),
            cards = doc.flashcards.len(),
            "Opened JSON file store"
        );
        Ok(Self {
            path,
            options,
            doc: Mutex::new(doc),
            lifecycle: Lifecycle::new(),
        })
    }

    fn load(path: &Path) -> Result<FileDocument, StoreError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileDocument::default().tap_normalize())
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(FileDocument::default().tap_normalize());
        }

        let mut doc = match serde_json::from_str::<OnDisk>(&raw) {
            Ok(OnDisk::Document(doc)) => doc,
            Ok(OnDisk::Legacy(flashcards)) => {
                tracing::info!(
                    path = %path.display(),
                    cards = flashcards.len(),
                    "Upgrading legacy flashcard array file"
                );
                FileDocument {
                    flashcards,
                    ..FileDocument::default()
                }
            }
            Err(_) => {
                // untagged 的报错信息不具体，重新按文档格式解析以拿到行列号
                let err = serde_json::from_str::<FileDocument>(&raw)
                    .err()
                    .map(StoreError::Serialization)
                    .unwrap_or_else(|| {
                        StoreError::Validation(format!("unreadable data file {}", path.display()))
                    });
                return Err(err);
            }
        };
        doc.normalize_counters();
        Ok(doc)
    }

    fn persist(&self, doc: &FileDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn apply<T, F>(&self, doc: &mut FileDocument, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut FileDocument) -> Result<(T, Outcome), StoreError>,
    {
        let mut draft = doc.clone();
        let (value, outcome) = f(&mut draft)?;
        if outcome == Outcome::Changed {
            self.persist(&draft)?;
            *doc = draft;
        }
        Ok(value)
    }

    fn ensure_ready(&self) -> Result<(), StoreError> {
        self.lifecycle.ensure_ready(|| {
            let mut doc = self.doc.lock()?;
            let plan = seed::plan(
                doc.flashcards.is_empty(),
                doc.preset_domains.is_empty(),
                &self.options,
                timestamp_now(),
            );
            if plan.is_empty() {
                return Ok(());
            }
            self.apply(&mut doc, |draft| {
                let now = timestamp_now();
                for name in plan.preset_domains {
                    draft.push_domain(name, now);
                }
                for snapshot in plan.cards {
                    draft.push_card(snapshot);
                }
                Ok(((), Outcome::Changed))
            })?;
            tracing::info!(backend = "file", "Seeded empty store");
            Ok(())
        })
    }

    fn read<T>(&self, f: impl FnOnce(&FileDocument) -> T) -> Result<T, StoreError> {
        self.ensure_ready()?;
        let doc = self.doc.lock()?;
        Ok(f(&doc))
    }

    fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut FileDocument) -> Result<(T, Outcome), StoreError>,
    {
        self.ensure_ready()?;
        let mut doc = self.doc.lock()?;
        self.apply(&mut doc, f)
    }
}

impl FlashcardRepository for JsonFileStore {
    fn backend(&self) -> BackendKind {
        BackendKind::File
    }

    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn get(&self, id: u64) -> Result<Option<Flashcard>, StoreError> {
        self.read(|doc| doc.flashcards.iter().find(|c| c.id == id).cloned())
    }

    fn list(&self) -> Result<Vec<Flashcard>, StoreError> {
        let mut cards = self.read(|doc| doc.flashcards.clone())?;
        cards.sort_by(newest_first);
        Ok(cards)
    }

    fn insert_snapshot(&self, snapshot: CardSnapshot) -> Result<Flashcard, StoreError> {
        self.mutate(|doc| Ok((doc.push_card(snapshot), Outcome::Changed)))
    }

    fn insert_in_preset_domain(&self, snapshot: CardSnapshot) -> Result<Flashcard, StoreError> {
        let domain = validation::normalize_domain_name(&snapshot.domain)?;
        self.mutate(|doc| {
            doc.ensure_domain(domain, timestamp_now());
            Ok((doc.push_card(snapshot), Outcome::Changed))
        })
    }

    fn update(&self, id: u64, patch: FlashcardPatch) -> Result<Option<Flashcard>, StoreError> {
        let patch = validation::normalize_patch(patch, &self.options.default_domain)?;
        self.mutate(|doc| match doc.card_mut(id) {
            Some(card) => {
                patch.apply_to(card);
                Ok((Some(card.clone()), Outcome::Changed))
            }
            None => Ok((None, Outcome::Unchanged)),
        })
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
        self.mutate(|doc| {
            if doc.card_mut(id).is_none() {
                return Ok((None, Outcome::Unchanged));
            }
            if let Some(domain) = domain {
                doc.ensure_domain(domain, timestamp_now());
            }
            let card = doc.card_mut(id).map(|card| {
                patch.apply_to(card);
                card.clone()
            });
            Ok((card, Outcome::Changed))
        })
    }

    fn delete(&self, id: u64) -> Result<bool, StoreError> {
        self.mutate(|doc| {
            let before = doc.flashcards.len();
            doc.flashcards.retain(|c| c.id != id);
            if doc.flashcards.len() < before {
                Ok((true, Outcome::Changed))
            } else {
                Ok((false, Outcome::Unchanged))
            }
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.mutate(|doc| {
            let outcome = if doc.flashcards.is_empty() {
                Outcome::Unchanged
            } else {
                Outcome::Changed
            };
            doc.flashcards.clear();
            Ok(((), outcome))
        })
    }

    fn record_review(
        &self,
        id: u64,
        mastery: Mastery,
        now: DateTime<Utc>,
    ) -> Result<Option<Flashcard>, StoreError> {
        self.mutate(|doc| match doc.card_mut(id) {
            Some(card) => {
                card.mastery = mastery;
                card.review_count = card.review_count.saturating_add(1);
                card.next_review = to_millis(scheduler::next_review(now, mastery));
                Ok((Some(card.clone()), Outcome::Changed))
            }
            None => Ok((None, Outcome::Unchanged)),
        })
    }

    fn list_preset_domains(&self) -> Result<Vec<PresetDomain>, StoreError> {
        let mut domains = self.read(|doc| doc.preset_domains.clone())?;
        domains.sort_by(oldest_domain_first);
        Ok(domains)
    }

    fn create_preset_domain(&self, name: &str) -> Result<PresetDomain, StoreError> {
        let name = validation::normalize_domain_name(name)?;
        self.mutate(|doc| {
            if doc.domain_by_name(&name).is_some() {
                return Err(StoreError::conflict("preset_domain", &name));
            }
            Ok((doc.push_domain(name, timestamp_now()), Outcome::Changed))
        })
    }

    fn ensure_preset_domain(&self, name: &str) -> Result<PresetDomain, StoreError> {
        let name = validation::normalize_domain_name(name)?;
        self.mutate(|doc| match doc.ensure_domain(name, timestamp_now()) {
            (domain, true) => Ok((domain, Outcome::Changed)),
            (domain, false) => Ok((domain, Outcome::Unchanged)),
        })
    }

    fn update_preset_domain(
        &self,
        id: u64,
        name: &str,
    ) -> Result<Option<PresetDomain>, StoreError> {
        let name = validation::normalize_domain_name(name)?;
        self.mutate(|doc| {
            if doc
                .preset_domains
                .iter()
                .any(|d| d.name == name && d.id != id)
            {
                return Err(StoreError::conflict("preset_domain", &name));
            }
            match doc.preset_domains.iter_mut().find(|d| d.id == id) {
                Some(domain) if domain.name == name => Ok((Some(domain.clone()), Outcome::Unchanged)),
                Some(domain) => {
                    domain.name = name;
                    Ok((Some(domain.clone()), Outcome::Changed))
                }
                None => Ok((None, Outcome::Unchanged)),
            }
        })
    }

    fn delete_preset_domain(&self, id: u64, name: &str) -> Result<bool, StoreError> {
        let default_domain = self.options.default_domain.clone();
        let (deleted, rewritten) = self.mutate(|doc| {
            let before = doc.preset_domains.len();
            doc.preset_domains.retain(|d| d.id != id);
            if doc.preset_domains.len() == before {
                return Ok(((false, 0usize), Outcome::Unchanged));
            }
            // 同一份文档内完成级联改写，随删除一起落盘
            let mut rewritten = 0usize;
            for card in doc.flashcards.iter_mut().filter(|c| c.domain == name) {
                card.domain = default_domain.clone();
                rewritten += 1;
            }
            Ok(((true, rewritten), Outcome::Changed))
        })?;

        if deleted {
            tracing::info!(id, domain = %name, rewritten, "Preset domain deleted");
        }
        Ok(deleted)
    }

    fn clear_preset_domains(&self) -> Result<(), StoreError> {
        self.mutate(|doc| {
            let outcome = if doc.preset_domains.is_empty() {
                Outcome::Unchanged
            } else {
                Outcome::Changed
            };
            doc.preset_domains.clear();
            Ok(((), outcome))
        })
    }
}
