//! 批量导入、导出、整库备份，以及后端之间的数据迁移。

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::srs::{CardSnapshot, Flashcard, Mastery, PresetDomain};
use crate::store::{timestamp_now, FlashcardRepository, StoreError};
use crate::validation;

pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields: sentence, word, or translation";
pub const DUPLICATE_MESSAGE: &str = "Duplicate card: same word and sentence already exist";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Append,
    Overwrite,
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!(
                "Invalid mode: must be \"overwrite\" or \"append\", got \"{other}\""
            )),
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => f.write_str("append"),
            Self::Overwrite => f.write_str("overwrite"),
        }
    }
}

/// 导入请求体：卡片数组，或完整备份文档
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ImportPayload {
    Records(Vec<Value>),
    Backup(BackupPayload),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupPayload {
    pub flashcards: Vec<Value>,
    #[serde(default, alias = "presetDomains")]
    pub preset_domains: Vec<Value>,
}

impl ImportPayload {
    fn into_parts(self) -> (Vec<Value>, Vec<Value>) {
        match self {
            Self::Records(records) => (records, Vec::new()),
            Self::Backup(backup) => (backup.flashcards, backup.preset_domains),
        }
    }
}

/// 单条导入记录，字段全部可缺省，逐条宽松解析
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImportRecord {
    sentence: Option<String>,
    word: Option<String>,
    translation: Option<String>,
    definition: Option<String>,
    domain: Option<String>,
    mastery: Option<i64>,
    review_count: Option<u32>,
    next_review: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportError {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub mode: ImportMode,
    pub imported: usize,
    pub total: usize,
    pub errors: Vec<ImportError>,
    pub preset_domains_imported: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupDocument {
    pub exported_at: DateTime<Utc>,
    pub flashcards: Vec<Flashcard>,
    pub preset_domains: Vec<PresetDomain>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub flashcards: usize,
    pub preset_domains: usize,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn duplicate_key(word: &str, sentence: &str) -> (String, String) {
    (word.trim().to_lowercase(), sentence.trim().to_string())
}

fn record_to_snapshot(
    value: Value,
    default_domain: &str,
    now: DateTime<Utc>,
) -> Result<CardSnapshot, String> {
    let record: ImportRecord =
        serde_json::from_value(value).map_err(|e| format!("Invalid record: {e}"))?;

    let (Some(sentence), Some(word), Some(translation)) = (
        non_blank(record.sentence),
        non_blank(record.word),
        non_blank(record.translation),
    ) else {
        return Err(MISSING_FIELDS_MESSAGE.to_string());
    };

    let mastery = match record.mastery {
        Some(level) => Mastery::try_from(level).map_err(|e| e.to_string())?,
        None => Mastery::default(),
    };
    let created_at = record.created_at.unwrap_or(now);

    let snapshot = CardSnapshot {
        sentence,
        word,
        translation,
        definition: record
            .definition
            .map(|d| d.trim().to_string())
            .unwrap_or_default(),
        domain: validation::resolve_domain(record.domain.as_deref(), default_domain),
        mastery,
        review_count: record.review_count.unwrap_or(0),
        next_review: record.next_review.unwrap_or(created_at),
        created_at,
    };
    Ok(snapshot.truncated_to_millis())
}

fn domain_name(value: &Value) -> Option<&str> {
    match value {
        Value::String(name) => Some(name.as_str()),
        Value::Object(map) => map.get("name").and_then(Value::as_str),
        _ => None,
    }
}

/// 导入卡片。
///
/// 无效记录逐条记入 `errors`，不会中断批次；存储故障直接返回错误。
/// overwrite 模式先清空卡片，`clear_domains` 为真时同时清空预设领域。
pub fn import(
    repo: &dyn FlashcardRepository,
    payload: ImportPayload,
    mode: ImportMode,
    clear_domains: bool,
) -> Result<ImportReport, StoreError> {
    let (records, domains) = payload.into_parts();
    let default_domain = repo.options().default_domain.clone();

    if mode == ImportMode::Overwrite {
        repo.clear()?;
        if clear_domains {
            repo.clear_preset_domains()?;
        }
    }

    let mut preset_domains_imported = 0usize;
    for value in &domains {
        match domain_name(value).map(validation::normalize_domain_name) {
            Some(Ok(name)) => {
                repo.ensure_preset_domain(&name)?;
                preset_domains_imported += 1;
            }
            Some(Err(e)) => tracing::warn!(error = %e, "Skipping invalid preset domain"),
            None => tracing::warn!("Skipping preset domain without a name"),
        }
    }

    let mut existing: HashSet<(String, String)> = match mode {
        ImportMode::Append => repo
            .list()?
            .iter()
            .map(|c| duplicate_key(&c.word, &c.sentence))
            .collect(),
        ImportMode::Overwrite => HashSet::new(),
    };

    let total = records.len();
    let now = timestamp_now();
    let mut imported = 0usize;
    let mut errors = Vec::new();

    for (index, value) in records.into_iter().enumerate() {
        let snapshot = match record_to_snapshot(value, &default_domain, now) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                errors.push(ImportError { index, error });
                continue;
            }
        };

        if mode == ImportMode::Append
            && !existing.insert(duplicate_key(&snapshot.word, &snapshot.sentence))
        {
            errors.push(ImportError {
                index,
                error: DUPLICATE_MESSAGE.to_string(),
            });
            continue;
        }

        match repo.insert_in_preset_domain(snapshot) {
            Ok(_) => imported += 1,
            Err(e) if e.is_storage() => return Err(e),
            Err(e) => errors.push(ImportError {
                index,
                error: e.to_string(),
            }),
        }
    }

    tracing::info!(
        backend = %repo.backend(),
        %mode,
        imported,
        total,
        failed = errors.len(),
        "Import finished"
    );

    Ok(ImportReport {
        mode,
        imported,
        total,
        errors,
        preset_domains_imported,
    })
}

pub fn export_cards(repo: &dyn FlashcardRepository) -> Result<Vec<Flashcard>, StoreError> {
    repo.list()
}

pub fn backup(repo: &dyn FlashcardRepository) -> Result<BackupDocument, StoreError> {
    Ok(BackupDocument {
        exported_at: timestamp_now(),
        flashcards: repo.list()?,
        preset_domains: repo.list_preset_domains()?,
    })
}

/// 把一个后端的全部数据追加到另一个后端。卡片按创建先后插入，id 由目标重新分配。
pub fn migrate(
    from: &dyn FlashcardRepository,
    to: &dyn FlashcardRepository,
) -> Result<MigrationReport, StoreError> {
    let domains = from.list_preset_domains()?;
    for domain in &domains {
        to.ensure_preset_domain(&domain.name)?;
    }

    let mut cards = from.list()?;
    cards.reverse();
    let count = cards.len();
    for card in cards {
        to.insert_snapshot(CardSnapshot::from(card))?;
    }
    to.flush()?;

    tracing::info!(
        from = %from.backend(),
        to = %to.backend(),
        flashcards = count,
        preset_domains = domains.len(),
        "Migration finished"
    );

    Ok(MigrationReport {
        flashcards: count,
        preset_domains: domains.len(),
    })
}
