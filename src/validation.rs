/// 公共验证函数模块
/// 卡片与预设领域的输入规范化，所有存储后端共用。
use chrono::{DateTime, Utc};

use crate::constants::MAX_DOMAIN_NAME_CHARS;
use crate::srs::{CardSnapshot, CreateFlashcard, FlashcardPatch, Mastery};
use crate::store::StoreError;

fn required(field: &str, value: &str) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

/// 领域为空或只含空白时回落到默认领域
pub fn resolve_domain(domain: Option<&str>, default_domain: &str) -> String {
    match domain.map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => default_domain.to_string(),
    }
}

/// 新建卡片：mastery=1，review_count=0，next_review=created_at=now
pub fn new_card_snapshot(
    input: CreateFlashcard,
    default_domain: &str,
    now: DateTime<Utc>,
) -> Result<CardSnapshot, StoreError> {
    Ok(CardSnapshot {
        sentence: required("sentence", &input.sentence)?,
        word: required("word", &input.word)?,
        translation: required("translation", &input.translation)?,
        definition: input
            .definition
            .map(|d| d.trim().to_string())
            .unwrap_or_default(),
        domain: resolve_domain(input.domain.as_deref(), default_domain),
        mastery: Mastery::Unfamiliar,
        review_count: 0,
        next_review: now,
        created_at: now,
    })
}

pub fn normalize_patch(
    patch: FlashcardPatch,
    default_domain: &str,
) -> Result<FlashcardPatch, StoreError> {
    Ok(FlashcardPatch {
        sentence: patch.sentence.map(|s| required("sentence", &s)).transpose()?,
        word: patch.word.map(|s| required("word", &s)).transpose()?,
        translation: patch
            .translation
            .map(|s| required("translation", &s))
            .transpose()?,
        definition: patch.definition.map(|d| d.trim().to_string()),
        domain: patch
            .domain
            .map(|d| resolve_domain(Some(&d), default_domain)),
    })
}

pub fn normalize_domain_name(name: &str) -> Result<String, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation("domain name must not be blank".into()));
    }
    if trimmed.chars().count() > MAX_DOMAIN_NAME_CHARS {
        return Err(StoreError::Validation(format!(
            "domain name must be at most {MAX_DOMAIN_NAME_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}
