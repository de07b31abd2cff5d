//! 卡片相关的跨操作业务规则：领域自动创建、复习提交、按 id 删除领域。

use chrono::{DateTime, Utc};

use crate::srs::{CreateFlashcard, Flashcard, FlashcardPatch, Mastery};
use crate::store::{timestamp_now, FlashcardRepository, StoreError};
use crate::validation;

/// 新建卡片；首次出现的领域会被登记为预设领域
pub fn create_card(
    repo: &dyn FlashcardRepository,
    input: CreateFlashcard,
) -> Result<Flashcard, StoreError> {
    let snapshot =
        validation::new_card_snapshot(input, &repo.options().default_domain, timestamp_now())?;
    let card = repo.insert_in_preset_domain(snapshot)?;
    tracing::info!(id = card.id, word = %card.word, domain = %card.domain, "Flashcard created");
    Ok(card)
}

/// 修改卡片内容；新领域与卡片写入一起登记
pub fn update_card(
    repo: &dyn FlashcardRepository,
    id: u64,
    patch: FlashcardPatch,
) -> Result<Option<Flashcard>, StoreError> {
    repo.update_in_preset_domain(id, patch)
}

/// 提交一次自评复习。等级不在 1..=3 时返回 InvalidMastery，不做任何写入。
pub fn submit_review(
    repo: &dyn FlashcardRepository,
    id: u64,
    level: i64,
    now: DateTime<Utc>,
) -> Result<Option<Flashcard>, StoreError> {
    let mastery = Mastery::try_from(level)?;
    let card = repo.record_review(id, mastery, now)?;
    if let Some(card) = &card {
        tracing::info!(
            id,
            mastery = %mastery,
            review_count = card.review_count,
            "Review recorded"
        );
    }
    Ok(card)
}

/// 按 id 删除预设领域，级联改写使用库中记录的名称
pub fn delete_preset_domain_by_id(
    repo: &dyn FlashcardRepository,
    id: u64,
) -> Result<bool, StoreError> {
    let Some(domain) = repo
        .list_preset_domains()?
        .into_iter()
        .find(|d| d.id == id)
    else {
        return Ok(false);
    };
    repo.delete_preset_domain(id, &domain.name)
}
