use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use scimemo_backend::srs::{CardSnapshot, Flashcard, Mastery};
use scimemo_backend::store::{timestamp_now, FlashcardRepository};

pub fn card_body(word: &str, domain: Option<&str>) -> Value {
    let mut body = json!({
        "sentence": format!("The {word} was noted in the report."),
        "word": word,
        "translation": format!("{word}-译"),
    });
    if let Some(domain) = domain {
        body["domain"] = json!(domain);
    }
    body
}

pub fn snapshot(word: &str, domain: &str, mastery: Mastery, next_review: DateTime<Utc>) -> CardSnapshot {
    CardSnapshot {
        sentence: format!("A sentence about {word}."),
        word: word.to_string(),
        translation: format!("{word}-译"),
        definition: String::new(),
        domain: domain.to_string(),
        mastery,
        review_count: 0,
        next_review,
        created_at: timestamp_now(),
    }
}

/// 插入一张 next_review 相对现在偏移 `due_in_hours` 小时的卡片
pub fn seed_card(
    repo: &dyn FlashcardRepository,
    word: &str,
    mastery: Mastery,
    due_in_hours: i64,
) -> Flashcard {
    let next_review = timestamp_now() + Duration::hours(due_in_hours);
    repo.insert_snapshot(snapshot(word, "通用", mastery, next_review))
        .expect("insert seed card")
}

pub fn seed_card_in_domain(repo: &dyn FlashcardRepository, word: &str, domain: &str) -> Flashcard {
    repo.insert_in_preset_domain(snapshot(word, domain, Mastery::Unfamiliar, timestamp_now()))
        .expect("insert seed card")
}
