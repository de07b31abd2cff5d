use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 自评掌握程度：1=不熟，2=一般，3=熟练
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub enum Mastery {
    Unfamiliar = 1,
    Familiar = 2,
    Mastered = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid mastery level {0}: must be 1, 2 or 3")]
pub struct InvalidMastery(pub i64);

impl Mastery {
    pub const ALL: [Mastery; 3] = [Mastery::Unfamiliar, Mastery::Familiar, Mastery::Mastered];

    pub fn level(self) -> u8 {
        self as u8
    }

    /// Selection weight: lower mastery is reviewed first.
    pub fn weight(self) -> u8 {
        4 - self.level()
    }
}

impl Default for Mastery {
    fn default() -> Self {
        Self::Unfamiliar
    }
}

impl TryFrom<i64> for Mastery {
    type Error = InvalidMastery;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Unfamiliar),
            2 => Ok(Self::Familiar),
            3 => Ok(Self::Mastered),
            other => Err(InvalidMastery(other)),
        }
    }
}

impl From<Mastery> for u8 {
    fn from(value: Mastery) -> Self {
        value.level()
    }
}

impl fmt::Display for Mastery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: u64,
    pub sentence: String,
    pub word: String,
    pub translation: String,
    pub definition: String,
    pub domain: String,
    pub mastery: Mastery,
    pub review_count: u32,
    pub next_review: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Flashcard {
    pub fn from_snapshot(id: u64, snapshot: CardSnapshot) -> Self {
        Self {
            id,
            sentence: snapshot.sentence,
            word: snapshot.word,
            translation: snapshot.translation,
            definition: snapshot.definition,
            domain: snapshot.domain,
            mastery: snapshot.mastery,
            review_count: snapshot.review_count,
            next_review: snapshot.next_review,
            created_at: snapshot.created_at,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }
}

/// 除 id 外的完整卡片内容，用于导入、恢复与迁移
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSnapshot {
    pub sentence: String,
    pub word: String,
    pub translation: String,
    pub definition: String,
    pub domain: String,
    pub mastery: Mastery,
    pub review_count: u32,
    pub next_review: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CardSnapshot {
    /// 时间戳截断到毫秒，三种后端存取后保持一致
    pub fn truncated_to_millis(mut self) -> Self {
        self.next_review = self.next_review.trunc_subsecs(3);
        self.created_at = self.created_at.trunc_subsecs(3);
        self
    }
}

impl From<Flashcard> for CardSnapshot {
    fn from(card: Flashcard) -> Self {
        Self {
            sentence: card.sentence,
            word: card.word,
            translation: card.translation,
            definition: card.definition,
            domain: card.domain,
            mastery: card.mastery,
            review_count: card.review_count,
            next_review: card.next_review,
            created_at: card.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateFlashcard {
    #[serde(default)]
    pub sentence: String,
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub translation: String,
    pub definition: Option<String>,
    pub domain: Option<String>,
}

/// Partial update of the card content; `None` leaves the field untouched.
/// 调度状态（mastery、review_count、next_review）只能通过复习提交改变，未知字段被忽略。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashcardPatch {
    pub sentence: Option<String>,
    pub word: Option<String>,
    pub translation: Option<String>,
    pub definition: Option<String>,
    pub domain: Option<String>,
}

impl FlashcardPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply_to(&self, card: &mut Flashcard) {
        if let Some(sentence) = &self.sentence {
            card.sentence = sentence.clone();
        }
        if let Some(word) = &self.word {
            card.word = word.clone();
        }
        if let Some(translation) = &self.translation {
            card.translation = translation.clone();
        }
        if let Some(definition) = &self.definition {
            card.definition = definition.clone();
        }
        if let Some(domain) = &self.domain {
            card.domain = domain.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetDomain {
    pub id: u64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsOverview {
    pub total_cards: u64,
    pub mastered_cards: u64,
    /// 百分比，保留一位小数（四舍五入）
    pub mastery_rate: f64,
    pub domain_distribution: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mastery_serializes_as_bare_integer() {
        let json = serde_json::to_string(&Mastery::Familiar).unwrap();
        assert_eq!(json, "2");
        let back: Mastery = serde_json::from_str("3").unwrap();
        assert_eq!(back, Mastery::Mastered);
    }

    #[test]
    fn mastery_rejects_out_of_range_input() {
        assert!(serde_json::from_str::<Mastery>("0").is_err());
        assert!(serde_json::from_str::<Mastery>("4").is_err());
        assert_eq!(Mastery::try_from(-1), Err(InvalidMastery(-1)));
    }

    #[test]
    fn weight_is_inverse_of_level() {
        assert_eq!(Mastery::Unfamiliar.weight(), 3);
        assert_eq!(Mastery::Familiar.weight(), 2);
        assert_eq!(Mastery::Mastered.weight(), 1);
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let now = Utc::now();
        let mut card = Flashcard {
            id: 7,
            sentence: "s".into(),
            word: "w".into(),
            translation: "t".into(),
            definition: "d".into(),
            domain: "通用".into(),
            mastery: Mastery::Unfamiliar,
            review_count: 0,
            next_review: now,
            created_at: now,
        };
        let patch = FlashcardPatch {
            word: Some("word".into()),
            domain: Some("GIS".into()),
            ..Default::default()
        };
        patch.apply_to(&mut card);

        assert_eq!(card.word, "word");
        assert_eq!(card.domain, "GIS");
        assert_eq!(card.mastery, Mastery::Unfamiliar);
        assert_eq!(card.sentence, "s");
        assert_eq!(card.created_at, now);
        assert!(!patch.is_empty());
        assert!(FlashcardPatch::default().is_empty());
    }

    #[test]
    fn patch_ignores_scheduling_fields_in_json() {
        let patch: FlashcardPatch = serde_json::from_value(serde_json::json!({
            "definition": "d2",
            "review_count": 0,
            "mastery": 3,
        }))
        .unwrap();
        assert_eq!(
            patch,
            FlashcardPatch {
                definition: Some("d2".into()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn snapshot_timestamps_truncate_to_millis() {
        let ts: DateTime<Utc> = "2030-01-01T00:00:00.123456Z".parse().unwrap();
        let snap = CardSnapshot {
            sentence: "s".into(),
            word: "w".into(),
            translation: "t".into(),
            definition: String::new(),
            domain: "通用".into(),
            mastery: Mastery::Unfamiliar,
            review_count: 0,
            next_review: ts,
            created_at: ts,
        }
        .truncated_to_millis();
        assert_eq!(snap.next_review.timestamp_subsec_micros(), 123_000);
        assert_eq!(snap.created_at, snap.next_review);
    }

    #[test]
    fn flashcard_json_uses_snake_case_record_shape() {
        let now = Utc::now();
        let card = Flashcard {
            id: 1,
            sentence: "s".into(),
            word: "w".into(),
            translation: "t".into(),
            definition: String::new(),
            domain: "GIS".into(),
            mastery: Mastery::Familiar,
            review_count: 4,
            next_review: now,
            created_at: now,
        };
        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value["mastery"], 2);
        assert_eq!(value["review_count"], 4);
        assert!(value["next_review"].is_string());
        assert!(value["created_at"].is_string());
    }
}
