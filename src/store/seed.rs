use chrono::{DateTime, Utc};

use crate::constants::INITIAL_PRESET_DOMAINS;
use crate::srs::{CardSnapshot, Mastery};
use crate::store::StoreOptions;

const SAMPLE_CARDS: &[(&str, &str, &str, &str, &str)] = &[
    (
        "The hypothesis was corroborated by empirical evidence from multiple experiments.",
        "corroborated",
        "证实，确证",
        "To confirm or give support to a statement, theory, or finding.",
        "通用",
    ),
    (
        "The researchers identified a statistically significant correlation between the variables.",
        "correlation",
        "相关性",
        "A mutual relationship or connection between two or more things.",
        "统计学",
    ),
    (
        "The methodology section describes the experimental design in detail.",
        "methodology",
        "方法论",
        "A system of methods used in a particular area of study or activity.",
        "科研方法",
    ),
];

/// 空库首次使用时要写入的数据。卡片与预设领域分别判断是否为空。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedPlan {
    pub cards: Vec<CardSnapshot>,
    pub preset_domains: Vec<String>,
}

impl SeedPlan {
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty() && self.preset_domains.is_empty()
    }
}

pub fn plan(
    cards_empty: bool,
    domains_empty: bool,
    options: &StoreOptions,
    now: DateTime<Utc>,
) -> SeedPlan {
    let cards = if cards_empty && options.seed_sample_data {
        sample_cards(now)
    } else {
        Vec::new()
    };

    let preset_domains = if domains_empty {
        initial_domains(options)
    } else {
        Vec::new()
    };

    SeedPlan {
        cards,
        preset_domains,
    }
}

pub fn sample_cards(now: DateTime<Utc>) -> Vec<CardSnapshot> {
    SAMPLE_CARDS
        .iter()
        .map(
            |&(sentence, word, translation, definition, domain)| CardSnapshot {
                sentence: sentence.to_string(),
                word: word.to_string(),
                translation: translation.to_string(),
                definition: definition.to_string(),
                domain: domain.to_string(),
                mastery: Mastery::Unfamiliar,
                review_count: 0,
                next_review: now,
                created_at: now,
            },
        )
        .collect()
}

/// 初始预设领域；配置了自定义默认领域时保证它也在列表中
pub fn initial_domains(options: &StoreOptions) -> Vec<String> {
    let mut names: Vec<String> = INITIAL_PRESET_DOMAINS
        .iter()
        .map(|name| name.to_string())
        .collect();
    if !names.iter().any(|name| name == &options.default_domain) {
        names.insert(0, options.default_domain.clone());
    }
    names
}
