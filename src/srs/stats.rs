use std::collections::BTreeMap;

use crate::srs::types::{Flashcard, Mastery, StatsOverview};

/// 掌握率（百分比，一位小数，四舍五入）。没有卡片时为 0。
pub fn mastery_rate(mastered: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    // 以十分之一个百分点为单位做整数四舍五入，避免浮点边界误差
    let tenths = (mastered as u128 * 2000 + total as u128) / (2 * total as u128);
    tenths as f64 / 10.0
}

pub fn aggregate(cards: &[Flashcard]) -> StatsOverview {
    let mut domain_distribution: BTreeMap<String, u64> = BTreeMap::new();
    let mut mastered_cards = 0u64;

    for card in cards {
        if card.mastery == Mastery::Mastered {
            mastered_cards += 1;
        }
        *domain_distribution.entry(card.domain.clone()).or_default() += 1;
    }

    let total_cards = cards.len() as u64;
    StatsOverview {
        total_cards,
        mastered_cards,
        mastery_rate: mastery_rate(mastered_cards, total_cards),
        domain_distribution,
    }
}
