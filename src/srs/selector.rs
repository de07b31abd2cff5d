//! 每日复习选卡：按掌握程度加权的随机抽取。
//!
//! 到期卡片先做一次 Fisher–Yates 洗牌，再按权重（4 - mastery）稳定降序排序：
//! 同权重卡片保持洗牌后的随机相对顺序，低掌握度卡片整体靠前。
//! 这只是加权抽样的近似，不是严格的按权重无放回抽样。
//! 没有到期卡片时退化为确定性排序：掌握度升序，创建时间降序。

use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::srs::types::Flashcard;

/// Picks at most `limit` cards from a snapshot of the whole store.
pub fn select_daily<R>(
    cards: Vec<Flashcard>,
    limit: usize,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<Flashcard>
where
    R: Rng + ?Sized,
{
    if limit == 0 {
        return Vec::new();
    }

    let (due, rest): (Vec<Flashcard>, Vec<Flashcard>) =
        cards.into_iter().partition(|card| card.is_due(now));

    if due.is_empty() {
        return lowest_mastery_first(rest, limit);
    }

    weighted_batch(due, limit, rng)
}

/// Due-branch ordering on an already filtered set of due cards.
pub fn weighted_batch<R>(mut due: Vec<Flashcard>, limit: usize, rng: &mut R) -> Vec<Flashcard>
where
    R: Rng + ?Sized,
{
    fisher_yates(&mut due, rng);
    // sort_by_key is stable, so equal weights keep the shuffled order
    due.sort_by_key(|card| Reverse(card.mastery.weight()));
    due.truncate(limit);
    due
}

/// Deterministic fallback used when nothing is due.
pub fn lowest_mastery_first(mut cards: Vec<Flashcard>, limit: usize) -> Vec<Flashcard> {
    cards.sort_by(fallback_order);
    cards.truncate(limit);
    cards
}

pub fn fallback_order(a: &Flashcard, b: &Flashcard) -> Ordering {
    a.mastery
        .cmp(&b.mastery)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

fn fisher_yates<T, R>(items: &mut [T], rng: &mut R)
where
    R: Rng + ?Sized,
{
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}
