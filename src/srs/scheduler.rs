//! 复习间隔计算：根据自评掌握程度给出下一次复习时间。
//!
//! 间隔表是固定策略，所有存储后端共用这一份实现。

use chrono::{DateTime, Duration, Utc};

use crate::constants::{
    FAMILIAR_INTERVAL_HOURS, MASTERED_INTERVAL_HOURS, UNFAMILIAR_INTERVAL_HOURS,
};
use crate::srs::types::{InvalidMastery, Mastery};

pub fn interval(mastery: Mastery) -> Duration {
    let hours = match mastery {
        Mastery::Unfamiliar => UNFAMILIAR_INTERVAL_HOURS,
        Mastery::Familiar => FAMILIAR_INTERVAL_HOURS,
        Mastery::Mastered => MASTERED_INTERVAL_HOURS,
    };
    Duration::hours(hours)
}

pub fn next_review(now: DateTime<Utc>, mastery: Mastery) -> DateTime<Utc> {
    now + interval(mastery)
}

/// Untyped entry point; anything outside 1..=3 is rejected instead of
/// falling back to the shortest interval.
pub fn next_review_for_level(
    now: DateTime<Utc>,
    level: i64,
) -> Result<DateTime<Utc>, InvalidMastery> {
    let mastery = Mastery::try_from(level)?;
    Ok(next_review(now, mastery))
}
