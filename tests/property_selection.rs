use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use scimemo_backend::srs::scheduler::{interval, next_review_for_level};
use scimemo_backend::srs::selector::{fallback_order, select_daily};
use scimemo_backend::srs::{Flashcard, Mastery};

fn base_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

fn mastery_strategy() -> impl Strategy<Value = Mastery> {
    prop_oneof![
        Just(Mastery::Unfamiliar),
        Just(Mastery::Familiar),
        Just(Mastery::Mastered),
    ]
}

/// (mastery, next_review 相对 now 的分钟偏移, 创建时间距 now 的分钟数)
fn cards_strategy() -> impl Strategy<Value = Vec<Flashcard>> {
    prop::collection::vec((mastery_strategy(), -600i64..600, 0i64..10_000), 0..40).prop_map(
        |specs| {
            let now = base_now();
            specs
                .into_iter()
                .enumerate()
                .map(|(idx, (mastery, due_offset, age))| Flashcard {
                    id: idx as u64 + 1,
                    sentence: format!("sentence {idx}"),
                    word: format!("word{idx}"),
                    translation: "t".into(),
                    definition: String::new(),
                    domain: "通用".into(),
                    mastery,
                    review_count: 0,
                    next_review: now + Duration::minutes(due_offset),
                    created_at: now - Duration::minutes(age),
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn selection_size_and_membership(cards in cards_strategy(), limit in 0usize..60, seed in any::<u64>()) {
        let now = base_now();
        let due_count = cards.iter().filter(|c| c.is_due(now)).count();
        let total = cards.len();
        let mut rng = StdRng::seed_from_u64(seed);

        let picked = select_daily(cards, limit, now, &mut rng);

        let expected = if due_count > 0 { limit.min(due_count) } else { limit.min(total) };
        prop_assert_eq!(picked.len(), expected);

        let ids: HashSet<u64> = picked.iter().map(|c| c.id).collect();
        prop_assert_eq!(ids.len(), picked.len());

        if due_count > 0 {
            prop_assert!(picked.iter().all(|c| c.is_due(now)));
        }
    }

    #[test]
    fn due_batch_weights_never_increase(cards in cards_strategy(), seed in any::<u64>()) {
        let now = base_now();
        prop_assume!(cards.iter().any(|c| c.is_due(now)));
        let mut rng = StdRng::seed_from_u64(seed);

        let picked = select_daily(cards, 100, now, &mut rng);
        for pair in picked.windows(2) {
            prop_assert!(pair[0].mastery.weight() >= pair[1].mastery.weight());
        }
    }

    #[test]
    fn truncated_due_batch_keeps_the_neediest_cards(cards in cards_strategy(), limit in 1usize..10, seed in any::<u64>()) {
        let now = base_now();
        let due: Vec<&Flashcard> = cards.iter().filter(|c| c.is_due(now)).collect();
        prop_assume!(due.len() > limit);
        let mut rng = StdRng::seed_from_u64(seed);

        let picked = select_daily(cards.clone(), limit, now, &mut rng);
        let cutoff = picked.iter().map(|c| c.mastery).max().unwrap();
        let picked_ids: HashSet<u64> = picked.iter().map(|c| c.id).collect();
        // 没被选中的到期卡片，掌握度不会低于已选中的最高掌握度
        for card in due.iter().filter(|c| !picked_ids.contains(&c.id)) {
            prop_assert!(card.mastery >= cutoff);
        }
    }

    #[test]
    fn fallback_is_deterministic_and_sorted(cards in cards_strategy(), limit in 1usize..60, seed_a in any::<u64>(), seed_b in any::<u64>()) {
        let future: Vec<Flashcard> = cards
            .into_iter()
            .map(|mut c| {
                c.next_review = base_now() + Duration::days(1);
                c
            })
            .collect();

        let a = select_daily(future.clone(), limit, base_now(), &mut StdRng::seed_from_u64(seed_a));
        let b = select_daily(future, limit, base_now(), &mut StdRng::seed_from_u64(seed_b));
        prop_assert_eq!(&a, &b);
        for pair in a.windows(2) {
            prop_assert_ne!(fallback_order(&pair[0], &pair[1]), std::cmp::Ordering::Greater);
        }
    }

    #[test]
    fn only_levels_one_to_three_schedule(level in -20i64..20, offset_mins in 0i64..1_000_000) {
        let now = base_now() + Duration::minutes(offset_mins);
        match next_review_for_level(now, level) {
            Ok(next) => {
                prop_assert!((1..=3).contains(&level));
                let mastery = Mastery::try_from(level).unwrap();
                prop_assert_eq!(next, now + interval(mastery));
                prop_assert!(next > now);
            }
            Err(e) => {
                prop_assert!(!(1..=3).contains(&level));
                prop_assert_eq!(e.0, level);
            }
        }
    }
}

#[test]
fn intervals_grow_with_mastery() {
    assert!(interval(Mastery::Unfamiliar) < interval(Mastery::Familiar));
    assert!(interval(Mastery::Familiar) < interval(Mastery::Mastered));
}
