use crate::srs::{Flashcard, PresetDomain};
use crate::store::embedded::{keys, EmbeddedStore};
use crate::store::{deserialize, StoreError};

type MigrationFn = fn(&EmbeddedStore) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_flashcards_created_at_index", m002_flashcards_created_at_index),
        ("003_sequence_floor", m003_sequence_floor),
        ("004_signed_created_at_index", m002_flashcards_created_at_index),
    ]
}

/// 执行所有未应用的迁移。
///
/// - 每个迁移必须幂等：进程可能在迁移完成后、写版本号前退出，重启会重跑。
/// - 版本号在每个迁移成功后立即持久化。
/// - 仅向前：set_version 拒绝降级。
pub fn run(store: &EmbeddedStore) -> Result<(), StoreError> {
    let current = get_current_version(store)?;

    for (index, (name, func)) in migrations().iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &EmbeddedStore) -> Result<u32, StoreError> {
    match store.meta.get(keys::VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("corrupt schema version ({} bytes)", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &EmbeddedStore, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(keys::VERSION_KEY.as_bytes(), version.to_be_bytes().to_vec())?;
    Ok(())
}

fn m001_initial(_store: &EmbeddedStore) -> Result<(), StoreError> {
    Ok(())
}

/// 按卡片树重建创建时间索引
fn m002_flashcards_created_at_index(store: &EmbeddedStore) -> Result<(), StoreError> {
    store.flashcards_by_created_at.clear()?;
    for item in store.flashcards.iter() {
        let (_, value) = item?;
        let card: Flashcard = deserialize(&value)?;
        store.flashcards_by_created_at.insert(
            keys::card_created_index_key(&card.created_at, card.id),
            keys::encode_u64(card.id),
        )?;
    }
    Ok(())
}

/// 序列值不得小于已有的最大 id（外部拷贝进来的数据可能没有序列）
fn m003_sequence_floor(store: &EmbeddedStore) -> Result<(), StoreError> {
    let mut max_card = 0u64;
    for item in store.flashcards.iter() {
        let (_, value) = item?;
        let card: Flashcard = deserialize(&value)?;
        max_card = max_card.max(card.id);
    }
    let mut max_domain = 0u64;
    for item in store.preset_domains.iter() {
        let (_, value) = item?;
        let domain: PresetDomain = deserialize(&value)?;
        max_domain = max_domain.max(domain.id);
    }

    raise_sequence(store, keys::CARD_SEQUENCE_KEY, max_card)?;
    raise_sequence(store, keys::DOMAIN_SEQUENCE_KEY, max_domain)?;
    Ok(())
}

fn raise_sequence(store: &EmbeddedStore, key: &str, floor: u64) -> Result<(), StoreError> {
    let current = match store.meta.get(key.as_bytes())? {
        Some(raw) => keys::decode_u64(&raw)?,
        None => 0,
    };
    if floor > current {
        store.meta.insert(key.as_bytes(), keys::encode_u64(floor))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{timestamp_now, StoreOptions};
    use crate::srs::{CardSnapshot, Mastery};

    #[test]
    fn migration_is_idempotent() {
        let store = EmbeddedStore::open_temporary(StoreOptions::default()).unwrap();
        let first = get_current_version(&store).unwrap();
        run(&store).unwrap();
        let second = get_current_version(&store).unwrap();

        assert_eq!(first, 4);
        assert_eq!(second, 4);
    }

    #[test]
    fn downgrade_is_rejected() {
        let store = EmbeddedStore::open_temporary(StoreOptions::default()).unwrap();
        set_version(&store, 5).unwrap();
        let err = set_version(&store, 2).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }

    #[test]
    fn index_rebuild_recovers_lost_entries() {
        let store = EmbeddedStore::open_temporary(StoreOptions::default()).unwrap();
        let now = timestamp_now();
        let card = store
            .raw_insert_card(&CardSnapshot {
                sentence: "s".into(),
                word: "w".into(),
                translation: "t".into(),
                definition: String::new(),
                domain: "通用".into(),
                mastery: Mastery::Unfamiliar,
                review_count: 0,
                next_review: now,
                created_at: now,
            })
            .unwrap();
        store.flashcards_by_created_at.clear().unwrap();
        assert!(store.raw_list_cards().unwrap().is_empty());

        m002_flashcards_created_at_index(&store).unwrap();
        assert_eq!(store.raw_list_cards().unwrap(), vec![card]);
    }

    #[test]
    fn sequence_floor_never_lowers_counter() {
        let store = EmbeddedStore::open_temporary(StoreOptions::default()).unwrap();
        store.meta.insert(keys::CARD_SEQUENCE_KEY, keys::encode_u64(50)).unwrap();
        m003_sequence_floor(&store).unwrap();
        let raw = store.meta.get(keys::CARD_SEQUENCE_KEY).unwrap().unwrap();
        assert_eq!(keys::decode_u64(&raw).unwrap(), 50);
    }
}
