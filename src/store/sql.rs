//! 关系型后端（SQLite）。
//!
//! 单连接放在 Mutex 后面；级联删除、更新等多语句操作都在一个事务内完成。
//! 时间戳以毫秒精度的 RFC 3339 文本存储，字典序即时间序。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, ToSql};

use crate::srs::{
    scheduler, selector, stats, CardSnapshot, Flashcard, FlashcardPatch, Mastery, PresetDomain,
    StatsOverview,
};
use crate::store::lifecycle::Lifecycle;
use crate::store::{
    seed, timestamp_now, to_millis, BackendKind, FlashcardRepository, StoreError, StoreOptions,
};
use crate::validation;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS flashcards (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    sentence     TEXT    NOT NULL,
    word         TEXT    NOT NULL,
    translation  TEXT    NOT NULL,
    definition   TEXT    NOT NULL DEFAULT '',
    domain       TEXT    NOT NULL,
    mastery      INTEGER NOT NULL DEFAULT 1 CHECK (mastery IN (1, 2, 3)),
    review_count INTEGER NOT NULL DEFAULT 0 CHECK (review_count >= 0),
    next_review  TEXT    NOT NULL,
    created_at   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_flashcards_next_review ON flashcards(next_review);
CREATE INDEX IF NOT EXISTS idx_flashcards_domain ON flashcards(domain);
CREATE INDEX IF NOT EXISTS idx_flashcards_mastery ON flashcards(mastery);

CREATE TABLE IF NOT EXISTS preset_domains (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT    NOT NULL UNIQUE,
    created_at TEXT    NOT NULL
);
"#;

const CARD_COLUMNS: &str =
    "id, sentence, word, translation, definition, domain, mastery, review_count, next_review, created_at";

impl ToSql for Mastery {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.level())))
    }
}

impl FromSql for Mastery {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let level = i64::column_result(value)?;
        Mastery::try_from(level).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ts_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Flashcard> {
    Ok(Flashcard {
        id: row.get::<_, i64>(0)? as u64,
        sentence: row.get(1)?,
        word: row.get(2)?,
        translation: row.get(3)?,
        definition: row.get(4)?,
        domain: row.get(5)?,
        mastery: row.get(6)?,
        review_count: row.get(7)?,
        next_review: ts_from_row(row, 8)?,
        created_at: ts_from_row(row, 9)?,
    })
}

fn domain_from_row(row: &Row<'_>) -> rusqlite::Result<PresetDomain> {
    Ok(PresetDomain {
        id: row.get::<_, i64>(0)? as u64,
        name: row.get(1)?,
        created_at: ts_from_row(row, 2)?,
    })
}

/// u64 超出 SQLite 整数范围时不可能存在对应记录
fn sql_id(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn select_card(conn: &Connection, id: i64) -> Result<Option<Flashcard>, StoreError> {
    let sql = format!("SELECT {CARD_COLUMNS} FROM flashcards WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], card_from_row).optional()?)
}

fn select_domain(conn: &Connection, id: i64) -> Result<Option<PresetDomain>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, name, created_at FROM preset_domains WHERE id = ?1",
            params![id],
            domain_from_row,
        )
        .optional()?)
}

fn select_domain_by_name(conn: &Connection, name: &str) -> Result<Option<PresetDomain>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, name, created_at FROM preset_domains WHERE name = ?1",
            params![name],
            domain_from_row,
        )
        .optional()?)
}

fn insert_card(conn: &Connection, snapshot: &CardSnapshot) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO flashcards (sentence, word, translation, definition, domain, mastery, review_count, next_review, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            snapshot.sentence,
            snapshot.word,
            snapshot.translation,
            snapshot.definition,
            snapshot.domain,
            snapshot.mastery,
            snapshot.review_count,
            ts_to_sql(&snapshot.next_review),
            ts_to_sql(&snapshot.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_domain(conn: &Connection, name: &str, created_at: &DateTime<Utc>) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO preset_domains (name, created_at) VALUES (?1, ?2)",
        params![name, ts_to_sql(created_at)],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::conflict("preset_domain", name)
        } else {
            StoreError::Sqlite(e)
        }
    })?;
    Ok(conn.last_insert_rowid())
}

/// INSERT OR IGNORE，名称已存在时返回已有记录
fn ensure_domain(conn: &Connection, name: &str) -> Result<PresetDomain, StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO preset_domains (name, created_at) VALUES (?1, ?2)",
        params![name, ts_to_sql(&timestamp_now())],
    )?;
    select_domain_by_name(conn, name)?.ok_or_else(|| StoreError::not_found("preset_domain", name))
}

/// 读改写单张卡片；`register_domain` 给出时在同一事务内登记领域
fn update_card(
    conn: &mut Connection,
    id: i64,
    patch: &FlashcardPatch,
    register_domain: Option<&str>,
) -> Result<Option<Flashcard>, StoreError> {
    let tx = conn.transaction()?;
    let Some(mut card) = select_card(&tx, id)? else {
        return Ok(None);
    };
    if let Some(domain) = register_domain {
        ensure_domain(&tx, domain)?;
    }
    patch.apply_to(&mut card);
    tx.execute(
        "UPDATE flashcards
         SET sentence = ?1, word = ?2, translation = ?3, definition = ?4, domain = ?5
         WHERE id = ?6",
        params![
            card.sentence,
            card.word,
            card.translation,
            card.definition,
            card.domain,
            id,
        ],
    )?;
    tx.commit()?;
    Ok(Some(card))
}

fn count(conn: &Connection, table: &str) -> Result<u64, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(n as u64)
}

#[derive(Debug)]
pub struct SqlStore {
    conn: Mutex<Connection>,
    options: StoreOptions,
    lifecycle: Lifecycle,
}

impl SqlStore {
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        tracing::debug!(path = %path.display(), "Opened SQLite store");
        Self::with_connection(conn, options)
    }

    pub fn open_in_memory(options: StoreOptions) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, options)
    }

    fn with_connection(conn: Connection, options: StoreOptions) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            options,
            lifecycle: Lifecycle::new(),
        })
    }

    fn ensure_ready(&self) -> Result<(), StoreError> {
        self.lifecycle.ensure_ready(|| {
            let mut conn = self.conn.lock()?;
            let plan = seed::plan(
                count(&conn, "flashcards")? == 0,
                count(&conn, "preset_domains")? == 0,
                &self.options,
                timestamp_now(),
            );
            if plan.is_empty() {
                return Ok(());
            }

            let tx = conn.transaction()?;
            let now = timestamp_now();
            for name in &plan.preset_domains {
                insert_domain(&tx, name, &now)?;
            }
            for snapshot in &plan.cards {
                insert_card(&tx, snapshot)?;
            }
            tx.commit()?;
            tracing::info!(backend = "sql", "Seeded empty store");
            Ok(())
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.ensure_ready()?;
        let mut conn = self.conn.lock()?;
        f(&mut conn)
    }
}

impl FlashcardRepository for SqlStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Sql
    }

    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn get(&self, id: u64) -> Result<Option<Flashcard>, StoreError> {
        let Some(id) = sql_id(id) else {
            return Ok(None);
        };
        self.with_conn(|conn| select_card(conn, id))
    }

    fn list(&self) -> Result<Vec<Flashcard>, StoreError> {
        self.with_conn(|conn| {
            let sql =
                format!("SELECT {CARD_COLUMNS} FROM flashcards ORDER BY created_at DESC, id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let cards = stmt
                .query_map([], card_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(cards)
        })
    }

    fn insert_snapshot(&self, snapshot: CardSnapshot) -> Result<Flashcard, StoreError> {
        let snapshot = snapshot.truncated_to_millis();
        self.with_conn(|conn| {
            let id = insert_card(conn, &snapshot)?;
            Ok(Flashcard::from_snapshot(id as u64, snapshot))
        })
    }

    fn insert_in_preset_domain(&self, snapshot: CardSnapshot) -> Result<Flashcard, StoreError> {
        let snapshot = snapshot.truncated_to_millis();
        let domain = validation::normalize_domain_name(&snapshot.domain)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            ensure_domain(&tx, &domain)?;
            let id = insert_card(&tx, &snapshot)?;
            tx.commit()?;
            Ok(Flashcard::from_snapshot(id as u64, snapshot))
        })
    }

    fn update(&self, id: u64, patch: FlashcardPatch) -> Result<Option<Flashcard>, StoreError> {
        let patch = validation::normalize_patch(patch, &self.options.default_domain)?;
        let Some(id) = sql_id(id) else {
            return Ok(None);
        };
        self.with_conn(|conn| update_card(conn, id, &patch, None))
    }

    fn update_in_preset_domain(
        &self,
        id: u64,
        patch: FlashcardPatch,
    ) -> Result<Option<Flashcard>, StoreError> {
        let patch = validation::normalize_patch(patch, &self.options.default_domain)?;
        let domain = patch
            .domain
            .as_deref()
            .map(validation::normalize_domain_name)
            .transpose()?;
        let Some(id) = sql_id(id) else {
            return Ok(None);
        };
        self.with_conn(|conn| update_card(conn, id, &patch, domain.as_deref()))
    }

    fn delete(&self, id: u64) -> Result<bool, StoreError> {
        let Some(id) = sql_id(id) else {
            return Ok(false);
        };
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM flashcards WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM flashcards", [])?;
            tracing::info!(removed, "Cleared flashcards");
            Ok(())
        })
    }

    fn record_review(
        &self,
        id: u64,
        mastery: Mastery,
        now: DateTime<Utc>,
    ) -> Result<Option<Flashcard>, StoreError> {
        let Some(id) = sql_id(id) else {
            return Ok(None);
        };
        let next_review = to_millis(scheduler::next_review(now, mastery));
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE flashcards
                 SET mastery = ?1, review_count = review_count + 1, next_review = ?2
                 WHERE id = ?3",
                params![mastery, ts_to_sql(&next_review), id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let card = select_card(&tx, id)?;
            tx.commit()?;
            Ok(card)
        })
    }

    fn list_preset_domains(&self) -> Result<Vec<PresetDomain>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at FROM preset_domains ORDER BY created_at ASC, id ASC",
            )?;
            let domains = stmt
                .query_map([], domain_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(domains)
        })
    }

    fn create_preset_domain(&self, name: &str) -> Result<PresetDomain, StoreError> {
        let name = validation::normalize_domain_name(name)?;
        self.with_conn(|conn| {
            let created_at = timestamp_now();
            let id = insert_domain(conn, &name, &created_at)?;
            Ok(PresetDomain {
                id: id as u64,
                name,
                created_at,
            })
        })
    }

    fn ensure_preset_domain(&self, name: &str) -> Result<PresetDomain, StoreError> {
        let name = validation::normalize_domain_name(name)?;
        self.with_conn(|conn| ensure_domain(conn, &name))
    }

    fn update_preset_domain(
        &self,
        id: u64,
        name: &str,
    ) -> Result<Option<PresetDomain>, StoreError> {
        let name = validation::normalize_domain_name(name)?;
        let Some(id) = sql_id(id) else {
            return Ok(None);
        };
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE preset_domains SET name = ?1 WHERE id = ?2",
                    params![name, id],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StoreError::conflict("preset_domain", &name)
                    } else {
                        StoreError::Sqlite(e)
                    }
                })?;
            if changed == 0 {
                return Ok(None);
            }
            select_domain(conn, id)
        })
    }

    fn delete_preset_domain(&self, id: u64, name: &str) -> Result<bool, StoreError> {
        let Some(id) = sql_id(id) else {
            return Ok(false);
        };
        let default_domain = self.options.default_domain.clone();
        let rewritten = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let deleted = tx.execute("DELETE FROM preset_domains WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Ok(None);
            }
            // domain 是反范式字符串，级联改写是显式的全表 UPDATE
            let rewritten = tx.execute(
                "UPDATE flashcards SET domain = ?1 WHERE domain = ?2",
                params![default_domain, name],
            )?;
            tx.commit()?;
            Ok(Some(rewritten))
        })?;

        match rewritten {
            Some(rewritten) => {
                tracing::info!(id, domain = %name, rewritten, "Preset domain deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear_preset_domains(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM preset_domains", [])?;
            Ok(())
        })
    }

    fn daily_random(&self, limit: usize) -> Result<Vec<Flashcard>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let due = self.with_conn(|conn| {
            let sql = format!("SELECT {CARD_COLUMNS} FROM flashcards WHERE next_review <= ?1");
            let mut stmt = conn.prepare(&sql)?;
            let cards = stmt
                .query_map(params![ts_to_sql(&now)], card_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(cards)
        })?;

        if !due.is_empty() {
            let mut rng = rand::thread_rng();
            return Ok(selector::weighted_batch(due, limit, &mut rng));
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CARD_COLUMNS} FROM flashcards
                 ORDER BY mastery ASC, created_at DESC, id DESC
                 LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let cards = stmt
                .query_map(params![limit], card_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(cards)
        })
    }

    fn stats(&self) -> Result<StatsOverview, StoreError> {
        self.with_conn(|conn| {
            let (total, mastered): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN mastery = 3 THEN 1 ELSE 0 END), 0)
                 FROM flashcards",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let mut stmt =
                conn.prepare("SELECT domain, COUNT(*) FROM flashcards GROUP BY domain")?;
            let domain_distribution: BTreeMap<String, u64> = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
                .collect::<Result<_, _>>()?;

            let total_cards = total as u64;
            let mastered_cards = mastered as u64;
            Ok(StatsOverview {
                total_cards,
                mastered_cards,
                mastery_rate: stats::mastery_rate(mastered_cards, total_cards),
                domain_distribution,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;
    use crate::srs::CreateFlashcard;

    fn dto(word: &str, domain: Option<&str>) -> CreateFlashcard {
        CreateFlashcard {
            sentence: format!("The {word} was measured."),
            word: word.into(),
            translation: "译".into(),
            definition: None,
            domain: domain.map(str::to_string),
        }
    }

    fn store() -> SqlStore {
        SqlStore::open_in_memory(StoreOptions {
            seed_sample_data: false,
            ..StoreOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn timestamps_roundtrip_with_millisecond_precision() {
        let store = store();
        let card = store.create(dto("variance", None)).unwrap();
        let loaded = store.get(card.id).unwrap().unwrap();
        assert_eq!(loaded, card);
    }

    #[test]
    fn check_constraint_guards_mastery_column() {
        let store = store();
        let card = store.create(dto("bias", None)).unwrap();
        let conn = store.conn.lock().unwrap();
        let result = conn.execute(
            "UPDATE flashcards SET mastery = 7 WHERE id = ?1",
            params![card.id as i64],
        );
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_ids_are_absent() {
        let store = store();
        assert_eq!(store.get(u64::MAX).unwrap(), None);
        assert!(!store.delete(u64::MAX).unwrap());
    }

    #[test]
    fn sql_stats_match_pure_aggregation() {
        let store = store();
        let a = store.create(dto("alpha", Some("GIS"))).unwrap();
        store.create(dto("beta", Some("GIS"))).unwrap();
        store.create(dto("gamma", None)).unwrap();
        store
            .record_review(a.id, Mastery::Mastered, Utc::now())
            .unwrap();

        let from_sql = store.stats().unwrap();
        let from_cards = stats::aggregate(&store.list().unwrap());
        assert_eq!(from_sql, from_cards);
        assert_eq!(from_sql.mastery_rate, 33.3);
    }

    #[test]
    fn fallback_query_orders_by_mastery_then_recency() {
        let store = store();
        let base = timestamp_now() - Duration::days(1);
        for (i, mastery) in [Mastery::Mastered, Mastery::Unfamiliar, Mastery::Familiar]
            .into_iter()
            .enumerate()
        {
            store
                .insert_snapshot(CardSnapshot {
                    sentence: format!("s{i}"),
                    word: format!("w{i}"),
                    translation: "t".into(),
                    definition: String::new(),
                    domain: "通用".into(),
                    mastery,
                    review_count: 0,
                    next_review: base + Duration::days(30),
                    created_at: base + Duration::minutes(i as i64),
                })
                .unwrap();
        }

        let batch = store.daily_random(2).unwrap();
        let masteries: Vec<Mastery> = batch.iter().map(|c| c.mastery).collect();
        assert_eq!(masteries, vec![Mastery::Unfamiliar, Mastery::Familiar]);
    }

    #[test]
    fn file_database_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cards.sqlite3");
        let options = StoreOptions::default();

        let store = SqlStore::open(&path, options.clone()).unwrap();
        assert_eq!(store.list().unwrap().len(), 3);
        drop(store);

        let reopened = SqlStore::open(&path, options).unwrap();
        assert_eq!(reopened.list().unwrap().len(), 3);
        assert_eq!(reopened.list_preset_domains().unwrap().len(), 5);
    }
}
