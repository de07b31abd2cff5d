use chrono::{DateTime, Utc};
use sled::Transactional;

use crate::srs::{Flashcard, PresetDomain};
use crate::store::embedded::{abort, keys, map_tx_err, next_sequence, EmbeddedStore, TxResult};
use crate::store::{deserialize, oldest_domain_first, serialize, StoreError};

/// create 与 ensure 的区别只在名称已存在时的处理
#[derive(Clone, Copy, PartialEq, Eq)]
enum OnExisting {
    Conflict,
    Return,
}

impl EmbeddedStore {
    pub(crate) fn raw_list_domains(&self) -> Result<Vec<PresetDomain>, StoreError> {
        let mut domains = Vec::with_capacity(self.preset_domains.len());
        for item in self.preset_domains.iter() {
            let (_, value) = item?;
            domains.push(deserialize::<PresetDomain>(&value)?);
        }
        domains.sort_by(oldest_domain_first);
        Ok(domains)
    }

    pub(crate) fn raw_create_domain(
        &self,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<PresetDomain, StoreError> {
        self.insert_domain(name, created_at, OnExisting::Conflict)
    }

    pub(crate) fn raw_ensure_domain(
        &self,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<PresetDomain, StoreError> {
        self.insert_domain(name, created_at, OnExisting::Return)
    }

    fn insert_domain(
        &self,
        name: &str,
        created_at: DateTime<Utc>,
        on_existing: OnExisting,
    ) -> Result<PresetDomain, StoreError> {
        let name_key = keys::domain_name_key(name);
        (&self.preset_domains, &self.preset_domain_names, &self.meta)
            .transaction(|(tx_domains, tx_names, tx_meta)| -> TxResult<PresetDomain> {
                if let Some(existing_id) = tx_names.get(&name_key)? {
                    if on_existing == OnExisting::Conflict {
                        return abort(StoreError::conflict("preset_domain", name));
                    }
                    let id = keys::decode_u64(&existing_id).or_else(abort)?;
                    return match tx_domains.get(keys::domain_key(id))? {
                        Some(raw) => deserialize(&raw).or_else(abort),
                        None => abort(StoreError::not_found("preset_domain", id)),
                    };
                }

                let id = next_sequence(tx_meta, keys::DOMAIN_SEQUENCE_KEY)?;
                let domain = PresetDomain {
                    id,
                    name: name.to_string(),
                    created_at,
                };
                tx_domains.insert(keys::domain_key(id), serialize(&domain).or_else(abort)?)?;
                tx_names.insert(name_key.as_slice(), keys::encode_u64(id))?;
                Ok(domain)
            })
            .map_err(map_tx_err)
    }

    pub(crate) fn raw_rename_domain(
        &self,
        id: u64,
        name: &str,
    ) -> Result<Option<PresetDomain>, StoreError> {
        let domain_key = keys::domain_key(id);
        let new_name_key = keys::domain_name_key(name);
        (&self.preset_domains, &self.preset_domain_names)
            .transaction(|(tx_domains, tx_names)| -> TxResult<Option<PresetDomain>> {
                let Some(raw) = tx_domains.get(&domain_key)? else {
                    return Ok(None);
                };
                let mut domain: PresetDomain = deserialize(&raw).or_else(abort)?;
                if domain.name == name {
                    return Ok(Some(domain));
                }
                if tx_names.get(&new_name_key)?.is_some() {
                    return abort(StoreError::conflict("preset_domain", name));
                }

                tx_names.remove(keys::domain_name_key(&domain.name))?;
                tx_names.insert(new_name_key.as_slice(), keys::encode_u64(id))?;
                domain.name = name.to_string();
                tx_domains.insert(domain_key.as_slice(), serialize(&domain).or_else(abort)?)?;
                Ok(Some(domain))
            })
            .map_err(map_tx_err)
    }

    /// 删除领域并把引用它的卡片改写为默认领域。
    ///
    /// 调用方持有级联写锁，扫描与事务之间不会有卡片写入；事务内再校验一次
    /// 卡片领域，确保只改写仍然指向被删名称的卡片。
    pub(crate) fn raw_delete_domain_cascade(
        &self,
        id: u64,
        name: &str,
        default_domain: &str,
    ) -> Result<bool, StoreError> {
        let mut affected = Vec::new();
        for item in self.flashcards.iter() {
            let (key, value) = item?;
            let card: Flashcard = deserialize(&value)?;
            if card.domain == name {
                affected.push(key);
            }
        }

        let domain_key = keys::domain_key(id);
        let rewritten = (&self.preset_domains, &self.preset_domain_names, &self.flashcards)
            .transaction(|(tx_domains, tx_names, tx_cards)| -> TxResult<Option<usize>> {
                let Some(raw) = tx_domains.remove(domain_key.as_slice())? else {
                    return Ok(None);
                };
                let domain: PresetDomain = deserialize(&raw).or_else(abort)?;
                tx_names.remove(keys::domain_name_key(&domain.name))?;

                let mut rewritten = 0usize;
                for key in &affected {
                    let Some(raw) = tx_cards.get(key)? else {
                        continue;
                    };
                    let mut card: Flashcard = deserialize(&raw).or_else(abort)?;
                    if card.domain != name {
                        continue;
                    }
                    card.domain = default_domain.to_string();
                    tx_cards.insert(key.clone(), serialize(&card).or_else(abort)?)?;
                    rewritten += 1;
                }
                Ok(Some(rewritten))
            })
            .map_err(map_tx_err)?;

        match rewritten {
            Some(rewritten) => {
                tracing::info!(id, domain = %name, rewritten, "Preset domain deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn raw_clear_domains(&self) -> Result<(), StoreError> {
        let domain_keys = self
            .preset_domains
            .iter()
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        let name_keys = self
            .preset_domain_names
            .iter()
            .keys()
            .collect::<Result<Vec<_>, _>>()?;

        (&self.preset_domains, &self.preset_domain_names)
            .transaction(|(tx_domains, tx_names)| -> TxResult<()> {
                for key in &domain_keys {
                    tx_domains.remove(key.clone())?;
                }
                for key in &name_keys {
                    tx_names.remove(key.clone())?;
                }
                Ok(())
            })
            .map_err(map_tx_err)
    }
}
