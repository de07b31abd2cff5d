use sled::Transactional;

use crate::srs::{CardSnapshot, Flashcard};
use crate::store::embedded::{abort, keys, map_tx_err, next_sequence, EmbeddedStore, TxResult};
use crate::store::{deserialize, serialize, StoreError};

impl EmbeddedStore {
    pub(crate) fn raw_get_card(&self, id: u64) -> Result<Option<Flashcard>, StoreError> {
        match self.flashcards.get(keys::card_key(id))? {
            Some(raw) => Ok(Some(deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 通过创建时间索引遍历，天然是最新优先
    pub(crate) fn raw_list_cards(&self) -> Result<Vec<Flashcard>, StoreError> {
        let mut cards = Vec::with_capacity(self.flashcards.len());
        for item in self.flashcards_by_created_at.iter() {
            let (_, value) = item?;
            let id = keys::decode_u64(&value)?;
            if let Some(card) = self.raw_get_card(id)? {
                cards.push(card);
            }
        }
        Ok(cards)
    }

    pub(crate) fn raw_insert_card(&self, snapshot: &CardSnapshot) -> Result<Flashcard, StoreError> {
        let card = (&self.flashcards, &self.flashcards_by_created_at, &self.meta)
            .transaction(|(tx_cards, tx_index, tx_meta)| -> TxResult<Flashcard> {
                let id = next_sequence(tx_meta, keys::CARD_SEQUENCE_KEY)?;
                let card = Flashcard::from_snapshot(id, snapshot.clone());
                let bytes = serialize(&card).or_else(abort)?;

                tx_cards.insert(keys::card_key(id), bytes)?;
                tx_index.insert(
                    keys::card_created_index_key(&card.created_at, id),
                    keys::encode_u64(id),
                )?;
                Ok(card)
            })
            .map_err(map_tx_err)?;

        tracing::debug!(id = card.id, word = %card.word, "Flashcard stored");
        Ok(card)
    }

    /// 单卡读改写。created_at 不可变，因此索引无需变动。
    pub(crate) fn raw_modify_card<F>(&self, id: u64, edit: F) -> Result<Option<Flashcard>, StoreError>
    where
        F: Fn(&mut Flashcard),
    {
        let key = keys::card_key(id);
        self.flashcards
            .transaction(|tx_cards| -> TxResult<Option<Flashcard>> {
                let Some(raw) = tx_cards.get(&key)? else {
                    return Ok(None);
                };
                let mut card: Flashcard = deserialize(&raw).or_else(abort)?;
                edit(&mut card);
                tx_cards.insert(key.as_slice(), serialize(&card).or_else(abort)?)?;
                Ok(Some(card))
            })
            .map_err(map_tx_err)
    }

    pub(crate) fn raw_delete_card(&self, id: u64) -> Result<bool, StoreError> {
        let key = keys::card_key(id);
        (&self.flashcards, &self.flashcards_by_created_at)
            .transaction(|(tx_cards, tx_index)| -> TxResult<bool> {
                let Some(raw) = tx_cards.remove(key.as_slice())? else {
                    return Ok(false);
                };
                let card: Flashcard = deserialize(&raw).or_else(abort)?;
                tx_index.remove(keys::card_created_index_key(&card.created_at, id))?;
                Ok(true)
            })
            .map_err(map_tx_err)
    }

    pub(crate) fn raw_clear_cards(&self) -> Result<(), StoreError> {
        let card_keys = self
            .flashcards
            .iter()
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        let index_keys = self
            .flashcards_by_created_at
            .iter()
            .keys()
            .collect::<Result<Vec<_>, _>>()?;

        (&self.flashcards, &self.flashcards_by_created_at)
            .transaction(|(tx_cards, tx_index)| -> TxResult<()> {
                for key in &card_keys {
                    tx_cards.remove(key.clone())?;
                }
                for key in &index_keys {
                    tx_index.remove(key.clone())?;
                }
                Ok(())
            })
            .map_err(map_tx_err)?;

        tracing::info!(removed = card_keys.len(), "Cleared flashcards");
        Ok(())
    }
}
