use chrono::{DateTime, Utc};

use crate::store::StoreError;

pub const VERSION_KEY: &str = "_meta:version";
pub const CARD_SEQUENCE_KEY: &str = "seq:flashcards";
pub const DOMAIN_SEQUENCE_KEY: &str = "seq:preset_domains";

/// 大端序 id，树内按 id 升序排列
pub fn card_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub fn domain_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub fn domain_name_key(name: &str) -> Vec<u8> {
    name.as_bytes().to_vec()
}

/// 反转时间戳 + 反转 id：正序遍历即为“最新创建优先，同时间 id 大者优先”。
/// 毫秒时间戳先平移 i64::MIN，1970 年之前的时间也保持顺序。
pub fn card_created_index_key(created_at: &DateTime<Utc>, id: u64) -> Vec<u8> {
    let ts = (i128::from(created_at.timestamp_millis()) - i128::from(i64::MIN)) as u64;
    format!("{:020}:{:020}", u64::MAX - ts, u64::MAX - id).into_bytes()
}

pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_u64(raw: &[u8]) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("expected 8-byte integer, found {} bytes", raw.len()),
        ))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn created_index_orders_newest_first() {
        let now = Utc::now();
        let older = card_created_index_key(&(now - Duration::seconds(5)), 1);
        let newer = card_created_index_key(&now, 2);
        assert!(newer < older);
    }

    #[test]
    fn created_index_breaks_ties_by_higher_id() {
        let now = Utc::now();
        let low = card_created_index_key(&now, 3);
        let high = card_created_index_key(&now, 4);
        assert!(high < low);
    }

    #[test]
    fn created_index_orders_dates_before_the_epoch() {
        let epoch = Utc.timestamp_millis_opt(0).unwrap();
        let keys: Vec<Vec<u8>> = [
            epoch + Duration::days(1),
            epoch,
            epoch - Duration::milliseconds(1),
            epoch - Duration::days(365 * 30),
        ]
        .iter()
        .map(|ts| card_created_index_key(ts, 1))
        .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn card_keys_sort_numerically() {
        assert!(card_key(2) < card_key(10));
        assert!(card_key(255) < card_key(256));
    }

    #[test]
    fn u64_codec_rejects_wrong_width() {
        assert_eq!(decode_u64(&encode_u64(42)).unwrap(), 42);
        assert!(decode_u64(b"abc").is_err());
    }
}
