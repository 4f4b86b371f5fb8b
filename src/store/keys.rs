use crate::scoring::types::EventStream;
use crate::store::StoreError;

const MAX_ID_LEN: usize = 128;

/// Ids are embedded in `:`-separated composite keys, so they must not contain
/// the separator themselves.
pub fn validate_id(kind: &str, id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::Validation(format!("{kind} id must not be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(StoreError::Validation(format!(
            "{kind} id exceeds {MAX_ID_LEN} bytes"
        )));
    }
    if id.contains(':') {
        return Err(StoreError::Validation(format!(
            "{kind} id must not contain ':'"
        )));
    }
    Ok(())
}

pub fn item_key(item_id: &str) -> Result<String, StoreError> {
    validate_id("item", item_id)?;
    Ok(item_id.to_string())
}

pub fn voter_key(voter_id: &str) -> Result<String, StoreError> {
    validate_id("voter", voter_id)?;
    Ok(voter_id.to_string())
}

pub fn collection_item_key(collection_id: &str, item_id: &str) -> Result<String, StoreError> {
    validate_id("collection", collection_id)?;
    validate_id("item", item_id)?;
    Ok(format!("{}:{}", collection_id, item_id))
}

pub fn collection_items_prefix(collection_id: &str) -> Result<String, StoreError> {
    validate_id("collection", collection_id)?;
    Ok(format!("{}:", collection_id))
}

pub fn collection_index_key(collection_id: &str) -> Result<String, StoreError> {
    validate_id("collection", collection_id)?;
    Ok(collection_id.to_string())
}

/// Event ids are big-endian so that byte order equals numeric order.
pub fn event_key(event_id: u64) -> [u8; 8] {
    event_id.to_be_bytes()
}

pub fn item_event_key(
    item_id: &str,
    stream: EventStream,
    event_id: u64,
) -> Result<String, StoreError> {
    validate_id("item", item_id)?;
    Ok(format!("{}:{}:{:020}", item_id, stream.as_str(), event_id))
}

pub fn item_event_prefix(item_id: &str, stream: EventStream) -> Result<String, StoreError> {
    validate_id("item", item_id)?;
    Ok(format!("{}:{}:", item_id, stream.as_str()))
}

/// Trailing component of an item event index key.
pub fn parse_item_event_id(key: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(key).ok()?;
    text.rsplit(':').next()?.parse().ok()
}

pub fn config_version_key(config_type: &str, version: u32) -> String {
    format!("{}:{:010}", config_type, version)
}

pub fn config_latest_key(config_type: &str) -> String {
    format!("{}:latest", config_type)
}

pub fn batch_run_key(timestamp_ms: i64, run_id: &str) -> String {
    let ts = timestamp_ms.max(0) as u64;
    let reverse_ts = u64::MAX - ts;
    format!("{:020}:{}", reverse_ts, run_id)
}
