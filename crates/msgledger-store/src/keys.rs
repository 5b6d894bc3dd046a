//! Key and value encoding utilities for `RocksDB`.
//!
//! Ids are fixed 16-byte ULID/UUID values, so compound index keys are simple
//! concatenations and ULID keys iterate in creation order. Counter values are
//! little-endian `i64`s so the merge operators can add them without
//! deserializing records.

use chrono::NaiveDate;

use msgledger_core::{LabelRef, MsgId, OrgId, SystemLabel, TopUpId};

/// Namespace byte for system labels in counter keys.
const LABEL_KIND_SYSTEM: u8 = 0x00;

/// Namespace byte for user labels in counter keys.
const LABEL_KIND_USER: u8 = 0x01;

/// Create a top-up key from a top-up ID.
#[must_use]
pub fn topup_key(id: &TopUpId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Create an org-topup index key.
///
/// Format: `org_id (16 bytes) || topup_id (16 bytes)`. ULIDs are
/// time-ordered, so top-ups for an org sort by creation time.
#[must_use]
pub fn org_topup_key(org: &OrgId, id: &TopUpId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(org.as_bytes());
    key.extend_from_slice(&id.to_bytes());
    key
}

/// Create a prefix for iterating all top-ups of an org.
#[must_use]
pub fn org_prefix(org: &OrgId) -> Vec<u8> {
    org.as_bytes().to_vec()
}

/// Extract the top-up ID from an org-topup index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_topup_id(key: &[u8]) -> TopUpId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TopUpId::from_bytes(bytes)
}

/// Create a usage row key.
///
/// Format: `topup_id (16 bytes) || day (4 bytes, big-endian days-from-CE)`,
/// so a top-up's rows iterate oldest day first.
#[must_use]
pub fn usage_key(topup: &TopUpId, day: NaiveDate) -> Vec<u8> {
    let mut key = Vec::with_capacity(20);
    key.extend_from_slice(&topup.to_bytes());
    key.extend_from_slice(&day.num_days_from_ce().to_be_bytes());
    key
}

/// Create a prefix for iterating all usage rows of a top-up.
#[must_use]
pub fn usage_prefix(topup: &TopUpId) -> Vec<u8> {
    topup.to_bytes().to_vec()
}

/// Extract the day from a usage row key.
#[must_use]
pub fn extract_usage_day(key: &[u8]) -> Option<NaiveDate> {
    let bytes: [u8; 4] = key.get(16..20)?.try_into().ok()?;
    NaiveDate::from_num_days_from_ce_opt(i32::from_be_bytes(bytes))
}

/// Create a message key from a message ID.
#[must_use]
pub fn msg_key(id: &MsgId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Create an org-message index key (also used for the unbilled index).
#[must_use]
pub fn org_msg_key(org: &OrgId, id: &MsgId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(org.as_bytes());
    key.extend_from_slice(&id.to_bytes());
    key
}

/// Extract the message ID from an org-message index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_msg_id(key: &[u8]) -> MsgId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    MsgId::from_bytes(bytes)
}

/// Create a membership key: `msg_id (16 bytes) || label_name (utf-8)`.
#[must_use]
pub fn msg_label_key(id: &MsgId, label: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + label.len());
    key.extend_from_slice(&id.to_bytes());
    key.extend_from_slice(label.as_bytes());
    key
}

/// Create a prefix for iterating a message's labels.
#[must_use]
pub fn msg_label_prefix(id: &MsgId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Extract the label name from a membership key.
#[must_use]
pub fn extract_label_name(key: &[u8]) -> Option<String> {
    let name = key.get(16..)?;
    String::from_utf8(name.to_vec()).ok()
}

/// Encode a label reference for counter keys.
///
/// System labels are `0x00 || code`; user labels are `0x01 || name`. The
/// namespace byte keeps the two from colliding.
#[must_use]
pub fn label_ref_bytes(label: &LabelRef) -> Vec<u8> {
    match label {
        LabelRef::System(system) => vec![LABEL_KIND_SYSTEM, system.code()],
        LabelRef::User(name) => {
            let mut bytes = Vec::with_capacity(1 + name.len());
            bytes.push(LABEL_KIND_USER);
            bytes.extend_from_slice(name.as_bytes());
            bytes
        }
    }
}

/// Decode a label reference from counter-key bytes.
#[must_use]
pub fn decode_label_ref(bytes: &[u8]) -> Option<LabelRef> {
    match *bytes.first()? {
        LABEL_KIND_SYSTEM => SystemLabel::from_code(*bytes.get(1)?).map(LabelRef::System),
        LABEL_KIND_USER => String::from_utf8(bytes.get(1..)?.to_vec())
            .ok()
            .map(LabelRef::User),
        _ => None,
    }
}

/// Create a counter key: `org_id (16 bytes) || label_ref`.
#[must_use]
pub fn label_count_key(org: &OrgId, label: &LabelRef) -> Vec<u8> {
    let label_bytes = label_ref_bytes(label);
    let mut key = Vec::with_capacity(16 + label_bytes.len());
    key.extend_from_slice(org.as_bytes());
    key.extend_from_slice(&label_bytes);
    key
}

/// Encode a `(count, visible_count)` pair as a 16-byte counter value.
#[must_use]
pub fn encode_counts(count: i64, visible_count: i64) -> [u8; 16] {
    let mut value = [0u8; 16];
    value[..8].copy_from_slice(&count.to_le_bytes());
    value[8..].copy_from_slice(&visible_count.to_le_bytes());
    value
}

/// Decode a 16-byte counter value. Malformed values read as zero.
#[must_use]
pub fn decode_counts(value: &[u8]) -> (i64, i64) {
    let Some(count) = value.get(..8).and_then(|b| b.try_into().ok()) else {
        return (0, 0);
    };
    let Some(visible) = value.get(8..16).and_then(|b| b.try_into().ok()) else {
        return (0, 0);
    };
    (i64::from_le_bytes(count), i64::from_le_bytes(visible))
}

/// Encode an `i64` usage value.
#[must_use]
pub fn encode_i64(value: i64) -> [u8; 8] {
    value.to_le_bytes()
}

/// Decode an `i64` usage value. Malformed values read as zero.
#[must_use]
pub fn decode_i64(value: &[u8]) -> i64 {
    value
        .try_into()
        .map_or(0, i64::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn org_topup_key_format() {
        let org = OrgId::generate();
        let id = TopUpId::generate();
        let key = org_topup_key(&org, &id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], org.as_bytes());
        assert_eq!(extract_topup_id(&key), id);
    }

    #[test]
    fn usage_key_roundtrips_day() {
        let topup = TopUpId::generate();
        let day = Utc::now().date_naive();
        let key = usage_key(&topup, day);

        assert_eq!(key.len(), 20);
        assert_eq!(extract_usage_day(&key), Some(day));
    }

    #[test]
    fn usage_keys_sort_by_day() {
        let topup = TopUpId::generate();
        let today = Utc::now().date_naive();
        let earlier = usage_key(&topup, today.pred_opt().unwrap());
        let later = usage_key(&topup, today);
        assert!(earlier < later);
    }

    #[test]
    fn msg_label_key_roundtrips_name() {
        let id = MsgId::generate();
        let key = msg_label_key(&id, "Très urgent");
        assert_eq!(extract_label_name(&key).as_deref(), Some("Très urgent"));
    }

    #[test]
    fn label_ref_bytes_roundtrip() {
        for label in SystemLabel::ALL {
            let label = LabelRef::from(label);
            assert_eq!(decode_label_ref(&label_ref_bytes(&label)), Some(label));
        }
        let user = LabelRef::user("Spam");
        assert_eq!(decode_label_ref(&label_ref_bytes(&user)), Some(user));
    }

    #[test]
    fn system_and_user_label_keys_never_collide() {
        let system = label_ref_bytes(&SystemLabel::Inbox.into());
        let user = label_ref_bytes(&LabelRef::user("I"));
        assert_ne!(system, user);
    }

    #[test]
    fn counts_value_roundtrip() {
        let (count, visible) = decode_counts(&encode_counts(42, -3));
        assert_eq!((count, visible), (42, -3));
        assert_eq!(decode_counts(&[1, 2, 3]), (0, 0));
    }

    #[test]
    fn i64_value_roundtrip() {
        assert_eq!(decode_i64(&encode_i64(-17)), -17);
        assert_eq!(decode_i64(&[0; 3]), 0);
    }
}
