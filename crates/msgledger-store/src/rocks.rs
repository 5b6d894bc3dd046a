//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Records are CBOR-encoded; counters and usage rows are raw `i64` values
//! maintained by additive merge operators so that increments are atomic at
//! the storage layer, matching the contract in [`crate::Store`].

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MergeOperands,
    MultiThreaded, Options, WriteBatch,
};

use msgledger_core::{
    CreditUsage, LabelCounts, LabelRef, MsgAttrs, MsgId, MsgRecord, OrgId, TopUp, TopUpId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

/// Merge operator for `(count, visible_count)` counter values.
fn merge_counts(_key: &[u8], existing: Option<&[u8]>, operands: &MergeOperands) -> Option<Vec<u8>> {
    let (mut count, mut visible) = existing.map_or((0, 0), keys::decode_counts);
    for operand in operands.iter() {
        let (delta, visible_delta) = keys::decode_counts(operand);
        count += delta;
        visible += visible_delta;
    }
    Some(keys::encode_counts(count, visible).to_vec())
}

/// Merge operator for `i64` usage values.
fn merge_usage(_key: &[u8], existing: Option<&[u8]>, operands: &MergeOperands) -> Option<Vec<u8>> {
    let mut total = existing.map_or(0, keys::decode_i64);
    for operand in operands.iter() {
        total += keys::decode_i64(operand);
    }
    Some(keys::encode_i64(total).to_vec())
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                match name {
                    cf::LABEL_COUNTS => {
                        cf_opts.set_merge_operator_associative("label_counts_add", merge_counts);
                    }
                    cf::USAGE => {
                        cf_opts.set_merge_operator_associative("usage_add", merge_usage);
                    }
                    _ => {}
                }
                ColumnFamilyDescriptor::new(name, cf_opts)
            })
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Collect all keys under a prefix in a column family, in key order.
    fn prefix_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));

        let mut matched = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            matched.push(key.to_vec());
        }
        Ok(matched)
    }

    /// Collect all `(key, value)` pairs under a prefix, in key order.
    fn prefix_entries(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));

        let mut matched = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            matched.push((key.to_vec(), value.to_vec()));
        }
        Ok(matched)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Top-Up Operations
    // =========================================================================

    fn put_topup(&self, topup: &TopUp) -> Result<()> {
        let cf_topups = self.cf(cf::TOPUPS)?;
        let cf_by_org = self.cf(cf::TOPUPS_BY_ORG)?;

        let value = Self::serialize(topup)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_topups, keys::topup_key(&topup.id), &value);
        batch.put_cf(&cf_by_org, keys::org_topup_key(&topup.org, &topup.id), []);
        self.write(batch)
    }

    fn get_topup(&self, id: &TopUpId) -> Result<Option<TopUp>> {
        let cf = self.cf(cf::TOPUPS)?;
        self.db
            .get_cf(&cf, keys::topup_key(id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn org_topups(&self, org: &OrgId) -> Result<Vec<TopUp>> {
        let index_keys = self.prefix_keys(cf::TOPUPS_BY_ORG, &keys::org_prefix(org))?;

        let mut topups = Vec::with_capacity(index_keys.len());
        for key in index_keys {
            let id = keys::extract_topup_id(&key);
            if let Some(topup) = self.get_topup(&id)? {
                topups.push(topup);
            }
        }
        Ok(topups)
    }

    // =========================================================================
    // Credit Usage Operations
    // =========================================================================

    fn add_usage(&self, topup: &TopUpId, day: NaiveDate, used: i64) -> Result<()> {
        let cf = self.cf(cf::USAGE)?;
        self.db
            .merge_cf(&cf, keys::usage_key(topup, day), keys::encode_i64(used))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn topup_usage(&self, topup: &TopUpId) -> Result<i64> {
        let entries = self.prefix_entries(cf::USAGE, &keys::usage_prefix(topup))?;
        Ok(entries
            .iter()
            .map(|(_, value)| keys::decode_i64(value))
            .sum())
    }

    fn usage_rows(&self, topup: &TopUpId) -> Result<Vec<CreditUsage>> {
        let entries = self.prefix_entries(cf::USAGE, &keys::usage_prefix(topup))?;

        let mut rows = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let day = keys::extract_usage_day(&key)
                .ok_or_else(|| StoreError::Serialization("invalid usage key".to_string()))?;
            rows.push(CreditUsage::new(*topup, day, keys::decode_i64(&value)));
        }
        Ok(rows)
    }

    fn replace_usage_rows(&self, topup: &TopUpId, merged: CreditUsage) -> Result<()> {
        let cf = self.cf(cf::USAGE)?;
        let existing = self.prefix_keys(cf::USAGE, &keys::usage_prefix(topup))?;

        // Deletes and the merged row land in one batch; the put is applied
        // after the deletes, so a same-day row survives as the merged value.
        let mut batch = WriteBatch::default();
        for key in existing {
            batch.delete_cf(&cf, key);
        }
        batch.put_cf(
            &cf,
            keys::usage_key(topup, merged.day),
            keys::encode_i64(merged.used),
        );
        self.write(batch)
    }

    // =========================================================================
    // Message Operations
    // =========================================================================

    fn put_msg(&self, msg: &MsgRecord) -> Result<()> {
        let cf_msgs = self.cf(cf::MSGS)?;
        let cf_by_org = self.cf(cf::MSGS_BY_ORG)?;
        let cf_unbilled = self.cf(cf::UNBILLED_BY_ORG)?;

        let value = Self::serialize(msg)?;
        let index_key = keys::org_msg_key(&msg.org, &msg.id);

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_msgs, keys::msg_key(&msg.id), &value);
        batch.put_cf(&cf_by_org, &index_key, []);
        if msg.topup.is_none() {
            batch.put_cf(&cf_unbilled, &index_key, []);
        }
        self.write(batch)
    }

    fn get_msg(&self, id: &MsgId) -> Result<Option<MsgRecord>> {
        let cf = self.cf(cf::MSGS)?;
        self.db
            .get_cf(&cf, keys::msg_key(id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn org_msgs(&self, org: &OrgId) -> Result<Vec<MsgRecord>> {
        let index_keys = self.prefix_keys(cf::MSGS_BY_ORG, &keys::org_prefix(org))?;

        let mut msgs = Vec::with_capacity(index_keys.len());
        for key in index_keys {
            let id = keys::extract_msg_id(&key);
            if let Some(msg) = self.get_msg(&id)? {
                msgs.push(msg);
            }
        }
        Ok(msgs)
    }

    fn unbilled_msgs(&self, org: &OrgId) -> Result<Vec<MsgRecord>> {
        let index_keys = self.prefix_keys(cf::UNBILLED_BY_ORG, &keys::org_prefix(org))?;

        let mut msgs = Vec::with_capacity(index_keys.len());
        for key in index_keys {
            let id = keys::extract_msg_id(&key);
            if let Some(msg) = self.get_msg(&id)? {
                msgs.push(msg);
            }
        }
        Ok(msgs)
    }

    fn count_unbilled(&self, org: &OrgId) -> Result<i64> {
        let index_keys = self.prefix_keys(cf::UNBILLED_BY_ORG, &keys::org_prefix(org))?;
        Ok(i64::try_from(index_keys.len()).unwrap_or(i64::MAX))
    }

    fn set_msg_topup(&self, id: &MsgId, topup: &TopUpId) -> Result<()> {
        let mut msg = self.get_msg(id)?.ok_or(StoreError::NotFound)?;
        msg.topup = Some(*topup);

        let cf_msgs = self.cf(cf::MSGS)?;
        let cf_unbilled = self.cf(cf::UNBILLED_BY_ORG)?;
        let value = Self::serialize(&msg)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_msgs, keys::msg_key(id), &value);
        batch.delete_cf(&cf_unbilled, keys::org_msg_key(&msg.org, id));
        self.write(batch)
    }

    fn update_msg_attrs(&self, id: &MsgId, attrs: MsgAttrs) -> Result<MsgAttrs> {
        let mut msg = self.get_msg(id)?.ok_or(StoreError::NotFound)?;
        let old = msg.attrs;
        msg.attrs = attrs;

        let cf = self.cf(cf::MSGS)?;
        let value = Self::serialize(&msg)?;
        self.db
            .put_cf(&cf, keys::msg_key(id), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(old)
    }

    // =========================================================================
    // Label Membership Operations
    // =========================================================================

    fn add_msg_label(&self, id: &MsgId, label: &str) -> Result<bool> {
        let cf = self.cf(cf::MSG_LABELS)?;
        let key = keys::msg_label_key(id, label);

        let exists = self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if exists {
            return Ok(false);
        }

        self.db
            .put_cf(&cf, &key, [])
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(true)
    }

    fn remove_msg_label(&self, id: &MsgId, label: &str) -> Result<bool> {
        let cf = self.cf(cf::MSG_LABELS)?;
        let key = keys::msg_label_key(id, label);

        let exists = self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if !exists {
            return Ok(false);
        }

        self.db
            .delete_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(true)
    }

    fn msg_labels(&self, id: &MsgId) -> Result<Vec<String>> {
        let index_keys = self.prefix_keys(cf::MSG_LABELS, &keys::msg_label_prefix(id))?;
        Ok(index_keys
            .iter()
            .filter_map(|key| keys::extract_label_name(key))
            .collect())
    }

    // =========================================================================
    // Label Counter Operations
    // =========================================================================

    fn incr_label_counts(
        &self,
        org: &OrgId,
        label: &LabelRef,
        delta: i64,
        visible_delta: i64,
    ) -> Result<()> {
        let cf = self.cf(cf::LABEL_COUNTS)?;
        self.db
            .merge_cf(
                &cf,
                keys::label_count_key(org, label),
                keys::encode_counts(delta, visible_delta),
            )
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_label_counts(&self, org: &OrgId, label: &LabelRef) -> Result<LabelCounts> {
        let cf = self.cf(cf::LABEL_COUNTS)?;
        let value = self
            .db
            .get_cf(&cf, keys::label_count_key(org, label))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(value.map_or_else(LabelCounts::default, |data| {
            let (count, visible_count) = keys::decode_counts(&data);
            LabelCounts::new(count, visible_count)
        }))
    }

    fn org_label_counts(&self, org: &OrgId) -> Result<Vec<(LabelRef, LabelCounts)>> {
        let entries = self.prefix_entries(cf::LABEL_COUNTS, &keys::org_prefix(org))?;

        let mut counts = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let Some(label) = keys::decode_label_ref(&key[16..]) else {
                continue;
            };
            let (count, visible_count) = keys::decode_counts(&value);
            counts.push((label, LabelCounts::new(count, visible_count)));
        }
        Ok(counts)
    }

    fn set_label_counts(&self, org: &OrgId, label: &LabelRef, counts: LabelCounts) -> Result<()> {
        let cf = self.cf(cf::LABEL_COUNTS)?;
        self.db
            .put_cf(
                &cf,
                keys::label_count_key(org, label),
                keys::encode_counts(counts.count, counts.visible_count),
            )
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use msgledger_core::{MsgType, SystemLabel};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn topup_crud_and_org_index() {
        let (store, _dir) = create_test_store();
        let org = OrgId::generate();

        let first = TopUp::new(org, 1000, 0, None);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = TopUp::new(org, 500, 1000, None);

        store.put_topup(&second).unwrap();
        store.put_topup(&first).unwrap();

        let topups = store.org_topups(&org).unwrap();
        assert_eq!(topups.len(), 2);
        assert_eq!(topups[0].id, first.id); // creation order
        assert_eq!(topups[1].id, second.id);

        assert!(store.org_topups(&OrgId::generate()).unwrap().is_empty());
    }

    #[test]
    fn usage_merges_and_squashes() {
        let (store, _dir) = create_test_store();
        let topup = TopUpId::generate();
        let today = Utc::now().date_naive();
        let yesterday = today.pred_opt().unwrap();

        store.add_usage(&topup, yesterday, 3).unwrap();
        store.add_usage(&topup, today, 1).unwrap();
        store.add_usage(&topup, today, 1).unwrap();
        assert_eq!(store.topup_usage(&topup).unwrap(), 5);
        assert_eq!(store.usage_rows(&topup).unwrap().len(), 2);

        store
            .replace_usage_rows(&topup, CreditUsage::new(topup, yesterday, 5))
            .unwrap();
        assert_eq!(store.usage_rows(&topup).unwrap().len(), 1);
        assert_eq!(store.topup_usage(&topup).unwrap(), 5);

        // merges keep applying on top of the squashed row
        store.add_usage(&topup, yesterday, 2).unwrap();
        assert_eq!(store.topup_usage(&topup).unwrap(), 7);
    }

    #[test]
    fn unbilled_index_follows_billing() {
        let (store, _dir) = create_test_store();
        let org = OrgId::generate();
        let topup = TopUpId::generate();

        let msg = MsgRecord::new(org, MsgAttrs::incoming(MsgType::Inbox));
        store.put_msg(&msg).unwrap();
        assert_eq!(store.count_unbilled(&org).unwrap(), 1);

        store.set_msg_topup(&msg.id, &topup).unwrap();
        assert_eq!(store.count_unbilled(&org).unwrap(), 0);
        assert!(store.unbilled_msgs(&org).unwrap().is_empty());

        let billed = store.get_msg(&msg.id).unwrap().unwrap();
        assert_eq!(billed.topup, Some(topup));
    }

    #[test]
    fn counter_merge_increments() {
        let (store, _dir) = create_test_store();
        let org = OrgId::generate();
        let label = LabelRef::from(SystemLabel::Flow);

        store.incr_label_counts(&org, &label, 1, 1).unwrap();
        store.incr_label_counts(&org, &label, 1, 1).unwrap();
        store.incr_label_counts(&org, &label, 0, -1).unwrap();

        let counts = store.get_label_counts(&org, &label).unwrap();
        assert_eq!(counts.count, 2);
        assert_eq!(counts.visible_count, 1);
    }

    #[test]
    fn counters_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let org = OrgId::generate();
        let label = LabelRef::user("Spam");

        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.incr_label_counts(&org, &label, 3, 2).unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        let counts = store.get_label_counts(&org, &label).unwrap();
        assert_eq!(counts, LabelCounts::new(3, 2));

        let all = store.org_label_counts(&org).unwrap();
        assert_eq!(all, vec![(label, LabelCounts::new(3, 2))]);
    }

    #[test]
    fn membership_is_idempotent() {
        let (store, _dir) = create_test_store();
        let msg = MsgId::generate();

        assert!(store.add_msg_label(&msg, "Spam").unwrap());
        assert!(!store.add_msg_label(&msg, "Spam").unwrap());
        assert!(store.add_msg_label(&msg, "Urgent").unwrap());

        let labels = store.msg_labels(&msg).unwrap();
        assert_eq!(labels, vec!["Spam".to_string(), "Urgent".to_string()]);

        assert!(store.remove_msg_label(&msg, "Spam").unwrap());
        assert!(!store.remove_msg_label(&msg, "Spam").unwrap());
    }
}
