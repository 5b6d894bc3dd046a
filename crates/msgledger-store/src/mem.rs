//! In-memory storage implementation.
//!
//! Backed by concurrent maps. Counter and usage mutations happen under the
//! map's entry guard, which makes them atomic increment-by-delta operations;
//! the listing operations are full scans, which is fine at the scale this
//! backend is meant for (tests and single-node deployments).

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use dashmap::DashMap;

use msgledger_core::{
    CreditUsage, LabelCounts, LabelRef, MsgAttrs, MsgId, MsgRecord, OrgId, TopUp, TopUpId,
};

use crate::error::{Result, StoreError};
use crate::Store;

/// In-memory storage implementation.
#[derive(Default)]
pub struct MemStore {
    topups: DashMap<TopUpId, TopUp>,
    usage: DashMap<TopUpId, BTreeMap<NaiveDate, i64>>,
    msgs: DashMap<MsgId, MsgRecord>,
    labels: DashMap<MsgId, BTreeSet<String>>,
    counts: DashMap<(OrgId, LabelRef), LabelCounts>,
}

impl MemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    // =========================================================================
    // Top-Up Operations
    // =========================================================================

    fn put_topup(&self, topup: &TopUp) -> Result<()> {
        self.topups.insert(topup.id, topup.clone());
        Ok(())
    }

    fn get_topup(&self, id: &TopUpId) -> Result<Option<TopUp>> {
        Ok(self.topups.get(id).map(|t| t.clone()))
    }

    fn org_topups(&self, org: &OrgId) -> Result<Vec<TopUp>> {
        let mut topups: Vec<TopUp> = self
            .topups
            .iter()
            .filter(|t| t.org == *org)
            .map(|t| t.clone())
            .collect();
        // ULIDs sort by creation time
        topups.sort_by_key(|t| t.id);
        Ok(topups)
    }

    // =========================================================================
    // Credit Usage Operations
    // =========================================================================

    fn add_usage(&self, topup: &TopUpId, day: NaiveDate, used: i64) -> Result<()> {
        let mut rows = self.usage.entry(*topup).or_default();
        *rows.entry(day).or_insert(0) += used;
        Ok(())
    }

    fn topup_usage(&self, topup: &TopUpId) -> Result<i64> {
        Ok(self
            .usage
            .get(topup)
            .map_or(0, |rows| rows.values().sum()))
    }

    fn usage_rows(&self, topup: &TopUpId) -> Result<Vec<CreditUsage>> {
        Ok(self.usage.get(topup).map_or_else(Vec::new, |rows| {
            rows.iter()
                .map(|(day, used)| CreditUsage::new(*topup, *day, *used))
                .collect()
        }))
    }

    fn replace_usage_rows(&self, topup: &TopUpId, merged: CreditUsage) -> Result<()> {
        let mut rows = self.usage.entry(*topup).or_default();
        rows.clear();
        rows.insert(merged.day, merged.used);
        Ok(())
    }

    // =========================================================================
    // Message Operations
    // =========================================================================

    fn put_msg(&self, msg: &MsgRecord) -> Result<()> {
        self.msgs.insert(msg.id, msg.clone());
        Ok(())
    }

    fn get_msg(&self, id: &MsgId) -> Result<Option<MsgRecord>> {
        Ok(self.msgs.get(id).map(|m| m.clone()))
    }

    fn org_msgs(&self, org: &OrgId) -> Result<Vec<MsgRecord>> {
        let mut msgs: Vec<MsgRecord> = self
            .msgs
            .iter()
            .filter(|m| m.org == *org)
            .map(|m| m.clone())
            .collect();
        msgs.sort_by_key(|m| m.id);
        Ok(msgs)
    }

    fn unbilled_msgs(&self, org: &OrgId) -> Result<Vec<MsgRecord>> {
        let mut msgs: Vec<MsgRecord> = self
            .msgs
            .iter()
            .filter(|m| m.org == *org && m.topup.is_none())
            .map(|m| m.clone())
            .collect();
        msgs.sort_by_key(|m| m.id);
        Ok(msgs)
    }

    fn count_unbilled(&self, org: &OrgId) -> Result<i64> {
        let count = self
            .msgs
            .iter()
            .filter(|m| m.org == *org && m.topup.is_none())
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    fn set_msg_topup(&self, id: &MsgId, topup: &TopUpId) -> Result<()> {
        let mut msg = self.msgs.get_mut(id).ok_or(StoreError::NotFound)?;
        msg.topup = Some(*topup);
        Ok(())
    }

    fn update_msg_attrs(&self, id: &MsgId, attrs: MsgAttrs) -> Result<MsgAttrs> {
        let mut msg = self.msgs.get_mut(id).ok_or(StoreError::NotFound)?;
        let old = msg.attrs;
        msg.attrs = attrs;
        Ok(old)
    }

    // =========================================================================
    // Label Membership Operations
    // =========================================================================

    fn add_msg_label(&self, id: &MsgId, label: &str) -> Result<bool> {
        let mut labels = self.labels.entry(*id).or_default();
        Ok(labels.insert(label.to_string()))
    }

    fn remove_msg_label(&self, id: &MsgId, label: &str) -> Result<bool> {
        Ok(self
            .labels
            .get_mut(id)
            .is_some_and(|mut labels| labels.remove(label)))
    }

    fn msg_labels(&self, id: &MsgId) -> Result<Vec<String>> {
        Ok(self
            .labels
            .get(id)
            .map_or_else(Vec::new, |labels| labels.iter().cloned().collect()))
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
        let mut counts = self.counts.entry((*org, label.clone())).or_default();
        counts.count += delta;
        counts.visible_count += visible_delta;
        Ok(())
    }

    fn get_label_counts(&self, org: &OrgId, label: &LabelRef) -> Result<LabelCounts> {
        Ok(self
            .counts
            .get(&(*org, label.clone()))
            .map_or_else(LabelCounts::default, |c| *c))
    }

    fn org_label_counts(&self, org: &OrgId) -> Result<Vec<(LabelRef, LabelCounts)>> {
        let mut counts: Vec<(LabelRef, LabelCounts)> = self
            .counts
            .iter()
            .filter(|entry| entry.key().0 == *org)
            .map(|entry| (entry.key().1.clone(), *entry.value()))
            .collect();
        counts.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));
        Ok(counts)
    }

    fn set_label_counts(&self, org: &OrgId, label: &LabelRef, counts: LabelCounts) -> Result<()> {
        self.counts.insert((*org, label.clone()), counts);
        Ok(())
    }
}
