//! Maintenance passes: usage compaction and label count repair.
//!
//! Both passes are per-organization, safe to interrupt, and safe to re-run.

use std::collections::HashMap;

use msgledger_core::{CreditUsage, LabelCounts, LabelRef, OrgId, Result};
use tracing::{debug, warn};

use crate::Ledger;

impl Ledger {
    /// Merge each top-up's usage rows into a single row, preserving sums.
    /// Returns how many top-ups were compacted.
    ///
    /// Daily billing leaves one usage row per (top-up, day); over time
    /// reading a top-up's total walks many rows. The merged row keeps the
    /// earliest day.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn squash_usage(&self, org: &OrgId) -> Result<u64> {
        let mut compacted = 0;
        for topup in self.store.org_topups(org)? {
            let rows = self.store.usage_rows(&topup.id)?;
            if rows.len() <= 1 {
                continue;
            }

            let total: i64 = rows.iter().map(|r| r.used).sum();
            let merged = CreditUsage::new(topup.id, rows[0].day, total);
            self.store.replace_usage_rows(&topup.id, merged)?;
            compacted += 1;

            debug!(topup = %topup.id, rows = rows.len(), total, "squashed usage rows");
        }
        Ok(compacted)
    }

    /// Recompute every label count for an organization from its messages
    /// and overwrite any stored counter that disagrees. Returns how many
    /// counters were corrected.
    ///
    /// This is the repair path for counter drift (a crash between a write
    /// and its increments). It is a full scan of the org's messages; run it
    /// on a schedule, not on reads.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn recount_labels(&self, org: &OrgId) -> Result<usize> {
        let mut computed: HashMap<LabelRef, LabelCounts> = HashMap::new();

        for msg in self.store.org_msgs(org)? {
            let visible = i64::from(msg.attrs.is_visible());
            if let Some(category) = msg.attrs.system_label() {
                let entry = computed.entry(category.into()).or_default();
                entry.count += 1;
                entry.visible_count += visible;
            }
            for name in self.store.msg_labels(&msg.id)? {
                let entry = computed.entry(LabelRef::user(name)).or_default();
                entry.count += 1;
                entry.visible_count += visible;
            }
        }

        let mut corrected = 0;

        // Stored counters that drifted, including stale ones for labels no
        // message carries anymore.
        for (label, stored) in self.store.org_label_counts(org)? {
            let expected = computed.remove(&label).unwrap_or_default();
            if stored != expected {
                warn!(%org, %label, ?stored, ?expected, "label counter drift, correcting");
                self.store.set_label_counts(org, &label, expected)?;
                corrected += 1;
            }
        }

        // Counters that should exist but were never written.
        for (label, expected) in computed {
            if expected.is_zero() {
                continue;
            }
            warn!(%org, %label, ?expected, "label counter missing, writing");
            self.store.set_label_counts(org, &label, expected)?;
            corrected += 1;
        }

        Ok(corrected)
    }
}
