//! Live label count maintenance.
//!
//! Counts are never recomputed on the read path. Every message event maps
//! to a set of `(label, delta, visible_delta)` increments applied atomically
//! by the store, so readers always see a consistent pair.

use tracing::debug;

use msgledger_core::{LabelCounts, LabelRef, LedgerError, MsgAttrs, MsgId, MsgRecord, OrgId, Result};

use crate::Ledger;

impl Ledger {
    /// Live counts for one label.
    ///
    /// Missing counters read as zero.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn get_label_count(&self, org: &OrgId, label: &LabelRef) -> Result<LabelCounts> {
        Ok(self.store.get_label_counts(org, label)?)
    }

    /// Apply the count increments for a newly created message.
    pub(crate) fn apply_insert_counts(&self, msg: &MsgRecord) -> Result<()> {
        if let Some(category) = msg.attrs.system_label() {
            let visible = i64::from(msg.attrs.is_visible());
            self.store
                .incr_label_counts(&msg.org, &category.into(), 1, visible)?;
        }
        Ok(())
    }

    /// Apply an attribute change to a message and move label counts to
    /// match. Returns the updated record.
    ///
    /// A category change decrements the old category and increments the
    /// new one. A visibility flip within the same category moves only the
    /// visible counts, including those of the message's user labels.
    /// Deletion is an attribute change to [`Visibility::Deleted`]: the
    /// message leaves its category but its record stays.
    ///
    /// [`Visibility::Deleted`]: msgledger_core::Visibility::Deleted
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MessageNotFound`] if the message doesn't
    /// exist, or an error if a storage operation fails.
    pub fn on_message_mutated(&self, id: &MsgId, new_attrs: MsgAttrs) -> Result<MsgRecord> {
        let Some(mut msg) = self.store.get_msg(id)? else {
            return Err(LedgerError::MessageNotFound {
                msg_id: id.to_string(),
            });
        };

        let old_attrs = self.store.update_msg_attrs(id, new_attrs)?;
        msg.attrs = new_attrs;
        if old_attrs == new_attrs {
            return Ok(msg);
        }

        let old_cat = old_attrs.system_label();
        let new_cat = new_attrs.system_label();
        let was_visible = i64::from(old_attrs.is_visible());
        let now_visible = i64::from(new_attrs.is_visible());

        if old_cat != new_cat {
            if let Some(old) = old_cat {
                self.store
                    .incr_label_counts(&msg.org, &old.into(), -1, -was_visible)?;
            }
            if let Some(new) = new_cat {
                self.store
                    .incr_label_counts(&msg.org, &new.into(), 1, now_visible)?;
            }
        } else if let Some(category) = new_cat {
            if was_visible != now_visible {
                self.store.incr_label_counts(
                    &msg.org,
                    &category.into(),
                    0,
                    now_visible - was_visible,
                )?;
            }
        }

        // Visibility flips also move the visible counts of user labels.
        if was_visible != now_visible {
            for name in self.store.msg_labels(id)? {
                self.store.incr_label_counts(
                    &msg.org,
                    &LabelRef::user(name),
                    0,
                    now_visible - was_visible,
                )?;
            }
        }

        debug!(msg = %id, ?old_cat, ?new_cat, "message mutated");
        Ok(msg)
    }

    /// Add or remove a user label on a message, adjusting its counts.
    /// Returns whether membership actually changed.
    ///
    /// Idempotent: adding a label the message already carries, or removing
    /// one it doesn't, touches no counters.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MessageNotFound`] if the message doesn't
    /// exist, or an error if a storage operation fails.
    pub fn on_label_membership_changed(
        &self,
        id: &MsgId,
        label: &str,
        added: bool,
    ) -> Result<bool> {
        let Some(msg) = self.store.get_msg(id)? else {
            return Err(LedgerError::MessageNotFound {
                msg_id: id.to_string(),
            });
        };

        let changed = if added {
            self.store.add_msg_label(id, label)?
        } else {
            self.store.remove_msg_label(id, label)?
        };
        if !changed {
            return Ok(false);
        }

        let sign = if added { 1 } else { -1 };
        let visible_delta = if msg.attrs.is_visible() { sign } else { 0 };
        self.store
            .incr_label_counts(&msg.org, &LabelRef::user(label), sign, visible_delta)?;
        Ok(true)
    }
}
