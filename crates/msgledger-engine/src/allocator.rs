//! Credit allocation: billing messages to top-ups.
//!
//! Each organization has at most one *active* top-up: the soonest-expiring
//! valid top-up with capacity left. Its id and a remaining-capacity
//! countdown are cached so that the hot path (one message arrives, one
//! credit is consumed) is a single counter decrement plus a usage
//! increment. When the countdown hits zero the next allocation recomputes
//! the active top-up from storage.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use msgledger_core::{LedgerError, MsgAttrs, MsgRecord, OrgId, Result, TopUpId};

use crate::Ledger;

/// Cached allocation state for one organization.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveTopUp {
    pub(crate) id: TopUpId,
    pub(crate) remaining: i64,
}

impl Ledger {
    /// Record a new message: bill it to a top-up if credit is available,
    /// persist it, and bump its label counts.
    ///
    /// Running out of credit is not an error. The message is stored
    /// unbilled and picked up by [`Ledger::apply_topups`] later.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn on_message_created(&self, org: &OrgId, attrs: MsgAttrs) -> Result<MsgRecord> {
        let mut msg = MsgRecord::new(*org, attrs);

        if let Some(topup_id) = self.take_credit(org)? {
            self.store
                .add_usage(&topup_id, Utc::now().date_naive(), 1)?;
            msg.topup = Some(topup_id);
        } else {
            debug!(%org, msg = %msg.id, "no credit available, message unbilled");
        }

        self.store.put_msg(&msg)?;
        self.apply_insert_counts(&msg)?;
        Ok(msg)
    }

    /// The organization's current active top-up, if any.
    ///
    /// Read-only probe: does not consume a credit or mutate the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn active_topup(&self, org: &OrgId) -> Result<Option<TopUpId>> {
        if let Some(active) = self.active_topups.get(org) {
            if active.remaining > 0 {
                return Ok(Some(active.id));
            }
        }
        Ok(self.calculate_active_topup(org)?.map(|(id, _)| id))
    }

    /// Consume one credit from the active top-up, returning its id, or
    /// `None` if the organization has no capacity left.
    fn take_credit(&self, org: &OrgId) -> Result<Option<TopUpId>> {
        if let Some(mut active) = self.active_topups.get_mut(org) {
            if active.remaining > 0 {
                active.remaining -= 1;
                return Ok(Some(active.id));
            }
        }

        // Exhausted or uncached: recompute from storage. The entry guard
        // above must be dropped before touching the map again.
        match self.calculate_active_topup(org)? {
            Some((id, remaining)) => {
                self.active_topups.insert(
                    *org,
                    ActiveTopUp {
                        id,
                        remaining: remaining - 1,
                    },
                );
                Ok(Some(id))
            }
            None => {
                self.active_topups.remove(org);
                Ok(None)
            }
        }
    }

    /// Find the soonest-expiring valid top-up with capacity left and how
    /// much capacity it has.
    ///
    /// Ordering: earliest `expires_on` first, never-expiring last, ties
    /// broken by creation order (ids are time-ordered).
    fn calculate_active_topup(&self, org: &OrgId) -> Result<Option<(TopUpId, i64)>> {
        let now = Utc::now();
        let mut candidates: Vec<_> = self
            .store
            .org_topups(org)?
            .into_iter()
            .filter(|t| t.is_valid_at(now))
            .collect();
        candidates.sort_by_key(|t| (t.expires_on.unwrap_or(DateTime::<Utc>::MAX_UTC), t.id));

        for topup in candidates {
            let used = self.store.topup_usage(&topup.id)?;
            if used < topup.credits {
                return Ok(Some((topup.id, topup.credits - used)));
            }
        }
        Ok(None)
    }

    /// Re-run allocation over the organization's unbilled messages, oldest
    /// first, against whatever capacity now exists. Returns how many
    /// messages were billed.
    ///
    /// Run after a purchase or on a schedule. Never un-bills: messages
    /// already carrying a top-up reference are untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn apply_topups(&self, org: &OrgId) -> Result<i64> {
        let unbilled = self.store.unbilled_msgs(org)?;
        if unbilled.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut topups: Vec<_> = self
            .store
            .org_topups(org)?
            .into_iter()
            .filter(|t| t.is_valid_at(now))
            .collect();
        topups.sort_by_key(|t| (t.expires_on.unwrap_or(DateTime::<Utc>::MAX_UTC), t.id));

        let today = now.date_naive();
        let mut billed: i64 = 0;
        let mut remaining = unbilled.as_slice();

        for topup in topups {
            if remaining.is_empty() {
                break;
            }
            let used = self.store.topup_usage(&topup.id)?;
            let capacity = topup.credits - used;
            if capacity <= 0 {
                continue;
            }

            let take = usize::try_from(capacity)
                .map(|cap| cap.min(remaining.len()))
                .unwrap_or(remaining.len());
            for msg in &remaining[..take] {
                self.store.set_msg_topup(&msg.id, &topup.id)?;
            }
            let taken =
                i64::try_from(take).map_err(|e| LedgerError::Storage(e.to_string()))?;
            self.store.add_usage(&topup.id, today, taken)?;
            billed += taken;
            remaining = &remaining[take..];
        }

        // Force the next allocation to recompute against the new usage.
        self.active_topups.remove(org);

        info!(
            %org,
            billed,
            still_unbilled = remaining.len(),
            "reapplied top-ups"
        );
        Ok(billed)
    }
}
