//! Top-up types for msgledger.
//!
//! A top-up is a grant of credits with an optional expiration. Top-ups are
//! never deleted; they are deactivated. How many credits a top-up has consumed
//! is always derived from its [`CreditUsage`] rows, never stored on the record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrgId, TopUpId};

/// A grant of credits to an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUp {
    /// Unique top-up ID (ULID for time-ordering).
    pub id: TopUpId,

    /// The organization that owns this top-up.
    pub org: OrgId,

    /// Number of credits granted. Fixed at creation (admin updates aside).
    pub credits: i64,

    /// Price paid in currency minor units. Zero for free grants.
    pub price_cents: i64,

    /// When these credits expire. `None` means they never expire.
    ///
    /// Expiration is a point-in-time comparison; expired top-ups stay in
    /// storage and capacity consumed before expiry stays counted.
    pub expires_on: Option<DateTime<Utc>>,

    /// Whether this top-up is active. Deactivation removes it from every
    /// aggregate, including purchased totals.
    pub is_active: bool,

    /// External payment reference, if this top-up came from a charge.
    pub payment_ref: Option<String>,

    /// When the top-up was created.
    pub created_at: DateTime<Utc>,
}

impl TopUp {
    /// Create a new active top-up.
    #[must_use]
    pub fn new(
        org: OrgId,
        credits: i64,
        price_cents: i64,
        expires_on: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: TopUpId::generate(),
            org,
            credits,
            price_cents,
            expires_on,
            is_active: true,
            payment_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Attach an external payment reference.
    #[must_use]
    pub fn with_payment_ref(mut self, payment_ref: impl Into<String>) -> Self {
        self.payment_ref = Some(payment_ref.into());
        self
    }

    /// Whether this top-up has expired as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.is_some_and(|expires| expires <= now)
    }

    /// Whether this top-up can be drawn down at `now`: active and not expired.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

/// A per-day aggregate of credits consumed from one top-up.
///
/// Billing a message adds one to the row for (top-up, today) rather than
/// keeping one accounting row per message. Compaction merges all of a
/// top-up's rows into one, preserving the sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditUsage {
    /// The top-up the credits were drawn from.
    pub topup: TopUpId,

    /// The day the credits were consumed on.
    pub day: NaiveDate,

    /// Number of credits consumed.
    pub used: i64,
}

impl CreditUsage {
    /// Create a usage row.
    #[must_use]
    pub const fn new(topup: TopUpId, day: NaiveDate, used: i64) -> Self {
        Self { topup, day, used }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_topup_is_active() {
        let topup = TopUp::new(OrgId::generate(), 1000, 0, None);
        assert!(topup.is_active);
        assert_eq!(topup.credits, 1000);
        assert!(topup.payment_ref.is_none());
    }

    #[test]
    fn never_expiring_topup_is_always_valid() {
        let topup = TopUp::new(OrgId::generate(), 100, 0, None);
        let far_future = Utc::now() + Duration::days(365 * 100);
        assert!(!topup.is_expired(far_future));
        assert!(topup.is_valid_at(far_future));
    }

    #[test]
    fn expiry_is_a_point_in_time_comparison() {
        let now = Utc::now();
        let topup = TopUp::new(OrgId::generate(), 100, 0, Some(now + Duration::days(7)));

        assert!(!topup.is_expired(now));
        assert!(topup.is_expired(now + Duration::days(8)));
        assert!(!topup.is_valid_at(now + Duration::days(8)));
    }

    #[test]
    fn deactivated_topup_is_not_valid() {
        let mut topup = TopUp::new(OrgId::generate(), 100, 0, None);
        topup.is_active = false;
        assert!(!topup.is_valid_at(Utc::now()));
    }

    #[test]
    fn payment_ref_builder() {
        let topup = TopUp::new(OrgId::generate(), 500, 1000, None).with_payment_ref("ch_123");
        assert_eq!(topup.payment_ref.as_deref(), Some("ch_123"));
    }
}
