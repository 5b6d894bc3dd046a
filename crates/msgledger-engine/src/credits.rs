//! Aggregate credit metrics.
//!
//! All metrics are derived from top-ups and usage rows; nothing here writes
//! to storage. Metrics that only change when a top-up changes go through the
//! credit cache; `used` and `remaining` move with every billed message and
//! are always computed fresh.

use chrono::{Duration, Utc};

use msgledger_core::{OrgId, Result};

use crate::cache::CreditMetric;
use crate::Ledger;

impl Ledger {
    /// Total credits: the capacity of active non-expired top-ups, plus the
    /// credits actually consumed on active expired ones.
    ///
    /// Expiry takes away unused capacity only; consumed credits stay in the
    /// total so `remaining` does not jump when a top-up expires.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn get_credits_total(&self, org: &OrgId) -> Result<i64> {
        self.cached(org, CreditMetric::Total, |ledger| {
            let now = Utc::now();
            let mut total = 0;
            for topup in ledger.store.org_topups(org)? {
                if !topup.is_active {
                    continue;
                }
                if topup.is_expired(now) {
                    total += ledger.store.topup_usage(&topup.id)?;
                } else {
                    total += topup.credits;
                }
            }
            Ok(total)
        })
    }

    /// Purchased credits: the capacity of all active top-ups, expired or
    /// not. This is a lifetime figure used for feature gating.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn get_purchased_credits(&self, org: &OrgId) -> Result<i64> {
        self.cached(org, CreditMetric::Purchased, |ledger| {
            Ok(ledger
                .store
                .org_topups(org)?
                .iter()
                .filter(|t| t.is_active)
                .map(|t| t.credits)
                .sum())
        })
    }

    /// Credits used: usage recorded against active top-ups, plus unbilled
    /// messages (each owes one credit).
    ///
    /// Never cached.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn get_credits_used(&self, org: &OrgId) -> Result<i64> {
        let mut used = 0;
        for topup in self.store.org_topups(org)? {
            if topup.is_active {
                used += self.store.topup_usage(&topup.id)?;
            }
        }
        used += self.store.count_unbilled(org)?;
        Ok(used)
    }

    /// Credits remaining: total minus used. May go negative while unbilled
    /// messages accumulate.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn get_credits_remaining(&self, org: &OrgId) -> Result<i64> {
        Ok(self.get_credits_total(org)? - self.get_credits_used(org)?)
    }

    /// Unused credits on top-ups expiring within the configured window.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn get_credits_expiring_soon(&self, org: &OrgId) -> Result<i64> {
        let window = self.config.expiring_window_days;
        self.cached(org, CreditMetric::ExpiringSoon, |ledger| {
            ledger.credits_expiring_within(org, window)
        })
    }

    /// Unused credits on top-ups expiring within `window_days` from now.
    ///
    /// Uncached variant of [`Ledger::get_credits_expiring_soon`] for ad-hoc
    /// windows.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn credits_expiring_within(&self, org: &OrgId, window_days: i64) -> Result<i64> {
        let now = Utc::now();
        let horizon = now + Duration::days(window_days);

        let mut expiring = 0;
        for topup in self.store.org_topups(org)? {
            if !topup.is_active {
                continue;
            }
            let Some(expires_on) = topup.expires_on else {
                continue;
            };
            if expires_on <= now || expires_on > horizon {
                continue;
            }
            let unused = topup.credits - self.store.topup_usage(&topup.id)?;
            expiring += unused.max(0);
        }
        Ok(expiring)
    }

    /// The low-credit warning threshold: a percentage of total credits,
    /// never below the configured floor.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn get_low_credits_threshold(&self, org: &OrgId) -> Result<i64> {
        self.cached(org, CreditMetric::LowThreshold, |ledger| {
            let total = ledger.get_credits_total(org)?;
            let percent = total * ledger.config.low_credits_percent / 100;
            Ok(percent.max(ledger.config.low_credits_floor))
        })
    }

    /// Whether the organization's remaining credits are at or below the
    /// low-credit threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn has_low_credits(&self, org: &OrgId) -> Result<bool> {
        Ok(self.get_credits_remaining(org)? <= self.get_low_credits_threshold(org)?)
    }

    /// Whether the organization qualifies as pro: purchased credits at or
    /// above the configured threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn is_pro(&self, org: &OrgId) -> Result<bool> {
        Ok(self.get_purchased_credits(org)? >= self.config.pro_credits_threshold)
    }

    /// Look up `metric` in the credit cache, computing and storing it on a
    /// miss.
    fn cached<F>(&self, org: &OrgId, metric: CreditMetric, compute: F) -> Result<i64>
    where
        F: FnOnce(&Self) -> Result<i64>,
    {
        if let Some(value) = self.credit_cache.get(org, metric) {
            return Ok(value);
        }
        let value = compute(self)?;
        self.credit_cache.put(org, metric, value);
        Ok(value)
    }
}
