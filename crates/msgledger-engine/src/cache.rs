//! Credit metric cache.
//!
//! Aggregate credit metrics are cheap to read but touch every top-up of an
//! organization to compute, so cacheable ones are kept here under an
//! explicit `(org, metric)` key. Invalidation is clear-on-write: every
//! top-up mutation drops all of the org's entries synchronously. `used` and
//! `remaining` are intentionally never cached; they depend on live billing.

use dashmap::DashMap;

use msgledger_core::OrgId;

/// The cacheable credit metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreditMetric {
    /// Total credits: active non-expired capacity plus capacity consumed on
    /// expired top-ups.
    Total,

    /// Purchased credits: capacity of all active top-ups, expired or not.
    Purchased,

    /// Credits expiring within the configured lookahead window.
    ExpiringSoon,

    /// The low-credit warning threshold.
    LowThreshold,
}

/// A clear-on-write cache of per-organization credit metrics.
#[derive(Default)]
pub struct CreditCache {
    inner: DashMap<(OrgId, CreditMetric), i64>,
}

impl CreditCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached value.
    #[must_use]
    pub fn get(&self, org: &OrgId, metric: CreditMetric) -> Option<i64> {
        self.inner.get(&(*org, metric)).map(|v| *v)
    }

    /// Store a value.
    pub fn put(&self, org: &OrgId, metric: CreditMetric, value: i64) {
        self.inner.insert((*org, metric), value);
    }

    /// Drop every cached metric for an organization.
    pub fn invalidate_org(&self, org: &OrgId) {
        self.inner.retain(|(cached_org, _), _| cached_org != org);
    }
}
