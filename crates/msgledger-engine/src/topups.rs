//! Top-up lifecycle: grants, purchases, and admin updates.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use msgledger_core::{LedgerError, OrgId, Result, TopUp, TopUpId};

use crate::Ledger;

/// A partial update to a top-up. Unset fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct TopUpUpdate {
    /// New credit quantity.
    pub credits: Option<i64>,

    /// New expiration (`Some(None)` clears it).
    pub expires_on: Option<Option<DateTime<Utc>>>,

    /// New active flag.
    pub is_active: Option<bool>,
}

impl TopUpUpdate {
    /// An empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the credit quantity.
    #[must_use]
    pub fn credits(mut self, credits: i64) -> Self {
        self.credits = Some(credits);
        self
    }

    /// Change the expiration.
    #[must_use]
    pub fn expires_on(mut self, expires_on: DateTime<Utc>) -> Self {
        self.expires_on = Some(Some(expires_on));
        self
    }

    /// Remove the expiration entirely.
    #[must_use]
    pub fn never_expires(mut self) -> Self {
        self.expires_on = Some(None);
        self
    }

    /// Change the active flag.
    #[must_use]
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }
}

impl Ledger {
    /// Register an organization: create its free welcome top-up.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn register_org(&self, org: &OrgId) -> Result<TopUp> {
        let expires_on = Utc::now() + Duration::days(self.config.welcome_expiry_days);
        let topup = TopUp::new(*org, self.config.welcome_credits, 0, Some(expires_on));
        self.store.put_topup(&topup)?;
        self.invalidate_org(org);

        info!(%org, credits = topup.credits, "created welcome top-up");
        Ok(topup)
    }

    /// Create a purchased top-up.
    ///
    /// Validation happens before anything is written: a rejected purchase
    /// has no side effects and the caller may retry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] if `credits` is not positive
    /// or `price_cents` is negative.
    pub fn purchase_topup(
        &self,
        org: &OrgId,
        credits: i64,
        price_cents: i64,
        payment_ref: Option<&str>,
    ) -> Result<TopUp> {
        if credits <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "credits must be positive, got {credits}"
            )));
        }
        if price_cents < 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "price cannot be negative, got {price_cents}"
            )));
        }

        let mut topup = TopUp::new(*org, credits, price_cents, None);
        if let Some(payment_ref) = payment_ref {
            topup = topup.with_payment_ref(payment_ref);
        }
        self.store.put_topup(&topup)?;
        self.invalidate_org(org);

        info!(%org, credits, price_cents, "created top-up");
        Ok(topup)
    }

    /// Create a free top-up (promotional or admin grant).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] if `credits` is not positive.
    pub fn grant_topup(&self, org: &OrgId, credits: i64) -> Result<TopUp> {
        self.purchase_topup(org, credits, 0, None)
    }

    /// Fetch a top-up.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TopUpNotFound`] if it doesn't exist.
    pub fn get_topup(&self, id: &TopUpId) -> Result<TopUp> {
        self.store
            .get_topup(id)?
            .ok_or_else(|| LedgerError::TopUpNotFound {
                topup_id: id.to_string(),
            })
    }

    /// Apply an admin update to a top-up.
    ///
    /// Any change invalidates the org's cached credit aggregates and its
    /// active-top-up cache.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TopUpNotFound`] if the top-up doesn't exist,
    /// or [`LedgerError::InvalidAmount`] for a non-positive credit quantity.
    pub fn update_topup(&self, id: &TopUpId, update: TopUpUpdate) -> Result<TopUp> {
        let mut topup = self.get_topup(id)?;

        if let Some(credits) = update.credits {
            if credits <= 0 {
                return Err(LedgerError::InvalidAmount(format!(
                    "credits must be positive, got {credits}"
                )));
            }
            topup.credits = credits;
        }
        if let Some(expires_on) = update.expires_on {
            topup.expires_on = expires_on;
        }
        if let Some(is_active) = update.is_active {
            topup.is_active = is_active;
        }

        self.store.put_topup(&topup)?;
        self.invalidate_org(&topup.org);
        Ok(topup)
    }

    /// Deactivate a top-up, removing it from every aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TopUpNotFound`] if the top-up doesn't exist.
    pub fn deactivate_topup(&self, id: &TopUpId) -> Result<TopUp> {
        self.update_topup(id, TopUpUpdate::new().active(false))
    }
}
