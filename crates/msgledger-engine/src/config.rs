//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default welcome grant on organization signup.
pub const DEFAULT_WELCOME_CREDITS: i64 = 1000;

/// Default welcome grant lifetime in days.
pub const DEFAULT_WELCOME_EXPIRY_DAYS: i64 = 365;

/// Default low-credit threshold as a percentage of total credits.
pub const DEFAULT_LOW_CREDITS_PERCENT: i64 = 15;

/// Default floor for the low-credit threshold.
pub const DEFAULT_LOW_CREDITS_FLOOR: i64 = 100;

/// Default lookahead window for expiring credits, in days.
pub const DEFAULT_EXPIRING_WINDOW_DAYS: i64 = 30;

/// Default purchased-credit threshold for pro feature gating.
pub const DEFAULT_PRO_CREDITS_THRESHOLD: i64 = 100_000;

/// Configuration for the ledger engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Credits granted for free when an organization registers.
    pub welcome_credits: i64,

    /// Days until the welcome grant expires.
    pub welcome_expiry_days: i64,

    /// Low-credit threshold percentage of total credits.
    pub low_credits_percent: i64,

    /// Minimum low-credit threshold, regardless of total.
    pub low_credits_floor: i64,

    /// How many days ahead "expiring soon" looks.
    pub expiring_window_days: i64,

    /// Purchased credits at or above which an org counts as pro.
    ///
    /// This reads purchased totals, independent of the current balance, so
    /// a heavily-used org stays pro.
    pub pro_credits_threshold: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            welcome_credits: DEFAULT_WELCOME_CREDITS,
            welcome_expiry_days: DEFAULT_WELCOME_EXPIRY_DAYS,
            low_credits_percent: DEFAULT_LOW_CREDITS_PERCENT,
            low_credits_floor: DEFAULT_LOW_CREDITS_FLOOR,
            expiring_window_days: DEFAULT_EXPIRING_WINDOW_DAYS,
            pro_credits_threshold: DEFAULT_PRO_CREDITS_THRESHOLD,
        }
    }
}

impl LedgerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the welcome grant size.
    #[must_use]
    pub fn with_welcome_credits(mut self, credits: i64) -> Self {
        self.welcome_credits = credits;
        self
    }

    /// Set the low-credit threshold percentage and floor.
    #[must_use]
    pub fn with_low_credits_threshold(mut self, percent: i64, floor: i64) -> Self {
        self.low_credits_percent = percent;
        self.low_credits_floor = floor;
        self
    }

    /// Set the expiring-soon lookahead window.
    #[must_use]
    pub fn with_expiring_window_days(mut self, days: i64) -> Self {
        self.expiring_window_days = days;
        self
    }

    /// Set the pro feature-gating threshold.
    #[must_use]
    pub fn with_pro_credits_threshold(mut self, credits: i64) -> Self {
        self.pro_credits_threshold = credits;
        self
    }
}
