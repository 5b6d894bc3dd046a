//! Credit top-up allocation and live label counting for msgledger.
//!
//! The [`Ledger`] is the engine's single entry point. It owns a [`Store`]
//! and maintains two in-process caches on top of it:
//!
//! - the **credit cache**: aggregate credit metrics per organization,
//!   cleared whenever one of the org's top-ups changes;
//! - the **active top-up cache**: the top-up currently being drawn down per
//!   organization, with a remaining-capacity countdown.
//!
//! # Billing model
//!
//! Every billable message consumes one credit from the organization's
//! soonest-expiring top-up with capacity left. Running out of credit is not
//! an error: messages keep flowing with no top-up reference and are billed
//! later by [`Ledger::apply_topups`] once capacity exists again.
//!
//! Allocation is best-effort eventually consistent. Concurrent workers may
//! briefly oversubscribe a top-up; the periodic reallocation pass corrects
//! under-billing and never un-bills.
//!
//! # Label counting
//!
//! Each message belongs to at most one system category (Inbox, Flow,
//! Archived, Outbox, Sent, Failed) derived from its attributes, plus any
//! number of user labels. Counts are maintained purely by atomic
//! increment-by-delta as messages are created and mutated;
//! [`Ledger::recount_labels`] is a repair pass, not a steady-state path.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use msgledger_core::{MsgAttrs, MsgType, OrgId, SystemLabel};
//! use msgledger_engine::Ledger;
//! use msgledger_store::MemStore;
//!
//! let ledger = Ledger::new(Arc::new(MemStore::new()));
//! let org = OrgId::generate();
//!
//! // signup grants a welcome top-up
//! ledger.register_org(&org).unwrap();
//! assert_eq!(ledger.get_credits_total(&org).unwrap(), 1000);
//!
//! // incoming messages are billed and counted
//! let msg = ledger
//!     .on_message_created(&org, MsgAttrs::incoming(MsgType::Inbox))
//!     .unwrap();
//! assert!(msg.topup.is_some());
//! assert_eq!(ledger.get_credits_remaining(&org).unwrap(), 999);
//!
//! let counts = ledger
//!     .get_label_count(&org, &SystemLabel::Inbox.into())
//!     .unwrap();
//! assert_eq!(counts.count, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod allocator;
pub mod cache;
pub mod config;
mod credits;
mod labels;
mod reconcile;
mod topups;

pub use cache::{CreditCache, CreditMetric};
pub use config::LedgerConfig;
pub use topups::TopUpUpdate;

use std::sync::Arc;

use dashmap::DashMap;

use allocator::ActiveTopUp;
use msgledger_core::OrgId;
use msgledger_store::Store;

/// The credit and label accounting engine.
///
/// Cheap to share: callers typically wrap it in an `Arc` and call it from
/// many workers. All methods take `&self`.
pub struct Ledger {
    store: Arc<dyn Store>,
    config: LedgerConfig,
    credit_cache: CreditCache,
    active_topups: DashMap<OrgId, ActiveTopUp>,
}

impl Ledger {
    /// Create a ledger with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    /// Create a ledger with an explicit configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn Store>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            credit_cache: CreditCache::new(),
            active_topups: DashMap::new(),
        }
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Drop all cached state for an organization.
    ///
    /// Called after every top-up mutation; also safe to call externally
    /// (e.g. after out-of-band storage edits).
    pub fn invalidate_org(&self, org: &OrgId) {
        self.credit_cache.invalidate_org(org);
        self.active_topups.remove(org);
    }
}
