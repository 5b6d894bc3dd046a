//! Storage layer for msgledger.
//!
//! This crate provides persistent storage for top-ups, per-day credit usage
//! aggregates, message records, label memberships, and label counters.
//!
//! Two backends implement the [`Store`] trait:
//!
//! - [`MemStore`]: in-memory, built on concurrent maps. The default backend
//!   and the one the engine's test suites run against.
//! - `RocksStore` (feature `rocksdb-backend`): `RocksDB` with column families
//!   for indexing and merge operators for atomic counter increments.
//!
//! # Counter contract
//!
//! Label counters and usage rows are only ever mutated by
//! increment-by-delta operations ([`Store::incr_label_counts`],
//! [`Store::add_usage`]). Both backends make these atomic at the storage
//! layer, so concurrent workers never lose updates. Reads of a counter may
//! race a concurrent increment; that is acceptable, full read-modify-write
//! cycles in callers are not.
//!
//! # Example
//!
//! ```
//! use msgledger_store::{MemStore, Store};
//! use msgledger_core::{OrgId, TopUp};
//!
//! let store = MemStore::new();
//!
//! let org = OrgId::generate();
//! let topup = TopUp::new(org, 1000, 0, None);
//! store.put_topup(&topup).unwrap();
//!
//! let topups = store.org_topups(&org).unwrap();
//! assert_eq!(topups.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
pub mod mem;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use mem::MemStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::NaiveDate;
use msgledger_core::{CreditUsage, LabelCounts, LabelRef, MsgAttrs, MsgId, MsgRecord, OrgId, TopUp, TopUpId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (in-memory, `RocksDB`).
pub trait Store: Send + Sync {
    // =========================================================================
    // Top-Up Operations
    // =========================================================================

    /// Insert or update a top-up record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_topup(&self, topup: &TopUp) -> Result<()>;

    /// Get a top-up by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_topup(&self, id: &TopUpId) -> Result<Option<TopUp>>;

    /// List all top-ups for an organization, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn org_topups(&self, org: &OrgId) -> Result<Vec<TopUp>>;

    // =========================================================================
    // Credit Usage Operations
    // =========================================================================

    /// Add consumed credits to the usage row for (top-up, day).
    ///
    /// This is an atomic increment; the row is created on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn add_usage(&self, topup: &TopUpId, day: NaiveDate, used: i64) -> Result<()>;

    /// Total credits consumed from a top-up (sum over its usage rows).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn topup_usage(&self, topup: &TopUpId) -> Result<i64>;

    /// List the usage rows for a top-up, oldest day first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn usage_rows(&self, topup: &TopUpId) -> Result<Vec<CreditUsage>>;

    /// Atomically replace all usage rows of a top-up with one merged row.
    ///
    /// Used by compaction. The caller is responsible for `merged` preserving
    /// the sum of the rows it replaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn replace_usage_rows(&self, topup: &TopUpId, merged: CreditUsage) -> Result<()>;

    // =========================================================================
    // Message Operations
    // =========================================================================

    /// Insert a message record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_msg(&self, msg: &MsgRecord) -> Result<()>;

    /// Get a message by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_msg(&self, id: &MsgId) -> Result<Option<MsgRecord>>;

    /// List all messages for an organization, in creation order.
    ///
    /// Reconciliation-only path; not used in steady state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn org_msgs(&self, org: &OrgId) -> Result<Vec<MsgRecord>>;

    /// List unbilled messages (no top-up reference) in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn unbilled_msgs(&self, org: &OrgId) -> Result<Vec<MsgRecord>>;

    /// Count unbilled messages for an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_unbilled(&self, org: &OrgId) -> Result<i64>;

    /// Bill a message to a top-up.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the message doesn't exist.
    fn set_msg_topup(&self, id: &MsgId, topup: &TopUpId) -> Result<()>;

    /// Replace a message's attributes, returning the previous attributes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the message doesn't exist.
    fn update_msg_attrs(&self, id: &MsgId, attrs: MsgAttrs) -> Result<MsgAttrs>;

    // =========================================================================
    // Label Membership Operations
    // =========================================================================

    /// Add a user label to a message. Returns `false` if it was already
    /// present (idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn add_msg_label(&self, id: &MsgId, label: &str) -> Result<bool>;

    /// Remove a user label from a message. Returns `false` if it was not
    /// present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn remove_msg_label(&self, id: &MsgId, label: &str) -> Result<bool>;

    /// List the user labels attached to a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn msg_labels(&self, id: &MsgId) -> Result<Vec<String>>;

    // =========================================================================
    // Label Counter Operations
    // =========================================================================

    /// Atomically add deltas to a label's counts.
    ///
    /// The row is created on first use; deltas may be negative.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn incr_label_counts(
        &self,
        org: &OrgId,
        label: &LabelRef,
        delta: i64,
        visible_delta: i64,
    ) -> Result<()>;

    /// Get a label's counts. Missing counters read as zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_label_counts(&self, org: &OrgId, label: &LabelRef) -> Result<LabelCounts>;

    /// List all label counters for an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn org_label_counts(&self, org: &OrgId) -> Result<Vec<(LabelRef, LabelCounts)>>;

    /// Overwrite a label's counts. Reconciliation-only path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn set_label_counts(&self, org: &OrgId, label: &LabelRef, counts: LabelCounts) -> Result<()>;
}
