//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Top-up records, keyed by `topup_id` (ULID).
    pub const TOPUPS: &str = "topups";

    /// Index: top-ups by organization, keyed by `org_id || topup_id`.
    /// Value is empty (index only).
    pub const TOPUPS_BY_ORG: &str = "topups_by_org";

    /// Per-day credit usage, keyed by `topup_id || day`. Value is an `i64`
    /// maintained by an additive merge operator.
    pub const USAGE: &str = "usage";

    /// Message records, keyed by `msg_id` (ULID).
    pub const MSGS: &str = "msgs";

    /// Index: messages by organization, keyed by `org_id || msg_id`.
    pub const MSGS_BY_ORG: &str = "msgs_by_org";

    /// Index: unbilled messages by organization, keyed by `org_id || msg_id`.
    /// An entry exists while the message has no top-up reference.
    pub const UNBILLED_BY_ORG: &str = "unbilled_by_org";

    /// User label membership, keyed by `msg_id || label_name`.
    pub const MSG_LABELS: &str = "msg_labels";

    /// Label counters, keyed by `org_id || label_key`. Value is a
    /// `(count, visible_count)` pair maintained by an additive merge
    /// operator.
    pub const LABEL_COUNTS: &str = "label_counts";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::TOPUPS,
        cf::TOPUPS_BY_ORG,
        cf::USAGE,
        cf::MSGS,
        cf::MSGS_BY_ORG,
        cf::UNBILLED_BY_ORG,
        cf::MSG_LABELS,
        cf::LABEL_COUNTS,
    ]
}
