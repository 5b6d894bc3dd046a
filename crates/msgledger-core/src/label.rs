//! Label types for msgledger.
//!
//! A *system label* is an implicit, non-editable message category (Inbox,
//! Flow, Archived, Outbox, Sent, Failed) maintained as a live count. A *user
//! label* is a named, per-organization label applied explicitly to messages.
//! Both share the same counter shape: a total count plus a visible count.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::MsgAttrs;

/// The fixed set of system message categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemLabel {
    /// Visible incoming inbox messages.
    Inbox,

    /// Visible incoming flow messages.
    Flow,

    /// Archived incoming messages.
    Archived,

    /// Outgoing messages queued for sending.
    Outbox,

    /// Outgoing messages sent or delivered.
    Sent,

    /// Outgoing messages that failed.
    Failed,
}

impl SystemLabel {
    /// All system labels, in display order.
    pub const ALL: [Self; 6] = [
        Self::Inbox,
        Self::Flow,
        Self::Archived,
        Self::Outbox,
        Self::Sent,
        Self::Failed,
    ];

    /// A stable one-byte code for storage keys.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Inbox => b'I',
            Self::Flow => b'W',
            Self::Archived => b'A',
            Self::Outbox => b'O',
            Self::Sent => b'S',
            Self::Failed => b'X',
        }
    }

    /// Decode a storage code back to a label.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            b'I' => Some(Self::Inbox),
            b'W' => Some(Self::Flow),
            b'A' => Some(Self::Archived),
            b'O' => Some(Self::Outbox),
            b'S' => Some(Self::Sent),
            b'X' => Some(Self::Failed),
            _ => None,
        }
    }

    /// The system category for a message attribute combination.
    ///
    /// Convenience alias for [`MsgAttrs::system_label`].
    #[must_use]
    pub fn for_attrs(attrs: &MsgAttrs) -> Option<Self> {
        attrs.system_label()
    }
}

impl fmt::Display for SystemLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inbox => "Inbox",
            Self::Flow => "Flow",
            Self::Archived => "Archived",
            Self::Outbox => "Outbox",
            Self::Sent => "Sent",
            Self::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

/// A reference to a counted label: either a system category or a user label.
///
/// User labels are identified by name within their organization; the two
/// namespaces cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelRef {
    /// A system category.
    System(SystemLabel),

    /// A user-defined label, by name.
    User(String),
}

impl LabelRef {
    /// Create a user label reference.
    #[must_use]
    pub fn user(name: impl Into<String>) -> Self {
        Self::User(name.into())
    }
}

impl From<SystemLabel> for LabelRef {
    fn from(label: SystemLabel) -> Self {
        Self::System(label)
    }
}

impl fmt::Display for LabelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System(label) => write!(f, "{label}"),
            Self::User(name) => write!(f, "{name}"),
        }
    }
}

/// Live counts for one label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    /// Number of messages carrying the label.
    pub count: i64,

    /// The subset that is currently visible.
    pub visible_count: i64,
}

impl LabelCounts {
    /// Create a counts pair.
    #[must_use]
    pub const fn new(count: i64, visible_count: i64) -> Self {
        Self {
            count,
            visible_count,
        }
    }

    /// Whether both counts are zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.count == 0 && self.visible_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MsgType;

    #[test]
    fn codes_roundtrip() {
        for label in SystemLabel::ALL {
            assert_eq!(SystemLabel::from_code(label.code()), Some(label));
        }
        assert_eq!(SystemLabel::from_code(b'?'), None);
    }

    #[test]
    fn for_attrs_matches_predicate_table() {
        assert_eq!(
            SystemLabel::for_attrs(&MsgAttrs::incoming(MsgType::Flow)),
            Some(SystemLabel::Flow)
        );
        assert_eq!(
            SystemLabel::for_attrs(&MsgAttrs::outgoing()),
            Some(SystemLabel::Outbox)
        );
    }

    #[test]
    fn label_ref_display() {
        assert_eq!(LabelRef::from(SystemLabel::Inbox).to_string(), "Inbox");
        assert_eq!(LabelRef::user("Spam").to_string(), "Spam");
    }

    #[test]
    fn label_counts_default_is_zero() {
        assert!(LabelCounts::default().is_zero());
        assert!(!LabelCounts::new(1, 0).is_zero());
    }
}
