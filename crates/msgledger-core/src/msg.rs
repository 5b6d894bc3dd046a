//! Message attribute types for msgledger.
//!
//! The engine does not own the message pipeline; it keeps a minimal record
//! per message: the attributes that drive system-category membership, the
//! top-up the message was billed to (if any), and its user label memberships
//! (stored separately).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MsgId, OrgId, SystemLabel, TopUpId};

/// Direction of a message relative to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// An incoming message from a contact.
    In,

    /// An outgoing message to a contact.
    Out,
}

/// Kind of an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    /// A plain inbox message.
    Inbox,

    /// A message handled by a flow.
    Flow,
}

/// Visibility of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible in listings.
    Visible,

    /// Archived by a user.
    Archived,

    /// Soft-deleted. Deleted messages belong to no system category.
    Deleted,
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgStatus {
    /// Created but not yet processed.
    Pending,

    /// Incoming message that has been handled.
    Handled,

    /// Outgoing message waiting to be sent.
    Queued,

    /// Outgoing message sent to the channel.
    Sent,

    /// Outgoing message confirmed delivered.
    Delivered,

    /// Outgoing message that failed to send.
    Failed,
}

/// The attributes of a message that determine its system category.
///
/// Only changes to these four fields move category counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAttrs {
    /// Message direction.
    pub direction: Direction,

    /// Message kind (meaningful for incoming messages).
    pub msg_type: MsgType,

    /// Message visibility.
    pub visibility: Visibility,

    /// Delivery status (meaningful for outgoing messages).
    pub status: MsgStatus,
}

impl MsgAttrs {
    /// Attributes of a freshly received incoming message.
    #[must_use]
    pub const fn incoming(msg_type: MsgType) -> Self {
        Self {
            direction: Direction::In,
            msg_type,
            visibility: Visibility::Visible,
            status: MsgStatus::Handled,
        }
    }

    /// Attributes of a freshly queued outgoing message.
    #[must_use]
    pub const fn outgoing() -> Self {
        Self {
            direction: Direction::Out,
            msg_type: MsgType::Inbox,
            visibility: Visibility::Visible,
            status: MsgStatus::Queued,
        }
    }

    /// Whether the message counts toward visible label counts.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    /// The system category this attribute combination belongs to, if any.
    ///
    /// This is the fixed predicate table: incoming messages are categorized
    /// by visibility then type; outgoing messages by status alone.
    #[must_use]
    pub fn system_label(&self) -> Option<SystemLabel> {
        match self.direction {
            Direction::In => match self.visibility {
                Visibility::Visible => match self.msg_type {
                    MsgType::Inbox => Some(SystemLabel::Inbox),
                    MsgType::Flow => Some(SystemLabel::Flow),
                },
                Visibility::Archived => Some(SystemLabel::Archived),
                Visibility::Deleted => None,
            },
            Direction::Out => match self.status {
                MsgStatus::Queued => Some(SystemLabel::Outbox),
                MsgStatus::Sent | MsgStatus::Delivered => Some(SystemLabel::Sent),
                MsgStatus::Failed => Some(SystemLabel::Failed),
                MsgStatus::Pending | MsgStatus::Handled => None,
            },
        }
    }
}

/// The engine's record of one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgRecord {
    /// Unique message ID (ULID for time-ordering).
    pub id: MsgId,

    /// The organization that owns this message.
    pub org: OrgId,

    /// Category-driving attributes.
    pub attrs: MsgAttrs,

    /// The top-up this message was billed to. `None` means the message is
    /// unbilled (the org was out of credit when it arrived).
    pub topup: Option<TopUpId>,

    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl MsgRecord {
    /// Create a new unbilled message record.
    #[must_use]
    pub fn new(org: OrgId, attrs: MsgAttrs) -> Self {
        Self {
            id: MsgId::generate(),
            org,
            attrs,
            topup: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(
        direction: Direction,
        msg_type: MsgType,
        visibility: Visibility,
        status: MsgStatus,
    ) -> MsgAttrs {
        MsgAttrs {
            direction,
            msg_type,
            visibility,
            status,
        }
    }

    #[test]
    fn incoming_visible_messages_categorize_by_type() {
        assert_eq!(
            MsgAttrs::incoming(MsgType::Inbox).system_label(),
            Some(SystemLabel::Inbox)
        );
        assert_eq!(
            MsgAttrs::incoming(MsgType::Flow).system_label(),
            Some(SystemLabel::Flow)
        );
    }

    #[test]
    fn incoming_archived_messages_are_archived_regardless_of_type() {
        for msg_type in [MsgType::Inbox, MsgType::Flow] {
            let a = attrs(
                Direction::In,
                msg_type,
                Visibility::Archived,
                MsgStatus::Handled,
            );
            assert_eq!(a.system_label(), Some(SystemLabel::Archived));
        }
    }

    #[test]
    fn deleted_incoming_messages_have_no_category() {
        let a = attrs(
            Direction::In,
            MsgType::Inbox,
            Visibility::Deleted,
            MsgStatus::Handled,
        );
        assert_eq!(a.system_label(), None);
    }

    #[test]
    fn outgoing_messages_categorize_by_status() {
        let base = MsgAttrs::outgoing();
        assert_eq!(base.system_label(), Some(SystemLabel::Outbox));

        for (status, expected) in [
            (MsgStatus::Sent, Some(SystemLabel::Sent)),
            (MsgStatus::Delivered, Some(SystemLabel::Sent)),
            (MsgStatus::Failed, Some(SystemLabel::Failed)),
            (MsgStatus::Pending, None),
        ] {
            let a = MsgAttrs { status, ..base };
            assert_eq!(a.system_label(), expected);
        }
    }

    #[test]
    fn outgoing_category_ignores_visibility() {
        let a = MsgAttrs {
            visibility: Visibility::Archived,
            ..MsgAttrs::outgoing()
        };
        assert_eq!(a.system_label(), Some(SystemLabel::Outbox));
        assert!(!a.is_visible());
    }

    #[test]
    fn msg_record_starts_unbilled() {
        let msg = MsgRecord::new(OrgId::generate(), MsgAttrs::incoming(MsgType::Inbox));
        assert!(msg.topup.is_none());
    }

    #[test]
    fn attrs_serde_roundtrip() {
        let a = MsgAttrs::incoming(MsgType::Flow);
        let json = serde_json::to_string(&a).unwrap();
        let parsed: MsgAttrs = serde_json::from_str(&json).unwrap();
        assert_eq!(a, parsed);
    }
}
