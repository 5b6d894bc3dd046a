//! Core types for msgledger.
//!
//! This crate provides the foundational types used throughout the msgledger
//! accounting engine:
//!
//! - **Identifiers**: `OrgId`, `MsgId`, `TopUpId`
//! - **Top-ups**: `TopUp`, `CreditUsage`
//! - **Messages**: `MsgRecord`, `Direction`, `MsgType`, `Visibility`, `MsgStatus`
//! - **Labels**: `SystemLabel`, `LabelRef`, `LabelCounts`
//!
//! # Credits
//!
//! One credit pays for one billable message. Credits arrive in *top-ups*
//! (purchased or granted, optionally expiring) and are consumed in
//! soonest-expiring-first order. A top-up's used count is never stored on the
//! top-up itself; it is derived from per-day [`CreditUsage`] rows.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod label;
pub mod msg;
pub mod topup;

pub use error::{LedgerError, Result};
pub use ids::{IdError, MsgId, OrgId, TopUpId};
pub use label::{LabelCounts, LabelRef, SystemLabel};
pub use msg::{Direction, MsgAttrs, MsgRecord, MsgStatus, MsgType, Visibility};
pub use topup::{CreditUsage, TopUp};
