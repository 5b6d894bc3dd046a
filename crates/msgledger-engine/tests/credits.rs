//! Credit lifecycle integration tests: grants, billing, aggregates,
//! exhaustion and reallocation, expiry, and compaction.

use std::sync::Arc;

use chrono::{Duration, Utc};

use msgledger_core::{LedgerError, MsgAttrs, MsgType, OrgId, TopUp};
use msgledger_engine::{Ledger, LedgerConfig};
use msgledger_store::{MemStore, Store};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ledger() -> Ledger {
    init_tracing();
    Ledger::new(Arc::new(MemStore::new()))
}

fn ledger_with(config: LedgerConfig) -> Ledger {
    init_tracing();
    Ledger::with_config(Arc::new(MemStore::new()), config)
}

// =============================================================================
// Registration and Welcome Grant
// =============================================================================

#[test]
fn registration_grants_welcome_credits() {
    let ledger = ledger();
    let org = OrgId::generate();

    let welcome = ledger.register_org(&org).unwrap();
    assert_eq!(welcome.credits, 1000);
    assert_eq!(welcome.price_cents, 0);
    assert!(welcome.expires_on.is_some());

    assert_eq!(ledger.get_credits_total(&org).unwrap(), 1000);
    assert_eq!(ledger.get_credits_used(&org).unwrap(), 0);
    assert_eq!(ledger.get_credits_remaining(&org).unwrap(), 1000);
    assert_eq!(ledger.get_purchased_credits(&org).unwrap(), 1000);
    assert!(!ledger.is_pro(&org).unwrap());
}

#[test]
fn threshold_is_percent_of_total_with_floor() {
    let ledger = ledger();
    let org = OrgId::generate();

    ledger.register_org(&org).unwrap();
    // 15% of 1000
    assert_eq!(ledger.get_low_credits_threshold(&org).unwrap(), 150);

    let small = ledger_with(LedgerConfig::new().with_welcome_credits(200));
    let org = OrgId::generate();
    small.register_org(&org).unwrap();
    // 15% of 200 is 30, below the floor of 100
    assert_eq!(small.get_low_credits_threshold(&org).unwrap(), 100);
}

#[test]
fn empty_org_has_nothing() {
    let ledger = ledger();
    let org = OrgId::generate();

    assert_eq!(ledger.get_credits_total(&org).unwrap(), 0);
    assert_eq!(ledger.get_credits_remaining(&org).unwrap(), 0);
    assert_eq!(ledger.active_topup(&org).unwrap(), None);
}

// =============================================================================
// Purchases and Validation
// =============================================================================

#[test]
fn purchase_adds_credits() {
    let ledger = ledger();
    let org = OrgId::generate();

    ledger.register_org(&org).unwrap();
    let topup = ledger
        .purchase_topup(&org, 500, 2000, Some("ch_42"))
        .unwrap();
    assert_eq!(topup.payment_ref.as_deref(), Some("ch_42"));

    assert_eq!(ledger.get_credits_total(&org).unwrap(), 1500);
    assert_eq!(ledger.get_purchased_credits(&org).unwrap(), 1500);
}

#[test]
fn invalid_purchase_writes_nothing() {
    let ledger = ledger();
    let org = OrgId::generate();

    let err = ledger.purchase_topup(&org, 0, 100, None).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));

    let err = ledger.purchase_topup(&org, 100, -1, None).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));

    assert!(ledger.store().org_topups(&org).unwrap().is_empty());
}

#[test]
fn pro_follows_purchased_not_remaining() {
    let ledger = ledger();
    let org = OrgId::generate();

    ledger.purchase_topup(&org, 100_000, 50_000, None).unwrap();
    assert!(ledger.is_pro(&org).unwrap());

    // consuming credits does not demote
    for _ in 0..5 {
        ledger
            .on_message_created(&org, MsgAttrs::incoming(MsgType::Inbox))
            .unwrap();
    }
    assert!(ledger.is_pro(&org).unwrap());
}

// =============================================================================
// Billing
// =============================================================================

#[test]
fn messages_bill_against_welcome_topup() {
    let ledger = ledger();
    let org = OrgId::generate();

    let welcome = ledger.register_org(&org).unwrap();

    for _ in 0..10 {
        let msg = ledger
            .on_message_created(&org, MsgAttrs::incoming(MsgType::Inbox))
            .unwrap();
        assert_eq!(msg.topup, Some(welcome.id));
    }

    assert_eq!(ledger.get_credits_used(&org).unwrap(), 10);
    assert_eq!(ledger.get_credits_remaining(&org).unwrap(), 990);
    assert_eq!(ledger.store().topup_usage(&welcome.id).unwrap(), 10);
}

#[test]
fn soonest_expiring_topup_is_drained_first() {
    let ledger = ledger();
    let org = OrgId::generate();
    let now = Utc::now();

    let later = TopUp::new(org, 100, 0, Some(now + Duration::days(60)));
    let sooner = TopUp::new(org, 2, 0, Some(now + Duration::days(7)));
    let never = TopUp::new(org, 100, 0, None);
    for topup in [&later, &sooner, &never] {
        ledger.store().put_topup(topup).unwrap();
    }

    assert_eq!(ledger.active_topup(&org).unwrap(), Some(sooner.id));

    // two credits drain the sooner top-up, the third rolls over
    for expected in [sooner.id, sooner.id, later.id] {
        let msg = ledger
            .on_message_created(&org, MsgAttrs::incoming(MsgType::Inbox))
            .unwrap();
        assert_eq!(msg.topup, Some(expected));
    }
}

#[test]
fn exhaustion_leaves_messages_unbilled() {
    let ledger = ledger_with(LedgerConfig::new().with_welcome_credits(10));
    let org = OrgId::generate();

    ledger.register_org(&org).unwrap();
    for _ in 0..15 {
        ledger
            .on_message_created(&org, MsgAttrs::incoming(MsgType::Inbox))
            .unwrap();
    }

    assert_eq!(ledger.store().count_unbilled(&org).unwrap(), 5);
    // unbilled messages still owe a credit
    assert_eq!(ledger.get_credits_used(&org).unwrap(), 15);
    assert_eq!(ledger.get_credits_remaining(&org).unwrap(), -5);
    assert!(ledger.has_low_credits(&org).unwrap());
}

#[test]
fn apply_topups_bills_backlog_oldest_first() {
    let ledger = ledger_with(LedgerConfig::new().with_welcome_credits(10));
    let org = OrgId::generate();

    ledger.register_org(&org).unwrap();
    let mut msgs = Vec::new();
    for _ in 0..15 {
        msgs.push(
            ledger
                .on_message_created(&org, MsgAttrs::incoming(MsgType::Inbox))
                .unwrap(),
        );
    }

    let purchased = ledger.purchase_topup(&org, 1000, 500, None).unwrap();
    assert_eq!(ledger.apply_topups(&org).unwrap(), 5);

    assert_eq!(ledger.store().count_unbilled(&org).unwrap(), 0);
    assert_eq!(ledger.store().topup_usage(&purchased.id).unwrap(), 5);
    assert_eq!(ledger.get_credits_used(&org).unwrap(), 15);
    assert_eq!(ledger.get_credits_remaining(&org).unwrap(), 995);

    // the previously unbilled tail now references the purchase
    for msg in &msgs[10..] {
        let stored = ledger.store().get_msg(&msg.id).unwrap().unwrap();
        assert_eq!(stored.topup, Some(purchased.id));
    }
    // already-billed messages are untouched
    for msg in &msgs[..10] {
        let stored = ledger.store().get_msg(&msg.id).unwrap().unwrap();
        assert_ne!(stored.topup, Some(purchased.id));
    }
}

#[test]
fn apply_topups_with_no_backlog_is_a_noop() {
    let ledger = ledger();
    let org = OrgId::generate();

    ledger.register_org(&org).unwrap();
    assert_eq!(ledger.apply_topups(&org).unwrap(), 0);
}

// =============================================================================
// Expiry
// =============================================================================

#[test]
fn expired_topup_keeps_consumed_credits_in_total() {
    let ledger = ledger();
    let org = OrgId::generate();
    let now = Utc::now();

    // expired with 30 of 100 consumed
    let expired = TopUp::new(org, 100, 0, Some(now - Duration::days(1)));
    ledger.store().put_topup(&expired).unwrap();
    ledger
        .store()
        .add_usage(&expired.id, now.date_naive() - Duration::days(10), 30)
        .unwrap();

    let live = TopUp::new(org, 500, 0, None);
    ledger.store().put_topup(&live).unwrap();

    // unused expired capacity is gone, consumed capacity stays
    assert_eq!(ledger.get_credits_total(&org).unwrap(), 530);
    assert_eq!(ledger.get_credits_used(&org).unwrap(), 30);
    assert_eq!(ledger.get_credits_remaining(&org).unwrap(), 500);
    // purchased still counts full capacity
    assert_eq!(ledger.get_purchased_credits(&org).unwrap(), 600);

    // expired top-ups are never allocated from
    assert_eq!(ledger.active_topup(&org).unwrap(), Some(live.id));
}

#[test]
fn expiring_soon_counts_unused_credits_inside_window() {
    let ledger = ledger();
    let org = OrgId::generate();
    let now = Utc::now();

    let soon = TopUp::new(org, 100, 0, Some(now + Duration::days(10)));
    let far = TopUp::new(org, 100, 0, Some(now + Duration::days(90)));
    let never = TopUp::new(org, 100, 0, None);
    for topup in [&soon, &far, &never] {
        ledger.store().put_topup(topup).unwrap();
    }
    ledger
        .store()
        .add_usage(&soon.id, now.date_naive(), 40)
        .unwrap();

    // default window is 30 days; only the unused part of `soon` counts
    assert_eq!(ledger.get_credits_expiring_soon(&org).unwrap(), 60);
    // a wider ad-hoc window picks up `far` too
    assert_eq!(ledger.credits_expiring_within(&org, 120).unwrap(), 160);
}

// =============================================================================
// Admin Updates
// =============================================================================

#[test]
fn shrinking_a_topup_keeps_recorded_usage() {
    let ledger = ledger();
    let org = OrgId::generate();

    let welcome = ledger.register_org(&org).unwrap();
    for _ in 0..10 {
        ledger
            .on_message_created(&org, MsgAttrs::incoming(MsgType::Inbox))
            .unwrap();
    }

    ledger
        .update_topup(&welcome.id, msgledger_engine::TopUpUpdate::new().credits(15))
        .unwrap();

    assert_eq!(ledger.get_credits_total(&org).unwrap(), 15);
    assert_eq!(ledger.get_credits_used(&org).unwrap(), 10);
    assert_eq!(ledger.get_credits_remaining(&org).unwrap(), 5);
}

#[test]
fn deactivation_removes_topup_from_all_aggregates() {
    let ledger = ledger();
    let org = OrgId::generate();

    let welcome = ledger.register_org(&org).unwrap();
    ledger
        .on_message_created(&org, MsgAttrs::incoming(MsgType::Inbox))
        .unwrap();

    ledger.deactivate_topup(&welcome.id).unwrap();

    assert_eq!(ledger.get_credits_total(&org).unwrap(), 0);
    assert_eq!(ledger.get_purchased_credits(&org).unwrap(), 0);
    // its usage no longer counts either, but the unbilled backlog is empty
    assert_eq!(ledger.get_credits_used(&org).unwrap(), 0);
    assert_eq!(ledger.active_topup(&org).unwrap(), None);
}

#[test]
fn updating_a_missing_topup_fails() {
    let ledger = ledger();
    let id = msgledger_core::TopUpId::generate();

    let err = ledger.deactivate_topup(&id).unwrap_err();
    assert!(matches!(err, LedgerError::TopUpNotFound { .. }));
}

#[test]
fn topup_mutations_invalidate_cached_metrics() {
    let ledger = ledger();
    let org = OrgId::generate();

    ledger.register_org(&org).unwrap();
    assert_eq!(ledger.get_credits_total(&org).unwrap(), 1000);
    assert_eq!(ledger.get_low_credits_threshold(&org).unwrap(), 150);

    ledger.purchase_topup(&org, 1000, 500, None).unwrap();
    assert_eq!(ledger.get_credits_total(&org).unwrap(), 2000);
    assert_eq!(ledger.get_low_credits_threshold(&org).unwrap(), 300);
}

// =============================================================================
// Usage Compaction
// =============================================================================

#[test]
fn squash_merges_daily_usage_rows() {
    let ledger = ledger();
    let org = OrgId::generate();
    let today = Utc::now().date_naive();

    let topup = ledger.grant_topup(&org, 1000).unwrap();
    for (days_ago, used) in [(3, 5), (2, 7), (1, 2)] {
        ledger
            .store()
            .add_usage(&topup.id, today - Duration::days(days_ago), used)
            .unwrap();
    }
    assert_eq!(ledger.store().usage_rows(&topup.id).unwrap().len(), 3);

    assert_eq!(ledger.squash_usage(&org).unwrap(), 1);

    let rows = ledger.store().usage_rows(&topup.id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].used, 14);
    assert_eq!(rows[0].day, today - Duration::days(3));

    // totals are unchanged
    assert_eq!(ledger.get_credits_used(&org).unwrap(), 14);

    // already-compacted top-ups are skipped on re-run
    assert_eq!(ledger.squash_usage(&org).unwrap(), 0);
}
