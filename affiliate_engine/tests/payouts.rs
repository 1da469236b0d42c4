use std::time::Duration;

use affiliate_common::UsdCents;
use affiliate_engine::{
    db_types::{Gateway, NewPayoutRequest, PayoutStatus},
    events::EventProducers,
    traits::{LedgerEntryKind, LedgerError, LedgerManagement, PayoutError},
    EngineConfig,
    FixedRateFeed,
    LedgerApi,
    Notifier,
    PayoutApi,
    RateCache,
    SqliteDatabase,
};
use chrono::{SubsecRound, Utc};
use futures_util::future::join_all;
use log::*;

use crate::support::prepare_env::{activate, membership, pay_activation, register_chain, setup, tear_down};

mod support;

fn payouts(db: &SqliteDatabase) -> PayoutApi<SqliteDatabase> {
    PayoutApi::new(db.clone(), EngineConfig::default().payout_rules(), EventProducers::default())
}

#[tokio::test]
async fn withdrawal_gate() {
    let db = setup().await;
    let members = membership(&db);
    let chain = register_chain(&members, &["Sponsor", "Joiner"]).await;
    let sponsor = &chain[0];
    activate(&db, &chain[0]).await;
    pay_activation(&db, &chain[1], "evt-joiner").await;
    let ledger = LedgerApi::new(db.clone());
    assert_eq!(ledger.balance(sponsor.id).await.unwrap(), UsdCents::from(500));

    let api = payouts(&db);
    let err = api.request_payout(sponsor.id, UsdCents::from(400), Gateway::Paypal, "s@paypal").await.unwrap_err();
    assert_eq!(err, PayoutError::BelowMinimum { requested: UsdCents::from(400), minimum: UsdCents::from(450) });
    assert_eq!(err.code(), "WITHDRAW_MINIMUM");
    let err = api.request_payout(sponsor.id, UsdCents::from(600), Gateway::Paypal, "s@paypal").await.unwrap_err();
    let (requested, available) = (UsdCents::from(600), UsdCents::from(500));
    assert_eq!(err, PayoutError::InsufficientBalance { requested, available });
    assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
    let err = api.request_payout(999, UsdCents::from(450), Gateway::Paypal, "x").await.unwrap_err();
    assert_eq!(err, PayoutError::MemberNotFound(999));

    let payout = api.request_payout(sponsor.id, UsdCents::from(450), Gateway::Paypal, "s@paypal").await.unwrap();
    assert_eq!(payout.status, PayoutStatus::Pending);
    // Pending requests do not touch the balance
    assert_eq!(ledger.balance(sponsor.id).await.unwrap(), UsdCents::from(500));

    let err = api.request_payout(sponsor.id, UsdCents::from(450), Gateway::Paypal, "s@paypal").await.unwrap_err();
    assert!(matches!(err, PayoutError::RateLimited { .. }));
    assert_eq!(err.code(), "PAYOUT_RATE_LIMIT");

    let sent = api.approve_payout(payout.id).await.unwrap();
    assert_eq!(sent.status, PayoutStatus::Sent);
    assert_eq!(ledger.balance(sponsor.id).await.unwrap(), UsdCents::from(50));
    let err = api.approve_payout(payout.id).await.unwrap_err();
    assert_eq!(err, PayoutError::PayoutNotPending { id: payout.id, status: PayoutStatus::Sent });
    let err = api.reject_payout(payout.id, None).await.unwrap_err();
    assert_eq!(err.code(), "PAYOUT_NOT_PENDING");
    let err = api.reject_payout(31337, None).await.unwrap_err();
    assert_eq!(err, PayoutError::PayoutNotFound(31337));

    assert_eq!(api.payouts_for_member(sponsor.id).await.unwrap().len(), 1);
    assert_eq!(api.all_payouts(Some(PayoutStatus::Sent)).await.unwrap().len(), 1);
    assert!(api.all_payouts(Some(PayoutStatus::Pending)).await.unwrap().is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn rejected_requests_still_count_towards_the_window() {
    let db = setup().await;
    let members = membership(&db);
    let chain = register_chain(&members, &["Sponsor", "Joiner"]).await;
    activate(&db, &chain[0]).await;
    pay_activation(&db, &chain[1], "evt-joiner").await;
    let api = payouts(&db);
    let sponsor = chain[0].id;
    let payout = api.request_payout(sponsor, UsdCents::from(500), Gateway::Pesapal, "+254700000000").await.unwrap();
    let rejected = api.reject_payout(payout.id, Some("Wrong number".into())).await.unwrap();
    assert_eq!(rejected.status, PayoutStatus::Rejected);
    assert_eq!(rejected.admin_note.as_deref(), Some("Wrong number"));
    let err = api.request_payout(sponsor, UsdCents::from(500), Gateway::Pesapal, "+254711111111").await.unwrap_err();
    assert!(matches!(err, PayoutError::RateLimited { .. }));
    assert_eq!(LedgerApi::new(db.clone()).balance(sponsor).await.unwrap(), UsdCents::from(500));
    tear_down(db).await;
}

#[tokio::test]
async fn payout_notifications() {
    let db = setup().await;
    let members = membership(&db);
    let chain = register_chain(&members, &["Sponsor", "Joiner"]).await;
    activate(&db, &chain[0]).await;
    pay_activation(&db, &chain[1], "evt-joiner").await;
    let sponsor = chain[0].id;
    let api = payouts(&db);
    let payout = api.request_payout(sponsor, UsdCents::from(500), Gateway::Paypal, "s@paypal").await.unwrap();
    api.approve_payout(payout.id).await.unwrap();

    let notifier = Notifier::new(db.clone(), EventProducers::default());
    let broadcasts = notifier.broadcasts(0, 10).await.unwrap();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].title, "Payout requested");
    let titles = notifier.notifications(sponsor, 0, 50).await.unwrap().into_iter().map(|n| n.title).collect::<Vec<_>>();
    assert!(titles.contains(&"We received your payout request".to_string()));
    assert!(titles.contains(&"Payout approved".to_string()));
    assert!(titles.contains(&"Referral commission earned".to_string()));
    tear_down(db).await;
}

#[tokio::test]
async fn transaction_history() {
    let db = setup().await;
    let members = membership(&db);
    let chain = register_chain(&members, &["Sponsor", "Joiner"]).await;
    activate(&db, &chain[0]).await;
    pay_activation(&db, &chain[1], "evt-joiner").await;
    let sponsor = chain[0].id;
    let api = payouts(&db);
    let payout = api.request_payout(sponsor, UsdCents::from(450), Gateway::Paypal, "s@paypal").await.unwrap();
    api.approve_payout(payout.id).await.unwrap();

    let ledger = LedgerApi::new(db.clone());
    let page = ledger.transactions(sponsor, 0, 10, false).await.unwrap();
    assert_eq!(page.total, 2);
    let net = page.entries.iter().map(|e| e.amount).sum::<UsdCents>();
    assert_eq!(net, ledger.balance(sponsor).await.unwrap());
    assert!(page.entries.iter().any(|e| e.kind == LedgerEntryKind::Debit && e.amount == UsdCents::from(-450)));
    let first = ledger.transactions(sponsor, 0, 1, false).await.unwrap();
    assert_eq!(first.entries.len(), 1);
    assert_eq!(first.total, 2);

    let joiner = chain[1].id;
    let page = ledger.transactions(joiner, 0, 10, true).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].kind, LedgerEntryKind::Payment);
    assert_eq!(page.entries[0].status, "confirmed");
    assert_eq!(ledger.transactions(joiner, 0, 10, false).await.unwrap().total, 0);

    let commissions = ledger.commissions(sponsor, 0, 10).await.unwrap();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].level, 1);

    let rates = RateCache::new(FixedRateFeed::new([("EUR", 0.9)]), Duration::from_secs(60));
    let wallet = ledger.balance_with_local(sponsor, &rates).await.unwrap();
    assert_eq!(wallet.usd, UsdCents::from(50));
    assert_eq!(wallet.currency, "USD");
    assert_eq!(wallet.local, Some(0.5));
    let err = ledger.balance(777).await.unwrap_err();
    assert_eq!(err, LedgerError::MemberNotFound(777));
    tear_down(db).await;
}

#[tokio::test]
async fn only_active_members_can_request_payouts() {
    let db = setup().await;
    let members = membership(&db);
    let chain = register_chain(&members, &["Sponsor", "Joiner"]).await;
    pay_activation(&db, &chain[1], "evt-joiner").await;
    let sponsor = chain[0].id;
    let api = payouts(&db);
    // Earned commissions, but never paid the activation fee
    assert_eq!(LedgerApi::new(db.clone()).balance(sponsor).await.unwrap(), UsdCents::from(500));
    let err = api.request_payout(sponsor, UsdCents::from(450), Gateway::Paypal, "s@paypal").await.unwrap_err();
    assert_eq!(err, PayoutError::AccountInactive(sponsor));
    assert_eq!(err.code(), "ACCOUNT_INACTIVE");

    activate(&db, &chain[0]).await;
    members.set_suspended(sponsor, true).await.unwrap();
    let err = api.request_payout(sponsor, UsdCents::from(450), Gateway::Paypal, "s@paypal").await.unwrap_err();
    assert_eq!(err, PayoutError::AccountInactive(sponsor));
    assert!(api.payouts_for_member(sponsor).await.unwrap().is_empty());

    activate(&db, &chain[0]).await;
    let payout = api.request_payout(sponsor, UsdCents::from(450), Gateway::Paypal, "s@paypal").await.unwrap();
    assert_eq!(payout.status, PayoutStatus::Pending);
    tear_down(db).await;
}

#[tokio::test]
async fn rate_limit_window_is_strict() {
    let db = setup().await;
    let members = membership(&db);
    let chain = register_chain(&members, &["Sponsor", "Joiner"]).await;
    activate(&db, &chain[0]).await;
    pay_activation(&db, &chain[1], "evt-joiner").await;
    let sponsor = chain[0].id;
    let rules = EngineConfig::default().payout_rules();
    let amount = UsdCents::from(450);
    let request = |at| NewPayoutRequest::new(sponsor, amount, Gateway::Paypal, "s@paypal").at(at);

    let t0 = Utc::now().trunc_subsecs(0) - chrono::Duration::days(30);
    let first = db.insert_payout_request(request(t0), &rules).await.unwrap();
    assert_eq!(first.created_at, t0);
    let just_inside = t0 + rules.window - chrono::Duration::seconds(1);
    let err = db.insert_payout_request(request(just_inside), &rules).await.unwrap_err();
    assert_eq!(err, PayoutError::RateLimited { last_request: t0 });
    // Exactly one window later the earlier request no longer counts
    let second = db.insert_payout_request(request(t0 + rules.window), &rules).await.unwrap();
    assert_eq!(second.created_at, t0 + rules.window);
    let err = db.insert_payout_request(request(t0 + rules.window * 2 - chrono::Duration::seconds(1)), &rules).await;
    assert_eq!(err.unwrap_err(), PayoutError::RateLimited { last_request: t0 + rules.window });
    assert_eq!(db.fetch_payouts_for_member(sponsor).await.unwrap().len(), 2);
    tear_down(db).await;
}

#[tokio::test]
async fn concurrent_requests_pass_the_gate_once() {
    const REQUESTS: usize = 6;
    let db = setup().await;
    let members = membership(&db);
    let chain = register_chain(&members, &["Sponsor", "Joiner"]).await;
    activate(&db, &chain[0]).await;
    pay_activation(&db, &chain[1], "evt-joiner").await;
    let sponsor = chain[0].id;
    info!("🚀️ Filing {REQUESTS} payout requests concurrently");
    let jobs = (0..REQUESTS).map(|i| {
        let db = db.clone();
        tokio::spawn(async move {
            payouts(&db).request_payout(sponsor, UsdCents::from(450), Gateway::Paypal, format!("s{i}@paypal")).await
        })
    });
    let results = join_all(jobs).await.into_iter().map(|r| r.expect("task panicked")).collect::<Vec<_>>();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert_eq!(err.code(), "PAYOUT_RATE_LIMIT", "Unexpected error: {err}");
    }
    assert_eq!(payouts(&db).payouts_for_member(sponsor).await.unwrap().len(), 1);
    tear_down(db).await;
}
