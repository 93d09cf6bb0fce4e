//! End-to-end reward scenarios against an in-memory SQLite database.
//!
//! Drives the public reconciler and ledger APIs the way the HTTP layer does:
//! review webhook, order webhook, credit, then withdrawal.

use std::sync::Arc;

use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use r2e_ledger::clients::StaticIdentityLookup;
use r2e_ledger::config::RewardConfig;
use r2e_ledger::ledger::LedgerError;
use r2e_ledger::model::{BankDetails, ShopAccount};
use r2e_ledger::reconciler::{
    OrderOutcome, ReviewOutcome, WebhookEvent, WebhookOutcome, WebhookReconciler,
};
use r2e_ledger::storage::{ShopStore, SqliteRewardStore, Stores};

struct Harness {
    reconciler: WebhookReconciler,
    identity: Arc<StaticIdentityLookup>,
}

async fn harness() -> Harness {
    let opts = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("failed to create in-memory pool");

    let store = Arc::new(SqliteRewardStore::new(pool));
    store.init_schema().await.expect("failed to init schema");
    store
        .upsert_shop(&ShopAccount::new("S1").with_rates(0.02, 0.03, 0.005))
        .await
        .unwrap();

    let identity = Arc::new(
        StaticIdentityLookup::new().with_member("S1", "alice123", "Alice@Example.com"),
    );
    let stores = Stores::from_backend(store);
    let reconciler = WebhookReconciler::new(&stores, identity.clone(), &RewardConfig::default());

    Harness {
        reconciler,
        identity,
    }
}

fn event(value: serde_json::Value) -> WebhookEvent {
    serde_json::from_value(value).expect("valid webhook payload")
}

fn review(board_id: u32, product_id: u32) -> WebhookEvent {
    event(json!({
        "event": "review_created",
        "shop_id": "S1",
        "board_id": board_id,
        "product_id": product_id,
        "member_id": "alice123",
        "content": "great",
        "rating": 5
    }))
}

fn order(order_id: &str, code: &str, items: serde_json::Value) -> WebhookEvent {
    event(json!({
        "event": "order_placed",
        "shop_id": "S1",
        "order_id": order_id,
        "referer": format!("https://s1.example/product/100?ref={code}"),
        "items": items
    }))
}

/// Returns (referral code, account id) of the recorded review.
async fn record_review(h: &Harness, board_id: u32, product_id: u32) -> (String, uuid::Uuid) {
    match h.reconciler.handle(review(board_id, product_id)).await.unwrap() {
        WebhookOutcome::Review(ReviewOutcome::Recorded {
            referral_code,
            account_id,
            ..
        }) => (referral_code, account_id),
        other => panic!("expected recorded review, got {other:?}"),
    }
}

#[tokio::test]
async fn test_review_then_order_credits_once() {
    let h = harness().await;
    let (code, account_id) = record_review(&h, 1001, 100).await;

    let purchase = order("ORD1", &code, json!([{"product_id": 100, "price": 100000}]));
    let first = h.reconciler.handle(purchase.clone()).await.unwrap();
    let WebhookOutcome::Order(OrderOutcome::Credited {
        transaction_ids,
        total_reward,
    }) = first.clone()
    else {
        panic!("expected credit, got {first:?}");
    };
    assert_eq!(total_reward, 2000);
    assert_eq!(transaction_ids.len(), 1);

    // Redelivery leaves the ledger untouched.
    let replay = h.reconciler.handle(purchase).await.unwrap();
    assert_eq!(replay, first);

    let ledger = h.reconciler.ledger();
    let balance = ledger.balance(account_id).await.unwrap();
    assert_eq!(balance.total_points, 2000);
    assert_eq!(balance.available_points, 2000);
    assert_eq!(ledger.list_transactions(account_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_redelivery_credits_once() {
    let h = harness().await;
    let (code, account_id) = record_review(&h, 1001, 100).await;
    let purchase = order("ORD1", &code, json!([{"product_id": 100, "price": 100000}]));

    let (a, b) = tokio::join!(
        h.reconciler.handle(purchase.clone()),
        h.reconciler.handle(purchase)
    );
    assert_eq!(a.unwrap(), b.unwrap());

    let balance = h.reconciler.ledger().balance(account_id).await.unwrap();
    assert_eq!(balance.total_points, 2000);
}

#[tokio::test]
async fn test_identity_normalization_reuses_account() {
    let h = harness().await;
    let (code, account_id) = record_review(&h, 1001, 100).await;

    let (second_code, second_account) = record_review(&h, 1002, 200).await;

    assert_eq!(code, second_code);
    assert_eq!(account_id, second_account);

    let account = h
        .reconciler
        .registry()
        .account_for_code(&code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.identity, "alice@example.com");
}

#[tokio::test]
async fn test_host_outage_is_retryable_and_records_nothing() {
    let h = harness().await;
    h.identity.set_unavailable(true);

    let err = h.reconciler.handle(review(1001, 100)).await.unwrap_err();
    assert!(err.is_retryable());

    h.identity.set_unavailable(false);
    let (code, _) = record_review(&h, 1001, 100).await;
    let reviews = h
        .reconciler
        .registry()
        .reviews_in_shop(&code, "S1")
        .await
        .unwrap();
    assert_eq!(reviews.len(), 1);
}

#[tokio::test]
async fn test_orders_without_attribution_change_nothing() {
    let h = harness().await;
    let (code, account_id) = record_review(&h, 1001, 100).await;

    let no_referral = event(json!({
        "event": "order_placed",
        "shop_id": "S1",
        "order_id": "ORD1",
        "items": [{"product_id": 100, "price": 100000}]
    }));
    assert_eq!(
        h.reconciler.handle(no_referral).await.unwrap(),
        WebhookOutcome::Order(OrderOutcome::NoReferral)
    );

    let other_product = order("ORD2", &code, json!([{"product_id": 999, "price": 100000}]));
    assert_eq!(
        h.reconciler.handle(other_product).await.unwrap(),
        WebhookOutcome::Order(OrderOutcome::NoMatchingProducts)
    );

    let unknown_code = order(
        "ORD3",
        "R2E-000000000000",
        json!([{"product_id": 100, "price": 100000}]),
    );
    assert_eq!(
        h.reconciler.handle(unknown_code).await.unwrap(),
        WebhookOutcome::Order(OrderOutcome::InvalidReferral)
    );

    let balance = h.reconciler.ledger().balance(account_id).await.unwrap();
    assert_eq!(balance.total_points, 0);
}

#[tokio::test]
async fn test_uninstalled_shop_stops_crediting() {
    let h = harness().await;
    let (code, account_id) = record_review(&h, 1001, 100).await;

    let uninstall = event(json!({"event": "app_uninstalled", "shop_id": "S1"}));
    assert_eq!(
        h.reconciler.handle(uninstall).await.unwrap(),
        WebhookOutcome::Uninstalled { deactivated: true }
    );

    let purchase = order("ORD1", &code, json!([{"product_id": 100, "price": 100000}]));
    assert_eq!(
        h.reconciler.handle(purchase).await.unwrap(),
        WebhookOutcome::Order(OrderOutcome::MallInactive)
    );
    let balance = h.reconciler.ledger().balance(account_id).await.unwrap();
    assert_eq!(balance.total_points, 0);
}

#[tokio::test]
async fn test_withdrawal_guard_and_conservation() {
    let h = harness().await;
    let (code, account_id) = record_review(&h, 1001, 100).await;

    // 2000 + 10000 = 12000 points.
    let items = json!([{"product_id": 100, "price": 100000}]);
    h.reconciler.handle(order("ORD1", &code, items)).await.unwrap();
    let items = json!([{"product_id": 100, "price": 500000}]);
    h.reconciler.handle(order("ORD2", &code, items)).await.unwrap();

    let ledger = h.reconciler.ledger();
    let first = ledger
        .request_withdrawal(account_id, 10_000, BankDetails::default())
        .await
        .unwrap();

    let err = ledger
        .request_withdrawal(account_id, 10_000, BankDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance {
            available: 2000,
            requested: 10_000
        }
    ));

    let balance = ledger.balance(account_id).await.unwrap();
    assert_eq!(balance.available_points, 2000);
    assert_eq!(balance.total_points, 12_000);

    ledger.reject_withdrawal(first.id).await.unwrap();
    assert_eq!(ledger.balance(account_id).await.unwrap().available_points, 12_000);

    let second = ledger
        .request_withdrawal(account_id, 12_000, BankDetails::default())
        .await
        .unwrap();
    ledger.approve_withdrawal(second.id).await.unwrap();

    let balance = ledger.balance(account_id).await.unwrap();
    assert_eq!(balance.available_points, 0);
    assert_eq!(balance.total_points, 12_000);

    let credited: i64 = ledger
        .list_transactions(account_id)
        .await
        .unwrap()
        .iter()
        .map(|t| t.amount)
        .sum();
    assert_eq!(credited, balance.total_points);
}
