//! Reconciler tests against the mock store and a static identity table.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::*;
use crate::clients::StaticIdentityLookup;
use crate::model::{ProductRateOverride, ShopAccount};
use crate::reward::FeePolicy;
use crate::storage::{LedgerStore, MockRewardStore, ReferralStore};

struct Harness {
    store: Arc<MockRewardStore>,
    identity: Arc<StaticIdentityLookup>,
    reconciler: WebhookReconciler,
}

async fn harness_with(config: RewardConfig) -> Harness {
    let store = Arc::new(MockRewardStore::new());
    store
        .upsert_shop(&ShopAccount::new("S1").with_rates(0.02, 0.03, 0.005))
        .await
        .unwrap();
    store
        .upsert_shop(&ShopAccount::new("S2").with_rates(0.01, 0.01, 0.0))
        .await
        .unwrap();

    let identity = Arc::new(
        StaticIdentityLookup::new()
            .with_member("S1", "alice123", "alice@example.com")
            .with_member("S1", "bob123", "bob@example.com")
            .with_member("S2", "alice-s2", "alice@example.com"),
    );
    let reconciler =
        WebhookReconciler::new(&Stores::from_backend(store.clone()), identity.clone(), &config);

    Harness {
        store,
        identity,
        reconciler,
    }
}

async fn harness() -> Harness {
    harness_with(RewardConfig::default()).await
}

fn review(shop_id: &str, board_id: &str, product_id: &str, member_id: &str) -> ReviewCreated {
    ReviewCreated {
        shop_id: shop_id.into(),
        board_id: board_id.into(),
        product_id: product_id.into(),
        member_id: member_id.into(),
        content: Some("recommended".into()),
        rating: Some(5),
    }
}

fn order(order_id: &str, referer: Option<String>, items: &[(&str, i64, i64)]) -> OrderPlaced {
    OrderPlaced {
        shop_id: "S1".into(),
        order_id: order_id.into(),
        referer,
        items: items
            .iter()
            .map(|(product_id, price, quantity)| OrderItem {
                product_id: product_id.to_string(),
                price: *price,
                quantity: *quantity,
            })
            .collect(),
        metadata: Default::default(),
    }
}

fn referer(code: &str) -> Option<String> {
    Some(format!("https://s1.example/product/100?ref={code}"))
}

/// Record alice's review of product 100 in S1 and return her code and account.
async fn alice_reviews(h: &Harness) -> (String, Uuid) {
    match h
        .reconciler
        .review_created(review("S1", "1001", "100", "alice123"))
        .await
        .unwrap()
    {
        ReviewOutcome::Recorded {
            referral_code,
            account_id,
            ..
        } => (referral_code, account_id),
        other => panic!("unexpected outcome {other:?}"),
    }
}

async fn available(h: &Harness, account_id: Uuid) -> i64 {
    h.store
        .balance(account_id)
        .await
        .unwrap()
        .unwrap()
        .available_points
}

#[tokio::test]
async fn test_review_created_records_and_converges() {
    let h = harness().await;

    let first = h
        .reconciler
        .review_created(review("S1", "1001", "100", "alice123"))
        .await
        .unwrap();
    let second = h
        .reconciler
        .review_created(review("S1", "1001", "100", "alice123"))
        .await
        .unwrap();

    assert_eq!(first, second);
    let ReviewOutcome::Recorded { referral_code, .. } = first else {
        panic!("expected recorded");
    };
    assert!(crate::referral::is_valid_code(&referral_code));
    assert_eq!(
        h.store
            .find_reviews_by_code(&referral_code, Some("S1"))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_redelivery_by_other_member_reports_stored_code() {
    let h = harness().await;
    let (alice_code, _) = alice_reviews(&h).await;

    let outcome = h
        .reconciler
        .review_created(review("S1", "1001", "100", "bob123"))
        .await
        .unwrap();
    let ReviewOutcome::Recorded {
        referral_code,
        review_id,
        account_id,
    } = outcome
    else {
        panic!("expected recorded");
    };

    assert_eq!(referral_code, alice_code);
    let stored = h
        .store
        .find_reviews_by_code(&alice_code, Some("S1"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, review_id);
    assert_eq!(stored[0].referral_code, referral_code);

    let bob = h
        .reconciler
        .registry()
        .resolve_or_create_account("bob@example.com")
        .await
        .unwrap();
    assert_eq!(bob.id, account_id);
    assert_ne!(bob.referral_code, referral_code);
}

#[tokio::test]
async fn test_review_in_inactive_or_unknown_shop() {
    let h = harness().await;
    h.store.deactivate_shop("S1").await.unwrap();

    assert_eq!(
        h.reconciler
            .review_created(review("S1", "1", "100", "alice123"))
            .await
            .unwrap(),
        ReviewOutcome::MallInactive
    );
    assert_eq!(
        h.reconciler
            .review_created(review("S9", "1", "100", "alice123"))
            .await
            .unwrap(),
        ReviewOutcome::MallInactive
    );
}

#[tokio::test]
async fn test_guest_reviews_are_member_only() {
    let h = harness().await;

    assert_eq!(
        h.reconciler
            .review_created(review("S1", "1", "100", "guest42"))
            .await
            .unwrap(),
        ReviewOutcome::MemberOnly
    );
    assert_eq!(
        h.reconciler
            .review_created(review("S1", "2", "100", ""))
            .await
            .unwrap(),
        ReviewOutcome::MemberOnly
    );
    assert!(h
        .store
        .find_account_by_identity("alice@example.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_identity_outage_is_retryable_and_writes_nothing() {
    let h = harness().await;
    h.identity.set_unavailable(true);

    let err = h
        .reconciler
        .review_created(review("S1", "1001", "100", "alice123"))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(h
        .store
        .find_account_by_identity("alice@example.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_order_without_referral() {
    let h = harness().await;
    let (_, account_id) = alice_reviews(&h).await;

    let outcome = h
        .reconciler
        .order_placed(order(
            "ORD1",
            Some("https://s1.example/product/100".into()),
            &[("100", 100_000, 1)],
        ))
        .await
        .unwrap();

    assert_eq!(outcome, OrderOutcome::NoReferral);
    assert!(h
        .store
        .transactions_for_account(account_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_malformed_and_unknown_codes_are_invalid_referral() {
    let h = harness().await;

    for code in ["R2E-XYZ", "R2E-000000000000"] {
        assert_eq!(
            h.reconciler
                .order_placed(order("ORD1", referer(code), &[("100", 1000, 1)]))
                .await
                .unwrap(),
            OrderOutcome::InvalidReferral,
            "{code}"
        );
    }
}

#[tokio::test]
async fn test_order_in_shop_without_reviews() {
    let h = harness().await;
    let (code, _) = alice_reviews(&h).await;

    let mut o = order("ORD1", referer(&code), &[("100", 1000, 1)]);
    o.shop_id = "S2".into();

    assert_eq!(
        h.reconciler.order_placed(o).await.unwrap(),
        OrderOutcome::NoReviews
    );
}

#[tokio::test]
async fn test_order_without_reviewed_products() {
    let h = harness().await;
    let (code, _) = alice_reviews(&h).await;

    assert_eq!(
        h.reconciler
            .order_placed(order("ORD1", referer(&code), &[("200", 5000, 2)]))
            .await
            .unwrap(),
        OrderOutcome::NoMatchingProducts
    );
}

#[tokio::test]
async fn test_order_credit_is_idempotent() {
    let h = harness().await;
    let (code, account_id) = alice_reviews(&h).await;
    let event = order("ORD1", referer(&code), &[("100", 100_000, 1)]);

    let first = h.reconciler.order_placed(event.clone()).await.unwrap();
    let replay = h.reconciler.order_placed(event).await.unwrap();

    let OrderOutcome::Credited {
        transaction_ids,
        total_reward,
    } = &first
    else {
        panic!("expected credited, got {first:?}");
    };
    assert_eq!(*total_reward, 2000);
    assert_eq!(transaction_ids.len(), 1);
    assert_eq!(first, replay);
    assert_eq!(available(&h, account_id).await, 2000);

    let reviews = h.store.find_reviews_by_code(&code, Some("S1")).await.unwrap();
    assert_eq!(reviews[0].conversion_count, 1);
    assert_eq!(reviews[0].attributed_revenue, 100_000);
}

#[tokio::test]
async fn test_multi_item_order_credits_each_reviewed_product() {
    let h = harness().await;
    let (code, account_id) = alice_reviews(&h).await;
    h.reconciler
        .review_created(review("S1", "1002", "101", "alice123"))
        .await
        .unwrap();

    let outcome = h
        .reconciler
        .order_placed(order(
            "ORD7",
            referer(&code),
            &[
                ("100", 30_000, 1),
                ("101", 10_000, 2),
                ("100", 20_000, 1),
                ("300", 99_000, 1),
                ("101", 0, 5),
            ],
        ))
        .await
        .unwrap();

    // product 100: 50_000 x 0.02, product 101: 20_000 x 0.02
    let OrderOutcome::Credited {
        transaction_ids,
        total_reward,
    } = outcome
    else {
        panic!("expected credited, got {outcome:?}");
    };
    assert_eq!(total_reward, 1400);
    assert_eq!(transaction_ids.len(), 2);
    let txs = h.store.transactions_for_account(account_id).await.unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(available(&h, account_id).await, 1400);
}

#[tokio::test]
async fn test_tiny_line_credits_nothing() {
    let h = harness().await;
    let (code, account_id) = alice_reviews(&h).await;

    let outcome = h
        .reconciler
        .order_placed(order("ORD1", referer(&code), &[("100", 49, 1)]))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        OrderOutcome::Credited {
            transaction_ids: vec![],
            total_reward: 0
        }
    );
    assert_eq!(available(&h, account_id).await, 0);
}

#[tokio::test]
async fn test_product_override_applies_to_order() {
    let h = harness().await;
    let (code, account_id) = alice_reviews(&h).await;
    h.store
        .set_product_override(&ProductRateOverride {
            shop_id: "S1".into(),
            product_id: "100".into(),
            reviewer_rate: 0.1,
            buyer_rate: 0.0,
            platform_fee_rate: 0.0,
            active: true,
        })
        .await
        .unwrap();

    h.reconciler
        .order_placed(order("ORD1", referer(&code), &[("100", 10_000, 1)]))
        .await
        .unwrap();

    assert_eq!(available(&h, account_id).await, 1000);
}

#[tokio::test]
async fn test_net_fee_policy_reduces_credit() {
    let h = harness_with(RewardConfig {
        fee_policy: FeePolicy::Net,
        ..RewardConfig::default()
    })
    .await;
    let (code, account_id) = alice_reviews(&h).await;

    h.reconciler
        .order_placed(order("ORD1", referer(&code), &[("100", 100_000, 1)]))
        .await
        .unwrap();

    assert_eq!(available(&h, account_id).await, 1500);
}

#[tokio::test]
async fn test_store_outage_during_order_is_retryable() {
    let h = harness().await;
    let (code, _) = alice_reviews(&h).await;
    h.store.set_unavailable(true).await;

    let err = h
        .reconciler
        .order_placed(order("ORD1", referer(&code), &[("100", 100_000, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Unavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_invalid_order_is_not_retryable() {
    let h = harness().await;

    let err = h
        .reconciler
        .order_placed(order("", None, &[("100", 1000, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Invalid(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_uninstall_stops_rewards() {
    let h = harness().await;
    let (code, account_id) = alice_reviews(&h).await;

    let outcome = h
        .reconciler
        .handle(WebhookEvent::AppUninstalled(AppUninstalled {
            shop_id: "S1".into(),
        }))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Uninstalled { deactivated: true });

    assert_eq!(
        h.reconciler
            .order_placed(order("ORD1", referer(&code), &[("100", 100_000, 1)]))
            .await
            .unwrap(),
        OrderOutcome::MallInactive
    );
    assert_eq!(available(&h, account_id).await, 0);

    let unknown = h
        .reconciler
        .app_uninstalled(AppUninstalled {
            shop_id: "S9".into(),
        })
        .await
        .unwrap();
    assert_eq!(unknown, WebhookOutcome::Uninstalled { deactivated: false });
}

#[tokio::test]
async fn test_handle_dispatches_parsed_payloads() {
    let h = harness().await;

    let review: WebhookEvent = serde_json::from_value(json!({
        "event": "review_created",
        "shop_id": "S1",
        "board_id": 1001,
        "product_id": 100,
        "member_id": "alice123"
    }))
    .unwrap();
    let outcome = h.reconciler.handle(review).await.unwrap();
    assert_eq!(outcome.as_str(), "recorded");

    let order: WebhookEvent = serde_json::from_value(json!({
        "event": "order_placed",
        "shop_id": "S1",
        "order_id": "ORD1",
        "items": [{"product_id": 100, "price": 100000, "quantity": 1}],
    }))
    .unwrap();
    let outcome = h.reconciler.handle(order).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Order(OrderOutcome::NoReferral));
}

#[tokio::test]
async fn test_same_account_earns_in_second_shop() {
    let h = harness().await;
    let (code, account_id) = alice_reviews(&h).await;
    h.reconciler
        .review_created(review("S2", "77", "100", "alice-s2"))
        .await
        .unwrap();

    let mut o = order("ORD1", referer(&code), &[("100", 100_000, 1)]);
    o.shop_id = "S2".into();
    h.reconciler.order_placed(o).await.unwrap();
    h.reconciler
        .order_placed(order("ORD1", referer(&code), &[("100", 100_000, 1)]))
        .await
        .unwrap();

    // S2 pays 1%, S1 pays 2%; same order id in two shops is two keys.
    assert_eq!(available(&h, account_id).await, 3000);
}
