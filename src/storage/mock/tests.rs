use chrono::Utc;
use uuid::Uuid;

use super::*;

fn account(identity: &str, code: &str) -> ReferralAccount {
    ReferralAccount {
        id: Uuid::new_v4(),
        identity: identity.to_string(),
        referral_code: code.to_string(),
        total_points: 0,
        available_points: 0,
        marketing_consent: false,
        created_at: Utc::now(),
    }
}

fn new_review(board_id: &str, code: &str) -> NewReview {
    NewReview {
        shop_id: "S1".to_string(),
        board_id: board_id.to_string(),
        product_id: "100".to_string(),
        member_id: "alice123".to_string(),
        referral_code: code.to_string(),
        content: None,
        rating: Some(5),
    }
}

fn entry(account_id: Uuid, review_id: Uuid, order_id: &str, amount: i64) -> CreditEntry {
    CreditEntry {
        key: IdempotencyKey {
            shop_id: "S1".to_string(),
            order_id: order_id.to_string(),
            product_id: "100".to_string(),
        },
        account_id,
        review_id,
        amount,
        order_amount: amount * 50,
        description: "test".to_string(),
        referral_code: "R2E-AAAAAAAAAAAA".to_string(),
        expires_at: Utc::now(),
    }
}

async fn seeded() -> (MockRewardStore, ReferralAccount, Review) {
    let store = MockRewardStore::new();
    let acct = store
        .insert_account(&account("a@example.com", "R2E-AAAAAAAAAAAA"))
        .await
        .unwrap()
        .into_account();
    let review = store
        .upsert_review(&new_review("1001", "R2E-AAAAAAAAAAAA"))
        .await
        .unwrap();
    (store, acct, review)
}

#[tokio::test]
async fn test_insert_account_returns_existing_identity() {
    let store = MockRewardStore::new();
    let first = account("a@example.com", "R2E-AAAAAAAAAAAA");
    store.insert_account(&first).await.unwrap();

    let again = store
        .insert_account(&account("a@example.com", "R2E-BBBBBBBBBBBB"))
        .await
        .unwrap();
    assert_eq!(again, AccountInsert::Existing(first));
}

#[tokio::test]
async fn test_insert_account_rejects_taken_code() {
    let store = MockRewardStore::new();
    store
        .insert_account(&account("a@example.com", "R2E-AAAAAAAAAAAA"))
        .await
        .unwrap();

    let result = store
        .insert_account(&account("b@example.com", "R2E-AAAAAAAAAAAA"))
        .await;
    assert!(matches!(result, Err(StoreError::UniqueViolation(_))));
}

#[tokio::test]
async fn test_upsert_review_keeps_id_and_counters() {
    let (store, _, review) = seeded().await;
    store.increment_clicks("R2E-AAAAAAAAAAAA").await.unwrap();

    let mut edited = new_review("1001", "R2E-AAAAAAAAAAAA");
    edited.content = Some("edited".to_string());
    let stored = store.upsert_review(&edited).await.unwrap();

    assert_eq!(stored.id, review.id);
    assert_eq!(stored.click_count, 1);
    assert_eq!(stored.content.as_deref(), Some("edited"));
}

#[tokio::test]
async fn test_credit_is_idempotent_per_key() {
    let (store, acct, review) = seeded().await;

    let first = store.credit(&entry(acct.id, review.id, "ORD1", 2000)).await.unwrap();
    let second = store.credit(&entry(acct.id, review.id, "ORD1", 2000)).await.unwrap();

    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    assert_eq!(first.transaction().id, second.transaction().id);

    let balance = store.balance(acct.id).await.unwrap().unwrap();
    assert_eq!(balance.total_points, 2000);

    let reviews = store.find_reviews_by_code("R2E-AAAAAAAAAAAA", None).await.unwrap();
    assert_eq!(reviews[0].conversion_count, 1);
    assert_eq!(reviews[0].attributed_revenue, 100_000);
}

#[tokio::test]
async fn test_reserve_and_settle_withdrawal() {
    let (store, acct, review) = seeded().await;
    store.credit(&entry(acct.id, review.id, "ORD1", 15_000)).await.unwrap();

    let request = WithdrawalRequest {
        id: Uuid::new_v4(),
        account_id: acct.id,
        amount: 10_000,
        bank_details: Default::default(),
        status: WithdrawalStatus::Pending,
        requested_at: Utc::now(),
    };
    store.reserve_withdrawal(&request).await.unwrap();

    let overdraw = WithdrawalRequest {
        id: Uuid::new_v4(),
        ..request.clone()
    };
    let result = store.reserve_withdrawal(&overdraw).await;
    assert!(matches!(
        result,
        Err(StoreError::InsufficientBalance {
            available: 5_000,
            requested: 10_000
        })
    ));
    assert!(store.get_withdrawal(overdraw.id).await.unwrap().is_none());

    let settled = store
        .settle_withdrawal(request.id, WithdrawalStatus::Rejected)
        .await
        .unwrap();
    assert_eq!(settled.status, WithdrawalStatus::Rejected);
    assert_eq!(
        store.balance(acct.id).await.unwrap().unwrap().available_points,
        15_000
    );

    let again = store
        .settle_withdrawal(request.id, WithdrawalStatus::Approved)
        .await;
    assert!(matches!(again, Err(StoreError::WithdrawalNotPending(_))));
}

#[tokio::test]
async fn test_unavailable_fails_every_call() {
    let store = MockRewardStore::new();
    store.set_unavailable(true).await;

    assert!(matches!(
        store.get_shop("S1").await,
        Err(StoreError::Unavailable(_))
    ));
    assert!(matches!(
        store.balance(Uuid::new_v4()).await,
        Err(StoreError::Unavailable(_))
    ));
}
