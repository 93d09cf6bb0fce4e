//! SQLite ReferralStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Order, Query, SelectStatement, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{finish, parse_time, parse_uuid, SqliteRewardStore};
use crate::model::{NewReview, ReferralAccount, Review, ShopLink};
use crate::storage::schema::{ReferralAccounts, Reviews, ShopLinks};
use crate::storage::{AccountInsert, ReferralStore, Result, StoreError};

fn select_accounts() -> SelectStatement {
    Query::select()
        .columns([
            ReferralAccounts::Id,
            ReferralAccounts::Identity,
            ReferralAccounts::ReferralCode,
            ReferralAccounts::TotalPoints,
            ReferralAccounts::AvailablePoints,
            ReferralAccounts::MarketingConsent,
            ReferralAccounts::CreatedAt,
        ])
        .from(ReferralAccounts::Table)
        .to_owned()
}

fn account_from_row(row: &SqliteRow) -> Result<ReferralAccount> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");
    Ok(ReferralAccount {
        id: parse_uuid(&id)?,
        identity: row.get("identity"),
        referral_code: row.get("referral_code"),
        total_points: row.get("total_points"),
        available_points: row.get("available_points"),
        marketing_consent: row.get("marketing_consent"),
        created_at: parse_time(&created_at)?,
    })
}

fn select_reviews() -> SelectStatement {
    Query::select()
        .columns([
            Reviews::Id,
            Reviews::ShopId,
            Reviews::BoardId,
            Reviews::ProductId,
            Reviews::MemberId,
            Reviews::ReferralCode,
            Reviews::Content,
            Reviews::Rating,
            Reviews::ClickCount,
            Reviews::ConversionCount,
            Reviews::AttributedRevenue,
            Reviews::Participating,
            Reviews::CreatedAt,
        ])
        .from(Reviews::Table)
        .to_owned()
}

fn review_from_row(row: &SqliteRow) -> Result<Review> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");
    Ok(Review {
        id: parse_uuid(&id)?,
        shop_id: row.get("shop_id"),
        board_id: row.get("board_id"),
        product_id: row.get("product_id"),
        member_id: row.get("member_id"),
        referral_code: row.get("referral_code"),
        content: row.get("content"),
        rating: row.get("rating"),
        click_count: row.get("click_count"),
        conversion_count: row.get("conversion_count"),
        attributed_revenue: row.get("attributed_revenue"),
        participating: row.get("participating"),
        created_at: parse_time(&created_at)?,
    })
}

impl SqliteRewardStore {
    async fn fetch_account(&self, query: SelectStatement) -> Result<Option<ReferralAccount>> {
        let sql = query.to_string(SqliteQueryBuilder);
        let row = sqlx::query(&sql).fetch_optional(self.pool()).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn bump_clicks(conn: &mut SqliteConnection, referral_code: &str) -> Result<Option<i64>> {
        let update = Query::update()
            .table(Reviews::Table)
            .value(Reviews::ClickCount, Expr::col(Reviews::ClickCount).add(1))
            .and_where(Expr::col(Reviews::ReferralCode).eq(referral_code))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&update).execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let total = Query::select()
            .expr(Expr::col(Reviews::ClickCount).sum())
            .from(Reviews::Table)
            .and_where(Expr::col(Reviews::ReferralCode).eq(referral_code))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&total).fetch_one(&mut *conn).await?;
        let clicks: Option<i64> = row.get(0);
        Ok(Some(clicks.unwrap_or(0)))
    }
}

#[async_trait]
impl ReferralStore for SqliteRewardStore {
    async fn get_account(&self, account_id: Uuid) -> Result<Option<ReferralAccount>> {
        self.fetch_account(
            select_accounts()
                .and_where(Expr::col(ReferralAccounts::Id).eq(account_id.to_string()))
                .to_owned(),
        )
        .await
    }

    async fn find_account_by_identity(&self, identity: &str) -> Result<Option<ReferralAccount>> {
        self.fetch_account(
            select_accounts()
                .and_where(Expr::col(ReferralAccounts::Identity).eq(identity))
                .to_owned(),
        )
        .await
    }

    async fn find_account_by_code(&self, referral_code: &str) -> Result<Option<ReferralAccount>> {
        self.fetch_account(
            select_accounts()
                .and_where(Expr::col(ReferralAccounts::ReferralCode).eq(referral_code))
                .to_owned(),
        )
        .await
    }

    async fn insert_account(&self, account: &ReferralAccount) -> Result<AccountInsert> {
        let query = Query::insert()
            .into_table(ReferralAccounts::Table)
            .columns([
                ReferralAccounts::Id,
                ReferralAccounts::Identity,
                ReferralAccounts::ReferralCode,
                ReferralAccounts::TotalPoints,
                ReferralAccounts::AvailablePoints,
                ReferralAccounts::MarketingConsent,
                ReferralAccounts::CreatedAt,
            ])
            .values_panic([
                account.id.to_string().into(),
                account.identity.clone().into(),
                account.referral_code.clone().into(),
                account.total_points.into(),
                account.available_points.into(),
                account.marketing_consent.into(),
                account.created_at.to_rfc3339().into(),
            ])
            // Only an identity conflict is absorbed; a referral code clash still errors.
            .on_conflict(
                OnConflict::column(ReferralAccounts::Identity)
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(self.pool()).await?;
        if result.rows_affected() > 0 {
            return Ok(AccountInsert::Created(account.clone()));
        }

        match self.find_account_by_identity(&account.identity).await? {
            Some(existing) => Ok(AccountInsert::Existing(existing)),
            None => Err(StoreError::Corrupt(format!(
                "account insert for '{}' conflicted but no row exists",
                account.identity
            ))),
        }
    }

    async fn ensure_shop_link(&self, link: &ShopLink) -> Result<bool> {
        let query = Query::insert()
            .into_table(ShopLinks::Table)
            .columns([
                ShopLinks::AccountId,
                ShopLinks::ShopId,
                ShopLinks::ShopMemberId,
                ShopLinks::LinkedAt,
            ])
            .values_panic([
                link.account_id.to_string().into(),
                link.shop_id.clone().into(),
                link.shop_member_id.clone().into(),
                link.linked_at.to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::columns([ShopLinks::AccountId, ShopLinks::ShopId])
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(self.pool()).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_review(&self, review: &NewReview) -> Result<Review> {
        let upsert = Query::insert()
            .into_table(Reviews::Table)
            .columns([
                Reviews::Id,
                Reviews::ShopId,
                Reviews::BoardId,
                Reviews::ProductId,
                Reviews::MemberId,
                Reviews::ReferralCode,
                Reviews::Content,
                Reviews::Rating,
                Reviews::CreatedAt,
            ])
            .values_panic([
                Uuid::new_v4().to_string().into(),
                review.shop_id.clone().into(),
                review.board_id.clone().into(),
                review.product_id.clone().into(),
                review.member_id.clone().into(),
                review.referral_code.clone().into(),
                review.content.clone().into(),
                review.rating.into(),
                chrono::Utc::now().to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::columns([Reviews::ShopId, Reviews::BoardId])
                    .update_columns([
                        Reviews::ProductId,
                        Reviews::MemberId,
                        Reviews::Content,
                        Reviews::Rating,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&upsert).execute(self.pool()).await?;

        let select = select_reviews()
            .and_where(Expr::col(Reviews::ShopId).eq(review.shop_id.as_str()))
            .and_where(Expr::col(Reviews::BoardId).eq(review.board_id.as_str()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&select).fetch_one(self.pool()).await?;
        review_from_row(&row)
    }

    async fn find_reviews_by_code(
        &self,
        referral_code: &str,
        shop_id: Option<&str>,
    ) -> Result<Vec<Review>> {
        let mut query = select_reviews();
        query.and_where(Expr::col(Reviews::ReferralCode).eq(referral_code));
        if let Some(shop_id) = shop_id {
            query.and_where(Expr::col(Reviews::ShopId).eq(shop_id));
        }
        let sql = query
            .order_by(Reviews::CreatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        rows.iter().map(review_from_row).collect()
    }

    async fn increment_clicks(&self, referral_code: &str) -> Result<Option<i64>> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::bump_clicks(&mut conn, referral_code).await;
        finish(&mut conn, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::*;

    fn account(identity: &str, code: &str) -> ReferralAccount {
        ReferralAccount {
            id: Uuid::new_v4(),
            identity: identity.to_string(),
            referral_code: code.to_string(),
            total_points: 0,
            available_points: 0,
            marketing_consent: false,
            created_at: chrono::Utc::now(),
        }
    }

    fn review(shop: &str, board: &str, code: &str) -> NewReview {
        NewReview {
            shop_id: shop.to_string(),
            board_id: board.to_string(),
            product_id: "100".to_string(),
            member_id: "alice123".to_string(),
            referral_code: code.to_string(),
            content: Some("great".to_string()),
            rating: Some(5),
        }
    }

    #[tokio::test]
    async fn test_insert_account_then_lookup() {
        let store = test_store().await;
        let a = account("alice@example.com", "R2E-AAAAAAAAAAAA");

        let inserted = store.insert_account(&a).await.expect("insert failed");
        assert!(matches!(inserted, AccountInsert::Created(_)));

        let by_code = store
            .find_account_by_code("R2E-AAAAAAAAAAAA")
            .await
            .expect("lookup failed")
            .expect("missing");
        assert_eq!(by_code.id, a.id);
        assert_eq!(
            store.get_account(a.id).await.expect("lookup failed").map(|x| x.identity),
            Some("alice@example.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_insert_account_same_identity_returns_existing() {
        let store = test_store().await;
        let first = account("alice@example.com", "R2E-AAAAAAAAAAAA");
        let second = account("alice@example.com", "R2E-BBBBBBBBBBBB");

        store.insert_account(&first).await.expect("insert failed");
        let outcome = store.insert_account(&second).await.expect("insert failed");

        match outcome {
            AccountInsert::Existing(existing) => {
                assert_eq!(existing.id, first.id);
                assert_eq!(existing.referral_code, "R2E-AAAAAAAAAAAA");
            }
            other => panic!("expected existing account, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_insert_account_code_clash_is_unique_violation() {
        let store = test_store().await;
        store
            .insert_account(&account("alice@example.com", "R2E-AAAAAAAAAAAA"))
            .await
            .expect("insert failed");

        let err = store
            .insert_account(&account("bob@example.com", "R2E-AAAAAAAAAAAA"))
            .await
            .expect_err("code clash must fail");
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_shop_link_created_once() {
        let store = test_store().await;
        let a = account("alice@example.com", "R2E-AAAAAAAAAAAA");
        store.insert_account(&a).await.expect("insert failed");

        let link = ShopLink {
            account_id: a.id,
            shop_id: "shop1".into(),
            shop_member_id: "alice123".into(),
            linked_at: chrono::Utc::now(),
        };
        assert!(store.ensure_shop_link(&link).await.expect("link failed"));
        assert!(!store.ensure_shop_link(&link).await.expect("link failed"));

        let other_shop = ShopLink {
            shop_id: "shop2".into(),
            ..link
        };
        assert!(store.ensure_shop_link(&other_shop).await.expect("link failed"));
    }

    #[tokio::test]
    async fn test_upsert_review_converges_on_natural_key() {
        let store = test_store().await;
        store
            .insert_account(&account("alice@example.com", "R2E-AAAAAAAAAAAA"))
            .await
            .expect("insert failed");

        let first = store
            .upsert_review(&review("shop1", "1001", "R2E-AAAAAAAAAAAA"))
            .await
            .expect("upsert failed");

        let mut edited = review("shop1", "1001", "R2E-AAAAAAAAAAAA");
        edited.content = Some("edited".into());
        let second = store.upsert_review(&edited).await.expect("upsert failed");

        assert_eq!(first.id, second.id);
        assert_eq!(second.content.as_deref(), Some("edited"));

        let all = store
            .find_reviews_by_code("R2E-AAAAAAAAAAAA", None)
            .await
            .expect("find failed");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_increment_clicks_across_shops() {
        let store = test_store().await;
        store
            .insert_account(&account("alice@example.com", "R2E-AAAAAAAAAAAA"))
            .await
            .expect("insert failed");
        store
            .upsert_review(&review("shop1", "1001", "R2E-AAAAAAAAAAAA"))
            .await
            .expect("upsert failed");
        store
            .upsert_review(&review("shop2", "7", "R2E-AAAAAAAAAAAA"))
            .await
            .expect("upsert failed");

        assert_eq!(
            store.increment_clicks("R2E-AAAAAAAAAAAA").await.expect("click failed"),
            Some(2)
        );
        assert_eq!(
            store.increment_clicks("R2E-AAAAAAAAAAAA").await.expect("click failed"),
            Some(4)
        );
        assert_eq!(
            store.increment_clicks("R2E-000000000000").await.expect("click failed"),
            None
        );

        let in_shop1 = store
            .find_reviews_by_code("R2E-AAAAAAAAAAAA", Some("shop1"))
            .await
            .expect("find failed");
        assert_eq!(in_shop1.len(), 1);
        assert_eq!(in_shop1[0].click_count, 2);
    }
}
