//! SQLite ShopStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_time, SqliteRewardStore};
use crate::model::{ProductRateOverride, ShopAccount, ShopCredentials};
use crate::storage::schema::{ProductRateOverrides, Shops};
use crate::storage::{Result, ShopStore};

fn shop_from_row(row: &SqliteRow) -> Result<ShopAccount> {
    let expires_at: Option<String> = row.get("token_expires_at");
    Ok(ShopAccount {
        shop_id: row.get("shop_id"),
        reviewer_rate: row.get("reviewer_rate"),
        buyer_rate: row.get("buyer_rate"),
        platform_fee_rate: row.get("platform_fee_rate"),
        prepaid_balance: row.get("prepaid_balance"),
        min_balance_threshold: row.get("min_balance_threshold"),
        active: row.get("active"),
        credentials: ShopCredentials {
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            expires_at: expires_at.as_deref().map(parse_time).transpose()?,
        },
    })
}

#[async_trait]
impl ShopStore for SqliteRewardStore {
    async fn get_shop(&self, shop_id: &str) -> Result<Option<ShopAccount>> {
        let query = Query::select()
            .columns([
                Shops::ShopId,
                Shops::ReviewerRate,
                Shops::BuyerRate,
                Shops::PlatformFeeRate,
                Shops::PrepaidBalance,
                Shops::MinBalanceThreshold,
                Shops::Active,
                Shops::AccessToken,
                Shops::RefreshToken,
                Shops::TokenExpiresAt,
            ])
            .from(Shops::Table)
            .and_where(Expr::col(Shops::ShopId).eq(shop_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        row.as_ref().map(shop_from_row).transpose()
    }

    async fn upsert_shop(&self, shop: &ShopAccount) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let expires_at = shop.credentials.expires_at.map(|t| t.to_rfc3339());

        let query = Query::insert()
            .into_table(Shops::Table)
            .columns([
                Shops::ShopId,
                Shops::ReviewerRate,
                Shops::BuyerRate,
                Shops::PlatformFeeRate,
                Shops::PrepaidBalance,
                Shops::MinBalanceThreshold,
                Shops::Active,
                Shops::AccessToken,
                Shops::RefreshToken,
                Shops::TokenExpiresAt,
                Shops::UpdatedAt,
            ])
            .values_panic([
                shop.shop_id.clone().into(),
                shop.reviewer_rate.into(),
                shop.buyer_rate.into(),
                shop.platform_fee_rate.into(),
                shop.prepaid_balance.into(),
                shop.min_balance_threshold.into(),
                shop.active.into(),
                shop.credentials.access_token.clone().into(),
                shop.credentials.refresh_token.clone().into(),
                expires_at.into(),
                now.into(),
            ])
            .on_conflict(
                OnConflict::column(Shops::ShopId)
                    .update_columns([
                        Shops::ReviewerRate,
                        Shops::BuyerRate,
                        Shops::PlatformFeeRate,
                        Shops::PrepaidBalance,
                        Shops::MinBalanceThreshold,
                        Shops::Active,
                        Shops::AccessToken,
                        Shops::RefreshToken,
                        Shops::TokenExpiresAt,
                        Shops::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(self.pool()).await?;
        Ok(())
    }

    async fn update_credentials(
        &self,
        shop_id: &str,
        credentials: &ShopCredentials,
    ) -> Result<bool> {
        let query = Query::update()
            .table(Shops::Table)
            .values([
                (Shops::AccessToken, credentials.access_token.clone().into()),
                (Shops::RefreshToken, credentials.refresh_token.clone().into()),
                (
                    Shops::TokenExpiresAt,
                    credentials.expires_at.map(|t| t.to_rfc3339()).into(),
                ),
                (Shops::UpdatedAt, chrono::Utc::now().to_rfc3339().into()),
            ])
            .and_where(Expr::col(Shops::ShopId).eq(shop_id))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(self.pool()).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_shop(&self, shop_id: &str) -> Result<bool> {
        let query = Query::update()
            .table(Shops::Table)
            .values([
                (Shops::Active, false.into()),
                (Shops::UpdatedAt, chrono::Utc::now().to_rfc3339().into()),
            ])
            .and_where(Expr::col(Shops::ShopId).eq(shop_id))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(self.pool()).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_product_override(
        &self,
        shop_id: &str,
        product_id: &str,
    ) -> Result<Option<ProductRateOverride>> {
        let query = Query::select()
            .columns([
                ProductRateOverrides::ShopId,
                ProductRateOverrides::ProductId,
                ProductRateOverrides::ReviewerRate,
                ProductRateOverrides::BuyerRate,
                ProductRateOverrides::PlatformFeeRate,
                ProductRateOverrides::Active,
            ])
            .from(ProductRateOverrides::Table)
            .and_where(Expr::col(ProductRateOverrides::ShopId).eq(shop_id))
            .and_where(Expr::col(ProductRateOverrides::ProductId).eq(product_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;

        Ok(row.map(|row| ProductRateOverride {
            shop_id: row.get("shop_id"),
            product_id: row.get("product_id"),
            reviewer_rate: row.get("reviewer_rate"),
            buyer_rate: row.get("buyer_rate"),
            platform_fee_rate: row.get("platform_fee_rate"),
            active: row.get("active"),
        }))
    }

    async fn set_product_override(&self, rate_override: &ProductRateOverride) -> Result<()> {
        let query = Query::insert()
            .into_table(ProductRateOverrides::Table)
            .columns([
                ProductRateOverrides::ShopId,
                ProductRateOverrides::ProductId,
                ProductRateOverrides::ReviewerRate,
                ProductRateOverrides::BuyerRate,
                ProductRateOverrides::PlatformFeeRate,
                ProductRateOverrides::Active,
            ])
            .values_panic([
                rate_override.shop_id.clone().into(),
                rate_override.product_id.clone().into(),
                rate_override.reviewer_rate.into(),
                rate_override.buyer_rate.into(),
                rate_override.platform_fee_rate.into(),
                rate_override.active.into(),
            ])
            .on_conflict(
                OnConflict::columns([ProductRateOverrides::ShopId, ProductRateOverrides::ProductId])
                    .update_columns([
                        ProductRateOverrides::ReviewerRate,
                        ProductRateOverrides::BuyerRate,
                        ProductRateOverrides::PlatformFeeRate,
                        ProductRateOverrides::Active,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(self.pool()).await?;
        Ok(())
    }
}
