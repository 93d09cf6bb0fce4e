//! Mock storage implementation for testing.
//!
//! Holds every table behind one lock so that each trait method is atomic,
//! matching the transactional guarantees of the SQL backends.

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AccountInsert, CreditEntry, CreditOutcome, LedgerStore, ReferralStore, Result, ShopStore,
    StoreError,
};
use crate::model::{
    Balance, IdempotencyKey, NewReview, ProductRateOverride, ReferralAccount, Review,
    ShopAccount, ShopCredentials, ShopLink, Transaction, TransactionStatus, TransactionType,
    WithdrawalRequest, WithdrawalStatus,
};

#[derive(Default)]
struct Tables {
    shops: HashMap<String, ShopAccount>,
    overrides: HashMap<(String, String), ProductRateOverride>,
    accounts: HashMap<Uuid, ReferralAccount>,
    links: HashMap<(Uuid, String), ShopLink>,
    reviews: Vec<Review>,
    transactions: Vec<Transaction>,
    withdrawals: HashMap<Uuid, WithdrawalRequest>,
}

/// Mock reward store that keeps all rows in memory.
#[derive(Default)]
pub struct MockRewardStore {
    tables: RwLock<Tables>,
    unavailable: RwLock<bool>,
}

impl MockRewardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    async fn check(&self) -> Result<()> {
        if *self.unavailable.read().await {
            return Err(StoreError::Unavailable("mock store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ShopStore for MockRewardStore {
    async fn get_shop(&self, shop_id: &str) -> Result<Option<ShopAccount>> {
        self.check().await?;
        Ok(self.tables.read().await.shops.get(shop_id).cloned())
    }

    async fn upsert_shop(&self, shop: &ShopAccount) -> Result<()> {
        self.check().await?;
        self.tables
            .write()
            .await
            .shops
            .insert(shop.shop_id.clone(), shop.clone());
        Ok(())
    }

    async fn update_credentials(
        &self,
        shop_id: &str,
        credentials: &ShopCredentials,
    ) -> Result<bool> {
        self.check().await?;
        let mut tables = self.tables.write().await;
        Ok(match tables.shops.get_mut(shop_id) {
            Some(shop) => {
                shop.credentials = credentials.clone();
                true
            }
            None => false,
        })
    }

    async fn deactivate_shop(&self, shop_id: &str) -> Result<bool> {
        self.check().await?;
        let mut tables = self.tables.write().await;
        Ok(match tables.shops.get_mut(shop_id) {
            Some(shop) => {
                shop.active = false;
                true
            }
            None => false,
        })
    }

    async fn get_product_override(
        &self,
        shop_id: &str,
        product_id: &str,
    ) -> Result<Option<ProductRateOverride>> {
        self.check().await?;
        let key = (shop_id.to_string(), product_id.to_string());
        Ok(self.tables.read().await.overrides.get(&key).cloned())
    }

    async fn set_product_override(&self, rate_override: &ProductRateOverride) -> Result<()> {
        self.check().await?;
        let key = (
            rate_override.shop_id.clone(),
            rate_override.product_id.clone(),
        );
        self.tables
            .write()
            .await
            .overrides
            .insert(key, rate_override.clone());
        Ok(())
    }
}

#[async_trait]
impl ReferralStore for MockRewardStore {
    async fn get_account(&self, account_id: Uuid) -> Result<Option<ReferralAccount>> {
        self.check().await?;
        Ok(self.tables.read().await.accounts.get(&account_id).cloned())
    }

    async fn find_account_by_identity(&self, identity: &str) -> Result<Option<ReferralAccount>> {
        self.check().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.identity == identity)
            .cloned())
    }

    async fn find_account_by_code(&self, referral_code: &str) -> Result<Option<ReferralAccount>> {
        self.check().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.referral_code == referral_code)
            .cloned())
    }

    async fn insert_account(&self, account: &ReferralAccount) -> Result<AccountInsert> {
        self.check().await?;
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .accounts
            .values()
            .find(|a| a.identity == account.identity)
        {
            return Ok(AccountInsert::Existing(existing.clone()));
        }
        if tables
            .accounts
            .values()
            .any(|a| a.referral_code == account.referral_code)
        {
            return Err(StoreError::UniqueViolation(format!(
                "referral_accounts.referral_code: {}",
                account.referral_code
            )));
        }

        tables.accounts.insert(account.id, account.clone());
        Ok(AccountInsert::Created(account.clone()))
    }

    async fn ensure_shop_link(&self, link: &ShopLink) -> Result<bool> {
        self.check().await?;
        let mut tables = self.tables.write().await;
        let key = (link.account_id, link.shop_id.clone());
        if tables.links.contains_key(&key) {
            return Ok(false);
        }
        tables.links.insert(key, link.clone());
        Ok(true)
    }

    async fn upsert_review(&self, review: &NewReview) -> Result<Review> {
        self.check().await?;
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .reviews
            .iter_mut()
            .find(|r| r.shop_id == review.shop_id && r.board_id == review.board_id)
        {
            existing.product_id = review.product_id.clone();
            existing.member_id = review.member_id.clone();
            existing.content = review.content.clone();
            existing.rating = review.rating;
            return Ok(existing.clone());
        }

        let stored = Review {
            id: Uuid::new_v4(),
            shop_id: review.shop_id.clone(),
            board_id: review.board_id.clone(),
            product_id: review.product_id.clone(),
            member_id: review.member_id.clone(),
            referral_code: review.referral_code.clone(),
            content: review.content.clone(),
            rating: review.rating,
            click_count: 0,
            conversion_count: 0,
            attributed_revenue: 0,
            participating: true,
            created_at: chrono::Utc::now(),
        };
        tables.reviews.push(stored.clone());
        Ok(stored)
    }

    async fn find_reviews_by_code(
        &self,
        referral_code: &str,
        shop_id: Option<&str>,
    ) -> Result<Vec<Review>> {
        self.check().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .iter()
            .filter(|r| r.referral_code == referral_code)
            .filter(|r| shop_id.map_or(true, |s| r.shop_id == s))
            .cloned()
            .collect())
    }

    async fn increment_clicks(&self, referral_code: &str) -> Result<Option<i64>> {
        self.check().await?;
        let mut tables = self.tables.write().await;
        let mut matched = false;
        let mut total = 0;
        for review in tables
            .reviews
            .iter_mut()
            .filter(|r| r.referral_code == referral_code)
        {
            review.click_count += 1;
            total += review.click_count;
            matched = true;
        }
        Ok(matched.then_some(total))
    }
}

fn key_matches(tx: &Transaction, key: &IdempotencyKey) -> bool {
    tx.shop_id == key.shop_id && tx.order_id == key.order_id && tx.product_id == key.product_id
}

#[async_trait]
impl LedgerStore for MockRewardStore {
    async fn credit(&self, entry: &CreditEntry) -> Result<CreditOutcome> {
        self.check().await?;
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .transactions
            .iter()
            .find(|t| key_matches(t, &entry.key))
        {
            return Ok(CreditOutcome::Duplicate(existing.clone()));
        }

        let account = tables
            .accounts
            .get_mut(&entry.account_id)
            .ok_or(StoreError::AccountNotFound(entry.account_id))?;
        account.total_points += entry.amount;
        account.available_points += entry.amount;

        if let Some(review) = tables.reviews.iter_mut().find(|r| r.id == entry.review_id) {
            review.conversion_count += 1;
            review.attributed_revenue += entry.order_amount;
        }

        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id: entry.account_id,
            review_id: entry.review_id,
            shop_id: entry.key.shop_id.clone(),
            tx_type: TransactionType::ReferralReward,
            status: TransactionStatus::Completed,
            amount: entry.amount,
            description: entry.description.clone(),
            order_id: entry.key.order_id.clone(),
            product_id: entry.key.product_id.clone(),
            referral_code: entry.referral_code.clone(),
            expires_at: entry.expires_at,
            created_at: chrono::Utc::now(),
        };
        tables.transactions.push(tx.clone());
        Ok(CreditOutcome::Applied(tx))
    }

    async fn transactions_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        self.check().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn balance(&self, account_id: Uuid) -> Result<Option<Balance>> {
        self.check().await?;
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&account_id).map(|a| Balance {
            total_points: a.total_points,
            available_points: a.available_points,
        }))
    }

    async fn reserve_withdrawal(&self, request: &WithdrawalRequest) -> Result<()> {
        self.check().await?;
        let mut tables = self.tables.write().await;

        let account = tables
            .accounts
            .get_mut(&request.account_id)
            .ok_or(StoreError::AccountNotFound(request.account_id))?;
        if account.available_points < request.amount {
            return Err(StoreError::InsufficientBalance {
                available: account.available_points,
                requested: request.amount,
            });
        }
        account.available_points -= request.amount;

        tables.withdrawals.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_withdrawal(&self, withdrawal_id: Uuid) -> Result<Option<WithdrawalRequest>> {
        self.check().await?;
        Ok(self.tables.read().await.withdrawals.get(&withdrawal_id).cloned())
    }

    async fn settle_withdrawal(
        &self,
        withdrawal_id: Uuid,
        status: WithdrawalStatus,
    ) -> Result<WithdrawalRequest> {
        self.check().await?;
        let mut tables = self.tables.write().await;

        let request = tables
            .withdrawals
            .get_mut(&withdrawal_id)
            .ok_or(StoreError::WithdrawalNotFound(withdrawal_id))?;
        if request.status != WithdrawalStatus::Pending {
            return Err(StoreError::WithdrawalNotPending(withdrawal_id));
        }
        request.status = status;
        let settled = request.clone();

        if status == WithdrawalStatus::Rejected {
            if let Some(account) = tables.accounts.get_mut(&settled.account_id) {
                account.available_points += settled.amount;
            }
        }

        Ok(settled)
    }
}
