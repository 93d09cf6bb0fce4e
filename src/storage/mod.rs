//! Storage interfaces and implementations.
//!
//! Three stores share one backend: shops and rate overrides, referral
//! accounts and reviews, and the ledger. Every invariant that guards money
//! (one credit per idempotency key, non-negative available points) is
//! enforced by the backend inside a single atomic unit, never by a
//! read-then-write sequence in the services above.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageType};
use crate::model::{
    Balance, IdempotencyKey, NewReview, ProductRateOverride, ReferralAccount, Review,
    ShopAccount, ShopCredentials, ShopLink, Transaction, WithdrawalRequest, WithdrawalStatus,
};

pub mod mock;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mock::MockRewardStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRewardStore;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("referral account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("withdrawal not found: {0}")]
    WithdrawalNotFound(Uuid),

    #[error("withdrawal {0} is not pending")]
    WithdrawalNotPending(Uuid),

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Outcome of inserting a referral account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountInsert {
    /// The account was inserted as given.
    Created(ReferralAccount),
    /// An account with the same identity already existed; it is returned unchanged.
    Existing(ReferralAccount),
}

impl AccountInsert {
    pub fn into_account(self) -> ReferralAccount {
        match self {
            AccountInsert::Created(a) | AccountInsert::Existing(a) => a,
        }
    }
}

/// A ledger credit to apply under its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditEntry {
    pub key: IdempotencyKey,
    pub account_id: Uuid,
    pub review_id: Uuid,
    pub amount: i64,
    /// Line amount of the purchase, accumulated onto the review's attributed revenue.
    pub order_amount: i64,
    pub description: String,
    pub referral_code: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// A new completed transaction was written and balances incremented.
    Applied(Transaction),
    /// The key was already credited; nothing changed.
    Duplicate(Transaction),
}

impl CreditOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            CreditOutcome::Applied(t) | CreditOutcome::Duplicate(t) => t,
        }
    }

    pub fn into_transaction(self) -> Transaction {
        match self {
            CreditOutcome::Applied(t) | CreditOutcome::Duplicate(t) => t,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, CreditOutcome::Duplicate(_))
    }
}

/// Shop accounts and per-product rate overrides.
#[async_trait]
pub trait ShopStore: Send + Sync + 'static {
    async fn get_shop(&self, shop_id: &str) -> Result<Option<ShopAccount>>;

    /// Insert a shop, or replace its rates, balances, flag and credentials.
    async fn upsert_shop(&self, shop: &ShopAccount) -> Result<()>;

    /// Replace the stored credentials. Returns false if the shop is unknown.
    async fn update_credentials(&self, shop_id: &str, credentials: &ShopCredentials)
        -> Result<bool>;

    /// Mark the shop inactive. Returns false if the shop is unknown.
    async fn deactivate_shop(&self, shop_id: &str) -> Result<bool>;

    async fn get_product_override(
        &self,
        shop_id: &str,
        product_id: &str,
    ) -> Result<Option<ProductRateOverride>>;

    /// Insert or replace the override for (shop_id, product_id).
    async fn set_product_override(&self, rate_override: &ProductRateOverride) -> Result<()>;
}

/// Referral accounts, shop links and reviews.
#[async_trait]
pub trait ReferralStore: Send + Sync + 'static {
    async fn get_account(&self, account_id: Uuid) -> Result<Option<ReferralAccount>>;

    async fn find_account_by_identity(&self, identity: &str) -> Result<Option<ReferralAccount>>;

    async fn find_account_by_code(&self, referral_code: &str) -> Result<Option<ReferralAccount>>;

    /// Insert the account unless one with the same identity exists.
    ///
    /// A referral code already held by another account fails with
    /// `StoreError::UniqueViolation`; callers retry with a fresh code.
    async fn insert_account(&self, account: &ReferralAccount) -> Result<AccountInsert>;

    /// Create the link unless (account_id, shop_id) exists. Returns true if created.
    async fn ensure_shop_link(&self, link: &ShopLink) -> Result<bool>;

    /// Insert or update the review keyed by (shop_id, board_id).
    ///
    /// On conflict only product, member, content and rating are refreshed;
    /// id, referral code and counters are kept. Returns the stored row.
    async fn upsert_review(&self, review: &NewReview) -> Result<Review>;

    /// Reviews carrying the code, optionally restricted to one shop.
    async fn find_reviews_by_code(
        &self,
        referral_code: &str,
        shop_id: Option<&str>,
    ) -> Result<Vec<Review>>;

    /// Increment click count on every review carrying the code.
    ///
    /// Returns the summed click count across those reviews, or `None` if no
    /// review carries the code.
    async fn increment_clicks(&self, referral_code: &str) -> Result<Option<i64>>;
}

/// Append-only transactions, balances and withdrawal reservations.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Insert a completed transaction unless its key exists, and in the same
    /// atomic unit increment the account's total and available points and the
    /// review's conversion count and attributed revenue.
    async fn credit(&self, entry: &CreditEntry) -> Result<CreditOutcome>;

    /// Transactions for the account, oldest first.
    async fn transactions_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>>;

    async fn balance(&self, account_id: Uuid) -> Result<Option<Balance>>;

    /// Decrement available points by the request amount and insert the
    /// pending request atomically. Fails with `InsufficientBalance` without
    /// mutating anything.
    async fn reserve_withdrawal(&self, request: &WithdrawalRequest) -> Result<()>;

    async fn get_withdrawal(&self, withdrawal_id: Uuid) -> Result<Option<WithdrawalRequest>>;

    /// Move a pending request to `Approved` or `Rejected`. Rejection restores
    /// the reserved amount to available points in the same atomic unit.
    async fn settle_withdrawal(
        &self,
        withdrawal_id: Uuid,
        status: WithdrawalStatus,
    ) -> Result<WithdrawalRequest>;
}

/// Handles to the three stores, usually backed by the same instance.
#[derive(Clone)]
pub struct Stores {
    pub shops: Arc<dyn ShopStore>,
    pub referrals: Arc<dyn ReferralStore>,
    pub ledger: Arc<dyn LedgerStore>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: ShopStore + ReferralStore + LedgerStore,
    {
        Self {
            shops: backend.clone(),
            referrals: backend.clone(),
            ledger: backend,
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> std::result::Result<Stores, Box<dyn std::error::Error>> {
    info!(storage_type = ?config.storage_type, path = %config.path, "initializing storage");

    match config.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            if config.path != ":memory:" {
                if let Some(parent) = std::path::Path::new(&config.path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&format!("sqlite:{}?mode=rwc", config.path))
                .await?;

            let store = Arc::new(SqliteRewardStore::new(pool));
            store.init_schema().await?;
            Ok(Stores::from_backend(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => Err("SQLite storage requested but 'sqlite' feature is not enabled".into()),
        StorageType::Memory => Ok(Stores::from_backend(Arc::new(MockRewardStore::new()))),
    }
}
