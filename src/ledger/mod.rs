//! Reward ledger.
//!
//! Credits are append-only and idempotent per (shop, order, product).
//! Withdrawals reserve points immediately and are later approved or
//! rejected; rejection restores the reservation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RewardConfig;
use crate::model::{
    Balance, BankDetails, IdempotencyKey, Transaction, WithdrawalRequest, WithdrawalStatus,
};
use crate::storage::{CreditEntry, CreditOutcome, LedgerStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("withdrawal of {requested} is below the minimum of {minimum}")]
    BelowMinimum { requested: i64, minimum: i64 },

    #[error("referral account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("withdrawal not found: {0}")]
    WithdrawalNotFound(Uuid),

    #[error("withdrawal {0} is not pending")]
    WithdrawalNotPending(Uuid),

    #[error("point expiry of {0} days is out of range")]
    ExpiryOutOfRange(i64),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientBalance {
                available,
                requested,
            } => LedgerError::InsufficientBalance {
                available,
                requested,
            },
            StoreError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
            StoreError::WithdrawalNotFound(id) => LedgerError::WithdrawalNotFound(id),
            StoreError::WithdrawalNotPending(id) => LedgerError::WithdrawalNotPending(id),
            other => LedgerError::Store(other),
        }
    }
}

/// A reward to credit for one order line.
#[derive(Debug, Clone)]
pub struct CreditRequest {
    pub account_id: Uuid,
    pub review_id: Uuid,
    pub shop_id: String,
    pub order_id: String,
    pub product_id: String,
    pub referral_code: String,
    pub amount: i64,
    /// Line amount the reward was computed from.
    pub order_amount: i64,
    pub description: String,
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    min_withdrawal: i64,
    point_expiry_days: i64,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, config: &RewardConfig) -> Self {
        Self {
            store,
            min_withdrawal: config.min_withdrawal,
            point_expiry_days: config.point_expiry_days,
        }
    }

    fn expires_at(&self) -> Result<DateTime<Utc>, LedgerError> {
        Duration::try_days(self.point_expiry_days)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or(LedgerError::ExpiryOutOfRange(self.point_expiry_days))
    }

    /// Credit a completed reward. A repeated key returns the first transaction
    /// as `CreditOutcome::Duplicate` and changes nothing.
    pub async fn credit(&self, request: CreditRequest) -> Result<CreditOutcome, LedgerError> {
        if request.amount <= 0 {
            return Err(LedgerError::InvalidAmount(request.amount));
        }

        let expires_at = self.expires_at()?;
        let entry = CreditEntry {
            key: IdempotencyKey {
                shop_id: request.shop_id,
                order_id: request.order_id,
                product_id: request.product_id,
            },
            account_id: request.account_id,
            review_id: request.review_id,
            amount: request.amount,
            order_amount: request.order_amount,
            description: request.description,
            referral_code: request.referral_code,
            expires_at,
        };

        let outcome = self.store.credit(&entry).await?;
        match &outcome {
            CreditOutcome::Applied(tx) => info!(
                transaction_id = %tx.id,
                account_id = %tx.account_id,
                key = %entry.key,
                amount = tx.amount,
                "credit applied"
            ),
            CreditOutcome::Duplicate(tx) => debug!(
                transaction_id = %tx.id,
                key = %entry.key,
                "credit already applied"
            ),
        }
        Ok(outcome)
    }

    /// Reserve `amount` from available points as a pending withdrawal.
    pub async fn request_withdrawal(
        &self,
        account_id: Uuid,
        amount: i64,
        bank_details: BankDetails,
    ) -> Result<WithdrawalRequest, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount < self.min_withdrawal {
            return Err(LedgerError::BelowMinimum {
                requested: amount,
                minimum: self.min_withdrawal,
            });
        }

        let request = WithdrawalRequest {
            id: Uuid::new_v4(),
            account_id,
            amount,
            bank_details,
            status: WithdrawalStatus::Pending,
            requested_at: Utc::now(),
        };
        self.store.reserve_withdrawal(&request).await?;

        info!(withdrawal_id = %request.id, %account_id, amount, "withdrawal requested");
        Ok(request)
    }

    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: Uuid,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let settled = self
            .store
            .settle_withdrawal(withdrawal_id, WithdrawalStatus::Approved)
            .await?;
        info!(%withdrawal_id, amount = settled.amount, "withdrawal approved");
        Ok(settled)
    }

    /// Reject a pending withdrawal and return its amount to available points.
    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: Uuid,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let settled = self
            .store
            .settle_withdrawal(withdrawal_id, WithdrawalStatus::Rejected)
            .await?;
        info!(%withdrawal_id, amount = settled.amount, "withdrawal rejected, points restored");
        Ok(settled)
    }

    pub async fn withdrawal(&self, withdrawal_id: Uuid) -> Result<WithdrawalRequest, LedgerError> {
        self.store
            .get_withdrawal(withdrawal_id)
            .await?
            .ok_or(LedgerError::WithdrawalNotFound(withdrawal_id))
    }

    pub async fn balance(&self, account_id: Uuid) -> Result<Balance, LedgerError> {
        self.store
            .balance(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Transaction history, oldest first.
    pub async fn list_transactions(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.balance(account_id).await?;
        Ok(self.store.transactions_for_account(account_id).await?)
    }
}
