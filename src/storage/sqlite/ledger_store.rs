//! SQLite LedgerStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Order, Query, SelectStatement, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{finish, parse_time, parse_uuid, SqliteRewardStore};
use crate::model::{
    Balance, BankDetails, IdempotencyKey, Transaction, TransactionStatus, TransactionType,
    WithdrawalRequest, WithdrawalStatus,
};
use crate::storage::schema::{ReferralAccounts, Reviews, Transactions, Withdrawals};
use crate::storage::{CreditEntry, CreditOutcome, LedgerStore, Result, StoreError};

fn select_transactions() -> SelectStatement {
    Query::select()
        .columns([
            Transactions::Id,
            Transactions::AccountId,
            Transactions::ReviewId,
            Transactions::ShopId,
            Transactions::TxType,
            Transactions::Status,
            Transactions::Amount,
            Transactions::Description,
            Transactions::OrderId,
            Transactions::ProductId,
            Transactions::ReferralCode,
            Transactions::ExpiresAt,
            Transactions::CreatedAt,
        ])
        .from(Transactions::Table)
        .to_owned()
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction> {
    let id: String = row.get("id");
    let account_id: String = row.get("account_id");
    let review_id: String = row.get("review_id");
    let tx_type: String = row.get("tx_type");
    let status: String = row.get("status");
    let expires_at: String = row.get("expires_at");
    let created_at: String = row.get("created_at");

    Ok(Transaction {
        id: parse_uuid(&id)?,
        account_id: parse_uuid(&account_id)?,
        review_id: parse_uuid(&review_id)?,
        shop_id: row.get("shop_id"),
        tx_type: TransactionType::parse(&tx_type)
            .ok_or_else(|| StoreError::Corrupt(format!("transaction type '{tx_type}'")))?,
        status: TransactionStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("transaction status '{status}'")))?,
        amount: row.get("amount"),
        description: row.get("description"),
        order_id: row.get("order_id"),
        product_id: row.get("product_id"),
        referral_code: row.get("referral_code"),
        expires_at: parse_time(&expires_at)?,
        created_at: parse_time(&created_at)?,
    })
}

fn select_withdrawals() -> SelectStatement {
    Query::select()
        .columns([
            Withdrawals::Id,
            Withdrawals::AccountId,
            Withdrawals::Amount,
            Withdrawals::BankName,
            Withdrawals::AccountNumber,
            Withdrawals::AccountHolder,
            Withdrawals::Status,
            Withdrawals::RequestedAt,
        ])
        .from(Withdrawals::Table)
        .to_owned()
}

fn withdrawal_from_row(row: &SqliteRow) -> Result<WithdrawalRequest> {
    let id: String = row.get("id");
    let account_id: String = row.get("account_id");
    let status: String = row.get("status");
    let requested_at: String = row.get("requested_at");

    Ok(WithdrawalRequest {
        id: parse_uuid(&id)?,
        account_id: parse_uuid(&account_id)?,
        amount: row.get("amount"),
        bank_details: BankDetails {
            bank_name: row.get("bank_name"),
            account_number: row.get("account_number"),
            account_holder: row.get("account_holder"),
        },
        status: WithdrawalStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("withdrawal status '{status}'")))?,
        requested_at: parse_time(&requested_at)?,
    })
}

fn key_filter(query: &mut SelectStatement, key: &IdempotencyKey) {
    query
        .and_where(Expr::col(Transactions::ShopId).eq(key.shop_id.as_str()))
        .and_where(Expr::col(Transactions::OrderId).eq(key.order_id.as_str()))
        .and_where(Expr::col(Transactions::ProductId).eq(key.product_id.as_str()));
}

impl SqliteRewardStore {
    async fn credit_in(conn: &mut SqliteConnection, entry: &CreditEntry) -> Result<CreditOutcome> {
        let now = chrono::Utc::now();
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
            created_at: now,
        };

        let insert = Query::insert()
            .into_table(Transactions::Table)
            .columns([
                Transactions::Id,
                Transactions::AccountId,
                Transactions::ReviewId,
                Transactions::ShopId,
                Transactions::TxType,
                Transactions::Status,
                Transactions::Amount,
                Transactions::Description,
                Transactions::OrderId,
                Transactions::ProductId,
                Transactions::ReferralCode,
                Transactions::ExpiresAt,
                Transactions::CreatedAt,
            ])
            .values_panic([
                tx.id.to_string().into(),
                tx.account_id.to_string().into(),
                tx.review_id.to_string().into(),
                tx.shop_id.clone().into(),
                tx.tx_type.as_str().into(),
                tx.status.as_str().into(),
                tx.amount.into(),
                tx.description.clone().into(),
                tx.order_id.clone().into(),
                tx.product_id.clone().into(),
                tx.referral_code.clone().into(),
                tx.expires_at.to_rfc3339().into(),
                tx.created_at.to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::columns([
                    Transactions::ShopId,
                    Transactions::OrderId,
                    Transactions::ProductId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let inserted = sqlx::query(&insert).execute(&mut *conn).await?;

        if inserted.rows_affected() == 0 {
            let mut select = select_transactions();
            key_filter(&mut select, &entry.key);
            let sql = select.to_string(SqliteQueryBuilder);
            let row = sqlx::query(&sql).fetch_one(&mut *conn).await?;
            return Ok(CreditOutcome::Duplicate(transaction_from_row(&row)?));
        }

        let balance = Query::update()
            .table(ReferralAccounts::Table)
            .value(
                ReferralAccounts::TotalPoints,
                Expr::col(ReferralAccounts::TotalPoints).add(entry.amount),
            )
            .value(
                ReferralAccounts::AvailablePoints,
                Expr::col(ReferralAccounts::AvailablePoints).add(entry.amount),
            )
            .and_where(Expr::col(ReferralAccounts::Id).eq(entry.account_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let updated = sqlx::query(&balance).execute(&mut *conn).await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(entry.account_id));
        }

        let conversion = Query::update()
            .table(Reviews::Table)
            .value(
                Reviews::ConversionCount,
                Expr::col(Reviews::ConversionCount).add(1),
            )
            .value(
                Reviews::AttributedRevenue,
                Expr::col(Reviews::AttributedRevenue).add(entry.order_amount),
            )
            .and_where(Expr::col(Reviews::Id).eq(entry.review_id.to_string()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&conversion).execute(&mut *conn).await?;

        Ok(CreditOutcome::Applied(tx))
    }

    async fn reserve_in(conn: &mut SqliteConnection, request: &WithdrawalRequest) -> Result<()> {
        let debit = Query::update()
            .table(ReferralAccounts::Table)
            .value(
                ReferralAccounts::AvailablePoints,
                Expr::col(ReferralAccounts::AvailablePoints).sub(request.amount),
            )
            .and_where(Expr::col(ReferralAccounts::Id).eq(request.account_id.to_string()))
            .and_where(Expr::col(ReferralAccounts::AvailablePoints).gte(request.amount))
            .to_string(SqliteQueryBuilder);

        let debited = sqlx::query(&debit).execute(&mut *conn).await?;

        if debited.rows_affected() == 0 {
            let select = Query::select()
                .column(ReferralAccounts::AvailablePoints)
                .from(ReferralAccounts::Table)
                .and_where(Expr::col(ReferralAccounts::Id).eq(request.account_id.to_string()))
                .to_string(SqliteQueryBuilder);

            return match sqlx::query(&select).fetch_optional(&mut *conn).await? {
                Some(row) => Err(StoreError::InsufficientBalance {
                    available: row.get("available_points"),
                    requested: request.amount,
                }),
                None => Err(StoreError::AccountNotFound(request.account_id)),
            };
        }

        let insert = Query::insert()
            .into_table(Withdrawals::Table)
            .columns([
                Withdrawals::Id,
                Withdrawals::AccountId,
                Withdrawals::Amount,
                Withdrawals::BankName,
                Withdrawals::AccountNumber,
                Withdrawals::AccountHolder,
                Withdrawals::Status,
                Withdrawals::RequestedAt,
            ])
            .values_panic([
                request.id.to_string().into(),
                request.account_id.to_string().into(),
                request.amount.into(),
                request.bank_details.bank_name.clone().into(),
                request.bank_details.account_number.clone().into(),
                request.bank_details.account_holder.clone().into(),
                request.status.as_str().into(),
                request.requested_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&insert).execute(&mut *conn).await?;
        Ok(())
    }

    async fn settle_in(
        conn: &mut SqliteConnection,
        withdrawal_id: Uuid,
        status: WithdrawalStatus,
    ) -> Result<WithdrawalRequest> {
        let select = select_withdrawals()
            .and_where(Expr::col(Withdrawals::Id).eq(withdrawal_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let mut request = match sqlx::query(&select).fetch_optional(&mut *conn).await? {
            Some(row) => withdrawal_from_row(&row)?,
            None => return Err(StoreError::WithdrawalNotFound(withdrawal_id)),
        };

        let update = Query::update()
            .table(Withdrawals::Table)
            .value(Withdrawals::Status, status.as_str())
            .and_where(Expr::col(Withdrawals::Id).eq(withdrawal_id.to_string()))
            .and_where(Expr::col(Withdrawals::Status).eq(WithdrawalStatus::Pending.as_str()))
            .to_string(SqliteQueryBuilder);

        let updated = sqlx::query(&update).execute(&mut *conn).await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::WithdrawalNotPending(withdrawal_id));
        }

        if status == WithdrawalStatus::Rejected {
            let restore = Query::update()
                .table(ReferralAccounts::Table)
                .value(
                    ReferralAccounts::AvailablePoints,
                    Expr::col(ReferralAccounts::AvailablePoints).add(request.amount),
                )
                .and_where(Expr::col(ReferralAccounts::Id).eq(request.account_id.to_string()))
                .to_string(SqliteQueryBuilder);

            sqlx::query(&restore).execute(&mut *conn).await?;
        }

        request.status = status;
        Ok(request)
    }
}

#[async_trait]
impl LedgerStore for SqliteRewardStore {
    async fn credit(&self, entry: &CreditEntry) -> Result<CreditOutcome> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::credit_in(&mut conn, entry).await;
        finish(&mut conn, result).await
    }

    async fn transactions_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        let sql = select_transactions()
            .and_where(Expr::col(Transactions::AccountId).eq(account_id.to_string()))
            .order_by(Transactions::CreatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn balance(&self, account_id: Uuid) -> Result<Option<Balance>> {
        let sql = Query::select()
            .columns([ReferralAccounts::TotalPoints, ReferralAccounts::AvailablePoints])
            .from(ReferralAccounts::Table)
            .and_where(Expr::col(ReferralAccounts::Id).eq(account_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&sql).fetch_optional(self.pool()).await?;
        Ok(row.map(|row| Balance {
            total_points: row.get("total_points"),
            available_points: row.get("available_points"),
        }))
    }

    async fn reserve_withdrawal(&self, request: &WithdrawalRequest) -> Result<()> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::reserve_in(&mut conn, request).await;
        finish(&mut conn, result).await
    }

    async fn get_withdrawal(&self, withdrawal_id: Uuid) -> Result<Option<WithdrawalRequest>> {
        let sql = select_withdrawals()
            .and_where(Expr::col(Withdrawals::Id).eq(withdrawal_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&sql).fetch_optional(self.pool()).await?;
        row.as_ref().map(withdrawal_from_row).transpose()
    }

    async fn settle_withdrawal(
        &self,
        withdrawal_id: Uuid,
        status: WithdrawalStatus,
    ) -> Result<WithdrawalRequest> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::settle_in(&mut conn, withdrawal_id, status).await;
        finish(&mut conn, result).await
    }
}
