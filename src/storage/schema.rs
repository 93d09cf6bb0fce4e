//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.
//! Uniqueness constraints here are load-bearing: credit idempotency, review
//! convergence and referral code uniqueness all rely on them.

use sea_query::Iden;

/// Connected shops.
#[derive(Iden)]
pub enum Shops {
    Table,
    #[iden = "shop_id"]
    ShopId,
    #[iden = "reviewer_rate"]
    ReviewerRate,
    #[iden = "buyer_rate"]
    BuyerRate,
    #[iden = "platform_fee_rate"]
    PlatformFeeRate,
    #[iden = "prepaid_balance"]
    PrepaidBalance,
    #[iden = "min_balance_threshold"]
    MinBalanceThreshold,
    #[iden = "active"]
    Active,
    #[iden = "access_token"]
    AccessToken,
    #[iden = "refresh_token"]
    RefreshToken,
    #[iden = "token_expires_at"]
    TokenExpiresAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Per-product rate overrides, unique per (shop_id, product_id).
#[derive(Iden)]
pub enum ProductRateOverrides {
    Table,
    #[iden = "shop_id"]
    ShopId,
    #[iden = "product_id"]
    ProductId,
    #[iden = "reviewer_rate"]
    ReviewerRate,
    #[iden = "buyer_rate"]
    BuyerRate,
    #[iden = "platform_fee_rate"]
    PlatformFeeRate,
    #[iden = "active"]
    Active,
}

/// Referral accounts, unique by identity and by referral code.
#[derive(Iden)]
pub enum ReferralAccounts {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "identity"]
    Identity,
    #[iden = "referral_code"]
    ReferralCode,
    #[iden = "total_points"]
    TotalPoints,
    #[iden = "available_points"]
    AvailablePoints,
    #[iden = "marketing_consent"]
    MarketingConsent,
    #[iden = "created_at"]
    CreatedAt,
}

/// Account-to-shop links, unique per (account_id, shop_id).
#[derive(Iden)]
pub enum ShopLinks {
    Table,
    #[iden = "account_id"]
    AccountId,
    #[iden = "shop_id"]
    ShopId,
    #[iden = "shop_member_id"]
    ShopMemberId,
    #[iden = "linked_at"]
    LinkedAt,
}

/// Reviews, unique per (shop_id, board_id).
#[derive(Iden)]
pub enum Reviews {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "shop_id"]
    ShopId,
    #[iden = "board_id"]
    BoardId,
    #[iden = "product_id"]
    ProductId,
    #[iden = "member_id"]
    MemberId,
    #[iden = "referral_code"]
    ReferralCode,
    #[iden = "content"]
    Content,
    #[iden = "rating"]
    Rating,
    #[iden = "click_count"]
    ClickCount,
    #[iden = "conversion_count"]
    ConversionCount,
    #[iden = "attributed_revenue"]
    AttributedRevenue,
    #[iden = "participating"]
    Participating,
    #[iden = "created_at"]
    CreatedAt,
}

/// Ledger transactions, unique per (shop_id, order_id, product_id).
#[derive(Iden)]
pub enum Transactions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "account_id"]
    AccountId,
    #[iden = "review_id"]
    ReviewId,
    #[iden = "shop_id"]
    ShopId,
    #[iden = "tx_type"]
    TxType,
    #[iden = "status"]
    Status,
    #[iden = "amount"]
    Amount,
    #[iden = "description"]
    Description,
    #[iden = "order_id"]
    OrderId,
    #[iden = "product_id"]
    ProductId,
    #[iden = "referral_code"]
    ReferralCode,
    #[iden = "expires_at"]
    ExpiresAt,
    #[iden = "created_at"]
    CreatedAt,
}

/// Withdrawal requests.
#[derive(Iden)]
pub enum Withdrawals {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "account_id"]
    AccountId,
    #[iden = "amount"]
    Amount,
    #[iden = "bank_name"]
    BankName,
    #[iden = "account_number"]
    AccountNumber,
    #[iden = "account_holder"]
    AccountHolder,
    #[iden = "status"]
    Status,
    #[iden = "requested_at"]
    RequestedAt,
}

/// DDL for all ledger tables, one statement per entry.
pub const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS shops (
        shop_id TEXT PRIMARY KEY,
        reviewer_rate REAL,
        buyer_rate REAL,
        platform_fee_rate REAL,
        prepaid_balance INTEGER NOT NULL DEFAULT 0,
        min_balance_threshold INTEGER NOT NULL DEFAULT 0,
        active INTEGER NOT NULL DEFAULT 1,
        access_token TEXT NOT NULL DEFAULT '',
        refresh_token TEXT NOT NULL DEFAULT '',
        token_expires_at TEXT,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS product_rate_overrides (
        shop_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        reviewer_rate REAL NOT NULL,
        buyer_rate REAL NOT NULL,
        platform_fee_rate REAL NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (shop_id, product_id)
    )",
    "CREATE TABLE IF NOT EXISTS referral_accounts (
        id TEXT PRIMARY KEY,
        identity TEXT NOT NULL UNIQUE,
        referral_code TEXT NOT NULL UNIQUE,
        total_points INTEGER NOT NULL DEFAULT 0,
        available_points INTEGER NOT NULL DEFAULT 0 CHECK (available_points >= 0),
        marketing_consent INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        CHECK (total_points >= available_points)
    )",
    "CREATE TABLE IF NOT EXISTS shop_links (
        account_id TEXT NOT NULL REFERENCES referral_accounts(id),
        shop_id TEXT NOT NULL,
        shop_member_id TEXT NOT NULL,
        linked_at TEXT NOT NULL,
        PRIMARY KEY (account_id, shop_id)
    )",
    "CREATE TABLE IF NOT EXISTS reviews (
        id TEXT PRIMARY KEY,
        shop_id TEXT NOT NULL,
        board_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        member_id TEXT NOT NULL,
        referral_code TEXT NOT NULL REFERENCES referral_accounts(referral_code),
        content TEXT,
        rating INTEGER,
        click_count INTEGER NOT NULL DEFAULT 0,
        conversion_count INTEGER NOT NULL DEFAULT 0,
        attributed_revenue INTEGER NOT NULL DEFAULT 0,
        participating INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        UNIQUE (shop_id, board_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_reviews_referral_code ON reviews(referral_code)",
    "CREATE TABLE IF NOT EXISTS transactions (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL REFERENCES referral_accounts(id),
        review_id TEXT NOT NULL REFERENCES reviews(id),
        shop_id TEXT NOT NULL,
        tx_type TEXT NOT NULL,
        status TEXT NOT NULL,
        amount INTEGER NOT NULL,
        description TEXT NOT NULL,
        order_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        referral_code TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (shop_id, order_id, product_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id)",
    "CREATE TABLE IF NOT EXISTS withdrawals (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL REFERENCES referral_accounts(id),
        amount INTEGER NOT NULL,
        bank_name TEXT NOT NULL,
        account_number TEXT NOT NULL,
        account_holder TEXT NOT NULL,
        status TEXT NOT NULL,
        requested_at TEXT NOT NULL
    )",
];
