//! Persisted entities of the reward ledger.
//!
//! Monetary amounts and points are integral minor currency units (`i64`).
//! Rates are fractions in `[0, 1]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque external credential pair for a connected shop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A shop connected to the plugin.
///
/// Individual rates may be unset on the record; the rate resolver then
/// substitutes configured fallbacks field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopAccount {
    pub shop_id: String,
    pub reviewer_rate: Option<f64>,
    pub buyer_rate: Option<f64>,
    pub platform_fee_rate: Option<f64>,
    pub prepaid_balance: i64,
    pub min_balance_threshold: i64,
    pub active: bool,
    pub credentials: ShopCredentials,
}

impl ShopAccount {
    /// A freshly authorized shop with no rate configuration.
    pub fn new(shop_id: impl Into<String>) -> Self {
        Self {
            shop_id: shop_id.into(),
            reviewer_rate: None,
            buyer_rate: None,
            platform_fee_rate: None,
            prepaid_balance: 0,
            min_balance_threshold: 0,
            active: true,
            credentials: ShopCredentials::default(),
        }
    }

    pub fn with_rates(mut self, reviewer: f64, buyer: f64, platform_fee: f64) -> Self {
        self.reviewer_rate = Some(reviewer);
        self.buyer_rate = Some(buyer);
        self.platform_fee_rate = Some(platform_fee);
        self
    }
}

/// Per-(shop, product) override of all three rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRateOverride {
    pub shop_id: String,
    pub product_id: String,
    pub reviewer_rate: f64,
    pub buyer_rate: f64,
    pub platform_fee_rate: f64,
    pub active: bool,
}

/// One account per natural identity (email).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralAccount {
    pub id: Uuid,
    pub identity: String,
    pub referral_code: String,
    pub total_points: i64,
    pub available_points: i64,
    pub marketing_consent: bool,
    pub created_at: DateTime<Utc>,
}

/// Binds a referral account to a shop-local member id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopLink {
    pub account_id: Uuid,
    pub shop_id: String,
    pub shop_member_id: String,
    pub linked_at: DateTime<Utc>,
}

/// A review observed in a shop, keyed by (shop_id, board_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub shop_id: String,
    pub board_id: String,
    pub product_id: String,
    pub member_id: String,
    pub referral_code: String,
    pub content: Option<String>,
    pub rating: Option<i32>,
    pub click_count: i64,
    pub conversion_count: i64,
    pub attributed_revenue: i64,
    pub participating: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when recording a review; the store assigns ids and counters.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub shop_id: String,
    pub board_id: String,
    pub product_id: String,
    pub member_id: String,
    pub referral_code: String,
    pub content: Option<String>,
    pub rating: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    ReferralReward,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::ReferralReward => "referral_reward",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "referral_reward" => Some(TransactionType::ReferralReward),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            _ => None,
        }
    }
}

/// Append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub review_id: Uuid,
    pub shop_id: String,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: i64,
    pub description: String,
    pub order_id: String,
    pub product_id: String,
    pub referral_code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// The at-most-one-credit boundary for a real-world purchase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub shop_id: String,
    pub order_id: String,
    pub product_id: String,
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.shop_id, self.order_id, self.product_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "rejected" => Some(WithdrawalStatus::Rejected),
            _ => None,
        }
    }
}

/// Destination account for a payout. Recorded only, never executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub bank_details: BankDetails,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub total_points: i64,
    pub available_points: i64,
}
