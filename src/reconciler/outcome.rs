//! Terminal outcomes of webhook reconciliation.
//!
//! Every variant is a success: the host must not redeliver. Only
//! `ReconcileError` signals a failure worth retrying.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Recorded {
        referral_code: String,
        review_id: Uuid,
        account_id: Uuid,
    },
    MallInactive,
    MemberOnly,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOutcome::Recorded { .. } => "recorded",
            ReviewOutcome::MallInactive => "mall_inactive",
            ReviewOutcome::MemberOnly => "member_only",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    /// Rewards credited (or already credited on an earlier delivery).
    Credited {
        transaction_ids: Vec<Uuid>,
        total_reward: i64,
    },
    NoReferral,
    InvalidReferral,
    NoReviews,
    NoMatchingProducts,
    MallInactive,
}

impl OrderOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderOutcome::Credited { .. } => "credited",
            OrderOutcome::NoReferral => "no_referral",
            OrderOutcome::InvalidReferral => "invalid_referral",
            OrderOutcome::NoReviews => "no_reviews",
            OrderOutcome::NoMatchingProducts => "no_matching_products",
            OrderOutcome::MallInactive => "mall_inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Review(ReviewOutcome),
    Order(OrderOutcome),
    Uninstalled { deactivated: bool },
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Review(o) => o.as_str(),
            WebhookOutcome::Order(o) => o.as_str(),
            WebhookOutcome::Uninstalled { .. } => "uninstalled",
        }
    }
}
