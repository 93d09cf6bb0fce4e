//! Reward program policy.
//!
//! Passed explicitly to the rate resolver, reward calculator and ledger at
//! construction. Nothing in those components reads process state.

use serde::Deserialize;

use crate::rates::Rates;
use crate::reward::FeePolicy;

/// Reward program configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Rates used when neither a product override nor an active shop applies.
    pub default_rates: Rates,
    /// Per-field fallback for an active shop whose record leaves a rate unset.
    pub shop_fallback: Rates,
    /// Whether the platform fee is deducted from the reviewer payout.
    pub fee_policy: FeePolicy,
    /// Smallest withdrawal accepted, in minor currency units.
    pub min_withdrawal: i64,
    /// Validity window stamped on each credited transaction.
    pub point_expiry_days: i64,
    /// Query parameter carrying the referral code in referer URLs.
    pub referral_param: String,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            default_rates: Rates {
                reviewer: 0.01,
                buyer: 0.01,
                platform_fee: 0.005,
            },
            shop_fallback: Rates {
                reviewer: 0.01,
                buyer: 0.05,
                platform_fee: 0.005,
            },
            fee_policy: FeePolicy::Gross,
            min_withdrawal: 10_000,
            point_expiry_days: 365,
            referral_param: "ref".to_string(),
        }
    }
}
