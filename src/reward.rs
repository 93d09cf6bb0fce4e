//! Reward calculation.
//!
//! Applies resolved rates to an order amount. Every amount is floored to a
//! whole minor unit; the platform never rounds a payout up.

use serde::{Deserialize, Serialize};

use crate::config::RewardConfig;
use crate::rates::{RateResolver, ResolvedRates};

const PPM: i128 = 1_000_000;

/// Whether the platform fee comes out of the reviewer payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeePolicy {
    /// Fee is informational; the reviewer receives the full rate.
    #[default]
    Gross,
    /// Fee is deducted from the reviewer amount, saturating at zero.
    Net,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RewardError {
    #[error("order amount must be positive, got {0}")]
    InvalidAmount(i64),
}

/// Integral amounts derived from one order line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RewardBreakdown {
    pub reviewer_amount: i64,
    pub buyer_discount_amount: i64,
    pub platform_fee: i64,
    pub rates_used: ResolvedRates,
}

/// `floor(amount * rate)` for non-negative inputs, never above the exact product.
///
/// A rate that is the nearest double to a whole number of parts-per-million
/// is taken as that decimal, so 0.02 * 100000 is exactly 2000. Any other rate
/// is floored against its exact binary value.
pub fn apply_rate(amount: i64, rate: f64) -> i64 {
    if amount <= 0 || rate.is_nan() || rate <= 0.0 {
        return 0;
    }
    let rate = rate.min(1.0);

    let ppm = (rate * PPM as f64).round();
    let floored = if ppm / PPM as f64 == rate {
        (amount as i128 * ppm as i128) / PPM
    } else {
        floor_binary(amount, rate)
    };
    i64::try_from(floored).unwrap_or(i64::MAX)
}

/// Exact `floor(amount * rate)` from the rate's mantissa and exponent.
/// Expects `0 < rate <= 1`.
fn floor_binary(amount: i64, rate: f64) -> i128 {
    let bits = rate.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exponent) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased - 1075)
    };

    // amount < 2^63 and mantissa < 2^53, so the product fits in i128.
    let product = amount as i128 * mantissa as i128;
    let shift = exponent.unsigned_abs();
    if shift >= 127 {
        0
    } else {
        product >> shift
    }
}

pub struct RewardCalculator {
    resolver: RateResolver,
    fee_policy: FeePolicy,
}

impl RewardCalculator {
    pub fn new(resolver: RateResolver, config: &RewardConfig) -> Self {
        Self {
            resolver,
            fee_policy: config.fee_policy,
        }
    }

    pub fn resolver(&self) -> &RateResolver {
        &self.resolver
    }

    pub async fn calculate(
        &self,
        shop_id: &str,
        product_id: Option<&str>,
        order_amount: i64,
    ) -> Result<RewardBreakdown, RewardError> {
        if order_amount <= 0 {
            return Err(RewardError::InvalidAmount(order_amount));
        }

        let rates_used = self
            .resolver
            .resolve_rates(shop_id, product_id, order_amount)
            .await;
        Ok(breakdown(order_amount, rates_used, self.fee_policy))
    }
}

fn breakdown(order_amount: i64, rates_used: ResolvedRates, policy: FeePolicy) -> RewardBreakdown {
    let rates = rates_used.rates;
    let gross = apply_rate(order_amount, rates.reviewer);
    let platform_fee = apply_rate(order_amount, rates.platform_fee);

    let reviewer_amount = match policy {
        FeePolicy::Gross => gross,
        FeePolicy::Net => (gross - platform_fee).max(0),
    };

    RewardBreakdown {
        reviewer_amount,
        buyer_discount_amount: apply_rate(order_amount, rates.buyer),
        platform_fee,
        rates_used,
    }
}
