//! Rate resolution.
//!
//! Rates resolve through an ordered chain of tiers; the first tier that
//! returns rates wins. The shipped chain is product override, then shop
//! defaults, then the configured global defaults. Resolution never fails:
//! a tier whose store lookup errors is logged and skipped.

mod tiers;


use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RewardConfig;
use crate::model::{ProductRateOverride, ShopAccount};
use crate::storage::ShopStore;

pub use tiers::{GlobalDefaultTier, ProductOverrideTier, ShopDefaultTier};

/// Errors from rate validation.
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("rate {name} must be within [0, 1], got {value}")]
    OutOfRange { name: String, value: f64 },
}

fn check_rate(name: String, value: f64) -> Result<(), RateError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RateError::OutOfRange { name, value })
    }
}

/// Reject a shop record carrying a rate outside `[0, 1]`.
pub fn validate_shop(shop: &ShopAccount) -> Result<(), RateError> {
    for (name, value) in [
        ("reviewer_rate", shop.reviewer_rate),
        ("buyer_rate", shop.buyer_rate),
        ("platform_fee_rate", shop.platform_fee_rate),
    ] {
        if let Some(value) = value {
            check_rate(format!("{}.{name}", shop.shop_id), value)?;
        }
    }
    Ok(())
}

/// Reject an override carrying a rate outside `[0, 1]`.
pub fn validate_override(o: &ProductRateOverride) -> Result<(), RateError> {
    Rates {
        reviewer: o.reviewer_rate,
        buyer: o.buyer_rate,
        platform_fee: o.platform_fee_rate,
    }
    .validate(&format!("{}.{}", o.shop_id, o.product_id))
}

/// The three rates applied to an order amount, as fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub reviewer: f64,
    pub buyer: f64,
    pub platform_fee: f64,
}

impl Rates {
    pub fn validate(&self, scope: &str) -> Result<(), RateError> {
        check_rate(format!("{scope}.reviewer"), self.reviewer)?;
        check_rate(format!("{scope}.buyer"), self.buyer)?;
        check_rate(format!("{scope}.platform_fee"), self.platform_fee)
    }
}

/// Which tier produced the rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSource {
    #[serde(rename = "product")]
    Product,
    #[serde(rename = "mall")]
    Shop,
    #[serde(rename = "default")]
    Default,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Product => "product",
            RateSource::Shop => "mall",
            RateSource::Default => "default",
        }
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rates together with the tier they came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRates {
    pub rates: Rates,
    pub source: RateSource,
}

/// Inputs to rate resolution.
#[derive(Debug, Clone, Copy)]
pub struct RateQuery<'a> {
    pub shop_id: &'a str,
    pub product_id: Option<&'a str>,
    pub order_amount: i64,
}

/// One step in the resolution chain.
#[async_trait]
pub trait RateTier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Resolved rates, or `None` to fall through to the next tier.
    async fn resolve(&self, query: &RateQuery<'_>) -> Option<ResolvedRates>;
}

/// Ordered chain of rate tiers ending in an infallible default.
pub struct RateResolver {
    tiers: Vec<Box<dyn RateTier>>,
    fallback: Rates,
}

impl RateResolver {
    /// The standard chain: product override, shop defaults, global defaults.
    pub fn new(shops: Arc<dyn ShopStore>, config: &RewardConfig) -> Self {
        Self::with_tiers(
            vec![
                Box::new(ProductOverrideTier::new(shops.clone())),
                Box::new(ShopDefaultTier::new(shops, config.shop_fallback)),
                Box::new(GlobalDefaultTier::new(config.default_rates)),
            ],
            config.default_rates,
        )
    }

    /// A custom chain. `fallback` applies if every tier falls through.
    pub fn with_tiers(tiers: Vec<Box<dyn RateTier>>, fallback: Rates) -> Self {
        Self { tiers, fallback }
    }

    pub async fn resolve(&self, query: &RateQuery<'_>) -> ResolvedRates {
        for tier in &self.tiers {
            if let Some(resolved) = tier.resolve(query).await {
                debug!(
                    shop_id = query.shop_id,
                    product_id = ?query.product_id,
                    tier = tier.name(),
                    source = %resolved.source,
                    "rates resolved"
                );
                return resolved;
            }
        }

        ResolvedRates {
            rates: self.fallback,
            source: RateSource::Default,
        }
    }

    /// Convenience wrapper over [`RateResolver::resolve`].
    pub async fn resolve_rates(
        &self,
        shop_id: &str,
        product_id: Option<&str>,
        order_amount: i64,
    ) -> ResolvedRates {
        self.resolve(&RateQuery {
            shop_id,
            product_id,
            order_amount,
        })
        .await
    }
}

/// Display form of a rate: percent rounded to two decimals.
pub fn to_percent(rate: f64) -> f64 {
    (rate * 10_000.0).round() / 100.0
}
