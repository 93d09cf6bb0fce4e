//! Built-in rate tiers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{RateQuery, RateSource, RateTier, Rates, ResolvedRates};
use crate::storage::ShopStore;

/// Active per-product override for (shop, product).
pub struct ProductOverrideTier {
    shops: Arc<dyn ShopStore>,
}

impl ProductOverrideTier {
    pub fn new(shops: Arc<dyn ShopStore>) -> Self {
        Self { shops }
    }
}

#[async_trait]
impl RateTier for ProductOverrideTier {
    fn name(&self) -> &'static str {
        "product_override"
    }

    async fn resolve(&self, query: &RateQuery<'_>) -> Option<ResolvedRates> {
        let product_id = query.product_id?;

        match self.shops.get_product_override(query.shop_id, product_id).await {
            Ok(Some(o)) if o.active => Some(ResolvedRates {
                rates: Rates {
                    reviewer: o.reviewer_rate,
                    buyer: o.buyer_rate,
                    platform_fee: o.platform_fee_rate,
                },
                source: RateSource::Product,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(
                    shop_id = query.shop_id,
                    product_id,
                    error = %e,
                    "product override lookup failed, falling through"
                );
                None
            }
        }
    }
}

/// Rates on an active shop record, each unset field filled from `fallback`.
pub struct ShopDefaultTier {
    shops: Arc<dyn ShopStore>,
    fallback: Rates,
}

impl ShopDefaultTier {
    pub fn new(shops: Arc<dyn ShopStore>, fallback: Rates) -> Self {
        Self { shops, fallback }
    }
}

#[async_trait]
impl RateTier for ShopDefaultTier {
    fn name(&self) -> &'static str {
        "shop_default"
    }

    async fn resolve(&self, query: &RateQuery<'_>) -> Option<ResolvedRates> {
        match self.shops.get_shop(query.shop_id).await {
            Ok(Some(shop)) if shop.active => Some(ResolvedRates {
                rates: Rates {
                    reviewer: shop.reviewer_rate.unwrap_or(self.fallback.reviewer),
                    buyer: shop.buyer_rate.unwrap_or(self.fallback.buyer),
                    platform_fee: shop.platform_fee_rate.unwrap_or(self.fallback.platform_fee),
                },
                source: RateSource::Shop,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(shop_id = query.shop_id, error = %e, "shop lookup failed, falling through");
                None
            }
        }
    }
}

/// Compiled-in or configured program defaults. Always resolves.
pub struct GlobalDefaultTier {
    rates: Rates,
}

impl GlobalDefaultTier {
    pub fn new(rates: Rates) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl RateTier for GlobalDefaultTier {
    fn name(&self) -> &'static str {
        "global_default"
    }

    async fn resolve(&self, _query: &RateQuery<'_>) -> Option<ResolvedRates> {
        Some(ResolvedRates {
            rates: self.rates,
            source: RateSource::Default,
        })
    }
}
