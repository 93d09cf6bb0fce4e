//! Webhook reconciliation.
//!
//! Turns host events into registry and ledger writes. Expected business
//! results (no referral, guest member, inactive shop) come back as named
//! outcomes; only malformed input and unavailable dependencies are errors.
//! Every step is safe to repeat, so a redelivered event either ends in the
//! same outcome or hits an idempotent upsert or credit.

pub mod events;
pub mod outcome;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::clients::{IdentityLookup, LookupError};
use crate::config::RewardConfig;
use crate::ledger::{CreditRequest, Ledger, LedgerError};
use crate::model::Review;
use crate::rates::RateResolver;
use crate::referral::{normalize_code, ReferralRegistry, RegistryError, ReviewDraft};
use crate::reward::{RewardCalculator, RewardError};
use crate::storage::{ShopStore, StoreError, Stores};

pub use events::{AppUninstalled, OrderItem, OrderPlaced, ReviewCreated, WebhookEvent};
pub use outcome::{OrderOutcome, ReviewOutcome, WebhookOutcome};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("invalid event: {0}")]
    Invalid(String),

    #[error("dependency unavailable: {0}")]
    Unavailable(String),
}

impl ReconcileError {
    /// Whether the host should redeliver the event.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Unavailable(_))
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        ReconcileError::Unavailable(err.to_string())
    }
}

impl From<LookupError> for ReconcileError {
    fn from(err: LookupError) -> Self {
        ReconcileError::Unavailable(err.to_string())
    }
}

impl From<RegistryError> for ReconcileError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Store(e) => e.into(),
            other => ReconcileError::Unavailable(other.to_string()),
        }
    }
}

impl From<RewardError> for ReconcileError {
    fn from(err: RewardError) -> Self {
        ReconcileError::Invalid(err.to_string())
    }
}

impl From<LedgerError> for ReconcileError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount(_) => ReconcileError::Invalid(err.to_string()),
            other => ReconcileError::Unavailable(other.to_string()),
        }
    }
}

pub struct WebhookReconciler {
    shops: Arc<dyn ShopStore>,
    identity: Arc<dyn IdentityLookup>,
    registry: ReferralRegistry,
    calculator: RewardCalculator,
    ledger: Ledger,
    referral_param: String,
}

impl WebhookReconciler {
    pub fn new(stores: &Stores, identity: Arc<dyn IdentityLookup>, config: &RewardConfig) -> Self {
        Self::with_registry(
            stores,
            identity,
            ReferralRegistry::new(stores.referrals.clone()),
            config,
        )
    }

    /// Reconciler using a prepared registry.
    pub fn with_registry(
        stores: &Stores,
        identity: Arc<dyn IdentityLookup>,
        registry: ReferralRegistry,
        config: &RewardConfig,
    ) -> Self {
        Self {
            shops: stores.shops.clone(),
            identity,
            registry,
            calculator: RewardCalculator::new(
                RateResolver::new(stores.shops.clone(), config),
                config,
            ),
            ledger: Ledger::new(stores.ledger.clone(), config),
            referral_param: config.referral_param.clone(),
        }
    }

    pub fn registry(&self) -> &ReferralRegistry {
        &self.registry
    }

    pub fn calculator(&self) -> &RewardCalculator {
        &self.calculator
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome, ReconcileError> {
        let kind = event.kind();
        let shop_id = event.shop_id().to_string();

        let result = match event {
            WebhookEvent::ReviewCreated(e) => self.review_created(e).await.map(WebhookOutcome::Review),
            WebhookEvent::OrderPlaced(e) => self.order_placed(e).await.map(WebhookOutcome::Order),
            WebhookEvent::AppUninstalled(e) => self.app_uninstalled(e).await,
        };

        match &result {
            Ok(outcome) => info!(event = kind, %shop_id, outcome = outcome.as_str(), "webhook reconciled"),
            Err(e) if e.is_retryable() => {
                error!(event = kind, %shop_id, error = %e, "webhook failed, awaiting redelivery")
            }
            Err(e) => warn!(event = kind, %shop_id, error = %e, "webhook rejected"),
        }
        result
    }

    /// Active shops take part; unknown and uninstalled shops do not.
    async fn shop_active(&self, shop_id: &str) -> Result<bool, ReconcileError> {
        Ok(self
            .shops
            .get_shop(shop_id)
            .await?
            .is_some_and(|shop| shop.active))
    }

    pub async fn review_created(
        &self,
        event: ReviewCreated,
    ) -> Result<ReviewOutcome, ReconcileError> {
        event.validate()?;

        if !self.shop_active(&event.shop_id).await? {
            return Ok(ReviewOutcome::MallInactive);
        }
        if event.member_id.trim().is_empty() {
            return Ok(ReviewOutcome::MemberOnly);
        }

        let identity = self
            .identity
            .customer_email(&event.shop_id, &event.member_id)
            .await?;

        let draft = ReviewDraft {
            shop_id: event.shop_id,
            board_id: event.board_id,
            product_id: event.product_id,
            member_id: event.member_id,
            content: event.content,
            rating: event.rating,
        };

        match self.registry.record_review(&draft, identity.as_deref()).await {
            Ok(recorded) => {
                info!(
                    shop_id = %draft.shop_id,
                    board_id = %draft.board_id,
                    referral_code = %recorded.review.referral_code,
                    newly_linked = recorded.newly_linked,
                    "review recorded"
                );
                Ok(ReviewOutcome::Recorded {
                    referral_code: recorded.review.referral_code,
                    review_id: recorded.review.id,
                    account_id: recorded.account.id,
                })
            }
            Err(RegistryError::MemberOnly) => Ok(ReviewOutcome::MemberOnly),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn order_placed(&self, event: OrderPlaced) -> Result<OrderOutcome, ReconcileError> {
        event.validate()?;

        let Some(raw_code) = event.referral_code(&self.referral_param) else {
            return Ok(OrderOutcome::NoReferral);
        };
        let Some(code) = normalize_code(&raw_code) else {
            info!(order_id = %event.order_id, referral_code = %raw_code, "malformed referral code");
            return Ok(OrderOutcome::InvalidReferral);
        };

        if !self.shop_active(&event.shop_id).await? {
            return Ok(OrderOutcome::MallInactive);
        }

        let Some(account) = self.registry.account_for_code(&code).await? else {
            return Ok(OrderOutcome::InvalidReferral);
        };

        let reviews = self.registry.reviews_in_shop(&code, &event.shop_id).await?;
        if reviews.is_empty() {
            return Ok(OrderOutcome::NoReviews);
        }

        let reviewed = |item: &OrderItem| reviews.iter().any(|r| r.product_id == item.product_id);
        if !event.items.iter().any(reviewed) {
            return Ok(OrderOutcome::NoMatchingProducts);
        }
        let lines = matched_lines(&event.items, &reviews);

        let mut transaction_ids = Vec::with_capacity(lines.len());
        let mut total_reward = 0;

        for (review, product_id, line_amount) in lines {
            let reward = self
                .calculator
                .calculate(&event.shop_id, Some(&product_id), line_amount)
                .await?;
            if reward.reviewer_amount == 0 {
                continue;
            }

            let credited = self
                .ledger
                .credit(CreditRequest {
                    account_id: account.id,
                    review_id: review.id,
                    shop_id: event.shop_id.clone(),
                    order_id: event.order_id.clone(),
                    product_id: product_id.clone(),
                    referral_code: code.clone(),
                    amount: reward.reviewer_amount,
                    order_amount: line_amount,
                    description: format!(
                        "Referral reward for order {} (product {})",
                        event.order_id, product_id
                    ),
                })
                .await?
                .into_transaction();

            total_reward += credited.amount;
            transaction_ids.push(credited.id);
        }

        Ok(OrderOutcome::Credited {
            transaction_ids,
            total_reward,
        })
    }

    pub async fn app_uninstalled(
        &self,
        event: AppUninstalled,
    ) -> Result<WebhookOutcome, ReconcileError> {
        if event.shop_id.trim().is_empty() {
            return Err(ReconcileError::Invalid("shop_id is required".to_string()));
        }
        let deactivated = self.shops.deactivate_shop(&event.shop_id).await?;
        Ok(WebhookOutcome::Uninstalled { deactivated })
    }
}

/// Order lines whose product has a review under the code, one per product
/// with line amounts summed. Zero-amount lines are dropped. The oldest
/// review of a product receives the attribution.
fn matched_lines<'a>(items: &[OrderItem], reviews: &'a [Review]) -> Vec<(&'a Review, String, i64)> {
    let mut lines: Vec<(&Review, String, i64)> = Vec::new();

    for item in items {
        let amount = item.line_amount().unwrap_or(0);
        if amount <= 0 {
            continue;
        }
        let Some(review) = reviews
            .iter()
            .filter(|r| r.product_id == item.product_id)
            .min_by_key(|r| r.created_at)
        else {
            continue;
        };

        match lines.iter_mut().find(|(_, product, _)| *product == item.product_id) {
            Some(line) => line.2 = line.2.saturating_add(amount),
            None => lines.push((review, item.product_id.clone(), amount)),
        }
    }

    lines
}
