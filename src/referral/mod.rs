//! Referral registry.
//!
//! Maps natural identities (emails) to referral accounts, binds accounts to
//! shop members, records reviews under the owning account's code and tracks
//! clicks on shared links.

mod code;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{NewReview, ReferralAccount, Review, ShopLink};
use crate::storage::{AccountInsert, ReferralStore, StoreError};

pub use code::{generate_referral_code, is_valid_code, normalize_code, CODE_PREFIX};

/// Attempts at inserting an account before giving up on code collisions.
pub const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("member has no resolvable identity")]
    MemberOnly,

    #[error("referral code not found: {0}")]
    ReferralCodeNotFound(String),

    #[error("no free referral code after {0} attempts")]
    CodeSpaceExhausted(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A review as delivered by the host, before identity resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDraft {
    pub shop_id: String,
    pub board_id: String,
    pub product_id: String,
    pub member_id: String,
    pub content: Option<String>,
    pub rating: Option<i32>,
}

/// Result of recording a review.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedReview {
    pub account: ReferralAccount,
    pub review: Review,
    /// True if this review created the account's link to the shop.
    pub newly_linked: bool,
}

type CodeGenerator = Box<dyn Fn() -> String + Send + Sync>;

pub struct ReferralRegistry {
    store: Arc<dyn ReferralStore>,
    generate_code: CodeGenerator,
}

impl ReferralRegistry {
    pub fn new(store: Arc<dyn ReferralStore>) -> Self {
        Self::with_code_generator(store, generate_referral_code)
    }

    /// Registry with a custom code source, for exercising collisions.
    pub fn with_code_generator<F>(store: Arc<dyn ReferralStore>, generate_code: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            store,
            generate_code: Box::new(generate_code),
        }
    }

    /// The account for `identity`, created with zero balances if absent.
    pub async fn resolve_or_create_account(
        &self,
        identity: &str,
    ) -> Result<ReferralAccount, RegistryError> {
        let identity = normalize_identity(identity).ok_or(RegistryError::MemberOnly)?;

        if let Some(existing) = self.store.find_account_by_identity(&identity).await? {
            return Ok(existing);
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let account = ReferralAccount {
                id: Uuid::new_v4(),
                identity: identity.clone(),
                referral_code: (self.generate_code)(),
                total_points: 0,
                available_points: 0,
                marketing_consent: false,
                created_at: Utc::now(),
            };

            match self.store.insert_account(&account).await {
                Ok(AccountInsert::Created(created)) => {
                    info!(
                        account_id = %created.id,
                        referral_code = %created.referral_code,
                        "referral account created"
                    );
                    return Ok(created);
                }
                Ok(AccountInsert::Existing(existing)) => return Ok(existing),
                Err(StoreError::UniqueViolation(detail)) => {
                    warn!(attempt, %detail, "referral code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Link the account to a shop member. Returns true if the link is new.
    pub async fn ensure_shop_link(
        &self,
        account_id: Uuid,
        shop_id: &str,
        shop_member_id: &str,
    ) -> Result<bool, RegistryError> {
        let link = ShopLink {
            account_id,
            shop_id: shop_id.to_string(),
            shop_member_id: shop_member_id.to_string(),
            linked_at: Utc::now(),
        };
        let created = self.store.ensure_shop_link(&link).await?;
        if created {
            debug!(%account_id, shop_id, shop_member_id, "shop link created");
        }
        Ok(created)
    }

    /// Record a review under the account of `identity`.
    ///
    /// Reviews without a member id or without a resolvable identity do not
    /// take part in the program and fail with `MemberOnly`. Redelivery of the
    /// same (shop, board) converges on one row.
    pub async fn record_review(
        &self,
        draft: &ReviewDraft,
        identity: Option<&str>,
    ) -> Result<RecordedReview, RegistryError> {
        if draft.member_id.trim().is_empty() {
            return Err(RegistryError::MemberOnly);
        }
        let identity = identity.ok_or(RegistryError::MemberOnly)?;

        let account = self.resolve_or_create_account(identity).await?;
        let newly_linked = self
            .ensure_shop_link(account.id, &draft.shop_id, &draft.member_id)
            .await?;

        let review = self
            .store
            .upsert_review(&NewReview {
                shop_id: draft.shop_id.clone(),
                board_id: draft.board_id.clone(),
                product_id: draft.product_id.clone(),
                member_id: draft.member_id.clone(),
                referral_code: account.referral_code.clone(),
                content: draft.content.clone(),
                rating: draft.rating,
            })
            .await?;

        Ok(RecordedReview {
            account,
            review,
            newly_linked,
        })
    }

    /// Count a click on every review carrying the code. Returns the summed count.
    pub async fn track_click(&self, referral_code: &str) -> Result<i64, RegistryError> {
        let code = normalize_code(referral_code)
            .ok_or_else(|| RegistryError::ReferralCodeNotFound(referral_code.to_string()))?;

        match self.store.increment_clicks(&code).await? {
            Some(clicks) => Ok(clicks),
            None => Err(RegistryError::ReferralCodeNotFound(code)),
        }
    }

    /// The account holding an already-normalized code.
    pub async fn account_for_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<ReferralAccount>, RegistryError> {
        Ok(self.store.find_account_by_code(referral_code).await?)
    }

    /// Reviews in `shop_id` carrying the code.
    pub async fn reviews_in_shop(
        &self,
        referral_code: &str,
        shop_id: &str,
    ) -> Result<Vec<Review>, RegistryError> {
        Ok(self
            .store
            .find_reviews_by_code(referral_code, Some(shop_id))
            .await?)
    }
}

/// Emails compare case-insensitively. Blank identities are not identities.
fn normalize_identity(identity: &str) -> Option<String> {
    let identity = identity.trim();
    (!identity.is_empty()).then(|| identity.to_lowercase())
}
