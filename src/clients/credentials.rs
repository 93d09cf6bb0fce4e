//! Credentials read from the shop record.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use super::{CredentialStore, LookupError};
use crate::storage::ShopStore;

/// Serves the access token stored on the shop.
///
/// Refreshing is done elsewhere; an expired token is reported as
/// `Unavailable` so the caller retries after the refresh lands.
pub struct StoredCredentials {
    shops: Arc<dyn ShopStore>,
}

impl StoredCredentials {
    pub fn new(shops: Arc<dyn ShopStore>) -> Self {
        Self { shops }
    }
}

#[async_trait]
impl CredentialStore for StoredCredentials {
    async fn valid_token(&self, shop_id: &str) -> Result<String, LookupError> {
        let shop = self
            .shops
            .get_shop(shop_id)
            .await
            .map_err(|e| LookupError::Unavailable(e.to_string()))?
            .ok_or_else(|| LookupError::Credential(format!("shop {shop_id} is not connected")))?;

        let credentials = shop.credentials;
        if credentials.access_token.is_empty() {
            return Err(LookupError::Credential(format!(
                "shop {shop_id} has no access token"
            )));
        }

        if let Some(expires_at) = credentials.expires_at {
            if expires_at <= Utc::now() {
                warn!(shop_id, %expires_at, "access token expired");
                return Err(LookupError::Unavailable(format!(
                    "access token for {shop_id} expired at {expires_at}"
                )));
            }
        }

        Ok(credentials.access_token)
    }
}
