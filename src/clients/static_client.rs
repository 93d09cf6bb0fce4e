//! Identity lookup with a fixed member table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{IdentityLookup, LookupError};

/// Identity lookup backed by an in-memory (shop, member) -> email map.
#[derive(Default)]
pub struct StaticIdentityLookup {
    emails: HashMap<(String, String), String>,
    unavailable: AtomicBool,
}

impl StaticIdentityLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, shop_id: &str, member_id: &str, email: &str) -> Self {
        self.emails
            .insert((shop_id.to_string(), member_id.to_string()), email.to_string());
        self
    }

    /// Make every subsequent lookup fail with `LookupError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityLookup for StaticIdentityLookup {
    async fn customer_email(
        &self,
        shop_id: &str,
        member_id: &str,
    ) -> Result<Option<String>, LookupError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LookupError::Unavailable("static lookup offline".to_string()));
        }
        Ok(self
            .emails
            .get(&(shop_id.to_string(), member_id.to_string()))
            .cloned())
    }
}
