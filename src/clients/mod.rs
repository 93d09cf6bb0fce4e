//! External service clients.
//!
//! The core consumes two collaborators: the host's customer directory, used
//! to map a shop member to an email, and a credential source supplying a
//! bearer token per shop.

pub mod credentials;
pub mod host;
pub mod static_client;

use async_trait::async_trait;

pub use credentials::StoredCredentials;
pub use host::HostIdentityLookup;
pub use static_client::StaticIdentityLookup;

/// Errors from external lookups. All of them are transient from the
/// reconciler's point of view: the host redelivers the event.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("host unavailable: {0}")]
    Unavailable(String),

    #[error("no usable credential: {0}")]
    Credential(String),

    #[error("unexpected host response: {0}")]
    Decode(String),
}

/// Host customer directory.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Email of the member, or `None` if the member has none (guest).
    async fn customer_email(
        &self,
        shop_id: &str,
        member_id: &str,
    ) -> Result<Option<String>, LookupError>;
}

/// Source of bearer tokens for host API calls.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn valid_token(&self, shop_id: &str) -> Result<String, LookupError>;
}
