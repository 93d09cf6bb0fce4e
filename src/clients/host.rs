//! Host customer directory over HTTP.
//!
//! GETs the customers endpoint filtered by member id with the shop's bearer
//! token. Timeouts, connection errors, 429 and 5xx are retried with backoff.

use std::sync::Arc;

use async_trait::async_trait;
use backon::Retryable;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::{CredentialStore, IdentityLookup, LookupError};
use crate::config::HostApiConfig;
use crate::utils::retry::{host_api_backoff, is_retryable_error, is_retryable_status};

#[derive(Debug, Deserialize)]
struct CustomersResponse {
    #[serde(default)]
    customers: Vec<Customer>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    #[serde(default)]
    email: Option<String>,
}

/// One failed attempt and whether another is worth making.
#[derive(Debug)]
struct Attempt {
    error: LookupError,
    retryable: bool,
}

impl Attempt {
    fn retry(error: LookupError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn fatal(error: LookupError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

pub struct HostIdentityLookup {
    client: Client,
    config: HostApiConfig,
    credentials: Arc<dyn CredentialStore>,
}

impl HostIdentityLookup {
    pub fn new(
        config: HostApiConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    fn request_url(&self, shop_id: &str, member_id: &str) -> Result<Url, LookupError> {
        Url::parse_with_params(
            &self.config.customers_url(shop_id),
            &[("member_id", member_id)],
        )
        .map_err(|e| LookupError::Decode(format!("customers url for {shop_id}: {e}")))
    }

    async fn fetch(&self, url: &Url, token: &str) -> Result<Option<String>, Attempt> {
        let mut request = self.client.get(url.clone()).bearer_auth(token);
        if !self.config.api_version.is_empty() {
            request = request.header("X-Api-Version", &self.config.api_version);
        }

        let response = request.send().await.map_err(|e| {
            let error = LookupError::Unavailable(e.to_string());
            if is_retryable_error(&e) {
                Attempt::retry(error)
            } else {
                Attempt::fatal(error)
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Attempt::fatal(LookupError::Credential(format!(
                "host rejected token: HTTP {status}"
            ))));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = LookupError::Unavailable(format!(
                "HTTP {} - {}",
                status,
                body.chars().take(200).collect::<String>()
            ));
            return Err(if is_retryable_status(status) {
                warn!(url = %url, status = %status, "customer lookup returned retryable status");
                Attempt::retry(error)
            } else {
                error!(url = %url, status = %status, "customer lookup failed");
                Attempt::fatal(error)
            });
        }

        let body: CustomersResponse = response
            .json()
            .await
            .map_err(|e| Attempt::fatal(LookupError::Decode(e.to_string())))?;

        Ok(first_email(body))
    }
}

fn first_email(body: CustomersResponse) -> Option<String> {
    body.customers
        .into_iter()
        .filter_map(|c| c.email)
        .map(|e| e.trim().to_string())
        .find(|e| !e.is_empty())
}

#[async_trait]
impl IdentityLookup for HostIdentityLookup {
    async fn customer_email(
        &self,
        shop_id: &str,
        member_id: &str,
    ) -> Result<Option<String>, LookupError> {
        let token = self.credentials.valid_token(shop_id).await?;
        let url = self.request_url(shop_id, member_id)?;

        let email = (|| async { self.fetch(&url, &token).await })
            .retry(host_api_backoff(self.config.max_retries))
            .when(|a: &Attempt| a.retryable)
            .await
            .map_err(|a| a.error)?;

        debug!(shop_id, member_id, found = email.is_some(), "customer lookup");
        Ok(email)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    struct FixedToken;

    #[async_trait]
    impl CredentialStore for FixedToken {
        async fn valid_token(&self, _shop_id: &str) -> Result<String, LookupError> {
            Ok("secret".to_string())
        }
    }

    #[derive(Clone, Default)]
    struct HostState {
        failures_left: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    async fn customers(
        State(state): State<HostState>,
        headers: axum::http::HeaderMap,
        Query(params): Query<std::collections::HashMap<String, String>>,
    ) -> Result<Json<Value>, AxumStatus> {
        state.calls.fetch_add(1, Ordering::SeqCst);
        if state
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AxumStatus::SERVICE_UNAVAILABLE);
        }
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
            return Err(AxumStatus::UNAUTHORIZED);
        }
        let body = match params.get("member_id").map(String::as_str) {
            Some("alice123") => json!({"customers": [{"email": "alice@example.com"}]}),
            Some("guest") => json!({"customers": [{"email": null}]}),
            _ => json!({"customers": []}),
        };
        Ok(Json(body))
    }

    async fn spawn_host(state: HostState) -> String {
        let app = Router::new()
            .route("/api/v2/admin/customers", get(customers))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn lookup(base_url: String, credentials: Arc<dyn CredentialStore>) -> HostIdentityLookup {
        HostIdentityLookup::new(
            HostApiConfig {
                base_url,
                max_retries: 3,
                timeout_secs: 5,
                ..Default::default()
            },
            credentials,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_returns_email() {
        let base = spawn_host(HostState::default()).await;
        let client = lookup(base, Arc::new(FixedToken));

        assert_eq!(
            client.customer_email("S1", "alice123").await.unwrap(),
            Some("alice@example.com".to_string())
        );
        assert_eq!(client.customer_email("S1", "guest").await.unwrap(), None);
        assert_eq!(client.customer_email("S1", "nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_retries_server_errors() {
        let state = HostState::default();
        state.failures_left.store(2, Ordering::SeqCst);
        let base = spawn_host(state.clone()).await;

        let email = lookup(base, Arc::new(FixedToken))
            .customer_email("S1", "alice123")
            .await
            .unwrap();

        assert_eq!(email.as_deref(), Some("alice@example.com"));
        assert_eq!(state.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_lookup_gives_up_after_max_retries() {
        let state = HostState::default();
        state.failures_left.store(100, Ordering::SeqCst);
        let base = spawn_host(state.clone()).await;

        let result = lookup(base, Arc::new(FixedToken))
            .customer_email("S1", "alice123")
            .await;

        assert!(matches!(result, Err(LookupError::Unavailable(_))));
        assert_eq!(state.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_rejected_token_is_not_retried() {
        struct WrongToken;

        #[async_trait]
        impl CredentialStore for WrongToken {
            async fn valid_token(&self, _shop_id: &str) -> Result<String, LookupError> {
                Ok("wrong".to_string())
            }
        }

        let state = HostState::default();
        let base = spawn_host(state.clone()).await;

        let result = lookup(base, Arc::new(WrongToken))
            .customer_email("S1", "alice123")
            .await;

        assert!(matches!(result, Err(LookupError::Credential(_))));
        assert_eq!(state.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_email_skips_blank() {
        let body: CustomersResponse = serde_json::from_value(json!({
            "customers": [{"email": " "}, {}, {"email": "b@example.com"}]
        }))
        .unwrap();
        assert_eq!(first_email(body), Some("b@example.com".to_string()));
    }
}
