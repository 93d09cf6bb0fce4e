//! Host platform API configuration.

use std::time::Duration;

use serde::Deserialize;

/// Where and how to reach the Host's customer directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostApiConfig {
    /// Base URL template; `{shop_id}` is replaced per request.
    pub base_url: String,
    /// Path of the customer search endpoint.
    pub customers_path: String,
    /// API version header value sent with each request. Empty to omit.
    pub api_version: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries for timeouts, connection errors, 429 and 5xx.
    pub max_retries: usize,
}

impl Default for HostApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://{shop_id}.example-host.com".to_string(),
            customers_path: "/api/v2/admin/customers".to_string(),
            api_version: String::new(),
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

impl HostApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the customer endpoint for a shop.
    pub fn customers_url(&self, shop_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url.replace("{shop_id}", shop_id).trim_end_matches('/'),
            self.customers_path
        )
    }
}
