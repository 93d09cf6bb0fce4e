//! Typed webhook payloads.
//!
//! Bodies are parsed into a closed set of events at the boundary. Host ids
//! arrive as either JSON strings or numbers and are kept as strings.

use std::collections::HashMap;

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::ReconcileError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WebhookEvent {
    ReviewCreated(ReviewCreated),
    OrderPlaced(OrderPlaced),
    AppUninstalled(AppUninstalled),
}

impl WebhookEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::ReviewCreated(_) => "review_created",
            WebhookEvent::OrderPlaced(_) => "order_placed",
            WebhookEvent::AppUninstalled(_) => "app_uninstalled",
        }
    }

    pub fn shop_id(&self) -> &str {
        match self {
            WebhookEvent::ReviewCreated(e) => &e.shop_id,
            WebhookEvent::OrderPlaced(e) => &e.shop_id,
            WebhookEvent::AppUninstalled(e) => &e.shop_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCreated {
    #[serde(deserialize_with = "string_or_number")]
    pub shop_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub board_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub product_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub member_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub rating: Option<i32>,
}

impl ReviewCreated {
    pub fn validate(&self) -> Result<(), ReconcileError> {
        require("shop_id", &self.shop_id)?;
        require("board_id", &self.board_id)?;
        require("product_id", &self.product_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(deserialize_with = "string_or_number")]
    pub product_id: String,
    /// Unit price in minor currency units.
    pub price: i64,
    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 {
    1
}

impl OrderItem {
    /// `price * quantity`, or `None` on overflow.
    pub fn line_amount(&self) -> Option<i64> {
        self.price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    #[serde(deserialize_with = "string_or_number")]
    pub shop_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Metadata key that always carries a referral code, whatever the URL
/// parameter is configured to.
pub const METADATA_CODE_KEY: &str = "referral_code";

impl OrderPlaced {
    pub fn validate(&self) -> Result<(), ReconcileError> {
        require("shop_id", &self.shop_id)?;
        require("order_id", &self.order_id)?;
        if self.items.is_empty() {
            return Err(ReconcileError::Invalid("order has no items".to_string()));
        }
        for item in &self.items {
            require("items[].product_id", &item.product_id)?;
            if item.price < 0 || item.quantity < 0 {
                return Err(ReconcileError::Invalid(format!(
                    "negative price or quantity for product {}",
                    item.product_id
                )));
            }
            if item.line_amount().is_none() {
                return Err(ReconcileError::Invalid(format!(
                    "line amount overflows for product {}",
                    item.product_id
                )));
            }
        }
        Ok(())
    }

    /// Raw referral code from metadata, falling back to the referer's
    /// `param` query parameter. Not normalized.
    pub fn referral_code(&self, param: &str) -> Option<String> {
        [METADATA_CODE_KEY, param]
            .iter()
            .find_map(|key| self.metadata.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.referer
                    .as_deref()
                    .and_then(|referer| code_from_referer(referer, param))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppUninstalled {
    #[serde(deserialize_with = "string_or_number")]
    pub shop_id: String,
}

/// Query parameter `param` of a referer, which may be absolute or a bare path.
pub fn code_from_referer(referer: &str, param: &str) -> Option<String> {
    let url = Url::parse(referer)
        .or_else(|_| Url::parse("http://referer.invalid/").and_then(|base| base.join(referer)))
        .ok()?;

    let code = url
        .query_pairs()
        .find(|(key, _)| key == param)
        .map(|(_, value)| value.trim().to_string())
        .filter(|code| !code.is_empty());
    code
}

fn require(field: &str, value: &str) -> Result<(), ReconcileError> {
    if value.trim().is_empty() {
        return Err(ReconcileError::Invalid(format!("{field} is required")));
    }
    Ok(())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
