//! r2e-ledger: webhook receiver and reward API
//!
//! ## Architecture
//! ```text
//! [Host webhooks] --POST /webhooks--> [r2e-ledger] --> SQLite
//!                                          |
//!                                          v
//!                               [Host customer API]
//! ```
//!
//! ## Configuration
//! - R2E_CONFIG: Path to a YAML config file (optional)
//! - R2E_SERVER__PORT, R2E_STORAGE__PATH, ...: per-field overrides
//! - R2E_LOG: tracing filter (default: info)

use std::sync::Arc;

use tracing::info;

use r2e_ledger::api::{self, AppState};
use r2e_ledger::clients::{HostIdentityLookup, StoredCredentials};
use r2e_ledger::config::Config;
use r2e_ledger::reconciler::WebhookReconciler;
use r2e_ledger::storage::init_storage;
use r2e_ledger::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let stores = init_storage(&config.storage).await?;

    let credentials = Arc::new(StoredCredentials::new(stores.shops.clone()));
    let identity = Arc::new(HostIdentityLookup::new(config.host_api.clone(), credentials)?);
    let reconciler = WebhookReconciler::new(&stores, identity, &config.rewards);

    info!(
        fee_policy = ?config.rewards.fee_policy,
        min_withdrawal = config.rewards.min_withdrawal,
        "r2e-ledger started"
    );

    let state = AppState {
        reconciler: Arc::new(reconciler),
        shops: stores.shops,
    };
    api::serve(state, &config.server.bind_address()).await
}
