//! HTTP surface.
//!
//! Endpoints:
//! - `POST /webhooks`: host webhook events
//! - `GET /rates`: display rates for a shop/product
//! - `POST /clicks`: count a click on a shared link
//! - `POST /withdrawals`: reserve points for a payout
//! - `POST /withdrawals/:id/approve` and `/reject`: settle a payout
//! - `GET /accounts/:id/balance` and `/transactions`
//! - `PUT /shops/:shop_id` and `/shops/:shop_id/products/:product_id/rates`: shop administration
//! - `GET /health`

mod error;
mod handlers;


use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::reconciler::WebhookReconciler;
use crate::storage::ShopStore;

pub use error::ApiError;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<WebhookReconciler>,
    pub shops: Arc<dyn ShopStore>,
}

/// Start the HTTP server on `addr`.
///
/// When the port is 0, the OS assigns an ephemeral port. The actual bound
/// address is always logged so it can be discovered.
pub async fn serve(state: AppState, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(address = %local, "reward ledger API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    // Storefront scripts call /rates and /clicks from shop pages.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks", post(handlers::webhook))
        .route("/rates", get(handlers::rates))
        .route("/clicks", post(handlers::track_click))
        .route("/withdrawals", post(handlers::request_withdrawal))
        .route("/withdrawals/:id/approve", post(handlers::approve_withdrawal))
        .route("/withdrawals/:id/reject", post(handlers::reject_withdrawal))
        .route("/accounts/:id/balance", get(handlers::balance))
        .route("/accounts/:id/transactions", get(handlers::transactions))
        .route("/shops/:shop_id", put(handlers::upsert_shop))
        .route(
            "/shops/:shop_id/products/:product_id/rates",
            put(handlers::set_product_rates),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
