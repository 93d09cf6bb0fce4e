//! r2e-ledger - Review-to-earn reward ledger
//!
//! Turns shop reviews into referral links and reconciles host webhooks
//! (review created, order placed, app uninstalled) into idempotent point
//! credits on a ledger with guarded withdrawals.

pub mod api;
pub mod clients;
pub mod config;
pub mod ledger;
pub mod model;
pub mod rates;
pub mod reconciler;
pub mod referral;
pub mod reward;
pub mod storage;
pub mod utils;
