//! Ledger configuration.
//!
//! One `Config` value holds server, storage, reward policy and host API
//! settings. It is read from YAML and `R2E_*` environment variables once at
//! startup and validated before any component is built.

mod host;
mod rewards;
mod server;
mod storage;

pub use host::HostApiConfig;
pub use rewards::RewardConfig;
pub use server::ServerConfig;
pub use storage::{StorageConfig, StorageType};

/// YAML file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Names an additional YAML file to layer on top.
pub const CONFIG_ENV_VAR: &str = "R2E_CONFIG";
/// Prefix of per-field overrides, e.g. `R2E_REWARDS__MIN_WITHDRAWAL`.
pub const CONFIG_ENV_PREFIX: &str = "R2E";
/// Tracing filter directive.
pub const LOG_ENV_VAR: &str = "R2E_LOG";

use serde::Deserialize;

use crate::rates::RateError;

/// Errors from configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Rate(#[from] RateError),

    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: i64 },

    #[error("{name} must be within 1..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        max: i64,
    },

    #[error("referral_param must not be empty")]
    EmptyReferralParam,
}

/// Longest point lifetime accepted, about a century.
pub const MAX_POINT_EXPIRY_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    /// Reward program policy.
    pub rewards: RewardConfig,
    /// Host customer API.
    pub host_api: HostApiConfig,
}

impl Config {
    /// Layer sources lowest to highest priority: `config.yaml` if present,
    /// then `path`, then the file named by `R2E_CONFIG`, then `R2E_*`
    /// variables. The merged result is validated.
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let explicit = path
            .map(str::to_string)
            .into_iter()
            .chain(std::env::var(CONFIG_ENV_VAR).ok());

        let mut sources = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));
        for file in explicit {
            sources = sources.add_source(File::new(&file, FileFormat::Yaml).required(true));
        }

        let merged = sources
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = merged.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject policy values that would break reward invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rewards = &self.rewards;
        rewards.default_rates.validate("default_rates")?;
        rewards.shop_fallback.validate("shop_fallback")?;

        if rewards.min_withdrawal <= 0 {
            return Err(ConfigError::NotPositive {
                name: "min_withdrawal",
                value: rewards.min_withdrawal,
            });
        }
        if !(1..=MAX_POINT_EXPIRY_DAYS).contains(&rewards.point_expiry_days) {
            return Err(ConfigError::OutOfRange {
                name: "point_expiry_days",
                value: rewards.point_expiry_days,
                max: MAX_POINT_EXPIRY_DAYS,
            });
        }
        if rewards.referral_param.trim().is_empty() {
            return Err(ConfigError::EmptyReferralParam);
        }
        Ok(())
    }

    /// In-memory single-connection storage, everything else default.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.storage.path = ":memory:".to_string();
        config.storage.max_connections = 1;
        config
    }
}
