//! Process configuration.
//!
//! Sources, later overriding earlier:
//! 1. built-in defaults
//! 2. `tillbook.toml` in the working directory (if present)
//! 3. the file passed with `--config` (must exist)
//! 4. `TILLBOOK__SECTION__KEY` environment variables

use crate::application::confirmation::SettlementPolicy;
use crate::application::engine::EngineOptions;
use crate::error::{LedgerError, Result};
use crate::infrastructure::http_gateway::HttpGatewayConfig;
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name, looked up without an extension.
pub const DEFAULT_CONFIG_FILE: &str = "tillbook";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TILLBOOK";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub storage: StorageSettings,
    pub gateway: GatewaySettings,
    pub orders: OrdersSettings,
    pub ledger: LedgerSettings,
    pub reports: ReportsSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Without it the in-process sandbox gateway is used.
    pub base_url: Option<String>,
    pub access_token: String,
    pub notification_url: Option<String>,
    pub currency: String,
    pub timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: None,
            access_token: String::new(),
            notification_url: None,
            currency: "ARS".to_string(),
            timeout_secs: 10,
        }
    }
}

impl GatewaySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `None` when no hosted gateway is configured.
    pub fn http_config(&self) -> Option<HttpGatewayConfig> {
        let base_url = self.base_url.clone()?;
        Some(HttpGatewayConfig {
            base_url,
            access_token: self.access_token.clone(),
            notification_url: self.notification_url.clone(),
            currency: self.currency.clone(),
            timeout: self.timeout(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrdersSettings {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub commit_attempts: u32,
    pub settlement_attempts: u32,
    pub settlement_backoff_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            commit_attempts: 16,
            settlement_attempts: 5,
            settlement_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportsSettings {
    /// Restaurant's offset from UTC, used to cut day/week/month windows.
    pub utc_offset_minutes: i32,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        use ::config::{Config, Environment, File};

        let mut builder =
            Config::builder().add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn engine_options(&self) -> Result<EngineOptions> {
        let offset_secs = self.reports.utc_offset_minutes.checked_mul(60);
        let utc_offset = offset_secs
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                LedgerError::Validation(format!(
                    "reports.utc_offset_minutes out of range: {}",
                    self.reports.utc_offset_minutes
                ))
            })?;
        if self.ledger.commit_attempts == 0 || self.ledger.settlement_attempts == 0 {
            return Err(LedgerError::Validation(
                "ledger retry attempts must be at least 1".to_string(),
            ));
        }

        Ok(EngineOptions {
            commit_attempts: self.ledger.commit_attempts,
            settlement: SettlementPolicy {
                attempts: self.ledger.settlement_attempts,
                backoff: Duration::from_millis(self.ledger.settlement_backoff_ms),
            },
            utc_offset,
        })
    }
}
