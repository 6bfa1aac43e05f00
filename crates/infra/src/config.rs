//! Process configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional
//! `construcbill.toml` in the working directory, then `CONSTRUCBILL__*`
//! environment variables (a `.env` file is loaded first when present).

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use construcbill_billing::DEFAULT_TAX_RATE_PERCENT;
use construcbill_parties::DEFAULT_INVOICE_PREFIX;

const DEV_JWT_SECRET: &str = "construcbill-dev-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HS256 secret for bearer tokens.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Postgres URL; the in-memory stores are used when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Tax rate for companies that configure none.
    #[serde(default = "default_tax_rate_percent")]
    pub default_tax_rate_percent: Decimal,

    /// Invoice prefix for companies that configure none.
    #[serde(default = "default_invoice_prefix")]
    pub default_invoice_prefix: String,

    /// Root that server-side image paths must resolve into. Ingesting
    /// images by path is refused when unset.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_jwt_secret() -> String {
    DEV_JWT_SECRET.to_string()
}

fn default_tax_rate_percent() -> Decimal {
    DEFAULT_TAX_RATE_PERCENT
}

fn default_invoice_prefix() -> String {
    DEFAULT_INVOICE_PREFIX.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            jwt_secret: default_jwt_secret(),
            database_url: None,
            default_tax_rate_percent: default_tax_rate_percent(),
            default_invoice_prefix: default_invoice_prefix(),
            upload_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("construcbill").required(false))
            .add_source(Environment::with_prefix("CONSTRUCBILL").separator("__"))
            .build()?;

        let cfg: AppConfig = config.try_deserialize()?;
        if cfg.uses_dev_secret() {
            tracing::warn!("CONSTRUCBILL__JWT_SECRET is not set; using the development secret");
        }
        Ok(cfg)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.default_tax_rate_percent.to_string(), "8.25");
        assert_eq!(cfg.default_invoice_prefix, "INV/");
        assert!(cfg.database_url.is_none());
        assert!(cfg.upload_dir.is_none());
        assert!(cfg.uses_dev_secret());
    }

    #[test]
    fn empty_source_falls_back_to_defaults() {
        let cfg: AppConfig = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
    }
}
