use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::core::model::ProviderKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Sandbox,
    Production,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlaidConfig {
    pub client_id: String,
    pub secret: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct TellerConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GoCardlessConfig {
    /// Pre-issued bearer token; the secret-id/key exchange lives outside
    /// this crate.
    pub access_token: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_version: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub plaid: Option<PlaidConfig>,
    pub teller: Option<TellerConfig>,
    pub gocardless: Option<GoCardlessConfig>,
    pub stripe: Option<StripeConfig>,
}

/// Default API hosts per provider and environment. Only Plaid splits its
/// hosts by environment; the rest separate environments by credential.
pub fn default_base_url(kind: ProviderKind, environment: Environment) -> &'static str {
    match kind {
        ProviderKind::Plaid => match environment {
            Environment::Development => "https://development.plaid.com",
            Environment::Sandbox => "https://sandbox.plaid.com",
            Environment::Production => "https://production.plaid.com",
        },
        ProviderKind::Teller => "https://api.teller.io",
        ProviderKind::GoCardless => "https://bankaccountdata.gocardless.com",
        ProviderKind::Stripe => "https://api.stripe.com",
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Active provider discriminant. Free-form on purpose: an unknown or
    /// absent value leaves the gateway in degraded mode instead of failing
    /// config parsing.
    pub provider: Option<String>,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "finbridge", "finbridge")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Resolved base URL for one provider, honoring a per-provider override.
    pub fn base_url(&self, kind: ProviderKind) -> String {
        let override_url = match kind {
            ProviderKind::Plaid => self
                .providers
                .plaid
                .as_ref()
                .and_then(|c| c.base_url.clone()),
            ProviderKind::Teller => self
                .providers
                .teller
                .as_ref()
                .and_then(|c| c.base_url.clone()),
            ProviderKind::GoCardless => self
                .providers
                .gocardless
                .as_ref()
                .and_then(|c| c.base_url.clone()),
            ProviderKind::Stripe => self
                .providers
                .stripe
                .as_ref()
                .and_then(|c| c.base_url.clone()),
        };
        override_url.unwrap_or_else(|| default_base_url(kind, self.environment).to_string())
    }
}
