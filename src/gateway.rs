//! Gateway facade over the provider adapters
//!
//! One adapter is selected at construction; every data operation routes
//! through the retry policy. With no resolvable provider the gateway runs in
//! degraded mode: reads return empty/absent values and deletion is a no-op.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::core::error::{ProviderError, Result};
use crate::core::model::{
    Account, Balance, HealthReport, Institution, ProviderKind, Transaction,
};
use crate::core::provider::BankProvider;
use crate::core::request::{
    AccountsRequest, BalanceRequest, DeleteAccountsRequest, InstitutionsRequest,
    TransactionsRequest,
};
use crate::providers::{GoCardlessProvider, PlaidProvider, StripeProvider, TellerProvider};
use crate::retry::RetryPolicy;

pub struct Gateway {
    active: Option<Box<dyn BankProvider>>,
    retry: RetryPolicy,
    config: AppConfig,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("active", &self.active.as_ref().map(|p| p.kind()))
            .field("retry", &self.retry)
            .field("config", &self.config)
            .finish()
    }
}

/// Builds one adapter from the credential bundle, failing when the selected
/// provider's credentials are missing or blank.
fn build_provider(kind: ProviderKind, config: &AppConfig) -> Result<Box<dyn BankProvider>> {
    let base_url = config.base_url(kind);

    fn credential(value: &str, field: &str, kind: ProviderKind) -> Result<()> {
        if value.is_empty() {
            Err(ProviderError::Validation(format!(
                "{kind} credential {field} is empty"
            )))
        } else {
            Ok(())
        }
    }

    match kind {
        ProviderKind::Plaid => {
            let creds = config.providers.plaid.as_ref().ok_or_else(|| {
                ProviderError::Validation("plaid credentials are not configured".to_string())
            })?;
            credential(&creds.client_id, "client_id", kind)?;
            credential(&creds.secret, "secret", kind)?;
            Ok(Box::new(PlaidProvider::new(
                &base_url,
                &creds.client_id,
                &creds.secret,
            )))
        }
        ProviderKind::Teller => {
            // Teller authenticates per request with enrollment tokens; the
            // bundle only carries connection settings.
            config.providers.teller.as_ref().ok_or_else(|| {
                ProviderError::Validation("teller is not configured".to_string())
            })?;
            Ok(Box::new(TellerProvider::new(&base_url)))
        }
        ProviderKind::GoCardless => {
            let creds = config.providers.gocardless.as_ref().ok_or_else(|| {
                ProviderError::Validation("gocardless credentials are not configured".to_string())
            })?;
            credential(&creds.access_token, "access_token", kind)?;
            Ok(Box::new(GoCardlessProvider::new(
                &base_url,
                &creds.access_token,
            )))
        }
        ProviderKind::Stripe => {
            let creds = config.providers.stripe.as_ref().ok_or_else(|| {
                ProviderError::Validation("stripe credentials are not configured".to_string())
            })?;
            credential(&creds.secret_key, "secret_key", kind)?;
            Ok(Box::new(StripeProvider::new(
                &base_url,
                &creds.secret_key,
                creds.api_version.clone(),
            )))
        }
    }
}

impl Gateway {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::with_retry(config, RetryPolicy::default())
    }

    pub fn with_retry(config: &AppConfig, retry: RetryPolicy) -> Result<Self> {
        let active = match config.provider.as_deref() {
            None | Some("") => {
                warn!("No provider configured; gateway runs in degraded mode");
                None
            }
            Some(name) => match name.parse::<ProviderKind>() {
                Ok(kind) => Some(build_provider(kind, config)?),
                Err(_) => {
                    warn!(provider = name, "Unknown provider; gateway runs in degraded mode");
                    None
                }
            },
        };

        Ok(Gateway {
            active,
            retry,
            config: config.clone(),
        })
    }

    pub fn active_provider(&self) -> Option<ProviderKind> {
        self.active.as_ref().map(|provider| provider.kind())
    }

    pub async fn get_transactions(&self, request: &TransactionsRequest) -> Result<Vec<Transaction>> {
        let Some(provider) = &self.active else {
            debug!("Degraded mode: returning no transactions");
            return Ok(Vec::new());
        };
        self.retry.run(|| provider.get_transactions(request)).await
    }

    pub async fn get_accounts(&self, request: &AccountsRequest) -> Result<Vec<Account>> {
        let Some(provider) = &self.active else {
            debug!("Degraded mode: returning no accounts");
            return Ok(Vec::new());
        };
        self.retry.run(|| provider.get_accounts(request)).await
    }

    pub async fn get_account_balance(&self, request: &BalanceRequest) -> Result<Option<Balance>> {
        let Some(provider) = &self.active else {
            debug!("Degraded mode: balance not found");
            return Ok(None);
        };
        self.retry
            .run(|| provider.get_account_balance(request))
            .await
    }

    pub async fn get_institutions(&self, request: &InstitutionsRequest) -> Result<Vec<Institution>> {
        let Some(provider) = &self.active else {
            debug!("Degraded mode: returning no institutions");
            return Ok(Vec::new());
        };
        self.retry.run(|| provider.get_institutions(request)).await
    }

    pub async fn delete_accounts(&self, request: &DeleteAccountsRequest) -> Result<()> {
        let Some(provider) = &self.active else {
            debug!("Degraded mode: nothing to deregister");
            return Ok(());
        };
        self.retry.run(|| provider.delete_accounts(request)).await
    }

    /// Probes every provider variant concurrently, ignoring which one is
    /// active. Each probe absorbs its own faults (a variant without
    /// credentials simply reports unhealthy); only a fault in the fan-out
    /// itself fails the call.
    pub async fn health_check(&self) -> Result<HealthReport> {
        let handles = ProviderKind::ALL.map(|kind| {
            let provider = build_provider(kind, &self.config).ok();
            tokio::spawn(async move {
                match provider {
                    Some(provider) => provider.health_check().await,
                    None => false,
                }
            })
        });

        // All probes must complete before the report goes out.
        let joined = join_all(handles).await;
        let mut healthy = [false; 4];
        for (index, result) in joined.into_iter().enumerate() {
            healthy[index] = result.map_err(|e| {
                ProviderError::Internal(format!("health fan-out task failed: {e}"))
            })?;
            debug!(provider = %ProviderKind::ALL[index], healthy = healthy[index], "Health probe finished");
        }

        let [plaid, teller, gocardless, stripe] = healthy;
        Ok(HealthReport {
            plaid,
            teller,
            gocardless,
            stripe,
        })
    }
}
