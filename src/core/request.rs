//! Request shapes for the gateway operations
//!
//! One struct per operation, shared by every adapter. Fields beyond the
//! primary identifier are optional; each adapter checks the subset it
//! actually needs before touching the network.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::error::{ProviderError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionsRequest {
    /// Provider-side account identifier.
    pub account_id: String,
    /// End-user access token (Plaid, Teller).
    pub access_token: Option<String>,
    /// Customer identifier (Stripe).
    pub customer_id: Option<String>,
    /// Fetch only the most recent activity instead of the full history.
    #[serde(default)]
    pub latest: bool,
    /// Page size cap. When set the adapter fetches a single page.
    pub limit: Option<u32>,
    /// Cursor into a previous page (Stripe, Teller).
    pub starting_after: Option<String>,
    /// Currency filter (Stripe).
    pub currency: Option<String>,
    /// Inclusive date window (Plaid, GoCardless).
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsRequest {
    /// Requisition/link identifier (GoCardless).
    pub id: Option<String>,
    pub country_code: Option<String>,
    /// End-user access token (Plaid, Teller).
    pub access_token: Option<String>,
    pub institution_id: Option<String>,
    /// Connected account identifier (Stripe).
    pub customer_id: Option<String>,
    /// External bank-account identifier (Stripe).
    pub bank_account_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceRequest {
    pub account_id: String,
    /// End-user access token (Plaid, Teller).
    pub access_token: Option<String>,
    /// External bank-account identifier (Stripe).
    pub bank_account_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstitutionsRequest {
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteAccountsRequest {
    /// Account or requisition identifier (GoCardless, Teller, Stripe).
    pub account_id: Option<String>,
    /// End-user access token (Plaid, Teller).
    pub access_token: Option<String>,
}

/// Unwraps a required optional field, failing with a `Validation` error that
/// names it. Adapters call this before issuing any request.
pub fn require<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ProviderError::Validation(format!("{field} is required"))),
    }
}

/// Validates a set of required fields at once so the error names every
/// offender, not just the first.
pub fn require_all(fields: &[(&str, Option<&str>)]) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.map_or(true, str::is_empty))
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}
