//! Canonical data shapes every provider adapter must produce

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::core::error::ProviderError;

/// The closed set of supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Plaid,
    Teller,
    GoCardless,
    Stripe,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Plaid,
        ProviderKind::Teller,
        ProviderKind::GoCardless,
        ProviderKind::Stripe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Plaid => "plaid",
            ProviderKind::Teller => "teller",
            ProviderKind::GoCardless => "gocardless",
            ProviderKind::Stripe => "stripe",
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plaid" => Ok(ProviderKind::Plaid),
            "teller" => Ok(ProviderKind::Teller),
            "gocardless" => Ok(ProviderKind::GoCardless),
            "stripe" => Ok(ProviderKind::Stripe),
            _ => Err(ProviderError::Validation(format!("unknown provider: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Depository,
    Credit,
    OtherAsset,
    Loan,
    OtherLiability,
}

impl Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AccountType::Depository => "depository",
            AccountType::Credit => "credit",
            AccountType::OtherAsset => "other_asset",
            AccountType::Loan => "loan",
            AccountType::OtherLiability => "other_liability",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Posted,
    Pending,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Posted => write!(f, "posted"),
            TransactionStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Normalized payment method. Providers use wildly different native
/// vocabularies; anything a mapping table cannot place lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMethod {
    Payment,
    Refund,
    Transfer,
    Payout,
    Adjustment,
    Fee,
    Other,
}

impl Display for TransactionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransactionMethod::Payment => "payment",
            TransactionMethod::Refund => "refund",
            TransactionMethod::Transfer => "transfer",
            TransactionMethod::Payout => "payout",
            TransactionMethod::Adjustment => "adjustment",
            TransactionMethod::Fee => "fee",
            TransactionMethod::Other => "other",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    pub id: String,
    pub name: String,
    pub logo: Option<String>,
    pub provider: ProviderKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    /// ISO 4217 currency code.
    pub currency: String,
    pub provider: ProviderKind,
    pub institution: Option<Institution>,
    #[serde(rename = "type")]
    pub kind: AccountType,
    /// Aggregator enrollment reference (Teller only).
    pub enrollment_id: Option<String>,
    /// Bank routing number (Stripe only).
    pub routing_number: Option<String>,
}

/// A normalized transaction. `amount` is always non-negative and in major
/// currency units; direction lives in `method` and `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    /// ISO-8601 date or datetime, as granular as the provider reports.
    pub date: String,
    pub status: TransactionStatus,
    /// Running balance after this transaction, when the provider reports one.
    pub balance: Option<f64>,
    pub category: Option<String>,
    pub method: TransactionMethod,
    pub name: String,
    pub description: Option<String>,
    pub currency_rate: Option<f64>,
    pub currency_source: Option<String>,
}

/// Current balance only; no history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: f64,
    pub currency: String,
}

/// Liveness of every known provider. One flag per variant, always fully
/// populated; a probe failure shows up as `false`, never as a missing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub plaid: bool,
    pub teller: bool,
    pub gocardless: bool,
    pub stripe: bool,
}

impl HealthReport {
    pub fn entries(&self) -> [(ProviderKind, bool); 4] {
        [
            (ProviderKind::Plaid, self.plaid),
            (ProviderKind::Teller, self.teller),
            (ProviderKind::GoCardless, self.gocardless),
            (ProviderKind::Stripe, self.stripe),
        ]
    }

    pub fn all_healthy(&self) -> bool {
        self.plaid && self.teller && self.gocardless && self.stripe
    }
}
