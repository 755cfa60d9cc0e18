//! GoCardless bank-account-data adapter
//!
//! European aggregator. Auth is a pre-issued bearer token (the secret-id /
//! secret-key exchange happens outside this crate). Transactions arrive as
//! one booked + pending pair of arrays, unpaginated; accounts resolve
//! through a requisition.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::core::error::{ProviderError, Result};
use crate::core::model::{
    Account, AccountType, Balance, Institution, ProviderKind, Transaction, TransactionMethod,
    TransactionStatus,
};
use crate::core::provider::BankProvider;
use crate::core::request::{
    AccountsRequest, BalanceRequest, DeleteAccountsRequest, InstitutionsRequest,
    TransactionsRequest, require,
};
use crate::providers::util::{
    DEFAULT_TIMEOUT, HEALTH_TIMEOUT, client, parse_amount, send_json, send_ok,
};

const PROVIDER: ProviderKind = ProviderKind::GoCardless;

pub struct GoCardlessProvider {
    base_url: String,
    access_token: String,
}

impl GoCardlessProvider {
    pub fn new(base_url: &str, access_token: &str) -> Self {
        GoCardlessProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn get(&self, client: &reqwest::Client, path: &str) -> reqwest::RequestBuilder {
        client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct TransactionsEnvelope {
    transactions: TransactionBuckets,
}

#[derive(Debug, Deserialize)]
struct TransactionBuckets {
    #[serde(default)]
    booked: Vec<GoCardlessTransaction>,
    #[serde(default)]
    pending: Vec<GoCardlessTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoCardlessTransaction {
    transaction_id: Option<String>,
    internal_transaction_id: Option<String>,
    transaction_amount: AmountField,
    booking_date: Option<String>,
    value_date: Option<String>,
    creditor_name: Option<String>,
    debtor_name: Option<String>,
    remittance_information_unstructured: Option<String>,
    proprietary_bank_transaction_code: Option<String>,
    balance_after_transaction: Option<BalanceAfter>,
    currency_exchange: Option<CurrencyExchange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmountField {
    /// Signed decimal string, major units.
    amount: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceAfter {
    balance_amount: AmountField,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrencyExchange {
    exchange_rate: Option<String>,
    source_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Requisition {
    institution_id: String,
    accounts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AccountDetailsEnvelope {
    account: AccountDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountDetails {
    currency: String,
    name: Option<String>,
    product: Option<String>,
    owner_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalancesEnvelope {
    balances: Vec<GoCardlessBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoCardlessBalance {
    balance_amount: AmountField,
    balance_type: String,
}

#[derive(Debug, Deserialize)]
struct GoCardlessInstitution {
    id: String,
    name: String,
    logo: Option<String>,
}

fn map_method(code: Option<&str>) -> TransactionMethod {
    let Some(code) = code else {
        return TransactionMethod::Other;
    };
    let code = code.to_uppercase();
    if code.contains("REFUND") {
        TransactionMethod::Refund
    } else if code.contains("PAYMENT") {
        TransactionMethod::Payment
    } else if code.contains("TRANSFER") {
        TransactionMethod::Transfer
    } else if code.contains("FEE") || code.contains("CHARGE") {
        TransactionMethod::Fee
    } else {
        TransactionMethod::Other
    }
}

fn transform_transaction(
    raw: &GoCardlessTransaction,
    status: TransactionStatus,
) -> Result<Transaction> {
    let amount = parse_amount(PROVIDER, &raw.transaction_amount.amount)?.abs();
    let balance = match &raw.balance_after_transaction {
        Some(after) => Some(parse_amount(PROVIDER, &after.balance_amount.amount)?.abs()),
        None => None,
    };
    let currency_rate = match raw.currency_exchange.as_ref().and_then(|e| e.exchange_rate.as_deref())
    {
        Some(rate) => Some(parse_amount(PROVIDER, rate)?),
        None => None,
    };

    let name = raw
        .creditor_name
        .clone()
        .or_else(|| raw.debtor_name.clone())
        .or_else(|| raw.remittance_information_unstructured.clone())
        .unwrap_or_else(|| "No information".to_string());

    Ok(Transaction {
        id: raw
            .transaction_id
            .clone()
            .or_else(|| raw.internal_transaction_id.clone())
            .unwrap_or_default(),
        amount,
        currency: raw.transaction_amount.currency.clone(),
        date: raw
            .booking_date
            .clone()
            .or_else(|| raw.value_date.clone())
            .unwrap_or_default(),
        status,
        balance,
        category: None,
        method: map_method(raw.proprietary_bank_transaction_code.as_deref()),
        name,
        description: raw.remittance_information_unstructured.clone(),
        currency_rate,
        currency_source: raw
            .currency_exchange
            .as_ref()
            .and_then(|e| e.source_currency.clone()),
    })
}

#[async_trait]
impl BankProvider for GoCardlessProvider {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    async fn get_transactions(&self, request: &TransactionsRequest) -> Result<Vec<Transaction>> {
        let account_id = require(Some(request.account_id.as_str()), "account_id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(start) = request.start_date {
            query.push(("date_from", start.format("%Y-%m-%d").to_string()));
        } else if request.latest {
            // No paging here; "latest" narrows the window instead.
            let from = chrono::Utc::now().date_naive() - chrono::Duration::days(90);
            query.push(("date_from", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = request.end_date {
            query.push(("date_to", end.format("%Y-%m-%d").to_string()));
        }

        let path = format!("/api/v2/accounts/{account_id}/transactions/");
        debug!("Requesting transactions from {path}");
        let envelope: TransactionsEnvelope =
            send_json(PROVIDER, self.get(&client, &path).query(&query)).await?;

        let buckets = envelope.transactions;
        let mut transactions = Vec::with_capacity(buckets.booked.len() + buckets.pending.len());
        for raw in &buckets.booked {
            transactions.push(transform_transaction(raw, TransactionStatus::Posted)?);
        }
        for raw in &buckets.pending {
            transactions.push(transform_transaction(raw, TransactionStatus::Pending)?);
        }

        if let Some(limit) = request.limit {
            transactions.truncate(limit as usize);
        }

        Ok(transactions)
    }

    async fn get_accounts(&self, request: &AccountsRequest) -> Result<Vec<Account>> {
        let requisition_id = require(request.id.as_deref(), "id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let requisition: Requisition = send_json(
            PROVIDER,
            self.get(&client, &format!("/api/v2/requisitions/{requisition_id}/")),
        )
        .await?;

        let institution: GoCardlessInstitution = send_json(
            PROVIDER,
            self.get(
                &client,
                &format!("/api/v2/institutions/{}/", requisition.institution_id),
            ),
        )
        .await?;
        let institution = Institution {
            id: institution.id,
            name: institution.name,
            logo: institution.logo,
            provider: PROVIDER,
        };

        let mut accounts = Vec::with_capacity(requisition.accounts.len());
        for account_id in &requisition.accounts {
            let details: AccountDetailsEnvelope = send_json(
                PROVIDER,
                self.get(&client, &format!("/api/v2/accounts/{account_id}/details/")),
            )
            .await?;
            let details = details.account;

            accounts.push(Account {
                id: account_id.clone(),
                name: details
                    .name
                    .or(details.product)
                    .or(details.owner_name)
                    .unwrap_or_else(|| institution.name.clone()),
                currency: details.currency,
                provider: PROVIDER,
                institution: Some(institution.clone()),
                // Bank-account data only exposes payment accounts.
                kind: AccountType::Depository,
                enrollment_id: None,
                routing_number: None,
            });
        }

        Ok(accounts)
    }

    async fn get_account_balance(&self, request: &BalanceRequest) -> Result<Option<Balance>> {
        let account_id = require(Some(request.account_id.as_str()), "account_id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let path = format!("/api/v2/accounts/{account_id}/balances/");
        let envelope = match send_json::<BalancesEnvelope>(PROVIDER, self.get(&client, &path)).await
        {
            Ok(envelope) => envelope,
            Err(ProviderError::Http { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        let balance = envelope
            .balances
            .iter()
            .find(|b| b.balance_type == "interimAvailable")
            .or_else(|| envelope.balances.first());

        match balance {
            Some(raw) => Ok(Some(Balance {
                amount: parse_amount(PROVIDER, &raw.balance_amount.amount)?,
                currency: raw.balance_amount.currency.clone(),
            })),
            None => Ok(None),
        }
    }

    async fn get_institutions(&self, request: &InstitutionsRequest) -> Result<Vec<Institution>> {
        let country = require(request.country_code.as_deref(), "country_code")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let institutions: Vec<GoCardlessInstitution> = send_json(
            PROVIDER,
            self.get(&client, "/api/v2/institutions/")
                .query(&[("country", country)]),
        )
        .await?;

        Ok(institutions
            .into_iter()
            .map(|institution| Institution {
                id: institution.id,
                name: institution.name,
                logo: institution.logo,
                provider: PROVIDER,
            })
            .collect())
    }

    async fn delete_accounts(&self, request: &DeleteAccountsRequest) -> Result<()> {
        let requisition_id = require(request.account_id.as_deref(), "account_id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        send_ok(
            PROVIDER,
            client
                .delete(format!(
                    "{}/api/v2/requisitions/{requisition_id}/",
                    self.base_url
                ))
                .bearer_auth(&self.access_token),
        )
        .await
    }

    async fn health_check(&self) -> bool {
        let Ok(client) = client(HEALTH_TIMEOUT) else {
            return false;
        };
        send_ok(
            PROVIDER,
            self.get(&client, "/api/v2/institutions/")
                .query(&[("country", "GB"), ("limit", "1")]),
        )
        .await
        .is_ok()
    }
}
