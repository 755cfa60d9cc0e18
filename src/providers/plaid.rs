//! Plaid adapter
//!
//! Aggregator with body-level client_id/secret auth on every POST. Reports
//! amounts in major units with the sign convention "positive = money out";
//! transactions paginate by offset against a `total_transactions` count.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::core::error::Result;
use crate::core::model::{
    Account, AccountType, Balance, Institution, ProviderKind, Transaction, TransactionMethod,
    TransactionStatus,
};
use crate::core::provider::BankProvider;
use crate::core::request::{
    AccountsRequest, BalanceRequest, DeleteAccountsRequest, InstitutionsRequest,
    TransactionsRequest, require,
};
use crate::providers::util::{DEFAULT_TIMEOUT, HEALTH_TIMEOUT, client, send_json};

const PROVIDER: ProviderKind = ProviderKind::Plaid;

const PAGE_SIZE: u32 = 500;
const INSTITUTIONS_PAGE_SIZE: u32 = 500;

// Default lookback windows when the caller gives no date filter.
const FULL_WINDOW_DAYS: i64 = 730;
const LATEST_WINDOW_DAYS: i64 = 90;

pub struct PlaidProvider {
    base_url: String,
    client_id: String,
    secret: String,
}

impl PlaidProvider {
    pub fn new(base_url: &str, client_id: &str, secret: &str) -> Self {
        PlaidProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Every Plaid call is a POST whose body carries the credentials.
    fn post(
        &self,
        client: &reqwest::Client,
        path: &str,
        mut body: serde_json::Value,
    ) -> reqwest::RequestBuilder {
        body["client_id"] = json!(self.client_id);
        body["secret"] = json!(self.secret);
        client.post(format!("{}{path}", self.base_url)).json(&body)
    }
}

#[derive(Debug, Deserialize)]
struct TransactionsPage {
    transactions: Vec<PlaidTransaction>,
    total_transactions: u64,
}

#[derive(Debug, Deserialize)]
struct PlaidTransaction {
    transaction_id: String,
    /// Major units; positive means money leaving the account.
    amount: f64,
    iso_currency_code: Option<String>,
    unofficial_currency_code: Option<String>,
    date: String,
    name: String,
    merchant_name: Option<String>,
    pending: bool,
    #[serde(default)]
    category: Option<Vec<String>>,
    transaction_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<PlaidAccount>,
    item: PlaidItem,
}

#[derive(Debug, Deserialize)]
struct PlaidItem {
    institution_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaidAccount {
    account_id: String,
    name: String,
    official_name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    balances: PlaidBalances,
}

#[derive(Debug, Deserialize)]
struct PlaidBalances {
    available: Option<f64>,
    current: Option<f64>,
    iso_currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstitutionsResponse {
    institutions: Vec<PlaidInstitution>,
}

#[derive(Debug, Deserialize)]
struct InstitutionResponse {
    institution: PlaidInstitution,
}

#[derive(Debug, Deserialize)]
struct PlaidInstitution {
    institution_id: String,
    name: String,
    logo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoveItemResponse {
    #[allow(dead_code)]
    request_id: String,
}

fn map_method(code: Option<&str>) -> TransactionMethod {
    match code {
        Some("purchase") | Some("bill payment") | Some("direct debit") | Some("standing order") => {
            TransactionMethod::Payment
        }
        Some("transfer") => TransactionMethod::Transfer,
        Some("bank charge") => TransactionMethod::Fee,
        Some("adjustment") => TransactionMethod::Adjustment,
        Some("cashback") => TransactionMethod::Refund,
        _ => TransactionMethod::Other,
    }
}

fn map_account_type(kind: &str) -> AccountType {
    match kind {
        "depository" => AccountType::Depository,
        "credit" => AccountType::Credit,
        "loan" => AccountType::Loan,
        "investment" | "brokerage" => AccountType::OtherAsset,
        _ => AccountType::OtherLiability,
    }
}

fn currency_of(iso: &Option<String>, unofficial: &Option<String>) -> String {
    iso.clone()
        .or_else(|| unofficial.clone())
        .unwrap_or_else(|| "USD".to_string())
}

fn transform_transaction(raw: &PlaidTransaction) -> Transaction {
    Transaction {
        id: raw.transaction_id.clone(),
        amount: raw.amount.abs(),
        currency: currency_of(&raw.iso_currency_code, &raw.unofficial_currency_code),
        date: raw.date.clone(),
        status: if raw.pending {
            TransactionStatus::Pending
        } else {
            TransactionStatus::Posted
        },
        balance: None,
        category: raw
            .category
            .as_ref()
            .and_then(|categories| categories.first().cloned()),
        method: map_method(raw.transaction_code.as_deref()),
        name: raw.name.clone(),
        description: raw.merchant_name.clone(),
        currency_rate: None,
        currency_source: None,
    }
}

fn transform_account(raw: &PlaidAccount, institution: Option<&Institution>) -> Account {
    Account {
        id: raw.account_id.clone(),
        name: raw.official_name.clone().unwrap_or_else(|| raw.name.clone()),
        currency: currency_of(&raw.balances.iso_currency_code, &None),
        provider: PROVIDER,
        institution: institution.cloned(),
        kind: map_account_type(&raw.kind),
        enrollment_id: None,
        routing_number: None,
    }
}

#[async_trait]
impl BankProvider for PlaidProvider {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    #[instrument(name = "PlaidTransactions", skip(self, request), fields(account = %request.account_id))]
    async fn get_transactions(&self, request: &TransactionsRequest) -> Result<Vec<Transaction>> {
        let access_token = require(request.access_token.as_deref(), "access_token")?;
        let account_id = require(Some(request.account_id.as_str()), "account_id")?;

        let today = Utc::now().date_naive();
        let window = if request.latest {
            LATEST_WINDOW_DAYS
        } else {
            FULL_WINDOW_DAYS
        };
        let start_date = request.start_date.unwrap_or(today - Duration::days(window));
        let end_date = request.end_date.unwrap_or(today);

        let client = client(DEFAULT_TIMEOUT)?;
        let page_size = request.limit.unwrap_or(PAGE_SIZE).min(PAGE_SIZE);
        let single_page = request.limit.is_some() || request.latest;
        let mut offset = 0u64;
        let mut transactions: Vec<Transaction> = Vec::new();

        loop {
            let body = json!({
                "access_token": access_token,
                "start_date": start_date.format("%Y-%m-%d").to_string(),
                "end_date": end_date.format("%Y-%m-%d").to_string(),
                "options": {
                    "account_ids": [account_id],
                    "count": page_size,
                    "offset": offset,
                },
            });

            debug!(offset, "Requesting transaction page from /transactions/get");
            let page: TransactionsPage =
                send_json(PROVIDER, self.post(&client, "/transactions/get", body)).await?;

            if page.transactions.is_empty() {
                // The provider may still advertise a larger total; an empty
                // page cannot advance the offset, so stop here.
                if transactions.len() < page.total_transactions as usize {
                    warn!(
                        total = page.total_transactions,
                        fetched = transactions.len(),
                        "Offset walk ended early on an empty page"
                    );
                }
                break;
            }

            offset += page.transactions.len() as u64;
            transactions.extend(page.transactions.iter().map(transform_transaction));

            if single_page || offset >= page.total_transactions {
                break;
            }
        }

        Ok(transactions)
    }

    async fn get_accounts(&self, request: &AccountsRequest) -> Result<Vec<Account>> {
        let access_token = require(request.access_token.as_deref(), "access_token")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let response: AccountsResponse = send_json(
            PROVIDER,
            self.post(&client, "/accounts/get", json!({"access_token": access_token})),
        )
        .await?;

        let institution = match response.item.institution_id {
            Some(institution_id) => {
                let country = request.country_code.as_deref().unwrap_or("US");
                let body = json!({
                    "institution_id": institution_id,
                    "country_codes": [country],
                    "options": {"include_optional_metadata": true},
                });
                let lookup: InstitutionResponse =
                    send_json(PROVIDER, self.post(&client, "/institutions/get_by_id", body))
                        .await?;
                Some(Institution {
                    id: lookup.institution.institution_id,
                    name: lookup.institution.name,
                    logo: lookup.institution.logo,
                    provider: PROVIDER,
                })
            }
            None => None,
        };

        Ok(response
            .accounts
            .iter()
            .map(|account| transform_account(account, institution.as_ref()))
            .collect())
    }

    async fn get_account_balance(&self, request: &BalanceRequest) -> Result<Option<Balance>> {
        let access_token = require(request.access_token.as_deref(), "access_token")?;
        let account_id = require(Some(request.account_id.as_str()), "account_id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let body = json!({
            "access_token": access_token,
            "options": {"account_ids": [account_id]},
        });
        let response: AccountsResponse = send_json(
            PROVIDER,
            self.post(&client, "/accounts/balance/get", body),
        )
        .await?;

        let Some(account) = response
            .accounts
            .iter()
            .find(|account| account.account_id == account_id)
        else {
            return Ok(None);
        };

        let Some(amount) = account.balances.available.or(account.balances.current) else {
            return Ok(None);
        };

        Ok(Some(Balance {
            amount,
            currency: currency_of(&account.balances.iso_currency_code, &None),
        }))
    }

    async fn get_institutions(&self, request: &InstitutionsRequest) -> Result<Vec<Institution>> {
        let country = request.country_code.as_deref().unwrap_or("US");

        let client = client(DEFAULT_TIMEOUT)?;
        let body = json!({
            "count": INSTITUTIONS_PAGE_SIZE,
            "offset": 0,
            "country_codes": [country],
            "options": {"include_optional_metadata": true},
        });
        let response: InstitutionsResponse =
            send_json(PROVIDER, self.post(&client, "/institutions/get", body)).await?;

        Ok(response
            .institutions
            .into_iter()
            .map(|institution| Institution {
                id: institution.institution_id,
                name: institution.name,
                logo: institution.logo,
                provider: PROVIDER,
            })
            .collect())
    }

    async fn delete_accounts(&self, request: &DeleteAccountsRequest) -> Result<()> {
        let access_token = require(request.access_token.as_deref(), "access_token")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let _: RemoveItemResponse = send_json(
            PROVIDER,
            self.post(&client, "/item/remove", json!({"access_token": access_token})),
        )
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let Ok(client) = client(HEALTH_TIMEOUT) else {
            return false;
        };
        let body = json!({
            "count": 1,
            "offset": 0,
            "country_codes": ["US"],
        });
        send_json::<InstitutionsResponse>(PROVIDER, self.post(&client, "/institutions/get", body))
            .await
            .is_ok()
    }
}
