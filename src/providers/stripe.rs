//! Stripe adapter
//!
//! The one payment processor among the providers. Models a single external
//! bank-account resource per connected account, reports amounts in minor
//! units, and has no institution concept at all.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::core::error::{ProviderError, Result};
use crate::core::model::{
    Account, AccountType, Balance, Institution, ProviderKind, Transaction, TransactionMethod,
    TransactionStatus,
};
use crate::core::provider::BankProvider;
use crate::core::request::{
    AccountsRequest, BalanceRequest, DeleteAccountsRequest, InstitutionsRequest,
    TransactionsRequest, require, require_all,
};
use crate::providers::util::{DEFAULT_TIMEOUT, HEALTH_TIMEOUT, client, send_json, send_ok};

const PROVIDER: ProviderKind = ProviderKind::Stripe;

// Stripe caps list endpoints at 100 items per page.
const MAX_PAGE_SIZE: u32 = 100;

pub struct StripeProvider {
    base_url: String,
    secret_key: String,
    api_version: Option<String>,
}

impl StripeProvider {
    pub fn new(base_url: &str, secret_key: &str, api_version: Option<String>) -> Self {
        StripeProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            api_version,
        }
    }

    fn request(&self, client: &reqwest::Client, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.secret_key);
        if let Some(version) = &self.api_version {
            builder = builder.header("Stripe-Version", version);
        }
        builder
    }
}

#[derive(Debug, Deserialize)]
struct TransactionPage {
    data: Vec<StripeTransaction>,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct StripeTransaction {
    id: String,
    /// Minor units, signed.
    amount: i64,
    currency: String,
    /// Unix epoch seconds.
    created: i64,
    #[serde(rename = "type")]
    kind: String,
    description: Option<String>,
    reporting_category: Option<String>,
    /// Net amount after fees, minor units.
    net: i64,
    exchange_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StripeBankAccount {
    id: String,
    bank_name: Option<String>,
    last4: String,
    currency: String,
    routing_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeBalance {
    available: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    /// Minor units.
    amount: i64,
    currency: String,
}

fn map_method(kind: &str) -> TransactionMethod {
    match kind {
        "charge" | "payment" => TransactionMethod::Payment,
        "refund" | "payment_refund" => TransactionMethod::Refund,
        "transfer" => TransactionMethod::Transfer,
        "payout" => TransactionMethod::Payout,
        "adjustment" => TransactionMethod::Adjustment,
        "stripe_fee" | "application_fee" => TransactionMethod::Fee,
        _ => TransactionMethod::Other,
    }
}

fn iso_date(epoch_seconds: i64) -> String {
    DateTime::from_timestamp(epoch_seconds, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn transform_transaction(raw: &StripeTransaction) -> Transaction {
    Transaction {
        id: raw.id.clone(),
        // Minor units to major units; the sign moves into `method`.
        amount: (raw.amount.abs() as f64) / 100.0,
        currency: raw.currency.clone(),
        date: iso_date(raw.created),
        // Balance transactions only exist once settled.
        status: TransactionStatus::Posted,
        balance: Some((raw.net.abs() as f64) / 100.0),
        category: raw.reporting_category.clone(),
        method: map_method(&raw.kind),
        name: raw.description.clone().unwrap_or_else(|| raw.kind.clone()),
        description: raw.description.clone(),
        currency_rate: raw.exchange_rate,
        currency_source: None,
    }
}

fn transform_bank_account(raw: &StripeBankAccount) -> Account {
    let name = raw.bank_name.clone().unwrap_or_else(|| raw.last4.clone());
    Account {
        id: raw.id.clone(),
        name: name.clone(),
        currency: raw.currency.clone(),
        provider: PROVIDER,
        institution: Some(Institution {
            id: raw.routing_number.clone().unwrap_or_else(|| raw.last4.clone()),
            name,
            logo: None,
            provider: PROVIDER,
        }),
        // External accounts collect and pay out funds; always depository.
        kind: AccountType::Depository,
        enrollment_id: None,
        routing_number: raw.routing_number.clone(),
    }
}

#[async_trait]
impl BankProvider for StripeProvider {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    #[instrument(name = "StripeTransactions", skip(self, request), fields(customer = ?request.customer_id))]
    async fn get_transactions(&self, request: &TransactionsRequest) -> Result<Vec<Transaction>> {
        let customer_id = require(request.customer_id.as_deref(), "customer_id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let page_size = request.limit.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let single_page = request.limit.is_some() || request.latest;
        let mut cursor = request.starting_after.clone();
        let mut transactions = Vec::new();

        loop {
            let mut query = vec![("limit", page_size.to_string())];
            if let Some(currency) = &request.currency {
                query.push(("currency", currency.clone()));
            }
            if let Some(cursor) = &cursor {
                query.push(("starting_after", cursor.clone()));
            }

            let path = format!("/v1/customers/{customer_id}/balance_transactions");
            debug!("Requesting transaction page from {path}");
            let page: TransactionPage = send_json(
                PROVIDER,
                self.request(&client, reqwest::Method::GET, &path).query(&query),
            )
            .await?;

            let next_cursor = page.data.last().map(|t| t.id.clone());
            transactions.extend(page.data.iter().map(transform_transaction));

            if single_page || !page.has_more {
                break;
            }
            // A page that advances the cursor by nothing terminates the
            // walk, whatever has_more claims.
            match next_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => {
                    warn!("Pagination reported more data but returned no new items; stopping");
                    break;
                }
            }
        }

        Ok(transactions)
    }

    async fn get_accounts(&self, request: &AccountsRequest) -> Result<Vec<Account>> {
        require_all(&[
            ("customer_id", request.customer_id.as_deref()),
            ("bank_account_id", request.bank_account_id.as_deref()),
        ])?;
        let account_id = request.customer_id.as_deref().unwrap_or_default();
        let bank_account_id = request.bank_account_id.as_deref().unwrap_or_default();

        let client = client(DEFAULT_TIMEOUT)?;
        let path = format!("/v1/accounts/{account_id}/external_accounts/{bank_account_id}");
        let bank_account: StripeBankAccount =
            send_json(PROVIDER, self.request(&client, reqwest::Method::GET, &path)).await?;

        // Stripe models exactly one bank-account resource per connected
        // account, so the list degenerates to one element.
        Ok(vec![transform_bank_account(&bank_account)])
    }

    async fn get_account_balance(&self, request: &BalanceRequest) -> Result<Option<Balance>> {
        let account_id = require(Some(request.account_id.as_str()), "account_id")?;
        let bank_account_id = require(request.bank_account_id.as_deref(), "bank_account_id")?;

        let client = client(DEFAULT_TIMEOUT)?;

        // Confirm the bank account exists before asking for the balance; a
        // vanished account is not-found, not a failure.
        let path = format!("/v1/accounts/{account_id}/external_accounts/{bank_account_id}");
        match send_json::<StripeBankAccount>(
            PROVIDER,
            self.request(&client, reqwest::Method::GET, &path),
        )
        .await
        {
            Ok(_) => {}
            Err(ProviderError::Http { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        }

        let balance: StripeBalance = send_json(
            PROVIDER,
            self.request(&client, reqwest::Method::GET, "/v1/balance")
                .header("Stripe-Account", account_id),
        )
        .await?;

        Ok(balance.available.first().map(|entry| Balance {
            amount: (entry.amount.abs() as f64) / 100.0,
            currency: entry.currency.clone(),
        }))
    }

    async fn get_institutions(&self, _request: &InstitutionsRequest) -> Result<Vec<Institution>> {
        // Declared capability gap: a payment processor has no institution
        // directory. Never retried.
        Err(ProviderError::Unsupported {
            provider: PROVIDER,
            operation: "get_institutions",
        })
    }

    async fn delete_accounts(&self, request: &DeleteAccountsRequest) -> Result<()> {
        let account_id = require(request.account_id.as_deref(), "account_id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let path = format!("/v1/accounts/{account_id}");
        send_ok(PROVIDER, self.request(&client, reqwest::Method::DELETE, &path)).await
    }

    async fn health_check(&self) -> bool {
        let Ok(client) = client(HEALTH_TIMEOUT) else {
            return false;
        };
        send_ok(PROVIDER, self.request(&client, reqwest::Method::GET, "/v1/balance"))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> StripeProvider {
        StripeProvider::new(base_url, "sk_test_123", Some("2024-06-20".to_string()))
    }

    fn raw_transaction(amount: i64, kind: &str) -> StripeTransaction {
        StripeTransaction {
            id: "txn_1".to_string(),
            amount,
            currency: "usd".to_string(),
            created: 1_700_000_000,
            kind: kind.to_string(),
            description: Some("ACME invoice".to_string()),
            reporting_category: Some("charge".to_string()),
            net: amount - 30,
            exchange_rate: None,
        }
    }

    #[test]
    fn test_minor_units_convert_to_major_units() {
        let transaction = transform_transaction(&raw_transaction(12345, "refund"));
        assert_eq!(transaction.amount, 123.45);
        assert_eq!(transaction.method, TransactionMethod::Refund);
        assert_eq!(transaction.status, TransactionStatus::Posted);
    }

    #[test]
    fn test_negative_amounts_are_sign_normalized() {
        let transaction = transform_transaction(&raw_transaction(-5000, "payout"));
        assert_eq!(transaction.amount, 50.0);
        assert_eq!(transaction.method, TransactionMethod::Payout);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let raw = raw_transaction(9900, "charge");
        assert_eq!(transform_transaction(&raw), transform_transaction(&raw));
    }

    #[test]
    fn test_epoch_seconds_become_iso_8601() {
        let transaction = transform_transaction(&raw_transaction(100, "charge"));
        assert_eq!(transaction.date, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_method_mapping_table() {
        assert_eq!(map_method("charge"), TransactionMethod::Payment);
        assert_eq!(map_method("payment"), TransactionMethod::Payment);
        assert_eq!(map_method("payment_refund"), TransactionMethod::Refund);
        assert_eq!(map_method("transfer"), TransactionMethod::Transfer);
        assert_eq!(map_method("payout"), TransactionMethod::Payout);
        assert_eq!(map_method("adjustment"), TransactionMethod::Adjustment);
        assert_eq!(map_method("stripe_fee"), TransactionMethod::Fee);
        assert_eq!(map_method("application_fee"), TransactionMethod::Fee);
        assert_eq!(map_method("climate_contribution"), TransactionMethod::Other);
    }

    fn page_body(ids: &[&str], has_more: bool) -> String {
        let items: Vec<String> = ids
            .iter()
            .map(|id| {
                format!(
                    r#"{{"id": "{id}", "amount": 1000, "currency": "usd", "created": 1700000000,
                        "type": "charge", "description": "order", "reporting_category": "charge",
                        "net": 970, "exchange_rate": null}}"#
                )
            })
            .collect();
        format!(r#"{{"data": [{}], "has_more": {has_more}}}"#, items.join(","))
    }

    #[tokio::test]
    async fn test_transactions_walk_all_pages_in_order() {
        let server = MockServer::start().await;
        let endpoint = "/v1/customers/cus_1/balance_transactions";

        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(query_param_is_missing("starting_after"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page_body(&["txn_a", "txn_b"], true)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(query_param("starting_after", "txn_b"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page_body(&["txn_c"], false)),
            )
            .mount(&server)
            .await;

        let request = TransactionsRequest {
            customer_id: Some("cus_1".to_string()),
            ..Default::default()
        };
        let transactions = provider(&server.uri()).get_transactions(&request).await.unwrap();

        let ids: Vec<&str> = transactions.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["txn_a", "txn_b", "txn_c"]);
        for transaction in &transactions {
            assert!(transaction.amount >= 0.0);
            assert_eq!(transaction.currency.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page_despite_has_more() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/customers/cus_1/balance_transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[], true)))
            .expect(1)
            .mount(&server)
            .await;

        let request = TransactionsRequest {
            customer_id: Some("cus_1".to_string()),
            ..Default::default()
        };
        let transactions = provider(&server.uri()).get_transactions(&request).await.unwrap();
        assert!(transactions.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_limit_fetches_a_single_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/customers/cus_1/balance_transactions"))
            .and(query_param("limit", "5"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page_body(&["txn_a"], true)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = TransactionsRequest {
            customer_id: Some("cus_1".to_string()),
            limit: Some(5),
            ..Default::default()
        };
        let transactions = provider(&server.uri()).get_transactions(&request).await.unwrap();
        assert_eq!(transactions.len(), 1);
    }

    #[tokio::test]
    async fn test_transactions_require_customer_id() {
        let request = TransactionsRequest {
            account_id: "acct_1".to_string(),
            ..Default::default()
        };
        // No server behind this URL; validation must fail before any request.
        let err = provider("http://127.0.0.1:9")
            .get_transactions(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)), "{err}");
    }

    #[tokio::test]
    async fn test_accounts_return_single_bank_account() {
        let server = MockServer::start().await;
        let body = r#"{
            "id": "ba_1",
            "bank_name": "STRIPE TEST BANK",
            "last4": "6789",
            "currency": "usd",
            "routing_number": "110000000"
        }"#;

        Mock::given(method("GET"))
            .and(path("/v1/accounts/acct_1/external_accounts/ba_1"))
            .and(header("Stripe-Version", "2024-06-20"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let request = AccountsRequest {
            customer_id: Some("acct_1".to_string()),
            bank_account_id: Some("ba_1".to_string()),
            ..Default::default()
        };
        let accounts = provider(&server.uri()).get_accounts(&request).await.unwrap();

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "STRIPE TEST BANK");
        assert_eq!(accounts[0].provider, ProviderKind::Stripe);
        assert_eq!(accounts[0].kind, AccountType::Depository);
        assert_eq!(accounts[0].routing_number.as_deref(), Some("110000000"));
        assert!(accounts[0].enrollment_id.is_none());
    }

    #[tokio::test]
    async fn test_balance_converts_minor_units() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/accounts/acct_1/external_accounts/ba_1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id": "ba_1", "bank_name": null, "last4": "6789", "currency": "usd", "routing_number": null}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/balance"))
            .and(header("Stripe-Account", "acct_1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"available": [{"amount": 250050, "currency": "usd"}], "pending": []}"#,
            ))
            .mount(&server)
            .await;

        let request = BalanceRequest {
            account_id: "acct_1".to_string(),
            bank_account_id: Some("ba_1".to_string()),
            ..Default::default()
        };
        let balance = provider(&server.uri())
            .get_account_balance(&request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.amount, 2500.50);
        assert_eq!(balance.currency, "usd");
    }

    #[tokio::test]
    async fn test_missing_bank_account_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/accounts/acct_1/external_accounts/ba_gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error": {}}"#))
            .mount(&server)
            .await;

        let request = BalanceRequest {
            account_id: "acct_1".to_string(),
            bank_account_id: Some("ba_gone".to_string()),
            ..Default::default()
        };
        let balance = provider(&server.uri()).get_account_balance(&request).await.unwrap();
        assert!(balance.is_none());
    }

    #[tokio::test]
    async fn test_institutions_are_unsupported() {
        let err = provider("http://127.0.0.1:9")
            .get_institutions(&InstitutionsRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_page_is_contract_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/customers/cus_1/balance_transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items": []}"#))
            .mount(&server)
            .await;

        let request = TransactionsRequest {
            customer_id: Some("cus_1".to_string()),
            ..Default::default()
        };
        let err = provider(&server.uri()).get_transactions(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Contract { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_health_check_true_on_success_false_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/balance"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"available": [], "pending": []}"#),
            )
            .mount(&server)
            .await;
        assert!(provider(&server.uri()).health_check().await);

        let failing = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/balance"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&failing)
            .await;
        assert!(!provider(&failing.uri()).health_check().await);
    }
}
