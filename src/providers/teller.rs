//! Teller adapter
//!
//! US-only aggregator. Authenticates with a per-enrollment access token as
//! the basic-auth username, ships amounts as signed decimal strings in major
//! units, and paginates newest-first with a `from_id` cursor.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

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

const PROVIDER: ProviderKind = ProviderKind::Teller;

const PAGE_SIZE: u32 = 100;

// Teller only serves US institutions and never reports a currency on
// transactions.
const CURRENCY: &str = "USD";

pub struct TellerProvider {
    base_url: String,
}

impl TellerProvider {
    pub fn new(base_url: &str) -> Self {
        TellerProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, client: &reqwest::Client, token: &str, path: &str) -> reqwest::RequestBuilder {
        client
            .get(format!("{}{path}", self.base_url))
            .basic_auth(token, None::<&str>)
    }

    fn logo_url(institution_id: &str) -> String {
        format!("https://teller.io/images/banks/{institution_id}.jpg")
    }
}

#[derive(Debug, Deserialize)]
struct TellerAccount {
    id: String,
    name: String,
    currency: String,
    enrollment_id: String,
    institution: TellerInstitution,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TellerInstitution {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TellerTransactionStatus {
    Posted,
    Pending,
}

#[derive(Debug, Deserialize)]
struct TellerTransaction {
    id: String,
    /// Signed decimal string, major units.
    amount: String,
    date: String,
    description: String,
    status: TellerTransactionStatus,
    running_balance: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    details: TellerTransactionDetails,
}

#[derive(Debug, Default, Deserialize)]
struct TellerTransactionDetails {
    category: Option<String>,
    counterparty: Option<TellerCounterparty>,
}

#[derive(Debug, Deserialize)]
struct TellerCounterparty {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TellerBalances {
    available: Option<String>,
    ledger: Option<String>,
}

fn map_method(kind: &str) -> TransactionMethod {
    match kind {
        "payment" | "card_payment" | "digital_payment" | "bill_payment" => {
            TransactionMethod::Payment
        }
        "refund" => TransactionMethod::Refund,
        "transfer" | "wire" | "ach" => TransactionMethod::Transfer,
        "fee" => TransactionMethod::Fee,
        "adjustment" => TransactionMethod::Adjustment,
        _ => TransactionMethod::Other,
    }
}

fn map_account_type(kind: &str) -> AccountType {
    match kind {
        "depository" => AccountType::Depository,
        "credit" => AccountType::Credit,
        _ => AccountType::OtherAsset,
    }
}

fn transform_transaction(raw: &TellerTransaction) -> Result<Transaction> {
    let amount = parse_amount(PROVIDER, &raw.amount)?.abs();
    let balance = match &raw.running_balance {
        Some(value) => Some(parse_amount(PROVIDER, value)?.abs()),
        None => None,
    };

    Ok(Transaction {
        id: raw.id.clone(),
        amount,
        currency: CURRENCY.to_string(),
        date: raw.date.clone(),
        status: match raw.status {
            TellerTransactionStatus::Posted => TransactionStatus::Posted,
            TellerTransactionStatus::Pending => TransactionStatus::Pending,
        },
        balance,
        category: raw.details.category.clone(),
        method: map_method(&raw.kind),
        name: raw.description.clone(),
        description: raw
            .details
            .counterparty
            .as_ref()
            .and_then(|c| c.name.clone()),
        currency_rate: None,
        currency_source: None,
    })
}

fn transform_account(raw: &TellerAccount) -> Account {
    Account {
        id: raw.id.clone(),
        name: raw.name.clone(),
        currency: raw.currency.clone(),
        provider: PROVIDER,
        institution: Some(Institution {
            id: raw.institution.id.clone(),
            name: raw.institution.name.clone(),
            logo: Some(TellerProvider::logo_url(&raw.institution.id)),
            provider: PROVIDER,
        }),
        kind: map_account_type(&raw.kind),
        enrollment_id: Some(raw.enrollment_id.clone()),
        routing_number: None,
    }
}

#[async_trait]
impl BankProvider for TellerProvider {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    async fn get_transactions(&self, request: &TransactionsRequest) -> Result<Vec<Transaction>> {
        let token = require(request.access_token.as_deref(), "access_token")?;
        let account_id = require(Some(request.account_id.as_str()), "account_id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let page_size = request.limit.unwrap_or(PAGE_SIZE).min(PAGE_SIZE);
        let single_page = request.limit.is_some() || request.latest;
        let mut cursor: Option<String> = request.starting_after.clone();
        let mut transactions = Vec::new();

        loop {
            let mut query = vec![("count", page_size.to_string())];
            if let Some(cursor) = &cursor {
                query.push(("from_id", cursor.clone()));
            }

            let path = format!("/accounts/{account_id}/transactions");
            debug!("Requesting transaction page from {path}");
            let page: Vec<TellerTransaction> =
                send_json(PROVIDER, self.get(&client, token, &path).query(&query)).await?;

            let page_len = page.len();
            let next_cursor = page.last().map(|t| t.id.clone());
            for raw in &page {
                transactions.push(transform_transaction(raw)?);
            }

            // A short page is the last one; an empty or cursor-repeating
            // page ends the walk no matter what the provider claims.
            if single_page || page_len < page_size as usize {
                break;
            }
            match next_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => {
                    warn!("Pagination returned no new items; stopping");
                    break;
                }
            }
        }

        Ok(transactions)
    }

    async fn get_accounts(&self, request: &AccountsRequest) -> Result<Vec<Account>> {
        let token = require(request.access_token.as_deref(), "access_token")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let accounts: Vec<TellerAccount> =
            send_json(PROVIDER, self.get(&client, token, "/accounts")).await?;

        Ok(accounts.iter().map(transform_account).collect())
    }

    async fn get_account_balance(&self, request: &BalanceRequest) -> Result<Option<Balance>> {
        let token = require(request.access_token.as_deref(), "access_token")?;
        let account_id = require(Some(request.account_id.as_str()), "account_id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let path = format!("/accounts/{account_id}/balances");
        let balances = match send_json::<TellerBalances>(
            PROVIDER,
            self.get(&client, token, &path),
        )
        .await
        {
            Ok(balances) => balances,
            Err(ProviderError::Http { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        let Some(raw) = balances.available.or(balances.ledger) else {
            return Ok(None);
        };

        Ok(Some(Balance {
            amount: parse_amount(PROVIDER, &raw)?,
            currency: CURRENCY.to_string(),
        }))
    }

    async fn get_institutions(&self, _request: &InstitutionsRequest) -> Result<Vec<Institution>> {
        // The institution directory is public; no enrollment token needed.
        let client = client(DEFAULT_TIMEOUT)?;
        let institutions: Vec<TellerInstitution> = send_json(
            PROVIDER,
            client.get(format!("{}/institutions", self.base_url)),
        )
        .await?;

        Ok(institutions
            .into_iter()
            .map(|institution| Institution {
                logo: Some(Self::logo_url(&institution.id)),
                id: institution.id,
                name: institution.name,
                provider: PROVIDER,
            })
            .collect())
    }

    async fn delete_accounts(&self, request: &DeleteAccountsRequest) -> Result<()> {
        let token = require(request.access_token.as_deref(), "access_token")?;
        let account_id = require(request.account_id.as_deref(), "account_id")?;

        let client = client(DEFAULT_TIMEOUT)?;
        let path = format!("/accounts/{account_id}");
        send_ok(
            PROVIDER,
            client
                .delete(format!("{}{path}", self.base_url))
                .basic_auth(token, None::<&str>),
        )
        .await
    }

    async fn health_check(&self) -> bool {
        let Ok(client) = client(HEALTH_TIMEOUT) else {
            return false;
        };
        send_ok(PROVIDER, client.get(format!("{}/health", self.base_url)))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "token_abc";

    fn transaction_body(id: &str, amount: &str, status: &str, kind: &str) -> String {
        format!(
            r#"{{
                "id": "{id}",
                "amount": "{amount}",
                "date": "2024-03-18",
                "description": "COFFEE ROASTERS",
                "status": "{status}",
                "running_balance": "512.31",
                "type": "{kind}",
                "details": {{
                    "category": "dining",
                    "counterparty": {{"name": "Coffee Roasters Inc"}}
                }}
            }}"#
        )
    }

    #[tokio::test]
    async fn test_transactions_transform_and_order() {
        let server = MockServer::start().await;
        let body = format!(
            "[{},{}]",
            transaction_body("txn_1", "-42.50", "posted", "card_payment"),
            transaction_body("txn_2", "1000.00", "pending", "ach")
        );

        Mock::given(method("GET"))
            .and(path("/accounts/acc_1/transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let request = TransactionsRequest {
            account_id: "acc_1".to_string(),
            access_token: Some(TOKEN.to_string()),
            ..Default::default()
        };
        let transactions = TellerProvider::new(&server.uri())
            .get_transactions(&request)
            .await
            .unwrap();

        assert_eq!(transactions.len(), 2);
        let first = &transactions[0];
        assert_eq!(first.id, "txn_1");
        assert_eq!(first.amount, 42.50);
        assert_eq!(first.currency, "USD");
        assert_eq!(first.status, TransactionStatus::Posted);
        assert_eq!(first.method, TransactionMethod::Payment);
        assert_eq!(first.balance, Some(512.31));
        assert_eq!(first.category.as_deref(), Some("dining"));
        assert_eq!(first.name, "COFFEE ROASTERS");
        assert_eq!(first.description.as_deref(), Some("Coffee Roasters Inc"));

        assert_eq!(transactions[1].status, TransactionStatus::Pending);
        assert_eq!(transactions[1].method, TransactionMethod::Transfer);
    }

    #[tokio::test]
    async fn test_transactions_walk_cursor_pages() {
        let server = MockServer::start().await;

        // First page completely full, second page short.
        let page_one: Vec<String> = (0..PAGE_SIZE)
            .map(|i| transaction_body(&format!("txn_{i}"), "-1.00", "posted", "card_payment"))
            .collect();
        Mock::given(method("GET"))
            .and(path("/accounts/acc_1/transactions"))
            .and(query_param_is_missing("from_id"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("[{}]", page_one.join(","))),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/accounts/acc_1/transactions"))
            .and(query_param("from_id", format!("txn_{}", PAGE_SIZE - 1)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "[{}]",
                transaction_body("txn_last", "-2.00", "posted", "card_payment")
            )))
            .mount(&server)
            .await;

        let request = TransactionsRequest {
            account_id: "acc_1".to_string(),
            access_token: Some(TOKEN.to_string()),
            ..Default::default()
        };
        let transactions = TellerProvider::new(&server.uri())
            .get_transactions(&request)
            .await
            .unwrap();

        assert_eq!(transactions.len(), PAGE_SIZE as usize + 1);
        assert_eq!(transactions.last().unwrap().id, "txn_last");
    }

    #[tokio::test]
    async fn test_zero_transactions_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/acc_1/transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let request = TransactionsRequest {
            account_id: "acc_1".to_string(),
            access_token: Some(TOKEN.to_string()),
            ..Default::default()
        };
        let transactions = TellerProvider::new(&server.uri())
            .get_transactions(&request)
            .await
            .unwrap();
        assert!(transactions.is_empty());
    }

    #[tokio::test]
    async fn test_transactions_require_access_token() {
        let request = TransactionsRequest {
            account_id: "acc_1".to_string(),
            ..Default::default()
        };
        let err = TellerProvider::new("http://127.0.0.1:9")
            .get_transactions(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.to_string().contains("access_token"));
    }

    #[tokio::test]
    async fn test_accounts_carry_enrollment_and_institution() {
        let server = MockServer::start().await;
        let body = r#"[{
            "id": "acc_1",
            "name": "Everyday Checking",
            "currency": "USD",
            "enrollment_id": "enr_1",
            "institution": {"id": "chase", "name": "Chase"},
            "type": "depository",
            "subtype": "checking"
        }]"#;

        Mock::given(method("GET"))
            .and(path("/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let request = AccountsRequest {
            access_token: Some(TOKEN.to_string()),
            ..Default::default()
        };
        let accounts = TellerProvider::new(&server.uri())
            .get_accounts(&request)
            .await
            .unwrap();

        assert_eq!(accounts.len(), 1);
        let account = &accounts[0];
        assert_eq!(account.kind, AccountType::Depository);
        assert_eq!(account.enrollment_id.as_deref(), Some("enr_1"));
        let institution = account.institution.as_ref().unwrap();
        assert_eq!(institution.name, "Chase");
        assert_eq!(
            institution.logo.as_deref(),
            Some("https://teller.io/images/banks/chase.jpg")
        );
    }

    #[tokio::test]
    async fn test_balance_prefers_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/acc_1/balances"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"account_id": "acc_1", "available": "100.25", "ledger": "90.00"}"#,
            ))
            .mount(&server)
            .await;

        let request = BalanceRequest {
            account_id: "acc_1".to_string(),
            access_token: Some(TOKEN.to_string()),
            ..Default::default()
        };
        let balance = TellerProvider::new(&server.uri())
            .get_account_balance(&request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.amount, 100.25);
        assert_eq!(balance.currency, "USD");
    }

    #[tokio::test]
    async fn test_balance_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/acc_gone/balances"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let request = BalanceRequest {
            account_id: "acc_gone".to_string(),
            access_token: Some(TOKEN.to_string()),
            ..Default::default()
        };
        let balance = TellerProvider::new(&server.uri())
            .get_account_balance(&request)
            .await
            .unwrap();
        assert!(balance.is_none());
    }

    #[tokio::test]
    async fn test_institutions_get_cdn_logos() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/institutions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id": "chase", "name": "Chase"}, {"id": "ally", "name": "Ally Bank"}]"#,
            ))
            .mount(&server)
            .await;

        let institutions = TellerProvider::new(&server.uri())
            .get_institutions(&InstitutionsRequest::default())
            .await
            .unwrap();

        assert_eq!(institutions.len(), 2);
        assert_eq!(institutions[0].provider, ProviderKind::Teller);
        assert_eq!(
            institutions[1].logo.as_deref(),
            Some("https://teller.io/images/banks/ally.jpg")
        );
    }

    #[tokio::test]
    async fn test_delete_account() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/accounts/acc_1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let request = DeleteAccountsRequest {
            account_id: Some("acc_1".to_string()),
            access_token: Some(TOKEN.to_string()),
        };
        TellerProvider::new(&server.uri())
            .delete_accounts(&request)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unparseable_amount_is_contract_error() {
        let server = MockServer::start().await;
        let body = r#"[{
            "id": "txn_1",
            "amount": "not-a-number",
            "date": "2024-03-18",
            "description": "weird",
            "status": "posted",
            "running_balance": null,
            "type": "card_payment"
        }]"#;
        Mock::given(method("GET"))
            .and(path("/accounts/acc_1/transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let request = TransactionsRequest {
            account_id: "acc_1".to_string(),
            access_token: Some(TOKEN.to_string()),
            ..Default::default()
        };
        let err = TellerProvider::new(&server.uri())
            .get_transactions(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Contract { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;
        assert!(TellerProvider::new(&server.uri()).health_check().await);
        assert!(!TellerProvider::new("http://127.0.0.1:9").health_check().await);
    }
}
