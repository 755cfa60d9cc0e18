//! The polymorphic adapter contract

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::model::{Account, Balance, Institution, ProviderKind, Transaction};
use crate::core::request::{
    AccountsRequest, BalanceRequest, DeleteAccountsRequest, InstitutionsRequest,
    TransactionsRequest,
};

/// Capability set every provider adapter implements. The gateway only ever
/// talks to `dyn BankProvider`; adding a provider means one new impl plus a
/// constructor entry in the gateway.
#[async_trait]
pub trait BankProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Fetches transactions for one account or customer, in provider
    /// arrival order. Walks every page when no explicit limit is given.
    /// Zero transactions is an empty vector, not an error.
    async fn get_transactions(&self, request: &TransactionsRequest) -> Result<Vec<Transaction>>;

    /// Lists all accounts visible under the given credential scope.
    async fn get_accounts(&self, request: &AccountsRequest) -> Result<Vec<Account>>;

    /// Current balance for one account. `None` when the account has no
    /// queryable balance.
    async fn get_account_balance(&self, request: &BalanceRequest) -> Result<Option<Balance>>;

    /// Lists institutions reachable through this provider. Providers with
    /// no institution concept fail with `Unsupported`.
    async fn get_institutions(&self, request: &InstitutionsRequest) -> Result<Vec<Institution>>;

    /// Best-effort deregistration. Success means the provider acknowledged
    /// the deletion, nothing more.
    async fn delete_accounts(&self, request: &DeleteAccountsRequest) -> Result<()>;

    /// Cheapest possible live call confirming credentials and
    /// connectivity. Never fails; any fault converts to `false`.
    async fn health_check(&self) -> bool;
}
