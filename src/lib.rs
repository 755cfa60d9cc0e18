pub mod cli;
pub mod config;
pub mod core;
pub mod gateway;
pub mod providers;
pub mod retry;

use anyhow::Result;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::core::request::{
    AccountsRequest, BalanceRequest, DeleteAccountsRequest, InstitutionsRequest,
    TransactionsRequest,
};
pub use crate::gateway::Gateway;

/// CLI-facing operations, decoupled from the argument parser.
#[derive(Debug, Clone)]
pub enum AppCommand {
    Health,
    Accounts(AccountsRequest),
    Transactions(TransactionsRequest),
    Balance(BalanceRequest),
    Institutions(InstitutionsRequest),
    Deregister(DeleteAccountsRequest),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Gateway starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let gateway = Gateway::from_config(&config)?;
    match gateway.active_provider() {
        Some(provider) => debug!("Active provider: {provider}"),
        None => debug!("No active provider; running degraded"),
    }

    match command {
        AppCommand::Health => {
            let report = gateway.health_check().await?;
            cli::render_health(&report);
        }
        AppCommand::Accounts(request) => {
            let accounts = gateway.get_accounts(&request).await?;
            cli::render_accounts(&accounts);
        }
        AppCommand::Transactions(request) => {
            let transactions = gateway.get_transactions(&request).await?;
            cli::render_transactions(&transactions);
        }
        AppCommand::Balance(request) => {
            let balance = gateway.get_account_balance(&request).await?;
            cli::render_balance(balance.as_ref());
        }
        AppCommand::Institutions(request) => {
            let institutions = gateway.get_institutions(&request).await?;
            cli::render_institutions(&institutions);
        }
        AppCommand::Deregister(request) => {
            gateway.delete_accounts(&request).await?;
            info!("Deregistration acknowledged");
            println!("Deregistration acknowledged.");
        }
    }

    Ok(())
}
