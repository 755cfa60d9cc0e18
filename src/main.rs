use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use finbridge::core::log::init_logging;
use finbridge::core::request::{
    AccountsRequest, BalanceRequest, DeleteAccountsRequest, InstitutionsRequest,
    TransactionsRequest,
};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Probe every provider and report liveness
    Health,
    /// List accounts visible under the given credentials
    Accounts {
        /// End-user access token (Plaid, Teller)
        #[arg(long)]
        access_token: Option<String>,
        /// Requisition/link identifier (GoCardless)
        #[arg(long)]
        id: Option<String>,
        /// Connected account identifier (Stripe)
        #[arg(long)]
        customer_id: Option<String>,
        /// External bank-account identifier (Stripe)
        #[arg(long)]
        bank_account_id: Option<String>,
        #[arg(long)]
        country_code: Option<String>,
    },
    /// Fetch transactions for one account
    Transactions {
        #[arg(long)]
        account_id: String,
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        customer_id: Option<String>,
        /// Fetch only recent activity instead of the full history
        #[arg(long)]
        latest: bool,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show the current balance of one account
    Balance {
        #[arg(long)]
        account_id: String,
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        bank_account_id: Option<String>,
    },
    /// List institutions reachable through the active provider
    Institutions {
        #[arg(long)]
        country_code: Option<String>,
    },
    /// Deregister accounts with the active provider
    Deregister {
        #[arg(long)]
        account_id: Option<String>,
        #[arg(long)]
        access_token: Option<String>,
    },
}

impl From<Commands> for finbridge::AppCommand {
    fn from(cmd: Commands) -> finbridge::AppCommand {
        match cmd {
            Commands::Health => finbridge::AppCommand::Health,
            Commands::Accounts {
                access_token,
                id,
                customer_id,
                bank_account_id,
                country_code,
            } => finbridge::AppCommand::Accounts(AccountsRequest {
                id,
                country_code,
                access_token,
                institution_id: None,
                customer_id,
                bank_account_id,
            }),
            Commands::Transactions {
                account_id,
                access_token,
                customer_id,
                latest,
                limit,
            } => finbridge::AppCommand::Transactions(TransactionsRequest {
                account_id,
                access_token,
                customer_id,
                latest,
                limit,
                ..Default::default()
            }),
            Commands::Balance {
                account_id,
                access_token,
                bank_account_id,
            } => finbridge::AppCommand::Balance(BalanceRequest {
                account_id,
                access_token,
                bank_account_id,
            }),
            Commands::Institutions { country_code } => {
                finbridge::AppCommand::Institutions(InstitutionsRequest { country_code })
            }
            Commands::Deregister {
                account_id,
                access_token,
            } => finbridge::AppCommand::Deregister(DeleteAccountsRequest {
                account_id,
                access_token,
            }),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => finbridge::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = finbridge::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
# Active provider: plaid | teller | gocardless | stripe
provider: teller

# development | sandbox | production
environment: sandbox

providers:
  teller: {}
  # plaid:
  #   client_id: ""
  #   secret: ""
  # gocardless:
  #   access_token: ""
  # stripe:
  #   secret_key: ""
  #   api_version: "2024-06-20"
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
