//! Emptor CLI - cart and checkout orchestration for storefront accounts
//!
//! Usage:
//!   emptor cart <account>                    Show the current cart
//!   emptor add <account> <subid>...          Add packages to the cart
//!   emptor checkout <account> <giftee-id>    Run one checkout to a terminal outcome
//!   emptor link <account> <transid>          Print the external payment link
//!   emptor summary <account>                 Show wallet and cart numbers
//!   emptor init-config                       Write a default config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use emptor_core::{BatchItem, BotConfig, CheckoutRequest, PaymentMethod};
use emptor_orchestrator::PurchaseBot;
use emptor_session::{FileSessionProvider, Session, SessionProvider, StoreSession};

#[derive(Parser)]
#[command(name = "emptor")]
#[command(author, version, about = "Cart and checkout orchestration for storefront accounts")]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "emptor.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current cart for an account
    Cart {
        /// Account with a saved session under the data directory
        account: String,
    },

    /// Add catalog packages to the cart, in order
    Add {
        account: String,

        /// Package ids to add
        #[arg(required = true)]
        sub_ids: Vec<u64>,
    },

    /// Run one checkout to a terminal outcome
    Checkout {
        account: String,

        /// Account id receiving the gift
        giftee_account_id: u64,

        /// Payment method (account, bitcoin, or a raw storefront name)
        #[arg(short, long, default_value = "account")]
        method: PaymentMethod,
    },

    /// Print the external payment link for an open transaction
    Link {
        account: String,

        /// Transaction id from a checkout that returned awaiting_external_payment
        transaction_id: String,
    },

    /// Show wallet balance and cart count
    Summary { account: String },

    /// Write a default config file and exit
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if matches!(cli.command, Commands::InitConfig) {
        return cmd_init_config(&cli.config);
    }

    let config = BotConfig::load_or_default(&cli.config)
        .with_context(|| format!("could not load config from {:?}", cli.config))?;

    match cli.command {
        Commands::Cart { account } => cmd_cart(config, account).await,
        Commands::Add { account, sub_ids } => cmd_add(config, account, sub_ids).await,
        Commands::Checkout {
            account,
            giftee_account_id,
            method,
        } => cmd_checkout(config, account, giftee_account_id, method).await,
        Commands::Link {
            account,
            transaction_id,
        } => cmd_link(config, account, transaction_id).await,
        Commands::Summary { account } => cmd_summary(config, account).await,
        Commands::InitConfig => unreachable!("handled above"),
    }
}

fn cmd_init_config(path: &PathBuf) -> Result<()> {
    BotConfig::write_default(path)
        .with_context(|| format!("could not write config to {:?}", path))?;
    println!("Wrote default config to {:?}", path);
    println!("Fill in [billing] before running checkouts.");
    Ok(())
}

async fn acquire_bot(config: &BotConfig, account: &str) -> Result<PurchaseBot<StoreSession>> {
    let provider =
        FileSessionProvider::new(config.session.data_dir.clone(), config.store.base_url.clone());
    let session = provider
        .acquire(account)
        .await
        .with_context(|| format!("no usable session for account {}", account))?;
    Ok(PurchaseBot::new(session, config.clone()))
}

/// Persist the session cookies back to disk after an operation. The
/// storefront rotates cookies mid-flow, so skipping this loses the cart.
async fn checkpoint(config: &BotConfig, bot: PurchaseBot<StoreSession>) -> Result<()> {
    let mut state = bot.into_session().into_state();
    let path = config.session_file(&state.account_name);
    state
        .save(&path)
        .await
        .with_context(|| format!("could not save session checkpoint to {:?}", path))?;
    Ok(())
}

async fn cmd_cart(config: BotConfig, account: String) -> Result<()> {
    let mut bot = acquire_bot(&config, &account).await?;

    let snapshot = bot.cart().await?;
    let view = serde_json::json!({
        "cart_token": bot.session().current_cart_token(),
        "snapshot": snapshot,
    });
    println!("{}", serde_json::to_string_pretty(&view)?);

    checkpoint(&config, bot).await
}

async fn cmd_add(config: BotConfig, account: String, sub_ids: Vec<u64>) -> Result<()> {
    info!(account = %account, items = sub_ids.len(), "adding items");
    let mut bot = acquire_bot(&config, &account).await?;

    let items: Vec<BatchItem> = sub_ids
        .iter()
        .map(|sub_id| BatchItem {
            relation_type: "sub".to_string(),
            relation_id: 0,
            sub_id: *sub_id,
        })
        .collect();

    let result = bot.add_items_to_cart(&items).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.failed_items.is_empty() || !result.invalidated_cart_tokens.is_empty() {
        info!(
            failed = result.failed_items.len(),
            invalidated = result.invalidated_cart_tokens.len(),
            "batch finished degraded"
        );
    }

    checkpoint(&config, bot).await
}

async fn cmd_checkout(
    config: BotConfig,
    account: String,
    giftee_account_id: u64,
    method: PaymentMethod,
) -> Result<()> {
    info!(account = %account, giftee = giftee_account_id, "running checkout");
    let mut bot = acquire_bot(&config, &account).await?;

    let request = CheckoutRequest {
        giftee_account_id,
        payment_method: method,
    };
    let report = bot.checkout(&request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    checkpoint(&config, bot).await
}

async fn cmd_link(config: BotConfig, account: String, transaction_id: String) -> Result<()> {
    let mut bot = acquire_bot(&config, &account).await?;

    let link = bot.external_payment_link(&transaction_id).await?;
    println!("{}", link);

    checkpoint(&config, bot).await
}

async fn cmd_summary(config: BotConfig, account: String) -> Result<()> {
    let mut bot = acquire_bot(&config, &account).await?;

    let summary = bot.account_summary().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    checkpoint(&config, bot).await
}
