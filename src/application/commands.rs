//! CLI commands and handlers
use alloy_primitives::U256;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::services::DashboardSession;
use crate::config::Config;
use crate::domain::history::HistoryState;
use crate::domain::transfer::{QuickPercent, TransferValidator};
use crate::infrastructure::wallet::{StaticWallet, WalletProvider};
use crate::shared::errors::{AppError, ConfigError, HistoryError};
use crate::shared::types::{Direction, PriceQuote, TransactionRecord, TransferRequest, ValidationResult};

#[derive(Parser)]
#[command(name = "ethdash-sync")]
#[command(about = "Ether price, transaction history and transfer checks for a wallet dashboard")]
pub struct Cli {
    /// Path to TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log filter, overrides RUST_LOG (e.g. "debug", "ethdash_sync=trace")
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Keep price and history fresh for the configured wallet
    Watch {
        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Fetch the current ether quote once
    Price,

    /// Show recent transactions of an address
    History {
        #[arg(short, long)]
        address: String,

        #[arg(long, default_value_t = 11_155_111)]
        chain_id: u64,
    },

    /// Value the configured wallet's balance
    Portfolio,

    /// Check a transfer draft without sending it
    Validate {
        #[arg(short, long)]
        recipient: String,

        /// Amount in ether; ignored with --quick or --min
        #[arg(short, long, default_value = "")]
        amount: String,

        /// Available balance in wei
        #[arg(short, long)]
        balance_wei: String,

        #[arg(long, default_value_t = 11_155_111)]
        chain_id: u64,

        /// Fill the amount with this percentage of the balance (25, 50, 75, 100)
        #[arg(short, long, conflicts_with = "min")]
        quick: Option<u8>,

        /// Fill the minimum button amount
        #[arg(long)]
        min: bool,
    },
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(command: Commands, config: Config) -> Result<(), AppError> {
        match command {
            Commands::Watch { duration } => Self::execute_watch_command(duration, config).await,
            Commands::Price => Self::execute_price_command(config).await,
            Commands::History { address, chain_id } => {
                Self::execute_history_command(address, chain_id, config).await
            }
            Commands::Portfolio => Self::execute_portfolio_command(config).await,
            Commands::Validate { recipient, amount, balance_wei, chain_id, quick, min } => {
                let sync = config.resolve()?;
                let session = DashboardSession::connect(&sync, Arc::new(StaticWallet::disconnected()))?;
                session.refresh_price().await;
                let quote = session.price();
                Self::execute_validate_command(recipient, amount, balance_wei, chain_id, quick, min, &quote)
            }
        }
    }

    async fn execute_watch_command(duration: Option<u64>, config: Config) -> Result<(), AppError> {
        let sync = config.resolve()?;
        let wallet: Arc<dyn WalletProvider> = Arc::new(config.wallet()?);
        let mut session = DashboardSession::connect(&sync, wallet)?;

        info!("👀 Watching (refresh every {:?}); Ctrl-C to stop", sync.refresh_interval);
        session.start();

        let deadline = duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
        let mut report = tokio::time::interval(sync.refresh_interval);
        // First tick fires immediately; skip it so the first report has data.
        report.tick().await;

        loop {
            let until_deadline = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("🛑 Interrupted");
                    break;
                }
                _ = until_deadline => {
                    info!("⏱️  Duration elapsed");
                    break;
                }
                _ = report.tick() => {
                    session.sync_wallet();
                    Self::report_session(&session).await;
                }
            }
        }

        session.stop();
        Ok(())
    }

    async fn report_session(session: &DashboardSession) {
        let quote = session.price();
        let stale = if session.rates().is_stale() { " (stale)" } else { "" };
        info!(
            "💰 ETH {:.2} {} / {:.2} {} ({:+.2}% 24h){}",
            quote.primary.value,
            quote.primary.currency.to_uppercase(),
            quote.secondary.value,
            quote.secondary.currency.to_uppercase(),
            quote.change_24h_percent,
            stale
        );

        match session.history_state() {
            HistoryState::Loaded(records) | HistoryState::Refreshing(records) => {
                info!("📜 {} recent transactions", records.len());
            }
            HistoryState::Empty => info!("📜 No transactions found"),
            HistoryState::Loading => info!("📜 Loading transactions..."),
            HistoryState::Error(message) => warn!("📜 History unavailable: {}", message),
            HistoryState::Idle => info!("📜 No wallet connected"),
        }
    }

    async fn execute_price_command(config: Config) -> Result<(), AppError> {
        let sync = config.resolve()?;
        let session = DashboardSession::connect(&sync, Arc::new(StaticWallet::disconnected()))?;

        let served = session.refresh_price().await;
        if let Some(err) = &served.error {
            warn!("⚠️  Upstream failed: {}", err);
        }

        let quote = &served.quote;
        info!("💰 Ethereum ({:?})", served.status);
        info!("   {}: {:.2}", quote.primary.currency.to_uppercase(), quote.primary.value);
        info!("   {}: {:.2}", quote.secondary.currency.to_uppercase(), quote.secondary.value);
        info!("   24h: {:+.2}%", quote.change_24h_percent);
        Ok(())
    }

    async fn execute_history_command(address: String, chain_id: u64, config: Config) -> Result<(), AppError> {
        let sync = config.resolve()?;
        let wallet = Arc::new(StaticWallet::new(Some(address.clone()), Some(chain_id), U256::ZERO));
        let session = DashboardSession::connect(&sync, wallet)?;

        info!("🔍 Fetching transactions of {} on chain {}...", address, chain_id);
        match session.history().refresh(&address, chain_id).await {
            Ok(records) if records.is_empty() => info!("📭 No transactions found"),
            Ok(records) => {
                for (i, record) in records.iter().enumerate() {
                    Self::print_record(&session, i + 1, record, &address);
                }
            }
            Err(e) => {
                error!("❌ {}", e);
                if matches!(e, HistoryError::UnsupportedChain(_)) {
                    for chain in session.router().supported_chains() {
                        info!("   Supported: {} ({})", chain.display_name, chain.chain_id);
                    }
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn print_record(session: &DashboardSession, index: usize, record: &TransactionRecord, account: &str) {
        let (arrow, counterparty) = match record.direction(account) {
            Direction::Sent if record.to.is_empty() => ("➡️  Sent to", "contract creation"),
            Direction::Sent => ("➡️  Sent to", record.to.as_str()),
            Direction::Received => ("⬅️  Received from", record.from.as_str()),
        };
        let failed = if record.failed { " [failed]" } else { "" };
        info!(
            "   {}. {} {} {} ETH at {}{}",
            index,
            arrow,
            counterparty,
            record.value_display(),
            record.timestamp.format("%Y-%m-%d %H:%M"),
            failed
        );
        if let Some(url) = session.explorer_url(&record.hash) {
            info!("      {}", url);
        }
    }

    async fn execute_portfolio_command(config: Config) -> Result<(), AppError> {
        let sync = config.resolve()?;
        let session = DashboardSession::connect(&sync, Arc::new(config.wallet()?))?;
        session.refresh_price().await;

        let portfolio = session.portfolio().await?;
        info!("👛 {} on {}", portfolio.account, portfolio.chain.name);
        info!("   Balance: {} ETH", portfolio.balance_display());
        info!("   {}: {:.2}", portfolio.primary.currency.to_uppercase(), portfolio.primary.value);
        info!("   {}: {:.2}", portfolio.secondary.currency.to_uppercase(), portfolio.secondary.value);
        if portfolio.price_is_stale {
            warn!("⚠️  Valued with a stale or fallback price");
        }
        Ok(())
    }

    fn execute_validate_command(
        recipient: String,
        amount: String,
        balance_wei: String,
        chain_id: u64,
        quick: Option<u8>,
        min: bool,
        quote: &PriceQuote,
    ) -> Result<(), AppError> {
        let balance = U256::from_str_radix(balance_wei.trim(), 10)
            .map_err(|e| ConfigError::Invalid(format!("balance-wei {:?}: {}", balance_wei, e)))?;
        let validator = TransferValidator::new();
        let draft = TransferRequest::new(recipient, amount);

        let (request, result) = match (quick, min) {
            (Some(percent), _) => {
                let percent = QuickPercent::from_percent(percent).ok_or_else(|| {
                    ConfigError::Invalid(format!("quick must be one of 25, 50, 75, 100; got {}", percent))
                })?;
                validator.apply_quick_amount(&draft, percent, balance, chain_id)
            }
            (None, true) => validator.apply_min_amount(&draft, balance, chain_id),
            (None, false) => {
                let result = validator.validate(&draft, balance, chain_id);
                (draft, result)
            }
        };

        let fiat = validator.fiat_display(&request.amount_display, quote);
        Self::print_validation(&request, &result);
        info!("   ≈ {} {}", fiat, quote.primary.currency.to_uppercase());
        if result.can_submit() {
            Ok(())
        } else {
            Err(AppError::InvalidTransfer(result.errors()))
        }
    }

    fn print_validation(request: &TransferRequest, result: &ValidationResult) {
        info!("📝 {} ETH to {}", request.amount_display, request.recipient);
        if let Some(kind) = result.recipient_error {
            warn!("   Recipient: {}", kind);
        }
        if let Some(kind) = result.amount_error {
            warn!("   Amount: {}", kind);
        }
        if let Some(warning) = &result.warning {
            warn!("   ⚠️  {}", warning);
        }
        if let Some(wei) = result.quantized_amount_wei {
            info!("   = {} wei", wei);
        }
        if result.can_submit() {
            info!("✅ Ready to submit");
        }
    }
}
