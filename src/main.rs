//! Molyparket - prediction market pool browser and trading CLI
//!
//! Run with: cargo run -- [--chain-id 8453] [--watch] [COMMAND]
//!
//! Without a command, loads the most recent pools and prints them.

use alloy_primitives::{Address, U256};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use molyparket::aggregator::{MolyparketInfo, PoolAggregator};
use molyparket::cache::ResponseCache;
use molyparket::config::Config;
use molyparket::market::{
    display_error, ContractBridge, Erc20, ExecutionReceipt, MarketActions, MarketClient, MarketContext,
    MarketReader, NewBet, Outcome, RpcBridge, TradeSide,
};
use molyparket::units::{decimal_to_wei, percentage_of, wei_to_decimal};

#[derive(Parser)]
#[command(name = "molyparket")]
#[command(about = "Browse and trade Molyparket prediction pools", long_about = None)]
struct Args {
    /// Chain to use (defaults to DEFAULT_CHAIN_ID)
    #[arg(short, long)]
    chain_id: Option<u64>,

    /// Override LOOK_BACK
    #[arg(short, long)]
    look_back: Option<u64>,

    /// Load settings from a TOML file instead of the environment
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep refreshing every POLL_INTERVAL_SECS
    #[arg(short, long)]
    watch: bool,

    /// Print the snapshot as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Yes,
    No,
}

impl From<Side> for Outcome {
    fn from(side: Side) -> Self {
        match side {
            Side::Yes => Outcome::Yes,
            Side::No => Outcome::No,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show one pool with its full resolution prompt
    Show { pool_id: u64 },

    /// Cost and balances for an account (defaults to the signer)
    Position {
        pool_id: u64,
        #[arg(long)]
        account: Option<Address>,
    },

    /// Buy outcome tokens
    Buy {
        pool_id: u64,
        #[arg(value_enum)]
        side: Side,
        /// Outcome tokens to buy, e.g. "10.5"
        amount: String,
        #[arg(long)]
        referrer: Option<Address>,
    },

    /// Sell outcome tokens, either an amount or a percentage of the balance
    Sell {
        pool_id: u64,
        #[arg(value_enum)]
        side: Side,
        #[arg(required_unless_present = "percent")]
        amount: Option<String>,
        /// Share of the current balance to sell, 1-100
        #[arg(long, conflicts_with = "amount", value_parser = clap::value_parser!(u8).range(1..=100))]
        percent: Option<u8>,
        #[arg(long)]
        referrer: Option<Address>,
    },

    /// Request oracle resolution of a closed pool
    Resolve { pool_id: u64 },

    /// Withdraw winnings from a resolved pool
    Withdraw { pool_id: u64 },

    /// Launch a new market
    Launch {
        #[arg(long)]
        title: String,
        #[arg(long)]
        prompt: String,
        /// Initial liquidity in collateral tokens
        #[arg(long, default_value = "20")]
        liquidity: String,
        #[arg(long, default_value_t = 24)]
        closes_in_hours: i64,
        #[arg(long, default_value_t = 48)]
        resolves_in_hours: i64,
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long, default_value = "")]
        discussion_url: String,
        #[arg(long, default_value = "")]
        logo_url: String,
    },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🎲 MOLYPARKET - Prediction Market Pools").cyan().bold()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}…", text.chars().take(max - 1).collect::<String>())
    }
}

fn print_pools(info: &MolyparketInfo) {
    let now = chrono::Utc::now().timestamp().max(0) as u64;

    println!(
        "{} {} of {} pools on chain {}",
        style("✓").green(),
        info.pools.len(),
        info.pool_count,
        info.chain_id
    );
    match (info.collateral_token_address, info.collateral_token_decimals) {
        (Some(token), Some(decimals)) => println!("   Collateral token: {} ({} decimals)", token, decimals),
        (Some(token), None) => println!("   Collateral token: {}", token),
        _ => {}
    }
    println!();
    println!("{:>6}  {:<50} {:>6} {:>14}  {}", "ID", "TITLE", "YES", "COLLATERAL", "STATUS");

    for pool in &info.pools {
        let yes = pool
            .yes_percentage()
            .map(|p| format!("{}%", p))
            .unwrap_or_else(|| "-".to_string());
        let status = match pool.resolution.label() {
            Some(label) => style(format!("Resolved: {}", label)).magenta().to_string(),
            None if pool.is_closed(now) => style("Closed".to_string()).yellow().to_string(),
            None => style("Open".to_string()).green().to_string(),
        };
        println!(
            "{:>6}  {:<50} {:>6} {:>14}  {}",
            pool.id,
            truncate(&pool.title, 50),
            yes,
            wei_to_decimal(pool.collateral),
            status
        );
    }

    if !info.keywords_sorted.is_empty() {
        println!();
        let top: Vec<String> = info
            .keywords_sorted
            .iter()
            .take(10)
            .map(|tag| format!("{} ({})", tag, info.keywords.get(tag).copied().unwrap_or(0)))
            .collect();
        println!("{} {}", style("Top keywords:").bold(), top.join(", "));
    }
}

fn print_receipt(action: &str, receipt: &ExecutionReceipt) {
    match receipt.success {
        Some(false) => println!("{} {} reverted: {:?}", style("✗").red(), action, receipt.tx_hash),
        _ => println!(
            "{} {} confirmed in block {}: {:?}",
            style("✓").green(),
            action,
            receipt.block_number.map(|b| b.to_string()).unwrap_or_else(|| "?".to_string()),
            receipt.tx_hash
        ),
    }
}

/// Load pools once, with a spinner fed by published snapshots
async fn load_snapshot(aggregator: &Arc<PoolAggregator>, quiet: bool) -> Result<Arc<MolyparketInfo>> {
    let spinner = if quiet { ProgressBar::hidden() } else { ProgressBar::new_spinner() };
    let spinner_style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(spinner_style);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("Reading market...");

    let mut rx = aggregator.subscribe();
    let progress = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let info = rx.borrow_and_update().clone();
                spinner.set_message(format!("Loaded {}/{} pools", info.pools.len(), info.pool_count));
            }
        })
    };

    let start = Instant::now();
    let result = aggregator.refresh().await;
    progress.abort();
    spinner.finish_and_clear();

    let report = result?;
    if let Some(index) = report.paging.aborted_at {
        warn!("⚠️  Paging stopped at index {}, showing partial results", index);
    }
    info!("Refresh finished in {:?} ({} pools loaded)", start.elapsed(), report.paging.loaded);

    Ok(aggregator.snapshot())
}

fn require_context(ctx: Option<MarketContext>, chain_id: u64) -> Result<MarketContext> {
    ctx.ok_or_else(|| eyre!("No market contract configured for chain {}", chain_id))
}

async fn collateral(reader: &MarketClient, bridge: Arc<dyn ContractBridge>, cache: Arc<ResponseCache>, ctx: &MarketContext) -> Result<Erc20> {
    let token = reader.collateral_token(ctx).await?;
    Ok(Erc20::new(bridge, cache, ctx.chain_id, token))
}

fn signer_account(bridge: &dyn ContractBridge) -> Result<Address> {
    bridge
        .account()
        .ok_or_else(|| eyre!("PRIVATE_KEY is required for this command"))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("molyparket=info".parse()?),
        )
        .init();

    let args = Args::parse();
    if !args.json {
        print_banner();
    }

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(look_back) = args.look_back {
        config.look_back = look_back;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }
    if !args.json {
        config.print_summary();
        println!();
    }

    let chain_id = config.effective_chain_id(args.chain_id);
    let ctx = config.market_context(args.chain_id)?;

    let bridge: Arc<dyn ContractBridge> = Arc::new(RpcBridge::from_config(&config)?);
    let cache = Arc::new(ResponseCache::new());
    let client = Arc::new(MarketClient::new(bridge.clone()));

    match args.command {
        None => {
            let aggregator = Arc::new(PoolAggregator::from_config(client, cache.clone(), &config));
            aggregator.set_context(chain_id, ctx.map(|c| c.contract)).await;

            loop {
                match load_snapshot(&aggregator, args.json).await {
                    Ok(info) if args.json => println!("{}", serde_json::to_string_pretty(&*info)?),
                    Ok(info) => print_pools(&info),
                    Err(e) if args.watch => error!("❌ Refresh failed: {}", e),
                    Err(e) => return Err(e),
                }

                if !args.watch {
                    break;
                }
                let stats = cache.stats();
                info!("💾 Cache: {} entries, {} hits, {} misses, {} coalesced", stats.entries, stats.hits, stats.misses, stats.coalesced);
                tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;
            }
        }

        Some(Command::Show { pool_id }) => {
            let ctx = require_context(ctx, chain_id)?;
            let aggregator = PoolAggregator::from_config(client.clone(), cache, &config);
            aggregator.set_context(ctx.chain_id, Some(ctx.contract)).await;
            aggregator.refresh_prompts().await;

            let info = aggregator.snapshot();
            let pool = client.pool(&ctx, U256::from(pool_id)).await?;
            println!("{} #{} {}", style("Pool").bold(), pool.id, style(&pool.title).cyan());
            println!("   Creator:    {}", pool.creator);
            println!("   Tags:       {}", pool.tag_list().collect::<Vec<_>>().join(", "));
            println!("   Collateral: {}", wei_to_decimal(pool.collateral));
            println!("   Yes / No:   {} / {}", wei_to_decimal(pool.total_supply_yes), wei_to_decimal(pool.total_supply_no));
            println!("   Resolution: {}", pool.resolution);
            if !pool.discussion_url.is_empty() {
                println!("   Discussion: {}", pool.discussion_url);
            }
            println!();
            match info.full_resolution_prompt(&pool) {
                Some(prompt) => println!("{}\n{}", style("Resolution prompt:").bold(), prompt),
                None => println!("{}\n{}", style("Resolution prompt (resolver unavailable):").bold(), pool.resolution_prompt),
            }
        }

        Some(Command::Position { pool_id, account }) => {
            let ctx = require_context(ctx, chain_id)?;
            let account = match account {
                Some(account) => account,
                None => signer_account(bridge.as_ref())?,
            };
            let pool_id = U256::from(pool_id);
            let one = decimal_to_wei("1")?;

            for outcome in [Outcome::Yes, Outcome::No] {
                let cost = client.cost_to_buy(&ctx, pool_id, outcome, one).await?;
                let balance = client.outcome_balance(&ctx, pool_id, outcome, account).await?;
                println!("   {:<3} balance {:>14}   cost of 1 share {:>10}", outcome, wei_to_decimal(balance), wei_to_decimal(cost));
            }
            let withdrawable = client.withdrawable_amount(&ctx, pool_id, account).await?;
            println!("   Withdrawable: {}", wei_to_decimal(withdrawable));

            let token = collateral(&client, bridge.clone(), cache, &ctx).await?;
            println!("   Wallet collateral: {}", token.to_human_readable(token.balance_of(account).await?).await?);
        }

        Some(Command::Buy { pool_id, side, amount, referrer }) => {
            let ctx = require_context(ctx, chain_id)?;
            let account = signer_account(bridge.as_ref())?;
            let pool_id = U256::from(pool_id);
            let outcome = Outcome::from(side);
            let amount = decimal_to_wei(&amount)?;

            let cost = client.cost_to_buy(&ctx, pool_id, outcome, amount).await?;
            let token = collateral(&client, bridge.clone(), cache, &ctx).await?;
            info!("Cost: {} collateral", token.to_human_readable(cost).await?);
            if let Some(receipt) = token.ensure_allowance(account, ctx.contract, cost).await? {
                print_receipt("Approval", &receipt);
            }

            let actions = MarketActions::new(bridge.clone(), ctx);
            match actions.trade(TradeSide::Buy, outcome, pool_id, amount, referrer).await {
                Ok(receipt) => print_receipt("Buy", &receipt),
                Err(e) => println!("{} {}", style("✗").red(), display_error(&e)),
            }
        }

        Some(Command::Sell { pool_id, side, amount, percent, referrer }) => {
            let ctx = require_context(ctx, chain_id)?;
            let account = signer_account(bridge.as_ref())?;
            let pool_id = U256::from(pool_id);
            let outcome = Outcome::from(side);

            let amount = match (amount, percent) {
                (Some(amount), _) => decimal_to_wei(&amount)?,
                (None, Some(pct)) => {
                    let balance = client.outcome_balance(&ctx, pool_id, outcome, account).await?;
                    let amount = percentage_of(balance, pct)?;
                    info!("Selling {}% of {} {} shares", pct, wei_to_decimal(balance), outcome);
                    amount
                }
                (None, None) => return Err(eyre!("Either an amount or --percent is required")),
            };

            let actions = MarketActions::new(bridge.clone(), ctx);
            match actions.trade(TradeSide::Sell, outcome, pool_id, amount, referrer).await {
                Ok(receipt) => print_receipt("Sell", &receipt),
                Err(e) => println!("{} {}", style("✗").red(), display_error(&e)),
            }
        }

        Some(Command::Resolve { pool_id }) => {
            let ctx = require_context(ctx, chain_id)?;
            let pool = client.pool(&ctx, U256::from(pool_id)).await?;
            if pool.resolution.is_resolved() {
                return Err(eyre!("Pool {} is already resolved: {}", pool_id, pool.resolution));
            }

            let actions = MarketActions::new(bridge.clone(), ctx);
            match actions.resolve(pool.id).await {
                Ok(receipt) => print_receipt("Resolve", &receipt),
                Err(e) => println!("{} {}", style("✗").red(), display_error(&e)),
            }
        }

        Some(Command::Withdraw { pool_id }) => {
            let ctx = require_context(ctx, chain_id)?;
            let actions = MarketActions::new(bridge.clone(), ctx);
            match actions.withdraw(U256::from(pool_id)).await {
                Ok(receipt) => print_receipt("Withdraw", &receipt),
                Err(e) => println!("{} {}", style("✗").red(), display_error(&e)),
            }
        }

        Some(Command::Launch {
            title,
            prompt,
            liquidity,
            closes_in_hours,
            resolves_in_hours,
            tags,
            discussion_url,
            logo_url,
        }) => {
            let ctx = require_context(ctx, chain_id)?;
            let account = signer_account(bridge.as_ref())?;
            let token = collateral(&client, bridge.clone(), cache, &ctx).await?;
            let decimals = token.decimals().await?;
            let now = chrono::Utc::now();

            let bet = NewBet {
                title,
                resolution_prompt: prompt,
                initial_liquidity: token.to_machine_readable(&liquidity).await?,
                closing_time: now + chrono::Duration::hours(closes_in_hours),
                resolution_time: now + chrono::Duration::hours(resolves_in_hours),
                discussion_url,
                tags,
                logo_url,
            };
            bet.validate(decimals)?;

            if let Some(receipt) = token.ensure_allowance(account, ctx.contract, bet.initial_liquidity).await? {
                print_receipt("Approval", &receipt);
            }

            let actions = MarketActions::new(bridge.clone(), ctx);
            match actions.create_bet(bet, decimals).await {
                Ok(receipt) => print_receipt("Launch", &receipt),
                Err(e) => println!("{} {}", style("✗").red(), display_error(&e)),
            }
        }
    }

    Ok(())
}
