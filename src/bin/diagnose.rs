//! Diagnostic tool - Check configuration without touching the network
//!
//! Run with: cargo run --bin diagnose

use std::env;

use molyparket::config::Config;

fn mask(url: &str) -> String {
    if url.chars().count() > 50 {
        let head: String = url.chars().take(30).collect();
        let tail: String = url.chars().rev().take(15).collect::<Vec<_>>().into_iter().rev().collect();
        format!("{}...{}", head, tail)
    } else {
        url.to_string()
    }
}

fn main() {
    println!("🔍 MOLYPARKET DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("DEFAULT_CHAIN_ID", "8453", "Chain used when none is given"),
        ("LOOK_BACK", "40", "Most recent pools to load"),
        ("REQUEST_TIMEOUT_SECS", "15", "Upper bound per contract read"),
        ("POLL_INTERVAL_SECS", "12", "Seconds between refreshes in --watch"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Could not parse configuration: {}", e);
            return;
        }
    };

    println!("═══════════════════════════════════════════════════");
    println!("                    MARKETS                         ");
    println!("═══════════════════════════════════════════════════\n");

    for (chain, url) in &config.rpc_urls {
        println!("  RPC {}: {}", chain, mask(url));
    }
    if config.market_contracts.is_empty() {
        println!("  ⚠️  MARKET_CONTRACTS is empty - the aggregator will stay idle");
    }
    for chain in config.market_contracts.keys() {
        let Ok(chain_id) = chain.parse::<u64>() else {
            println!("  ❌ {}: not a chain id", chain);
            continue;
        };
        match config.contract_address(chain_id) {
            Ok(Some(address)) => println!("  ✅ Chain {}: {}", chain_id, address),
            Ok(None) => println!("  ⚠️  Chain {}: empty address", chain_id),
            Err(e) => println!("  ❌ Chain {}: {}", chain_id, e),
        }
    }

    match config.market_context(None) {
        Ok(Some(ctx)) => println!("\n  Default market: {}", ctx),
        Ok(None) => println!("\n  ⚠️  No market on default chain {}", config.default_chain_id),
        Err(e) => println!("\n  ❌ Default market: {}", e),
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    if config.private_key.is_some() {
        println!("  🚀 TRADING ENABLED");
        println!("     → buy / sell / resolve / withdraw / launch available");
        println!("     → Your money: AT RISK");
    } else {
        println!("  📋 READ-ONLY MODE");
        println!("     → Pools, prices and balances only");
        println!("     → Set PRIVATE_KEY to trade");
    }

    match config.validate() {
        Ok(()) => println!("\n✅ Diagnostic complete!\n"),
        Err(e) => println!("\n❌ Configuration invalid: {}\n", e),
    }
}
