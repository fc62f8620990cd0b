//! State-changing market calls
//!
//! Trading, market creation, resolution and withdrawal. Every call waits for
//! confirmation; `resolve` funds the oracle callback with native value.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use chrono::{DateTime, Utc};
use eyre::{eyre, Result};
use std::sync::Arc;
use tracing::info;

use super::bridge::{ContractBridge, ExecuteOptions, ExecutionReceipt};
use super::types::{IMolyparket, MarketContext, Outcome};

/// Longest accepted market title (characters)
pub const MAX_TITLE_LENGTH: usize = 120;

/// Longest accepted resolution prompt (characters)
pub const MAX_PROMPT_LENGTH: usize = 2048;

/// Smallest initial liquidity, in whole collateral tokens
pub const MIN_COLLATERAL_TOKENS: u64 = 20;

/// Gas limit used for `createBet`
pub const CREATE_BET_GAS_LIMIT: u64 = 1_000_000;

/// Native value (gwei) attached to `resolve` to pay for the oracle callback
pub const RESOLVE_ORACLE_FEE_GWEI: u64 = 5_000;

/// Error text shown inline is cut to this many characters
pub const MAX_ERROR_DISPLAY_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "Buy"),
            TradeSide::Sell => write!(f, "Sell"),
        }
    }
}

/// Parameters for launching a new market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBet {
    pub title: String,
    pub resolution_prompt: String,
    /// Smallest collateral units
    pub initial_liquidity: U256,
    pub closing_time: DateTime<Utc>,
    pub resolution_time: DateTime<Utc>,
    pub discussion_url: String,
    pub tags: String,
    pub logo_url: String,
}

impl NewBet {
    /// Check launch constraints; `collateral_decimals` scales the minimum liquidity
    pub fn validate(&self, collateral_decimals: u8) -> Result<()> {
        let title_len = self.title.trim().chars().count();
        if title_len == 0 || title_len > MAX_TITLE_LENGTH {
            return Err(eyre!("Title must be 1-{} characters (got {})", MAX_TITLE_LENGTH, title_len));
        }

        let prompt_len = self.resolution_prompt.trim().chars().count();
        if prompt_len == 0 || prompt_len > MAX_PROMPT_LENGTH {
            return Err(eyre!("Resolution prompt must be 1-{} characters (got {})", MAX_PROMPT_LENGTH, prompt_len));
        }

        let min_liquidity = U256::from(MIN_COLLATERAL_TOKENS)
            * U256::from(10u64).pow(U256::from(collateral_decimals));
        if self.initial_liquidity < min_liquidity {
            return Err(eyre!("Initial liquidity must be at least {} tokens", MIN_COLLATERAL_TOKENS));
        }

        if self.resolution_time < self.closing_time {
            return Err(eyre!("Resolution time must not be before closing time"));
        }

        Ok(())
    }

    fn into_call(self) -> IMolyparket::createBetCall {
        IMolyparket::createBetCall {
            title: self.title,
            resolutionPrompt: self.resolution_prompt,
            initialLiquidity: self.initial_liquidity,
            closingTime: U256::from(self.closing_time.timestamp().max(0) as u64),
            resolutionTime: U256::from(self.resolution_time.timestamp().max(0) as u64),
            discussionUrl: self.discussion_url,
            tags: self.tags,
            logoUrl: self.logo_url,
        }
    }
}

/// Signed actions against one market contract
pub struct MarketActions {
    bridge: Arc<dyn ContractBridge>,
    ctx: MarketContext,
}

impl MarketActions {
    pub fn new(bridge: Arc<dyn ContractBridge>, ctx: MarketContext) -> Self {
        Self { bridge, ctx }
    }

    async fn send<C: SolCall>(&self, call: C, options: ExecuteOptions) -> Result<ExecutionReceipt> {
        self.bridge
            .execute(self.ctx.chain_id, self.ctx.contract, call.abi_encode().into(), options)
            .await
    }

    pub async fn create_bet(&self, bet: NewBet, collateral_decimals: u8) -> Result<ExecutionReceipt> {
        bet.validate(collateral_decimals)?;
        info!("🚀 Creating market \"{}\" on {}", bet.title, self.ctx);
        self.send(bet.into_call(), ExecuteOptions::wait().with_gas_limit(CREATE_BET_GAS_LIMIT)).await
    }

    /// Buy or sell `amount` of an outcome; referrer defaults to the zero address
    pub async fn trade(
        &self,
        side: TradeSide,
        outcome: Outcome,
        pool_id: U256,
        amount: U256,
        referrer: Option<Address>,
    ) -> Result<ExecutionReceipt> {
        if amount.is_zero() {
            return Err(eyre!("Trade amount must be greater than zero"));
        }
        let referrer = referrer.unwrap_or(Address::ZERO);
        info!("{} {} on pool {}: {} units", side, outcome, pool_id, amount);

        let options = ExecuteOptions::wait();
        match (side, outcome) {
            (TradeSide::Buy, Outcome::Yes) => {
                self.send(IMolyparket::buyYesCall { poolId: pool_id, amount, referrer }, options).await
            }
            (TradeSide::Buy, Outcome::No) => {
                self.send(IMolyparket::buyNoCall { poolId: pool_id, amount, referrer }, options).await
            }
            (TradeSide::Sell, Outcome::Yes) => {
                self.send(IMolyparket::sellYesCall { poolId: pool_id, amount, referrer }, options).await
            }
            (TradeSide::Sell, Outcome::No) => {
                self.send(IMolyparket::sellNoCall { poolId: pool_id, amount, referrer }, options).await
            }
        }
    }

    /// Ask the oracle to settle a closed pool
    pub async fn resolve(&self, pool_id: U256) -> Result<ExecutionReceipt> {
        let options = ExecuteOptions::wait().with_value(resolve_oracle_fee());
        self.send(IMolyparket::resolveCall { poolId: pool_id }, options).await
    }

    pub async fn withdraw(&self, pool_id: U256) -> Result<ExecutionReceipt> {
        self.send(IMolyparket::withdrawCall { poolId: pool_id }, ExecuteOptions::wait()).await
    }
}

/// Wei attached to `resolve`
pub fn resolve_oracle_fee() -> U256 {
    U256::from(RESOLVE_ORACLE_FEE_GWEI) * U256::from(1_000_000_000u64)
}

/// Error text for inline display, cut to `MAX_ERROR_DISPLAY_CHARS`
pub fn display_error(err: &eyre::Report) -> String {
    err.to_string().chars().take(MAX_ERROR_DISPLAY_CHARS).collect()
}

// ============================================
// TESTS
// ============================================
