//! Molyparket Contract Types and ABIs
//!
//! Interface definitions for the market contract, the DTN resolver and the
//! collateral ERC-20, plus the decoded pool records handed to the aggregator.

use alloy_primitives::{Address, I256, U256};
use alloy_sol_types::sol;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};

// ============================================
// SOLIDITY INTERFACES
// ============================================

sol! {
    /// Prediction market contract (LMSR pools with yes/no outcome tokens)
    #[allow(missing_docs)]
    interface IMolyparket {
        function collateralToken() external view returns (address);
        function betIdsLength() external view returns (uint256);
        function betIds(uint256 index) external view returns (uint256);
        function dtnResolver() external view returns (address);

        function pools(uint256 poolId) external view returns (
            uint256 id,
            address creator,
            uint256 closingTime,
            uint256 resolutionTime,
            int256 b,
            int256 nYes,
            int256 nNo,
            uint256 totalSupplyYes,
            uint256 totalSupplyNo,
            uint256 collateral,
            uint8 resolution,
            string title,
            string resolutionPrompt,
            string discussionUrl,
            string tags,
            string logoUrl
        );

        function getBetSummaries(uint256[] betIds) external view returns (
            uint256[] yesSupply,
            uint256[] noSupply,
            uint256[] collaterals,
            uint8[] resolutions
        );

        function costToBuyYes(uint256 poolId, uint256 amount) external view returns (uint256);
        function costToBuyNo(uint256 poolId, uint256 amount) external view returns (uint256);
        function yesBalances(uint256 poolId, address account) external view returns (uint256);
        function noBalances(uint256 poolId, address account) external view returns (uint256);
        function withdrawableAmount(uint256 poolId, address account) external view returns (uint256);

        function createBet(
            string title,
            string resolutionPrompt,
            uint256 initialLiquidity,
            uint256 closingTime,
            uint256 resolutionTime,
            string discussionUrl,
            string tags,
            string logoUrl
        ) external;
        function buyYes(uint256 poolId, uint256 amount, address referrer) external;
        function buyNo(uint256 poolId, uint256 amount, address referrer) external;
        function sellYes(uint256 poolId, uint256 amount, address referrer) external;
        function sellNo(uint256 poolId, uint256 amount, address referrer) external;
        function resolve(uint256 poolId) external payable;
        function withdraw(uint256 poolId) external;
    }

    /// Resolver holding the static halves of the oracle instruction
    #[allow(missing_docs)]
    interface IDtnResolver {
        function systemPrompt1() external view returns (string);
        function systemPrompt2() external view returns (string);
    }

    #[allow(missing_docs)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

// ============================================
// RESOLUTION
// ============================================

/// Terminal outcome of a pool, encoded on-chain as a uint8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    Unresolved,
    Yes,
    No,
    Inconclusive,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        *self != Resolution::Unresolved
    }

    /// Human label for a settled pool, `None` while unresolved
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Resolution::Unresolved => None,
            Resolution::Yes => Some("Yes"),
            Resolution::No => Some("No"),
            Resolution::Inconclusive => Some("Inconclusive"),
        }
    }
}

impl TryFrom<u8> for Resolution {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Resolution::Unresolved),
            1 => Ok(Resolution::Yes),
            2 => Ok(Resolution::No),
            3 => Ok(Resolution::Inconclusive),
            other => Err(eyre!("Unknown resolution state {}", other)),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Unresolved => write!(f, "UNRESOLVED"),
            Resolution::Yes => write!(f, "YES"),
            Resolution::No => write!(f, "NO"),
            Resolution::Inconclusive => write!(f, "INCONCLUSIVE"),
        }
    }
}

/// Which side of a binary pool a trade or balance refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Yes => write!(f, "Yes"),
            Outcome::No => write!(f, "No"),
        }
    }
}

// ============================================
// MARKET CONTEXT
// ============================================

/// A deployed market contract on a specific chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketContext {
    pub chain_id: u64,
    pub contract: Address,
}

impl MarketContext {
    pub fn new(chain_id: u64, contract: Address) -> Self {
        Self { chain_id, contract }
    }
}

impl std::fmt::Display for MarketContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.contract, self.chain_id)
    }
}

// ============================================
// POOL RECORDS
// ============================================

/// One prediction market as stored by the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: U256,
    pub creator: Address,
    /// Unix seconds after which trading stops
    pub closing_time: u64,
    /// Unix seconds after which `resolve` may be called
    pub resolution_time: u64,
    /// LMSR liquidity parameter (SD59x18)
    pub b: I256,
    pub n_yes: I256,
    pub n_no: I256,
    pub total_supply_yes: U256,
    pub total_supply_no: U256,
    pub collateral: U256,
    pub resolution: Resolution,
    pub title: String,
    pub resolution_prompt: String,
    pub discussion_url: String,
    /// Comma separated keywords
    pub tags: String,
    pub logo_url: String,
}

impl Pool {
    /// Share of yes supply in percent, rounded down. `None` for an empty pool.
    pub fn yes_percentage(&self) -> Option<u64> {
        let total = self.total_supply_yes.checked_add(self.total_supply_no)?;
        if total.is_zero() {
            return None;
        }
        let pct = U256::from(100u64).saturating_mul(self.total_supply_yes) / total;
        u64::try_from(pct).ok()
    }

    pub fn is_closed(&self, now_unix: u64) -> bool {
        now_unix > self.closing_time
    }

    /// Individual tags, trimmed, empty entries dropped
    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags.split(',').map(str::trim).filter(|t| !t.is_empty())
    }
}

impl TryFrom<IMolyparket::poolsReturn> for Pool {
    type Error = eyre::Report;

    fn try_from(raw: IMolyparket::poolsReturn) -> Result<Self> {
        Ok(Self {
            id: raw.id,
            creator: raw.creator,
            closing_time: u64::try_from(raw.closingTime).unwrap_or(u64::MAX),
            resolution_time: u64::try_from(raw.resolutionTime).unwrap_or(u64::MAX),
            b: raw.b,
            n_yes: raw.nYes,
            n_no: raw.nNo,
            total_supply_yes: raw.totalSupplyYes,
            total_supply_no: raw.totalSupplyNo,
            collateral: raw.collateral,
            resolution: Resolution::try_from(raw.resolution)?,
            title: raw.title,
            resolution_prompt: raw.resolutionPrompt,
            discussion_url: raw.discussionUrl,
            tags: raw.tags,
            logo_url: raw.logoUrl,
        })
    }
}

/// Mutable pool fields returned in bulk by `getBetSummaries`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetSummary {
    pub yes_supply: U256,
    pub no_supply: U256,
    pub collateral: U256,
    pub resolution: Resolution,
}

/// Oracle instruction sent to the resolver: system prompts around the pool's own prompt
pub fn full_resolution_prompt(pool_prompt: &str, system_prompt1: &str, system_prompt2: &str) -> String {
    format!("{}\n\n{}\n\n{}", system_prompt1, pool_prompt, system_prompt2)
}

// ============================================
// TESTS
// ============================================
