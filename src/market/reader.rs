//! Typed read access to the market contract
//!
//! `MarketReader` is what the aggregator consumes; `MarketClient` implements
//! it on top of any `ContractBridge`.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::sync::Arc;
use tracing::trace;

use super::bridge::{read_call, ContractBridge};
use super::types::{BetSummary, IDtnResolver, IMolyparket, MarketContext, Outcome, Pool, Resolution, IERC20};

/// Which of the resolver's two static prompts to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptSlot {
    First,
    Second,
}

impl PromptSlot {
    pub fn cache_resource(&self) -> &'static str {
        match self {
            PromptSlot::First => "systemPrompt1",
            PromptSlot::Second => "systemPrompt2",
        }
    }
}

#[async_trait]
pub trait MarketReader: Send + Sync {
    async fn collateral_token(&self, ctx: &MarketContext) -> Result<Address>;

    /// ERC-20 `decimals()` of `token`
    async fn token_decimals(&self, chain_id: u64, token: Address) -> Result<u8>;

    /// Total number of pools ever created
    async fn bet_ids_length(&self, ctx: &MarketContext) -> Result<u64>;

    /// Pool identifier stored at `index`
    async fn bet_id(&self, ctx: &MarketContext, index: u64) -> Result<U256>;

    async fn pool(&self, ctx: &MarketContext, id: U256) -> Result<Pool>;

    /// One summary per id, in the order submitted
    async fn bet_summaries(&self, ctx: &MarketContext, ids: &[U256]) -> Result<Vec<BetSummary>>;

    async fn dtn_resolver(&self, ctx: &MarketContext) -> Result<Address>;

    async fn system_prompt(&self, chain_id: u64, resolver: Address, slot: PromptSlot) -> Result<String>;

    async fn cost_to_buy(&self, ctx: &MarketContext, pool_id: U256, outcome: Outcome, amount: U256) -> Result<U256>;

    async fn outcome_balance(&self, ctx: &MarketContext, pool_id: U256, outcome: Outcome, account: Address) -> Result<U256>;

    async fn withdrawable_amount(&self, ctx: &MarketContext, pool_id: U256, account: Address) -> Result<U256>;
}

/// `MarketReader` over a contract bridge
pub struct MarketClient {
    bridge: Arc<dyn ContractBridge>,
}

impl MarketClient {
    pub fn new(bridge: Arc<dyn ContractBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl MarketReader for MarketClient {
    async fn collateral_token(&self, ctx: &MarketContext) -> Result<Address> {
        read_call(self.bridge.as_ref(), ctx.chain_id, ctx.contract, IMolyparket::collateralTokenCall {}).await
    }

    async fn token_decimals(&self, chain_id: u64, token: Address) -> Result<u8> {
        read_call(self.bridge.as_ref(), chain_id, token, IERC20::decimalsCall {}).await
    }

    async fn bet_ids_length(&self, ctx: &MarketContext) -> Result<u64> {
        let count = read_call(self.bridge.as_ref(), ctx.chain_id, ctx.contract, IMolyparket::betIdsLengthCall {}).await?;
        u64::try_from(count).map_err(|_| eyre!("Pool count {} does not fit in u64", count))
    }

    async fn bet_id(&self, ctx: &MarketContext, index: u64) -> Result<U256> {
        read_call(
            self.bridge.as_ref(),
            ctx.chain_id,
            ctx.contract,
            IMolyparket::betIdsCall { index: U256::from(index) },
        )
        .await
        .map_err(|e| eyre!("Bet ID {} not found: {}", index, e))
    }

    async fn pool(&self, ctx: &MarketContext, id: U256) -> Result<Pool> {
        let raw = read_call(self.bridge.as_ref(), ctx.chain_id, ctx.contract, IMolyparket::poolsCall { poolId: id }).await?;

        // Unknown ids come back as a zeroed struct
        if raw.creator == Address::ZERO {
            return Err(eyre!("Pool {} not found", id));
        }

        trace!("Loaded pool {} ({})", id, raw.title);
        Pool::try_from(raw)
    }

    async fn bet_summaries(&self, ctx: &MarketContext, ids: &[U256]) -> Result<Vec<BetSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw = read_call(
            self.bridge.as_ref(),
            ctx.chain_id,
            ctx.contract,
            IMolyparket::getBetSummariesCall { betIds: ids.to_vec() },
        )
        .await?;

        let n = ids.len();
        if raw.yesSupply.len() != n || raw.noSupply.len() != n
            || raw.collaterals.len() != n || raw.resolutions.len() != n
        {
            return Err(eyre!(
                "getBetSummaries returned mismatched arrays for {} ids ({}/{}/{}/{})",
                n, raw.yesSupply.len(), raw.noSupply.len(), raw.collaterals.len(), raw.resolutions.len()
            ));
        }

        (0..n)
            .map(|i| {
                Ok(BetSummary {
                    yes_supply: raw.yesSupply[i],
                    no_supply: raw.noSupply[i],
                    collateral: raw.collaterals[i],
                    resolution: Resolution::try_from(raw.resolutions[i])?,
                })
            })
            .collect()
    }

    async fn dtn_resolver(&self, ctx: &MarketContext) -> Result<Address> {
        read_call(self.bridge.as_ref(), ctx.chain_id, ctx.contract, IMolyparket::dtnResolverCall {}).await
    }

    async fn system_prompt(&self, chain_id: u64, resolver: Address, slot: PromptSlot) -> Result<String> {
        match slot {
            PromptSlot::First => {
                read_call(self.bridge.as_ref(), chain_id, resolver, IDtnResolver::systemPrompt1Call {}).await
            }
            PromptSlot::Second => {
                read_call(self.bridge.as_ref(), chain_id, resolver, IDtnResolver::systemPrompt2Call {}).await
            }
        }
    }

    async fn cost_to_buy(&self, ctx: &MarketContext, pool_id: U256, outcome: Outcome, amount: U256) -> Result<U256> {
        let bridge = self.bridge.as_ref();
        match outcome {
            Outcome::Yes => {
                read_call(bridge, ctx.chain_id, ctx.contract, IMolyparket::costToBuyYesCall { poolId: pool_id, amount }).await
            }
            Outcome::No => {
                read_call(bridge, ctx.chain_id, ctx.contract, IMolyparket::costToBuyNoCall { poolId: pool_id, amount }).await
            }
        }
    }

    async fn outcome_balance(&self, ctx: &MarketContext, pool_id: U256, outcome: Outcome, account: Address) -> Result<U256> {
        let bridge = self.bridge.as_ref();
        match outcome {
            Outcome::Yes => {
                read_call(bridge, ctx.chain_id, ctx.contract, IMolyparket::yesBalancesCall { poolId: pool_id, account }).await
            }
            Outcome::No => {
                read_call(bridge, ctx.chain_id, ctx.contract, IMolyparket::noBalancesCall { poolId: pool_id, account }).await
            }
        }
    }

    async fn withdrawable_amount(&self, ctx: &MarketContext, pool_id: U256, account: Address) -> Result<U256> {
        read_call(
            self.bridge.as_ref(),
            ctx.chain_id,
            ctx.contract,
            IMolyparket::withdrawableAmountCall { poolId: pool_id, account },
        )
        .await
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::bridge::{ExecuteOptions, ExecutionReceipt};
    use alloy_primitives::{address, Bytes};
    use alloy_sol_types::{SolCall, SolValue};
    use std::sync::Mutex;

    /// Returns a fixed payload and records every calldata it sees
    struct CannedBridge {
        response: Bytes,
        seen: Mutex<Vec<(Address, Bytes)>>,
    }

    impl CannedBridge {
        fn new(response: Vec<u8>) -> Self {
            Self { response: response.into(), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ContractBridge for CannedBridge {
        async fn call(&self, _chain_id: u64, to: Address, calldata: Bytes) -> Result<Bytes> {
            self.seen.lock().unwrap().push((to, calldata));
            Ok(self.response.clone())
        }

        async fn execute(&self, _: u64, _: Address, _: Bytes, _: ExecuteOptions) -> Result<ExecutionReceipt> {
            Err(eyre!("read-only"))
        }
    }

    fn ctx() -> MarketContext {
        MarketContext::new(8453, address!("2222222222222222222222222222222222222222"))
    }

    #[tokio::test]
    async fn test_collateral_token_decoded() {
        let token = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
        let bridge = Arc::new(CannedBridge::new(token.abi_encode()));
        let client = MarketClient::new(bridge.clone());

        let decoded = client.collateral_token(&ctx()).await.unwrap();
        assert_eq!(decoded, token);

        let seen = bridge.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, ctx().contract);
        assert_eq!(&seen[0].1[..4], &IMolyparket::collateralTokenCall::SELECTOR[..]);
    }

    #[tokio::test]
    async fn test_token_decimals_reads_the_token() {
        let token = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
        let bridge = Arc::new(CannedBridge::new(U256::from(6u64).abi_encode()));
        let client = MarketClient::new(bridge.clone());

        assert_eq!(client.token_decimals(8453, token).await.unwrap(), 6);

        let seen = bridge.seen.lock().unwrap();
        assert_eq!(seen[0].0, token);
        assert_eq!(&seen[0].1[..4], &IERC20::decimalsCall::SELECTOR[..]);
    }

    #[tokio::test]
    async fn test_bet_id_encodes_index() {
        let bridge = Arc::new(CannedBridge::new(U256::from(42u64).abi_encode()));
        let client = MarketClient::new(bridge.clone());

        assert_eq!(client.bet_id(&ctx(), 3).await.unwrap(), U256::from(42u64));

        let seen = bridge.seen.lock().unwrap();
        let expected = IMolyparket::betIdsCall { index: U256::from(3u64) }.abi_encode();
        assert_eq!(seen[0].1.to_vec(), expected);
    }

    #[tokio::test]
    async fn test_empty_summary_request_makes_no_call() {
        let bridge = Arc::new(CannedBridge::new(Vec::new()));
        let client = MarketClient::new(bridge.clone());

        let summaries = tokio_test::assert_ok!(client.bet_summaries(&ctx(), &[]).await);
        assert!(summaries.is_empty());
        assert!(bridge.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_return_is_an_error() {
        let bridge = Arc::new(CannedBridge::new(vec![0xde, 0xad]));
        let client = MarketClient::new(bridge);
        tokio_test::assert_err!(client.bet_ids_length(&ctx()).await);
    }
}
