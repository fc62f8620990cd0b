//! Collateral token helper
//!
//! Decimal conversion and balance lookups for an ERC-20 on a given chain.
//! `decimals()` is immutable per token, so it goes through the shared cache.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use eyre::Result;
use std::sync::Arc;

use super::bridge::{read_call, ContractBridge, ExecuteOptions, ExecutionReceipt};
use super::types::IERC20;
use crate::cache::{cache_key, ResponseCache};
use crate::units::{format_fixed, parse_amount, DISPLAY_PRECISION};

pub struct Erc20 {
    bridge: Arc<dyn ContractBridge>,
    cache: Arc<ResponseCache>,
    chain_id: u64,
    token: Address,
}

impl Erc20 {
    pub fn new(bridge: Arc<dyn ContractBridge>, cache: Arc<ResponseCache>, chain_id: u64, token: Address) -> Self {
        Self { bridge, cache, chain_id, token }
    }

    pub async fn decimals(&self) -> Result<u8> {
        let bridge = self.bridge.clone();
        let (chain_id, token) = (self.chain_id, self.token);
        self.cache
            .get_or_fetch(&cache_key(chain_id, &token, "decimals"), move || async move {
                read_call(bridge.as_ref(), chain_id, token, IERC20::decimalsCall {}).await
            })
            .await
    }

    /// Smallest-unit amount -> display string
    pub async fn to_human_readable(&self, amount: U256) -> Result<String> {
        Ok(format_fixed(amount, self.decimals().await?, DISPLAY_PRECISION))
    }

    /// Display string -> smallest-unit amount
    pub async fn to_machine_readable(&self, display: &str) -> Result<U256> {
        parse_amount(display, self.decimals().await?)
    }

    pub async fn balance_of(&self, account: Address) -> Result<U256> {
        read_call(self.bridge.as_ref(), self.chain_id, self.token, IERC20::balanceOfCall { account }).await
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        read_call(self.bridge.as_ref(), self.chain_id, self.token, IERC20::allowanceCall { owner, spender }).await
    }

    /// Approve `spender` for `amount` unless the current allowance already covers it
    pub async fn ensure_allowance(&self, owner: Address, spender: Address, amount: U256) -> Result<Option<ExecutionReceipt>> {
        if self.allowance(owner, spender).await? >= amount {
            return Ok(None);
        }

        let calldata = IERC20::approveCall { spender, amount }.abi_encode();
        let receipt = self.bridge
            .execute(self.chain_id, self.token, calldata.into(), ExecuteOptions::wait())
            .await?;
        Ok(Some(receipt))
    }
}

// ============================================
// TESTS
// ============================================
