//! Contract Call Bridge
//!
//! The single seam between this crate and the chain:
//! - `call` performs a read-only `eth_call` and returns the raw return data
//! - `execute` signs and sends a transaction, optionally waiting for the receipt
//!
//! Typed readers (`MarketClient`, `Erc20`) encode/decode through `read_call`.

use alloy_network::{EthereumWallet, ReceiptResponse};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::Config;

/// Options for a state-changing call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Block until the transaction is mined
    pub wait: bool,
    pub gas_limit: Option<u64>,
    /// Native value attached to the call (wei)
    pub value: U256,
}

impl ExecuteOptions {
    pub fn wait() -> Self {
        Self { wait: true, ..Default::default() }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// What we know about a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub tx_hash: B256,
    /// Present once the receipt was observed
    pub block_number: Option<u64>,
    pub success: Option<bool>,
}

impl ExecutionReceipt {
    pub fn submitted(tx_hash: B256) -> Self {
        Self { tx_hash, block_number: None, success: None }
    }

    pub fn is_confirmed(&self) -> bool {
        self.block_number.is_some()
    }
}

#[async_trait]
pub trait ContractBridge: Send + Sync {
    /// Read-only call; may fail on transport errors or reverts
    async fn call(&self, chain_id: u64, to: Address, calldata: Bytes) -> Result<Bytes>;

    /// State-changing call signed by the configured account
    async fn execute(
        &self,
        chain_id: u64,
        to: Address,
        calldata: Bytes,
        options: ExecuteOptions,
    ) -> Result<ExecutionReceipt>;

    /// Account used by `execute`, if any
    fn account(&self) -> Option<Address> {
        None
    }
}

/// Encode `call`, run it through the bridge and decode the typed return
pub async fn read_call<C>(bridge: &dyn ContractBridge, chain_id: u64, to: Address, call: C) -> Result<C::Return>
where
    C: SolCall + Send + Sync,
{
    let calldata = Bytes::from(call.abi_encode());
    let data = bridge.call(chain_id, to, calldata).await?;
    C::abi_decode_returns(&data)
        .map_err(|e| eyre!("Failed to decode {} from {}: {}", C::SIGNATURE, to, e))
}

// ============================================
// JSON-RPC BRIDGE
// ============================================

/// Bridge backed by per-chain HTTP JSON-RPC endpoints
pub struct RpcBridge {
    rpc_urls: BTreeMap<u64, String>,
    signer: Option<PrivateKeySigner>,
}

impl RpcBridge {
    pub fn new(rpc_urls: BTreeMap<u64, String>, signer: Option<PrivateKeySigner>) -> Self {
        Self { rpc_urls, signer }
    }

    /// Build from configuration; the signer is optional (read-only mode without it)
    pub fn from_config(config: &Config) -> Result<Self> {
        let signer = match &config.private_key {
            Some(key) => {
                let signer = PrivateKeySigner::from_str(key.trim_start_matches("0x"))
                    .map_err(|e| eyre!("Failed to parse PRIVATE_KEY: {}", e))?;
                info!("✓ Signer loaded: {:?}", signer.address());
                Some(signer)
            }
            None => {
                debug!("PRIVATE_KEY not set (read-only mode)");
                None
            }
        };

        Ok(Self::new(config.rpc_url_map()?, signer))
    }

    fn rpc_url(&self, chain_id: u64) -> Result<&str> {
        self.rpc_urls
            .get(&chain_id)
            .map(String::as_str)
            .ok_or_else(|| eyre!("No RPC URL configured for chain {}", chain_id))
    }
}

#[async_trait]
impl ContractBridge for RpcBridge {
    async fn call(&self, chain_id: u64, to: Address, calldata: Bytes) -> Result<Bytes> {
        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url(chain_id)?.parse()?);

        let tx = TransactionRequest::default()
            .to(to)
            .input(calldata.into());

        let result = provider.call(tx).await
            .map_err(|e| eyre!("eth_call to {} failed: {}", to, e))?;

        Ok(result)
    }

    async fn execute(
        &self,
        chain_id: u64,
        to: Address,
        calldata: Bytes,
        options: ExecuteOptions,
    ) -> Result<ExecutionReceipt> {
        let signer = self.signer.clone()
            .ok_or_else(|| eyre!("No signer configured - set PRIVATE_KEY to send transactions"))?
            .with_chain_id(Some(chain_id));

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url(chain_id)?.parse()?);

        let mut tx = TransactionRequest::default()
            .to(to)
            .input(calldata.into())
            .value(options.value);
        if let Some(gas_limit) = options.gas_limit {
            tx = tx.gas_limit(gas_limit);
        }

        let pending = provider.send_transaction(tx).await
            .map_err(|e| eyre!("Transaction to {} failed: {}", to, e))?;
        let tx_hash = *pending.tx_hash();
        info!("📤 Submitted {:?} to {}", tx_hash, to);

        if !options.wait {
            return Ok(ExecutionReceipt::submitted(tx_hash));
        }

        let receipt = pending.get_receipt().await
            .map_err(|e| eyre!("Waiting for {:?} failed: {}", tx_hash, e))?;

        debug!("Receipt for {:?}: block {:?}, status {}", tx_hash, receipt.block_number(), receipt.status());

        Ok(ExecutionReceipt {
            tx_hash,
            block_number: receipt.block_number(),
            success: Some(receipt.status()),
        })
    }

    fn account(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }
}

// ============================================
// TESTS
// ============================================
