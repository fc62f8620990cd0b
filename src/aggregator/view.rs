//! Aggregated market view
//!
//! `MolyparketInfo` is the display-ready snapshot published by the aggregator.
//! Bulk summaries are authoritative for the mutable pool fields.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::market::{full_resolution_prompt, BetSummary, Pool};

#[derive(Debug, Clone, Serialize)]
pub struct MolyparketInfo {
    pub chain_id: u64,
    pub contract: Option<Address>,
    pub collateral_token_address: Option<Address>,
    pub collateral_token_decimals: Option<u8>,
    /// Pools known to the contract (not just the loaded ones)
    pub pool_count: u64,
    /// Newest first
    pub pools: Vec<Pool>,
    pub keywords: BTreeMap<String, usize>,
    /// Most used first, ties alphabetical
    pub keywords_sorted: Vec<String>,
    pub system_prompt1: Option<String>,
    pub system_prompt2: Option<String>,
    pub bet_resolver_contract_address: Option<Address>,
    pub updated_at: DateTime<Utc>,
}

impl Default for MolyparketInfo {
    fn default() -> Self {
        Self {
            chain_id: 0,
            contract: None,
            collateral_token_address: None,
            collateral_token_decimals: None,
            pool_count: 0,
            pools: Vec::new(),
            keywords: BTreeMap::new(),
            keywords_sorted: Vec::new(),
            system_prompt1: None,
            system_prompt2: None,
            bet_resolver_contract_address: None,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl MolyparketInfo {
    pub fn pool(&self, id: U256) -> Option<&Pool> {
        self.pools.iter().find(|p| p.id == id)
    }

    /// Oracle instruction for `pool`, once both resolver prompts are known
    pub fn full_resolution_prompt(&self, pool: &Pool) -> Option<String> {
        let p1 = self.system_prompt1.as_deref()?;
        let p2 = self.system_prompt2.as_deref()?;
        Some(full_resolution_prompt(&pool.resolution_prompt, p1, p2))
    }
}

/// Overlay the summary's mutable fields onto a detail record
pub fn reconcile(pool: &Pool, summary: Option<&BetSummary>) -> Pool {
    let mut merged = pool.clone();
    if let Some(summary) = summary {
        merged.total_supply_yes = summary.yes_supply;
        merged.total_supply_no = summary.no_supply;
        merged.collateral = summary.collateral;
        merged.resolution = summary.resolution;
    }
    merged
}

/// Reconciled pools, highest id first
pub fn reconcile_all(pools: &BTreeMap<U256, Pool>, summaries: &HashMap<U256, BetSummary>) -> Vec<Pool> {
    pools
        .iter()
        .rev()
        .map(|(id, pool)| reconcile(pool, summaries.get(id)))
        .collect()
}

/// Tag frequency across pools plus the display ordering
pub fn derive_keywords<'a>(pools: impl IntoIterator<Item = &'a Pool>) -> (BTreeMap<String, usize>, Vec<String>) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for pool in pools {
        for tag in pool.tag_list() {
            *counts.entry(tag.to_string()).or_default() += 1;
        }
    }

    // BTreeMap iteration is alphabetical and the sort is stable
    let mut sorted: Vec<(&String, &usize)> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1));
    let sorted = sorted.into_iter().map(|(tag, _)| tag.clone()).collect();

    (counts, sorted)
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Resolution;
    use alloy_primitives::I256;

    fn pool(id: u64, tags: &str) -> Pool {
        Pool {
            id: U256::from(id),
            creator: Address::repeat_byte(0x11),
            closing_time: 1_700_000_000,
            resolution_time: 1_700_086_400,
            b: I256::ZERO,
            n_yes: I256::ZERO,
            n_no: I256::ZERO,
            total_supply_yes: U256::ZERO,
            total_supply_no: U256::from(50u64),
            collateral: U256::from(10u64),
            resolution: Resolution::Unresolved,
            title: format!("Pool {}", id),
            resolution_prompt: "Resolve it".to_string(),
            discussion_url: String::new(),
            tags: tags.to_string(),
            logo_url: String::new(),
        }
    }

    #[test]
    fn test_keywords_counted_and_sorted() {
        let pools = [pool(1, "fed, rates"), pool(2, "fed"), pool(3, "")];
        let (keywords, sorted) = derive_keywords(&pools);

        assert_eq!(keywords.len(), 2);
        assert_eq!(keywords["fed"], 2);
        assert_eq!(keywords["rates"], 1);
        assert_eq!(sorted, vec!["fed", "rates"]);
    }

    #[test]
    fn test_keyword_ties_alphabetical() {
        let pools = [pool(1, "zeta, alpha , ,"), pool(2, "mid")];
        let (_, sorted) = derive_keywords(&pools);
        assert_eq!(sorted, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_summary_overwrites_detail() {
        let detail = pool(1, "");
        let summary = BetSummary {
            yes_supply: U256::from(100u64),
            no_supply: U256::from(40u64),
            collateral: U256::from(77u64),
            resolution: Resolution::Yes,
        };

        let merged = reconcile(&detail, Some(&summary));
        assert_eq!(merged.total_supply_yes, U256::from(100u64));
        assert_eq!(merged.total_supply_no, U256::from(40u64));
        assert_eq!(merged.collateral, U256::from(77u64));
        assert_eq!(merged.resolution, Resolution::Yes);
        assert_eq!(merged.title, detail.title);
    }

    #[test]
    fn test_missing_summary_keeps_detail() {
        let detail = pool(1, "");
        assert_eq!(reconcile(&detail, None), detail);
    }

    #[test]
    fn test_pools_descending() {
        let mut pools = BTreeMap::new();
        for id in [3u64, 5, 1] {
            pools.insert(U256::from(id), pool(id, ""));
        }
        let ids: Vec<U256> = reconcile_all(&pools, &HashMap::new()).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![U256::from(5u64), U256::from(3u64), U256::from(1u64)]);
    }

    #[test]
    fn test_full_prompt_needs_both_halves() {
        let mut info = MolyparketInfo::default();
        let p = pool(1, "");
        assert_eq!(info.full_resolution_prompt(&p), None);

        info.system_prompt1 = Some("A".to_string());
        info.system_prompt2 = Some("B".to_string());
        assert_eq!(info.full_resolution_prompt(&p).unwrap(), "A\n\nResolve it\n\nB");
    }
}
