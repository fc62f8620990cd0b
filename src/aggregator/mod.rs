//! Pool Aggregator
//!
//! Keeps a display-ready snapshot of the most recent pools of one market
//! contract. A refresh pass:
//! 1. Reads the collateral token and its decimals (cached) and the pool count
//!    (always fresh)
//! 2. Reads the resolver and its prompts (cached, fail-soft)
//! 3. Pages through the last `look_back` indices sequentially, merging and
//!    publishing each pool as it arrives; the first failing index aborts the pass
//! 4. Overlays one bulk summary read onto every loaded pool (fail-soft)
//!
//! Every context switch bumps a generation counter. Results from a pass that
//! started under an older generation are dropped instead of merged.

mod view;

pub use view::{derive_keywords, reconcile, reconcile_all, MolyparketInfo};

use alloy_primitives::{Address, U256};
use chrono::Utc;
use eyre::{eyre, Result};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::cache::{cache_key, indexed_cache_key, ResponseCache};
use crate::config::Config;
use crate::market::{BetSummary, MarketContext, MarketReader, Pool, PromptSlot};

/// Most recent pools loaded per pass
pub const DEFAULT_LOOK_BACK: u64 = 40;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of one paging pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingReport {
    /// Indices the pass covered, `None` when there are no pools
    pub range: Option<RangeInclusive<u64>>,
    pub loaded: usize,
    /// Index whose lookup failed and ended the pass
    pub aborted_at: Option<u64>,
    /// The context changed while the pass was running
    pub stale: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub pool_count: u64,
    pub paging: PagingReport,
    pub summaries_updated: bool,
}

#[derive(Default)]
struct AggregatorState {
    generation: u64,
    chain_id: u64,
    contract: Option<Address>,
    collateral_token: Option<Address>,
    collateral_decimals: Option<u8>,
    pool_count: u64,
    pools: BTreeMap<U256, Pool>,
    summaries: HashMap<U256, BetSummary>,
    resolver: Option<Address>,
    system_prompt1: Option<String>,
    system_prompt2: Option<String>,
}

impl AggregatorState {
    fn context(&self) -> Option<MarketContext> {
        self.contract.map(|contract| MarketContext::new(self.chain_id, contract))
    }

    fn to_info(&self) -> MolyparketInfo {
        let pools = reconcile_all(&self.pools, &self.summaries);
        let (keywords, keywords_sorted) = derive_keywords(&pools);

        MolyparketInfo {
            chain_id: self.chain_id,
            contract: self.contract,
            collateral_token_address: self.collateral_token,
            collateral_token_decimals: self.collateral_decimals,
            pool_count: self.pool_count,
            pools,
            keywords,
            keywords_sorted,
            system_prompt1: self.system_prompt1.clone(),
            system_prompt2: self.system_prompt2.clone(),
            bet_resolver_contract_address: self.resolver,
            updated_at: Utc::now(),
        }
    }
}

pub struct PoolAggregator {
    reader: Arc<dyn MarketReader>,
    cache: Arc<ResponseCache>,
    look_back: u64,
    request_timeout: Duration,
    state: RwLock<AggregatorState>,
    publisher: watch::Sender<Arc<MolyparketInfo>>,
}

impl PoolAggregator {
    pub fn new(reader: Arc<dyn MarketReader>, cache: Arc<ResponseCache>) -> Self {
        let (publisher, _) = watch::channel(Arc::new(MolyparketInfo::default()));
        Self {
            reader,
            cache,
            look_back: DEFAULT_LOOK_BACK,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            state: RwLock::new(AggregatorState::default()),
            publisher,
        }
    }

    pub fn from_config(reader: Arc<dyn MarketReader>, cache: Arc<ResponseCache>, config: &Config) -> Self {
        Self::new(reader, cache)
            .with_look_back(config.look_back)
            .with_request_timeout(Duration::from_secs(config.request_timeout_secs))
    }

    pub fn with_look_back(mut self, look_back: u64) -> Self {
        self.look_back = look_back;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<MolyparketInfo>> {
        self.publisher.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<MolyparketInfo> {
        self.publisher.borrow().clone()
    }

    /// Point the aggregator at a chain/contract pair. `None` makes it inert.
    ///
    /// Switching context drops all loaded data and invalidates running passes.
    pub async fn set_context(&self, chain_id: u64, contract: Option<Address>) {
        let mut state = self.state.write().await;
        if state.chain_id == chain_id && state.contract == contract && state.generation > 0 {
            return;
        }

        let generation = state.generation + 1;
        *state = AggregatorState {
            generation,
            chain_id,
            contract,
            ..Default::default()
        };

        match contract {
            Some(contract) => info!("🔗 Market context: {} on chain {} (generation {})", contract, chain_id, generation),
            None => warn!("⚠️  No market contract for chain {} - aggregator idle", chain_id),
        }
        self.publish(&state);
    }

    /// Full pass: general info, resolver prompts, paging, summaries
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let Some((ctx, generation)) = self.current().await else {
            debug!("No market context, skipping refresh");
            return Ok(RefreshReport::default());
        };

        let Some(pool_count) = self.refresh_general_info(ctx, generation).await? else {
            return Ok(RefreshReport {
                paging: PagingReport { stale: true, ..Default::default() },
                ..Default::default()
            });
        };
        self.refresh_resolver_prompts(ctx, generation).await;
        let paging = self.load_pools(ctx, generation, pool_count).await;
        let summaries_updated = if paging.stale {
            false
        } else {
            self.refresh_summaries(ctx, generation).await
        };

        Ok(RefreshReport { pool_count, paging, summaries_updated })
    }

    /// Only the resolver and its prompts, for showing a single pool
    pub async fn refresh_prompts(&self) {
        if let Some((ctx, generation)) = self.current().await {
            self.refresh_resolver_prompts(ctx, generation).await;
        }
    }

    async fn current(&self) -> Option<(MarketContext, u64)> {
        let state = self.state.read().await;
        state.context().map(|ctx| (ctx, state.generation))
    }

    // ============================================
    // GENERAL INFO
    // ============================================

    /// Collateral token and decimals (cached) and pool count (fresh).
    ///
    /// Returns the pool count, or `None` when the context changed meanwhile.
    async fn refresh_general_info(&self, ctx: MarketContext, generation: u64) -> Result<Option<u64>> {
        let reader = self.reader.clone();
        let collateral_token: Address = self
            .cached(
                cache_key(ctx.chain_id, &ctx.contract, "collateralToken"),
                "collateralToken",
                async move { reader.collateral_token(&ctx).await },
            )
            .await?;
        let collateral_decimals = self.fetch_decimals(ctx.chain_id, collateral_token).await;

        let pool_count = bounded(self.request_timeout, "betIdsLength".to_string(), self.reader.bet_ids_length(&ctx)).await?;

        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!("Dropping general info from superseded pass on {}", ctx);
            return Ok(None);
        }
        if state.pool_count != pool_count {
            info!("📊 {} pools on {}", pool_count, ctx);
        }
        state.collateral_token = Some(collateral_token);
        if collateral_decimals.is_some() {
            state.collateral_decimals = collateral_decimals;
        }
        state.pool_count = pool_count;
        self.publish(&state);

        Ok(Some(pool_count))
    }

    /// Token decimals share the cache key used by `Erc20::decimals`
    async fn fetch_decimals(&self, chain_id: u64, token: Address) -> Option<u8> {
        let reader = self.reader.clone();
        let decimals = self
            .cached(
                cache_key(chain_id, &token, "decimals"),
                "decimals",
                async move { reader.token_decimals(chain_id, token).await },
            )
            .await;

        match decimals {
            Ok(decimals) => Some(decimals),
            Err(e) => {
                warn!("⚠️  Could not read decimals of {}: {}", token, e);
                None
            }
        }
    }

    /// Resolver address and both prompts; failures only leave them unset
    async fn refresh_resolver_prompts(&self, ctx: MarketContext, generation: u64) {
        let reader = self.reader.clone();
        let resolver: Address = match self
            .cached(
                cache_key(ctx.chain_id, &ctx.contract, "dtnResolver"),
                "dtnResolver",
                async move { reader.dtn_resolver(&ctx).await },
            )
            .await
        {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!("⚠️  Could not read resolver for {}: {}", ctx, e);
                return;
            }
        };

        let system_prompt1 = self.fetch_prompt(ctx.chain_id, resolver, PromptSlot::First).await;
        let system_prompt2 = self.fetch_prompt(ctx.chain_id, resolver, PromptSlot::Second).await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            return;
        }
        state.resolver = Some(resolver);
        if system_prompt1.is_some() {
            state.system_prompt1 = system_prompt1;
        }
        if system_prompt2.is_some() {
            state.system_prompt2 = system_prompt2;
        }
        self.publish(&state);
    }

    async fn fetch_prompt(&self, chain_id: u64, resolver: Address, slot: PromptSlot) -> Option<String> {
        let reader = self.reader.clone();
        let prompt = self
            .cached(
                cache_key(chain_id, &resolver, slot.cache_resource()),
                slot.cache_resource(),
                async move { reader.system_prompt(chain_id, resolver, slot).await },
            )
            .await;

        match prompt {
            Ok(prompt) => Some(prompt),
            Err(e) => {
                warn!("⚠️  Could not read {} from {}: {}", slot.cache_resource(), resolver, e);
                None
            }
        }
    }

    // ============================================
    // PAGING
    // ============================================

    /// Load the last `look_back` pools one index at a time
    async fn load_pools(&self, ctx: MarketContext, generation: u64, pool_count: u64) -> PagingReport {
        let Some(range) = paging_range(pool_count, self.look_back) else {
            return PagingReport::default();
        };
        let mut report = PagingReport { range: Some(range.clone()), ..Default::default() };

        for index in range {
            let pool = match self.fetch_pool_at(ctx, index).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!("❌ Pool paging on {} stopped at index {}: {}", ctx, index, e);
                    report.aborted_at = Some(index);
                    break;
                }
            };

            let mut state = self.state.write().await;
            if state.generation != generation {
                debug!("Discarding pool {} from superseded pass on {}", pool.id, ctx);
                report.stale = true;
                break;
            }
            state.pools.insert(pool.id, pool);
            report.loaded += 1;
            self.publish(&state);
        }

        if report.aborted_at.is_none() && !report.stale {
            debug!("Loaded {} pools from {}", report.loaded, ctx);
        }
        report
    }

    async fn fetch_pool_at(&self, ctx: MarketContext, index: u64) -> Result<Pool> {
        let reader = self.reader.clone();
        let id: U256 = self
            .cached(
                indexed_cache_key(ctx.chain_id, &ctx.contract, "betId", index),
                "betIds",
                async move { reader.bet_id(&ctx, index).await },
            )
            .await?;

        let reader = self.reader.clone();
        self.cached(
            indexed_cache_key(ctx.chain_id, &ctx.contract, "pool", id),
            "pools",
            async move { reader.pool(&ctx, id).await },
        )
        .await
    }

    // ============================================
    // SUMMARIES
    // ============================================

    /// One bulk read for every loaded pool. Returns whether summaries changed.
    async fn refresh_summaries(&self, ctx: MarketContext, generation: u64) -> bool {
        let ids: Vec<U256> = {
            let state = self.state.read().await;
            if state.generation != generation {
                return false;
            }
            state.pools.keys().copied().collect()
        };
        if ids.is_empty() {
            return false;
        }

        let summaries = match bounded(
            self.request_timeout,
            "getBetSummaries".to_string(),
            self.reader.bet_summaries(&ctx, &ids),
        )
        .await
        {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!("⚠️  Bet summaries for {} unavailable, keeping last known values: {}", ctx, e);
                return false;
            }
        };

        let mut state = self.state.write().await;
        if state.generation != generation {
            return false;
        }
        state.summaries.extend(ids.into_iter().zip(summaries));
        self.publish(&state);
        true
    }

    // ============================================
    // HELPERS
    // ============================================

    /// Read-through the shared cache; the fetch itself is time-bounded
    async fn cached<V, Fut>(&self, key: String, what: &str, fetch: Fut) -> Result<V>
    where
        V: Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let limit = self.request_timeout;
        let what = what.to_string();
        self.cache.get_or_fetch(&key, move || bounded(limit, what, fetch)).await
    }

    fn publish(&self, state: &AggregatorState) {
        self.publisher.send_replace(Arc::new(state.to_info()));
    }
}

/// `[max(0, N - L), N - 1]`, or `None` when nothing should be loaded
pub fn paging_range(pool_count: u64, look_back: u64) -> Option<RangeInclusive<u64>> {
    if pool_count == 0 || look_back == 0 {
        return None;
    }
    Some(pool_count.saturating_sub(look_back)..=pool_count - 1)
}

async fn bounded<T>(limit: Duration, what: String, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(eyre!("{} timed out after {:?}", what, limit)),
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Outcome, Resolution};
    use alloy_primitives::{address, I256};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const CONTRACT: Address = address!("2222222222222222222222222222222222222222");
    const OTHER_CONTRACT: Address = address!("3333333333333333333333333333333333333333");
    const TOKEN: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
    const RESOLVER: Address = address!("4444444444444444444444444444444444444444");

    /// In-memory market: pool at index `i` has id `i + 1`
    #[derive(Default)]
    struct MockReader {
        pool_count: u64,
        fail_index: Option<u64>,
        fail_summaries: bool,
        pool_delay: Option<Duration>,
        count_delay: Option<Duration>,
        collateral_delay: Option<Duration>,
        fail_decimals: bool,
        tags: HashMap<u64, String>,
        calls: Mutex<HashMap<&'static str, usize>>,
        requested_indices: Mutex<Vec<u64>>,
    }

    impl MockReader {
        fn with_pools(pool_count: u64) -> Self {
            Self { pool_count, ..Default::default() }
        }

        fn record(&self, method: &'static str) {
            *self.calls.lock().unwrap().entry(method).or_default() += 1;
        }

        fn calls(&self, method: &str) -> usize {
            self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
        }
    }

    fn test_pool(id: U256, tags: &str) -> Pool {
        Pool {
            id,
            creator: Address::repeat_byte(0x11),
            closing_time: 1_700_000_000,
            resolution_time: 1_700_086_400,
            b: I256::ZERO,
            n_yes: I256::ZERO,
            n_no: I256::ZERO,
            total_supply_yes: U256::ZERO,
            total_supply_no: U256::ZERO,
            collateral: U256::from(20u64),
            resolution: Resolution::Unresolved,
            title: format!("Pool {}", id),
            resolution_prompt: String::new(),
            discussion_url: String::new(),
            tags: tags.to_string(),
            logo_url: String::new(),
        }
    }

    #[async_trait]
    impl MarketReader for MockReader {
        async fn collateral_token(&self, _: &MarketContext) -> Result<Address> {
            self.record("collateral_token");
            if let Some(delay) = self.collateral_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(TOKEN)
        }

        async fn token_decimals(&self, _: u64, _: Address) -> Result<u8> {
            self.record("token_decimals");
            if self.fail_decimals {
                return Err(eyre!("execution reverted"));
            }
            Ok(6)
        }

        async fn bet_ids_length(&self, _: &MarketContext) -> Result<u64> {
            self.record("bet_ids_length");
            if let Some(delay) = self.count_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.pool_count)
        }

        async fn bet_id(&self, _: &MarketContext, index: u64) -> Result<U256> {
            self.record("bet_id");
            self.requested_indices.lock().unwrap().push(index);
            if self.fail_index == Some(index) {
                return Err(eyre!("Bet ID {} not found", index));
            }
            Ok(U256::from(index + 1))
        }

        async fn pool(&self, _: &MarketContext, id: U256) -> Result<Pool> {
            self.record("pool");
            if let Some(delay) = self.pool_delay {
                tokio::time::sleep(delay).await;
            }
            let tags = self.tags.get(&id.to::<u64>()).cloned().unwrap_or_default();
            Ok(test_pool(id, &tags))
        }

        async fn bet_summaries(&self, _: &MarketContext, ids: &[U256]) -> Result<Vec<BetSummary>> {
            self.record("bet_summaries");
            if self.fail_summaries {
                return Err(eyre!("execution reverted"));
            }
            Ok(ids
                .iter()
                .map(|id| BetSummary {
                    yes_supply: *id * U256::from(100u64),
                    no_supply: U256::from(1u64),
                    collateral: U256::from(500u64),
                    resolution: Resolution::Yes,
                })
                .collect())
        }

        async fn dtn_resolver(&self, _: &MarketContext) -> Result<Address> {
            self.record("dtn_resolver");
            Ok(RESOLVER)
        }

        async fn system_prompt(&self, _: u64, _: Address, slot: PromptSlot) -> Result<String> {
            self.record("system_prompt");
            Ok(format!("prompt {:?}", slot))
        }

        async fn cost_to_buy(&self, _: &MarketContext, _: U256, _: Outcome, amount: U256) -> Result<U256> {
            Ok(amount)
        }

        async fn outcome_balance(&self, _: &MarketContext, _: U256, _: Outcome, _: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }

        async fn withdrawable_amount(&self, _: &MarketContext, _: U256, _: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }
    }

    async fn aggregator(reader: Arc<MockReader>) -> PoolAggregator {
        let aggregator = PoolAggregator::new(reader, Arc::new(ResponseCache::new()));
        aggregator.set_context(8453, Some(CONTRACT)).await;
        aggregator
    }

    #[test]
    fn test_paging_range() {
        assert_eq!(paging_range(3, 40), Some(0..=2));
        assert_eq!(paging_range(100, 40), Some(60..=99));
        assert_eq!(paging_range(40, 40), Some(0..=39));
        assert_eq!(paging_range(0, 40), None);
        assert_eq!(paging_range(5, 0), None);
    }

    #[tokio::test]
    async fn test_requests_only_the_look_back_window() {
        let reader = Arc::new(MockReader::with_pools(50));
        let aggregator = aggregator(reader.clone()).await;

        let report = aggregator.refresh().await.unwrap();
        assert_eq!(report.pool_count, 50);
        assert_eq!(report.paging.loaded, 40);

        let indices = reader.requested_indices.lock().unwrap().clone();
        assert_eq!(indices, (10..50).collect::<Vec<u64>>());
        assert_eq!(reader.calls("pool"), 40);
    }

    #[tokio::test]
    async fn test_snapshot_newest_first_with_summaries() {
        let reader = Arc::new(MockReader::with_pools(3));
        let aggregator = aggregator(reader.clone()).await;
        aggregator.refresh().await.unwrap();

        let info = aggregator.snapshot();
        let ids: Vec<U256> = info.pools.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![U256::from(3u64), U256::from(2u64), U256::from(1u64)]);
        assert_eq!(info.collateral_token_address, Some(TOKEN));
        assert_eq!(info.collateral_token_decimals, Some(6));
        assert_eq!(info.pool_count, 3);
        assert_eq!(info.pool(U256::from(2u64)).map(|p| p.title.as_str()), Some("Pool 2"));

        // summary values replace the detail values
        assert_eq!(info.pools[0].total_supply_yes, U256::from(300u64));
        assert_eq!(info.pools[0].resolution, Resolution::Yes);
        assert_eq!(info.bet_resolver_contract_address, Some(RESOLVER));
        assert!(info.system_prompt1.is_some() && info.system_prompt2.is_some());
    }

    #[tokio::test]
    async fn test_second_refresh_reuses_cached_reads() {
        let reader = Arc::new(MockReader::with_pools(3));
        let aggregator = aggregator(reader.clone()).await;

        aggregator.refresh().await.unwrap();
        aggregator.refresh().await.unwrap();

        for cached in ["collateral_token", "token_decimals", "dtn_resolver"] {
            assert_eq!(reader.calls(cached), 1, "{}", cached);
        }
        assert_eq!(reader.calls("system_prompt"), 2);
        assert_eq!(reader.calls("bet_id"), 3);
        assert_eq!(reader.calls("pool"), 3);

        // never cached
        assert_eq!(reader.calls("bet_ids_length"), 2);
        assert_eq!(reader.calls("bet_summaries"), 2);
    }

    #[tokio::test]
    async fn test_failing_index_aborts_the_pass() {
        let reader = Arc::new(MockReader { fail_index: Some(1), ..MockReader::with_pools(3) });
        let aggregator = aggregator(reader.clone()).await;

        let report = aggregator.refresh().await.unwrap();
        assert_eq!(report.paging.aborted_at, Some(1));
        assert_eq!(report.paging.loaded, 1);
        assert_eq!(reader.requested_indices.lock().unwrap().clone(), vec![0, 1]);

        let info = aggregator.snapshot();
        assert_eq!(info.pools.len(), 1);
        assert_eq!(info.pools[0].id, U256::from(1u64));
    }

    #[tokio::test]
    async fn test_failed_summaries_keep_last_known_values() {
        let reader = Arc::new(MockReader { fail_summaries: true, ..MockReader::with_pools(2) });
        let aggregator = aggregator(reader.clone()).await;

        let report = aggregator.refresh().await.unwrap();
        assert!(!report.summaries_updated);

        let info = aggregator.snapshot();
        assert_eq!(info.pools.len(), 2);
        assert_eq!(info.pools[0].total_supply_yes, U256::ZERO);
        assert_eq!(info.pools[0].resolution, Resolution::Unresolved);
    }

    #[tokio::test]
    async fn test_no_pools_means_no_summary_call() {
        let reader = Arc::new(MockReader::with_pools(0));
        let aggregator = aggregator(reader.clone()).await;

        let report = aggregator.refresh().await.unwrap();
        assert_eq!(report.paging.range, None);
        assert_eq!(reader.calls("bet_summaries"), 0);
    }

    #[tokio::test]
    async fn test_keywords_in_snapshot() {
        let mut reader = MockReader::with_pools(3);
        reader.tags.insert(1, "fed, rates".to_string());
        reader.tags.insert(2, "fed".to_string());
        reader.tags.insert(3, String::new());
        let aggregator = aggregator(Arc::new(reader)).await;
        aggregator.refresh().await.unwrap();

        let info = aggregator.snapshot();
        assert_eq!(info.keywords.get("fed"), Some(&2));
        assert_eq!(info.keywords.get("rates"), Some(&1));
        assert_eq!(info.keywords_sorted, vec!["fed", "rates"]);
    }

    #[tokio::test]
    async fn test_context_switch_discards_stale_pass() {
        let reader = Arc::new(MockReader {
            pool_delay: Some(Duration::from_millis(50)),
            ..MockReader::with_pools(3)
        });
        let aggregator = aggregator(reader.clone()).await;

        let switch = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            aggregator.set_context(8453, Some(OTHER_CONTRACT)).await;
        };
        let (report, _) = tokio::join!(aggregator.refresh(), switch);

        let report = report.unwrap();
        assert!(report.paging.stale);
        assert_eq!(report.paging.loaded, 0);

        let info = aggregator.snapshot();
        assert_eq!(info.contract, Some(OTHER_CONTRACT));
        assert!(info.pools.is_empty());
    }

    #[tokio::test]
    async fn test_context_switch_during_general_info_is_stale_not_an_error() {
        let reader = Arc::new(MockReader {
            collateral_delay: Some(Duration::from_millis(50)),
            ..MockReader::with_pools(3)
        });
        let aggregator = aggregator(reader.clone()).await;

        let switch = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            aggregator.set_context(84532, Some(OTHER_CONTRACT)).await;
        };
        let (report, _) = tokio::join!(aggregator.refresh(), switch);

        let report = tokio_test::assert_ok!(report);
        assert!(report.paging.stale);
        assert_eq!(report.pool_count, 0);
        assert_eq!(reader.calls("bet_id"), 0);
        assert_eq!(reader.calls("bet_summaries"), 0);

        let info = aggregator.snapshot();
        assert_eq!(info.chain_id, 84532);
        assert_eq!(info.collateral_token_address, None);
    }

    #[tokio::test]
    async fn test_missing_decimals_do_not_fail_the_pass() {
        let reader = Arc::new(MockReader { fail_decimals: true, ..MockReader::with_pools(2) });
        let aggregator = aggregator(reader.clone()).await;

        let report = aggregator.refresh().await.unwrap();
        assert_eq!(report.paging.loaded, 2);

        let info = aggregator.snapshot();
        assert_eq!(info.collateral_token_address, Some(TOKEN));
        assert_eq!(info.collateral_token_decimals, None);
    }

    #[tokio::test]
    async fn test_without_contract_is_inert() {
        let reader = Arc::new(MockReader::with_pools(3));
        let aggregator = PoolAggregator::new(reader.clone(), Arc::new(ResponseCache::new()));
        aggregator.set_context(1, None).await;

        let report = aggregator.refresh().await.unwrap();
        assert_eq!(report, RefreshReport::default());
        assert_eq!(reader.calls("bet_ids_length"), 0);
        assert_eq!(aggregator.snapshot().chain_id, 1);
    }

    #[tokio::test]
    async fn test_hanging_call_times_out() {
        let reader = Arc::new(MockReader {
            count_delay: Some(Duration::from_millis(500)),
            ..MockReader::with_pools(3)
        });
        let aggregator = PoolAggregator::new(reader, Arc::new(ResponseCache::new()))
            .with_request_timeout(Duration::from_millis(20));
        aggregator.set_context(8453, Some(CONTRACT)).await;

        let err = aggregator.refresh().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_subscribers_see_incremental_updates() {
        let reader = Arc::new(MockReader::with_pools(2));
        let aggregator = aggregator(reader).await;
        let mut rx = aggregator.subscribe();
        rx.borrow_and_update();

        aggregator.refresh().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().pools.len(), 2);
    }
}
