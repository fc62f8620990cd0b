//! Market contract surface
//!
//! ABIs and decoded records, the call bridge, typed reads, the collateral
//! token helper and signed trading actions.

mod actions;
mod bridge;
mod reader;
mod token;
mod types;

pub use actions::{display_error, resolve_oracle_fee, MarketActions, NewBet, TradeSide, MAX_PROMPT_LENGTH, MAX_TITLE_LENGTH, MIN_COLLATERAL_TOKENS};
pub use bridge::{read_call, ContractBridge, ExecuteOptions, ExecutionReceipt, RpcBridge};
pub use reader::{MarketClient, MarketReader, PromptSlot};
pub use token::Erc20;
pub use types::{full_resolution_prompt, BetSummary, IDtnResolver, IMolyparket, IERC20, MarketContext, Outcome, Pool, Resolution};
