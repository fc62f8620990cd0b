//! Fixed-point amount conversions
//!
//! On-chain amounts are integers with 18 implied decimals (wei). Display
//! strings carry two decimals, rounded half-up.

use alloy_primitives::utils::{parse_units, ParseUnits};
use alloy_primitives::U256;
use eyre::{eyre, Result};

/// Implied decimals of the collateral and outcome tokens
pub const WEI_DECIMALS: u8 = 18;

/// Decimals shown to users
pub const DISPLAY_PRECISION: u8 = 2;

/// `1500000000000000000` -> `"1.50"`
pub fn wei_to_decimal(wei: U256) -> String {
    format_fixed(wei, WEI_DECIMALS, DISPLAY_PRECISION)
}

/// `"20.00"` -> `20000000000000000000`
pub fn decimal_to_wei(display: &str) -> Result<U256> {
    parse_amount(display, WEI_DECIMALS)
}

/// Format `value` (with `decimals` implied decimals) to `precision` places, rounding half-up
pub fn format_fixed(value: U256, decimals: u8, precision: u8) -> String {
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let precision_scale = U256::from(10u64).pow(U256::from(precision));

    let mut whole = value / scale;
    let remainder = value % scale;

    // remainder < scale, so the multiplication cannot overflow for sane decimals
    let mut frac = (remainder * precision_scale + scale / U256::from(2u64)) / scale;
    if frac >= precision_scale {
        whole += U256::from(1u64);
        frac -= precision_scale;
    }

    if precision == 0 {
        return whole.to_string();
    }
    format!("{}.{:0>width$}", whole, frac.to_string(), width = precision as usize)
}

/// Parse a human amount into its integer representation with `decimals` decimals
pub fn parse_amount(display: &str, decimals: u8) -> Result<U256> {
    let trimmed = display.trim();
    if trimmed.is_empty() {
        return Err(eyre!("Amount is empty"));
    }

    match parse_units(trimmed, decimals).map_err(|e| eyre!("Invalid amount '{}': {}", trimmed, e))? {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => Err(eyre!("Amount must not be negative: {}", trimmed)),
    }
}

/// `pct` percent of an on-chain balance, rounded down so it never exceeds the balance
pub fn percentage_of(balance: U256, pct: u8) -> Result<U256> {
    if pct > 100 {
        return Err(eyre!("Percentage must be between 0 and 100, got {}", pct));
    }
    Ok(balance * U256::from(pct) / U256::from(100u64))
}

// ============================================
// TESTS
// ============================================
