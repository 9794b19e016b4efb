//! Decimal conversions and formatting.
//!
//! Raw on-chain balances are fixed-point integers. Everything between the
//! reserve read and the final USD value stays in `BigDecimal`; only the
//! display value crosses into `f64`.

use alloy::primitives::hex;
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ============================================
// Fixed-point Normalization
// ============================================

/// Scale a raw integer balance down by `10^decimals`.
///
/// # Example
/// ```ignore
/// let raw = BigInt::from(1_500_000_000_000_000_000u128);
/// assert_eq!(normalize_amount(&raw, 18).to_string(), "1.5");
/// ```
pub fn normalize_amount(raw: &BigInt, decimals: u8) -> BigDecimal {
    let value = BigDecimal::from(raw.clone());
    if decimals == 0 {
        value
    } else {
        value / big_pow10(decimals)
    }
}

/// Divide, returning zero instead of failing when the divisor is zero.
pub fn safe_div(numerator: &BigDecimal, denominator: &BigDecimal) -> BigDecimal {
    if denominator.is_zero() {
        BigDecimal::zero()
    } else {
        numerator / denominator
    }
}

/// Convert to a display `f64`, mapping non-finite results to 0.0.
pub fn decimal_to_f64(value: &BigDecimal) -> f64 {
    match value.to_f64() {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Render an amount with four fractional digits, the stored text format.
pub fn format_amount(value: &BigDecimal) -> String {
    value.with_scale_round(4, RoundingMode::HalfUp).to_string()
}

/// Drop thousands separators from a human-formatted amount.
pub fn strip_separators(amount: &str) -> String {
    amount.replace(',', "")
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}
