//! Utility functions for the sorametrics indexer.
//!
//! - [`conversion`] - Fixed-point normalization, safe division and amount formatting

mod conversion;

// ============================================
// Common Constants
// ============================================

/// Sentinel extrinsic id for bridge legs that originate on an external chain.
pub const EXTERNAL_EXTRINSIC_ID: &str = "ETH";

/// Format the `{block}-{index}` extrinsic identifier stored with every record.
pub fn extrinsic_id(block: u64, index: u32) -> String {
    format!("{}-{}", block, index)
}

// ============================================
// Re-exports
// ============================================

pub use conversion::{
    decimal_to_f64, format_amount, hex_encode, normalize_amount, safe_div, strip_separators,
};
