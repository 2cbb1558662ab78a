//! Optimal Bloom filter parameter calculation
//!
//! Formulas:
//! - m = ceil(-n*ln(p) / (ln(2)^2))  -- optimal bits
//! - k = max(1, round((m/n) * ln(2))) -- optimal hash functions
//! - FPR = (1 - e^(-kn/m))^k

use std::f64::consts::LN_2;

use crate::error::ConfigError;

/// Bloom filter sizing derived from (n, p)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomFilterParams {
    /// Number of bits or counters (m)
    pub size_bits: u64,
    /// Number of hash positions per element (k)
    pub hash_count: u32,
    /// Expected false positive rate once n elements are inserted
    pub expected_fpr: f64,
}

/// Calculate optimal Bloom filter parameters for given constraints
///
/// # Arguments
/// * `expected_items` - Expected number of elements to insert (n)
/// * `target_fpr` - Target false positive rate, strictly between 0 and 1
///
/// # Errors
/// `ConfigError` when `n == 0` or `p` lies outside `(0, 1)`.
pub fn calculate_optimal_parameters(
    expected_items: u64,
    target_fpr: f64,
) -> Result<BloomFilterParams, ConfigError> {
    if expected_items == 0 {
        return Err(ConfigError::InvalidExpectedItems);
    }
    // Negated comparison also rejects NaN
    if !(target_fpr > 0.0 && target_fpr < 1.0) {
        return Err(ConfigError::InvalidFalsePositiveRate { fpr: target_fpr });
    }

    let n = expected_items as f64;
    let ln2_squared = LN_2 * LN_2;

    let m = (-n * target_fpr.ln() / ln2_squared).ceil().max(1.0) as u64;
    let k = ((m as f64 / n) * LN_2).round().max(1.0) as u32;

    Ok(BloomFilterParams {
        size_bits: m,
        hash_count: k,
        expected_fpr: calculate_fpr(m, expected_items, k),
    })
}

/// Calculate the false positive rate for given parameters
///
/// Formula: FPR = (1 - e^(-kn/m))^k
pub fn calculate_fpr(m: u64, n: u64, k: u32) -> f64 {
    if m == 0 {
        return 1.0;
    }
    let exponent = -(k as f64) * (n as f64) / (m as f64);
    (1.0 - exponent.exp()).powi(k as i32)
}

/// Estimate how many distinct elements produced `set_bits` ones
///
/// Swamidass & Baldi: n* = -(m/k) * ln(1 - X/m). A saturated array has no
/// finite estimate and reports `u64::MAX`.
pub fn estimate_cardinality(m: u64, k: u32, set_bits: u64) -> u64 {
    if m == 0 || k == 0 {
        return 0;
    }
    if set_bits >= m {
        return u64::MAX;
    }
    let fill = set_bits as f64 / m as f64;
    let estimate = -(m as f64 / k as f64) * (1.0 - fill).ln();
    estimate.round() as u64
}
