//! Domain Layer - Pure filter logic
//!
//! This layer contains:
//! - Parameter calculations (m, k, expected FPR)
//! - Versioned hash families and double hashing
//! - Element encoding
//! - Filter configuration and persisted metadata
//!
//! RULES:
//! - No I/O operations
//! - No async code
//! - Pure functions where possible

pub mod config;
pub mod element;
pub mod hash_functions;
pub mod parameters;

pub use config::{
    FilterConfig, FilterMetadata, FilterOptions, FilterOptionsBuilder, FilterVariant,
    DEFAULT_MAX_BITS, META_SUFFIX, TOTAL_FIELD,
};
pub use element::{Encoded, FilterElement};
pub use hash_functions::{compute_hash_positions, ElementDigest, HashFamily};
pub use parameters::{
    calculate_fpr, calculate_optimal_parameters, estimate_cardinality, BloomFilterParams,
};
