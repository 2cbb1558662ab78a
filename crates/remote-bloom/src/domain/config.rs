//! Filter configuration and validation
//!
//! `FilterConfig` is the immutable sizing of one named filter. `FilterOptions`
//! holds the knobs that are not part of the sizing: where keys live, how large
//! a filter may get and which hash family new filters use.
//!
//! # Example
//!
//! ```ignore
//! use remote_bloom::{FilterOptionsBuilder, HashFamily};
//!
//! let options = FilterOptionsBuilder::new()
//!     .key_prefix("bloom:")
//!     .hash_family(HashFamily::SipHash13)
//!     .build()?;
//! ```

use std::env;

use serde::{Deserialize, Serialize};

use super::hash_functions::HashFamily;
use super::parameters::{calculate_fpr, calculate_optimal_parameters};
use crate::error::ConfigError;

/// Largest binary value most key-value stores accept (512 MiB)
pub const DEFAULT_MAX_BITS: u64 = 1 << 32;

/// Suffix of the key holding a filter's persisted sizing
pub const META_SUFFIX: &str = ":meta";

/// Field holding the aggregate counter of a counting filter
pub const TOTAL_FIELD: &str = "total";

/// Which of the two filter layouts a name holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterVariant {
    Plain,
    Counting,
}

impl FilterVariant {
    pub fn tag(&self) -> i64 {
        match self {
            FilterVariant::Plain => 1,
            FilterVariant::Counting => 2,
        }
    }
}

/// Sizing of one named filter, fixed at construction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Store key identifying the shared structure
    pub name: String,
    /// Expected number of elements (n)
    pub expected_items: u64,
    /// Target false positive rate (p)
    pub false_positive_rate: f64,
    /// Number of bits or counters (m), derived
    pub bit_count: u64,
    /// Positions per element (k), derived
    pub hash_count: u32,
    /// Hash family used to derive positions
    pub hash_family: HashFamily,
}

impl FilterConfig {
    /// Plan a filter named `name` for `expected_items` at `false_positive_rate`
    pub fn new(
        name: impl Into<String>,
        expected_items: u64,
        false_positive_rate: f64,
        options: &FilterOptions,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::InvalidName("name cannot be empty".to_string()));
        }
        if name.ends_with(META_SUFFIX) {
            return Err(ConfigError::InvalidName(format!(
                "name cannot end with '{}'",
                META_SUFFIX
            )));
        }

        let params = calculate_optimal_parameters(expected_items, false_positive_rate)?;
        if params.size_bits > options.max_bits {
            return Err(ConfigError::FilterTooLarge {
                bits: params.size_bits,
                max: options.max_bits,
            });
        }

        Ok(Self {
            name,
            expected_items,
            false_positive_rate,
            bit_count: params.size_bits,
            hash_count: params.hash_count,
            hash_family: options.hash_family,
        })
    }

    /// False positive rate once `expected_items` elements are present
    pub fn expected_fpr(&self) -> f64 {
        calculate_fpr(self.bit_count, self.expected_items, self.hash_count)
    }

    /// Positions of an encoded element in this filter
    pub fn positions(&self, element: &[u8]) -> Vec<u64> {
        self.hash_family
            .digest(element)
            .positions(self.bit_count, self.hash_count)
    }

    /// Metadata record persisted for this sizing
    pub fn metadata(&self, variant: FilterVariant) -> FilterMetadata {
        FilterMetadata {
            variant,
            bit_count: self.bit_count,
            hash_count: self.hash_count,
            hash_version: self.hash_family.version(),
        }
    }
}

/// Persisted sizing record, compared on every open
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterMetadata {
    pub variant: FilterVariant,
    pub bit_count: u64,
    pub hash_count: u32,
    pub hash_version: i64,
}

impl FilterMetadata {
    pub const FIELD_VARIANT: &'static str = "variant";
    pub const FIELD_BITS: &'static str = "bits";
    pub const FIELD_HASHES: &'static str = "hashes";
    pub const FIELD_HASH_VERSION: &'static str = "hash_version";

    /// Field/value pairs in their persisted order
    pub fn fields(&self) -> Vec<(&'static str, i64)> {
        vec![
            (Self::FIELD_VARIANT, self.variant.tag()),
            (Self::FIELD_BITS, self.bit_count as i64),
            (Self::FIELD_HASHES, self.hash_count as i64),
            (Self::FIELD_HASH_VERSION, self.hash_version),
        ]
    }
}

/// Options that are not part of a filter's sizing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Prepended to every key this crate touches
    pub key_prefix: String,
    /// Upper bound on m
    pub max_bits: u64,
    /// Hash family for filters opened with these options
    pub hash_family: HashFamily,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            max_bits: DEFAULT_MAX_BITS,
            hash_family: HashFamily::default(),
        }
    }
}

impl FilterOptions {
    /// Create options from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BLOOM_KEY_PREFIX`: Key prefix (default: empty)
    /// - `BLOOM_MAX_BITS`: Maximum filter size in bits (default: 2^32)
    /// - `BLOOM_HASH_FAMILY`: `murmur3` or `siphash13` (default: murmur3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = FilterOptionsBuilder::new();

        if let Ok(prefix) = env::var("BLOOM_KEY_PREFIX") {
            builder = builder.key_prefix(prefix);
        }

        if let Ok(raw) = env::var("BLOOM_MAX_BITS") {
            let max_bits = raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidOption(format!("BLOOM_MAX_BITS is not an integer: {}", raw))
            })?;
            builder = builder.max_bits(max_bits);
        }

        if let Ok(raw) = env::var("BLOOM_HASH_FAMILY") {
            let family = HashFamily::parse(&raw).ok_or_else(|| {
                ConfigError::InvalidOption(format!("unknown BLOOM_HASH_FAMILY: {}", raw))
            })?;
            builder = builder.hash_family(family);
        }

        builder.build()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bits == 0 {
            return Err(ConfigError::InvalidOption(
                "max_bits cannot be 0".to_string(),
            ));
        }
        // Counters are addressed as i64 fields and bits as u64 offsets
        if self.max_bits > i64::MAX as u64 {
            return Err(ConfigError::InvalidOption(format!(
                "max_bits cannot exceed {}",
                i64::MAX
            )));
        }
        Ok(())
    }

    /// Key holding the bits or counters of `name`
    pub fn data_key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }

    /// Key holding the persisted sizing of `name`
    pub fn meta_key(&self, name: &str) -> String {
        format!("{}{}{}", self.key_prefix, name, META_SUFFIX)
    }
}

/// Builder for FilterOptions with validation
#[derive(Default)]
pub struct FilterOptionsBuilder {
    key_prefix: Option<String>,
    max_bits: Option<u64>,
    hash_family: Option<HashFamily>,
}

impl FilterOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn max_bits(mut self, bits: u64) -> Self {
        self.max_bits = Some(bits);
        self
    }

    pub fn hash_family(mut self, family: HashFamily) -> Self {
        self.hash_family = Some(family);
        self
    }

    /// Build the options, validating all fields
    pub fn build(self) -> Result<FilterOptions, ConfigError> {
        let defaults = FilterOptions::default();

        let options = FilterOptions {
            key_prefix: self.key_prefix.unwrap_or(defaults.key_prefix),
            max_bits: self.max_bits.unwrap_or(defaults.max_bits),
            hash_family: self.hash_family.unwrap_or(defaults.hash_family),
        };

        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_derives_sizing() {
        let config = FilterConfig::new("bf", 1000, 0.01, &FilterOptions::default()).unwrap();

        assert_eq!(config.bit_count, 9586);
        assert_eq!(config.hash_count, 7);
        assert_eq!(config.hash_family, HashFamily::Murmur3);
        assert!(config.expected_fpr() <= 0.011);
    }

    #[test]
    fn test_positions_depend_on_family() {
        let murmur = FilterConfig::new("bf", 1000, 0.01, &FilterOptions::default()).unwrap();
        let options = FilterOptionsBuilder::new()
            .hash_family(HashFamily::SipHash13)
            .build()
            .unwrap();
        let sip = FilterConfig::new("bf", 1000, 0.01, &options).unwrap();

        let positions = murmur.positions(b"hello");
        assert_eq!(positions.len(), 7);
        assert!(positions.iter().all(|&p| p < 9586));
        assert_eq!(positions, murmur.positions(b"hello"));
        assert_ne!(positions, sip.positions(b"hello"));
    }

    #[test]
    fn test_config_rejects_empty_name() {
        let result = FilterConfig::new("", 1000, 0.01, &FilterOptions::default());
        assert!(matches!(result, Err(ConfigError::InvalidName(_))));
    }

    #[test]
    fn test_config_rejects_meta_suffix() {
        let result = FilterConfig::new("bf:meta", 1000, 0.01, &FilterOptions::default());
        assert!(matches!(result, Err(ConfigError::InvalidName(_))));
    }

    #[test]
    fn test_config_rejects_oversized_filter() {
        let options = FilterOptionsBuilder::new().max_bits(1024).build().unwrap();
        let result = FilterConfig::new("bf", 1000, 0.01, &options);

        assert_eq!(
            result,
            Err(ConfigError::FilterTooLarge {
                bits: 9586,
                max: 1024
            })
        );
    }

    #[test]
    fn test_metadata_fields() {
        let config = FilterConfig::new("cbf", 1000, 0.01, &FilterOptions::default()).unwrap();
        let fields = config.metadata(FilterVariant::Counting).fields();

        assert_eq!(
            fields,
            vec![("variant", 2), ("bits", 9586), ("hashes", 7), ("hash_version", 1)]
        );
    }

    #[test]
    fn test_keys_use_prefix() {
        let options = FilterOptionsBuilder::new().key_prefix("app:").build().unwrap();

        assert_eq!(options.data_key("bf"), "app:bf");
        assert_eq!(options.meta_key("bf"), "app:bf:meta");
    }

    #[test]
    fn test_builder_uses_defaults() {
        let options = FilterOptionsBuilder::new().build().unwrap();
        assert_eq!(options, FilterOptions::default());
    }

    #[test]
    fn test_builder_rejects_zero_max_bits() {
        let result = FilterOptionsBuilder::new().max_bits(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidOption(_))));
    }

    #[test]
    fn test_from_env_reads_variables() {
        // Only this test touches these variables
        env::set_var("BLOOM_KEY_PREFIX", "env:");
        env::set_var("BLOOM_MAX_BITS", "65536");
        env::set_var("BLOOM_HASH_FAMILY", "siphash13");

        let options = FilterOptions::from_env();

        env::remove_var("BLOOM_KEY_PREFIX");
        env::remove_var("BLOOM_MAX_BITS");
        env::remove_var("BLOOM_HASH_FAMILY");

        let options = options.unwrap();
        assert_eq!(options.key_prefix, "env:");
        assert_eq!(options.max_bits, 65536);
        assert_eq!(options.hash_family, HashFamily::SipHash13);
    }
}
