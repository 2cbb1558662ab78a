//! Service Layer
//!
//! The filters callers hold. Each is a thin handle: immutable sizing plus a
//! store adapter, cheap to clone and safe to share across tasks.

pub mod bloom_filter;
pub mod counting_bloom_filter;

pub use bloom_filter::BloomFilter;
pub use counting_bloom_filter::CountingBloomFilter;
