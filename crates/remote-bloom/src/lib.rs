//! # Remote Bloom
//!
//! Bloom filters and counting Bloom filters whose state lives in a shared
//! key-value store, so many processes can add to and query one logical
//! filter by name.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure logic, no I/O
//!   - Parameter planning (m, k) and false positive estimates
//!   - Versioned hash families and double hashing
//!   - Element encoding and filter configuration
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `MembershipFilter`, `CountingMembershipFilter`: Driving ports
//!   - `FilterStore`: Driven port, the key-value store
//!
//! - **Adapters Layer** (`adapters/`): Store layouts
//!   - `BitStoreAdapter`: One bit per position in a binary value
//!   - `CountingStoreAdapter`: One integer field per position plus a total
//!   - `InMemoryStore`: Process-local `FilterStore`
//!
//! - **Service Layer** (`service/`): The filters callers hold
//!   - `BloomFilter`, `CountingBloomFilter`
//!
//! ## Store Layout
//!
//! For a filter `name` under key prefix `prefix`:
//!
//! - `{prefix}{name}`: bits, MSB-first within each byte (plain), or integer
//!   fields `"<position>"` and `"total"` (counting)
//! - `{prefix}{name}:meta`: integer fields `variant`, `bits`, `hashes` and
//!   `hash_version`, written once and checked on every open
//!
//! A Redis-style store implements a batch as one server-side script, which
//! gives each operation a single round trip and atomicity against other
//! clients.
//!
//! ## Invariants
//!
//! - **No false negatives**: after `add(x)` returns Ok, `exists(x)` is true
//!   through every handle on the same name
//! - **Determinism**: positions depend only on (element bytes, m, k, hash
//!   family version)
//! - **Consistency**: a name keeps the sizing and variant it was created with
//! - **Non-negative counters**: a remove that would underflow changes nothing
//!
//! ## Usage Example
//!
//! ```ignore
//! use remote_bloom::{Context, CountingBloomFilter, InMemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let ctx = Context::background();
//!
//! let filter = CountingBloomFilter::new(&ctx, store, "cbf", 1000, 0.01).await?;
//! filter.add(&ctx, "hello").await?;
//! filter.add(&ctx, "world").await?;
//! assert_eq!(filter.count(&ctx).await?, 2);
//!
//! filter.remove(&ctx, "hello").await?;
//! assert!(!filter.exists(&ctx, "hello").await?);
//! ```

pub mod adapters;
pub mod context;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports for convenience
pub use adapters::InMemoryStore;
pub use context::{CancelHandle, Context};
pub use domain::{Encoded, FilterConfig, FilterElement, FilterOptions, FilterOptionsBuilder, HashFamily};
pub use error::{ConfigError, EncodingError, FilterError, FilterErrorKind, Operation, StoreError};
pub use metrics::{Metrics, MetricsRecorder, MetricsSnapshot, NoOpMetrics};
pub use ports::{CountingMembershipFilter, FilterStore, MembershipFilter, StoreCapabilities};
pub use service::{BloomFilter, CountingBloomFilter};
