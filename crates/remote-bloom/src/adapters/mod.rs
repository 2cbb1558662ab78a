//! Adapters Layer
//!
//! - `BitStoreAdapter`: plain filter state as one binary value
//! - `CountingStoreAdapter`: counting filter state as integer fields
//! - `InMemoryStore`: process-local `FilterStore`

pub mod bit_store;
pub mod counting_store;
pub mod memory_store;

mod metadata;
mod replies;

pub use bit_store::BitStoreAdapter;
pub use counting_store::CountingStoreAdapter;
pub use memory_store::InMemoryStore;
