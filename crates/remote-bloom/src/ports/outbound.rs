//! Outbound Ports (Driven Ports)
//!
//! The key-value store that holds filter state. Connection management,
//! routing and transport retries belong to the implementation; filters only
//! need three things from it:
//!
//! 1. all-or-nothing execution of an ordered batch of operations,
//! 2. bit get/set inside a binary value addressed by key,
//! 3. atomic increments of integer fields addressed by `(key, field)`.
//!
//! A Redis-style store maps a [`Batch`] onto one server-side script
//! (`SETBIT`/`GETBIT`/`BITCOUNT`/`HINCRBY`/`HMGET`/`HSETNX`).

use async_trait::async_trait;

use crate::context::Context;
use crate::error::StoreError;

/// Features a store declares; checked once when a filter is opened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Batches execute atomically with all-or-nothing visibility
    pub atomic_batches: bool,
    /// Individual bits of a binary value can be read and written
    pub bit_values: bool,
    /// Integer fields under a key can be incremented atomically
    pub integer_fields: bool,
}

impl StoreCapabilities {
    pub const fn all() -> Self {
        Self {
            atomic_batches: true,
            bit_values: true,
            integer_fields: true,
        }
    }

    /// First capability a plain filter needs that is missing
    pub fn missing_for_bits(&self) -> Option<&'static str> {
        if !self.atomic_batches {
            Some("atomic batches")
        } else if !self.bit_values {
            Some("bit values")
        } else if !self.integer_fields {
            // Metadata is kept in integer fields
            Some("integer fields")
        } else {
            None
        }
    }

    /// First capability a counting filter needs that is missing
    pub fn missing_for_counters(&self) -> Option<&'static str> {
        if !self.atomic_batches {
            Some("atomic batches")
        } else if !self.integer_fields {
            Some("integer fields")
        } else {
            None
        }
    }
}

/// One step of a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// Set the bits at `offsets` to 1, growing the value as needed
    SetBits { key: String, offsets: Vec<u64> },
    /// Read the bits at `offsets`; missing keys and offsets read as 0
    GetBits { key: String, offsets: Vec<u64> },
    /// Number of bits set in the value
    CountBits { key: String },
    /// Add each delta to its field; missing fields start at 0
    IncrementFields { key: String, deltas: Vec<(String, i64)> },
    /// Read fields; missing fields read as `None`
    GetFields { key: String, fields: Vec<String> },
    /// Abort the whole batch unless every field is at least its minimum
    RequireAtLeast { key: String, minimums: Vec<(String, i64)> },
    /// Set each field only if absent, then return the stored values
    ClaimFields { key: String, values: Vec<(String, i64)> },
}

impl StoreOp {
    pub fn key(&self) -> &str {
        match self {
            StoreOp::SetBits { key, .. }
            | StoreOp::GetBits { key, .. }
            | StoreOp::CountBits { key }
            | StoreOp::IncrementFields { key, .. }
            | StoreOp::GetFields { key, .. }
            | StoreOp::RequireAtLeast { key, .. }
            | StoreOp::ClaimFields { key, .. } => key,
        }
    }
}

/// Result of one applied [`StoreOp`], in the same position as its op
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreReply {
    /// Write or guard without a value
    Done,
    Bits(Vec<bool>),
    BitCount(u64),
    /// Field values after the op; `None` for fields that do not exist
    Fields(Vec<Option<i64>>),
}

/// Ordered operations executed atomically
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<StoreOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: StoreOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn with(mut self, op: StoreOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<StoreOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A guard that stopped a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// Index of the failing `RequireAtLeast` op
    pub op_index: usize,
    pub key: String,
    pub field: String,
    /// Current value, 0 when the field is absent
    pub actual: i64,
    pub required: i64,
}

/// Outcome of a batch that reached the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every op was applied; one reply per op
    Applied(Vec<StoreReply>),
    /// A guard failed; nothing was applied
    Rejected(Rejection),
}

/// Key-value store backing shared filters (Driven Port)
#[async_trait]
pub trait FilterStore: Send + Sync {
    /// Features this store provides
    fn capabilities(&self) -> StoreCapabilities;

    /// Execute `batch` atomically
    ///
    /// `ctx` comes straight from the filter caller; the store decides how to
    /// honor its deadline and cancellation.
    async fn execute(&self, ctx: &Context, batch: Batch) -> Result<BatchOutcome, StoreError>;
}
