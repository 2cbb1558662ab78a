//! In-memory FilterStore
//!
//! Process-local store with the same semantics a remote store provides:
//! bits are addressed MSB-first within each byte and values grow in whole
//! bytes, integer fields are i64, and every batch is applied atomically.
//! Filters sharing one `InMemoryStore` behave like processes sharing one
//! remote store.
//!
//! Batches run against a staging area holding copies of the keys they
//! write; the staging area is committed only when every op succeeded.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use bitvec::prelude::*;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

use crate::context::Context;
use crate::domain::DEFAULT_MAX_BITS;
use crate::error::StoreError;
use crate::ports::{
    Batch, BatchOutcome, FilterStore, Rejection, StoreCapabilities, StoreOp, StoreReply,
};

/// A stored value
#[derive(Clone, Debug)]
enum Value {
    Bits(BitVec<u8, Msb0>),
    Fields(HashMap<String, i64>),
}

#[derive(Default)]
struct State {
    data: HashMap<String, Value>,
    pending_failures: VecDeque<StoreError>,
}

/// Process-local [`FilterStore`] for tests and single-process use
pub struct InMemoryStore {
    state: Mutex<State>,
    capabilities: StoreCapabilities,
    max_bits: u64,
    latency: Option<Duration>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            capabilities: StoreCapabilities::all(),
            max_bits: DEFAULT_MAX_BITS,
            latency: None,
        }
    }

    /// Declare a different capability set
    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Largest bit value the store accepts
    pub fn with_max_bits(mut self, max_bits: u64) -> Self {
        self.max_bits = max_bits;
        self
    }

    /// Delay every batch, as a network round trip would
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next batch with `error` without touching any data
    pub async fn fail_next(&self, error: StoreError) {
        self.state.lock().await.pending_failures.push_back(error);
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.state.lock().await.data.contains_key(key)
    }

    /// Length in bits of a binary value
    pub async fn bit_len(&self, key: &str) -> Option<usize> {
        match self.state.lock().await.data.get(key) {
            Some(Value::Bits(bits)) => Some(bits.len()),
            _ => None,
        }
    }

    /// Value of one integer field
    pub async fn field(&self, key: &str, field: &str) -> Option<i64> {
        match self.state.lock().await.data.get(key) {
            Some(Value::Fields(fields)) => fields.get(field).copied(),
            _ => None,
        }
    }

    /// Sum of all integer fields under `key` except `skip`
    pub async fn field_sum(&self, key: &str, skip: &str) -> i64 {
        match self.state.lock().await.data.get(key) {
            Some(Value::Fields(fields)) => fields
                .iter()
                .filter(|(name, _)| name.as_str() != skip)
                .map(|(_, v)| *v)
                .sum(),
            _ => 0,
        }
    }

    async fn lock_state(&self, ctx: &Context) -> Result<MutexGuard<'_, State>, StoreError> {
        let acquire = async {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.state.lock().await
        };

        match ctx.remaining() {
            Some(remaining) => tokio::time::timeout(remaining, acquire)
                .await
                .map_err(|_| StoreError::Timeout),
            None => Ok(acquire.await),
        }
    }

    fn check_offset(&self, key: &str, offset: u64) -> Result<(), StoreError> {
        if offset >= self.max_bits {
            return Err(StoreError::Protocol(format!(
                "bit offset {} out of range for key {}",
                offset, key
            )));
        }
        Ok(())
    }

    fn apply(&self, data: &HashMap<String, Value>, batch: Batch) -> Result<Applied, StoreError> {
        let mut staging = Staging {
            data,
            written: HashMap::new(),
        };
        let mut replies = Vec::with_capacity(batch.len());

        for (op_index, op) in batch.into_ops().into_iter().enumerate() {
            let reply = match op {
                StoreOp::SetBits { key, offsets } => {
                    for &offset in &offsets {
                        self.check_offset(&key, offset)?;
                    }
                    let bits = staging.bits_mut(&key)?;
                    for offset in offsets {
                        let index = offset as usize;
                        if index >= bits.len() {
                            // Values grow in whole bytes
                            bits.resize((index / 8 + 1) * 8, false);
                        }
                        bits.set(index, true);
                    }
                    StoreReply::Done
                }
                StoreOp::GetBits { key, offsets } => {
                    for &offset in &offsets {
                        self.check_offset(&key, offset)?;
                    }
                    let values = match staging.read(&key) {
                        None => vec![false; offsets.len()],
                        Some(Value::Bits(bits)) => offsets
                            .iter()
                            .map(|&o| bits.get(o as usize).map(|b| *b).unwrap_or(false))
                            .collect(),
                        Some(Value::Fields(_)) => return Err(StoreError::WrongType { key }),
                    };
                    StoreReply::Bits(values)
                }
                StoreOp::CountBits { key } => match staging.read(&key) {
                    None => StoreReply::BitCount(0),
                    Some(Value::Bits(bits)) => StoreReply::BitCount(bits.count_ones() as u64),
                    Some(Value::Fields(_)) => return Err(StoreError::WrongType { key }),
                },
                StoreOp::IncrementFields { key, deltas } => {
                    let fields = staging.fields_mut(&key)?;
                    let mut values = Vec::with_capacity(deltas.len());
                    for (field, delta) in deltas {
                        let slot = fields.entry(field).or_insert(0);
                        *slot = slot.checked_add(delta).ok_or_else(|| {
                            StoreError::Protocol(format!("increment overflow on key {}", key))
                        })?;
                        values.push(Some(*slot));
                    }
                    StoreReply::Fields(values)
                }
                StoreOp::GetFields { key, fields } => {
                    let values = match staging.read(&key) {
                        None => vec![None; fields.len()],
                        Some(Value::Fields(stored)) => {
                            fields.iter().map(|f| stored.get(f).copied()).collect()
                        }
                        Some(Value::Bits(_)) => return Err(StoreError::WrongType { key }),
                    };
                    StoreReply::Fields(values)
                }
                StoreOp::RequireAtLeast { key, minimums } => {
                    let stored = match staging.read(&key) {
                        None => None,
                        Some(Value::Fields(stored)) => Some(stored),
                        Some(Value::Bits(_)) => return Err(StoreError::WrongType { key }),
                    };
                    for (field, required) in minimums {
                        let actual = stored.and_then(|s| s.get(&field).copied()).unwrap_or(0);
                        if actual < required {
                            return Ok(Applied::Rejected(Rejection {
                                op_index,
                                key,
                                field,
                                actual,
                                required,
                            }));
                        }
                    }
                    StoreReply::Done
                }
                StoreOp::ClaimFields { key, values } => {
                    let fields = staging.fields_mut(&key)?;
                    let stored = values
                        .into_iter()
                        .map(|(field, value)| Some(*fields.entry(field).or_insert(value)))
                        .collect();
                    StoreReply::Fields(stored)
                }
            };
            replies.push(reply);
        }

        Ok(Applied::Commit {
            written: staging.written,
            replies,
        })
    }
}

enum Applied {
    Commit {
        written: HashMap<String, Value>,
        replies: Vec<StoreReply>,
    },
    Rejected(Rejection),
}

/// Copies of the keys a batch writes, layered over the committed data
struct Staging<'a> {
    data: &'a HashMap<String, Value>,
    written: HashMap<String, Value>,
}

impl<'a> Staging<'a> {
    fn read(&self, key: &str) -> Option<&Value> {
        self.written.get(key).or_else(|| self.data.get(key))
    }

    fn stage(&mut self, key: &str, empty: Value) -> &mut Value {
        let data = self.data;
        self.written
            .entry(key.to_string())
            .or_insert_with(|| data.get(key).cloned().unwrap_or(empty))
    }

    fn bits_mut(&mut self, key: &str) -> Result<&mut BitVec<u8, Msb0>, StoreError> {
        match self.stage(key, Value::Bits(BitVec::new())) {
            Value::Bits(bits) => Ok(bits),
            Value::Fields(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    fn fields_mut(&mut self, key: &str) -> Result<&mut HashMap<String, i64>, StoreError> {
        match self.stage(key, Value::Fields(HashMap::new())) {
            Value::Fields(fields) => Ok(fields),
            Value::Bits(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }
}

#[async_trait]
impl FilterStore for InMemoryStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    async fn execute(&self, ctx: &Context, batch: Batch) -> Result<BatchOutcome, StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if ctx.is_expired() {
            return Err(StoreError::Timeout);
        }

        let mut state = self.lock_state(ctx).await?;
        if let Some(error) = state.pending_failures.pop_front() {
            return Err(error);
        }

        let ops = batch.len();
        match self.apply(&state.data, batch)? {
            Applied::Commit { written, replies } => {
                state.data.extend(written);
                trace!(ops = ops, "Batch applied");
                Ok(BatchOutcome::Applied(replies))
            }
            Applied::Rejected(rejection) => {
                trace!(
                    key = %rejection.key,
                    field = %rejection.field,
                    "Batch rejected by guard"
                );
                Ok(BatchOutcome::Rejected(rejection))
            }
        }
    }
}
