//! Counting Store Adapter
//!
//! Maps a counting Bloom filter onto integer fields under one key: field
//! `"<position>"` holds the counter of that position and field `"total"`
//! holds the number of adds not yet offset by removes.
//!
//! Double hashing can map one element to the same position more than once.
//! Such a position is incremented (and on remove, required and decremented)
//! once per occurrence, which keeps add followed by remove an exact inverse.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::metadata::claim_metadata;
use super::replies::{expect_applied, into_fields};
use crate::context::Context;
use crate::domain::{FilterMetadata, TOTAL_FIELD};
use crate::error::{FilterErrorKind, StoreError};
use crate::ports::{Batch, BatchOutcome, FilterStore, StoreOp};

/// Counting filter state addressed by one key
pub struct CountingStoreAdapter<S: ?Sized> {
    store: Arc<S>,
    key: String,
    meta_key: String,
}

impl<S: ?Sized> Clone for CountingStoreAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: self.key.clone(),
            meta_key: self.meta_key.clone(),
        }
    }
}

/// Occurrences of each position, in ascending position order
fn multiplicities(positions: &[u64]) -> Vec<(String, i64)> {
    let mut counts: BTreeMap<u64, i64> = BTreeMap::new();
    for &pos in positions {
        *counts.entry(pos).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(pos, count)| (pos.to_string(), count))
        .collect()
}

impl<S: FilterStore + ?Sized> CountingStoreAdapter<S> {
    pub fn new(store: Arc<S>, key: impl Into<String>, meta_key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            meta_key: meta_key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record or verify the persisted sizing
    pub async fn ensure_metadata(
        &self,
        ctx: &Context,
        metadata: &FilterMetadata,
    ) -> Result<(), FilterErrorKind> {
        claim_metadata(self.store.as_ref(), ctx, &self.meta_key, metadata).await
    }

    /// Increment every counter in `positions` and the total. Not idempotent.
    pub async fn add(&self, ctx: &Context, positions: &[u64]) -> Result<(), FilterErrorKind> {
        self.add_many(ctx, &[positions.to_vec()]).await
    }

    /// Several adds in one batch
    pub async fn add_many(
        &self,
        ctx: &Context,
        position_sets: &[Vec<u64>],
    ) -> Result<(), FilterErrorKind> {
        if position_sets.is_empty() {
            return Ok(());
        }
        let mut batch = Batch::new();
        for positions in position_sets {
            let mut deltas = multiplicities(positions);
            deltas.push((TOTAL_FIELD.to_string(), 1));
            batch.push(StoreOp::IncrementFields {
                key: self.key.clone(),
                deltas,
            });
        }

        let outcome = self.store.execute(ctx, batch).await?;
        expect_applied(outcome, position_sets.len())?;
        debug!(key = %self.key, elements = position_sets.len(), "Counters incremented");
        Ok(())
    }

    /// Decrement every counter in `positions` and the total
    ///
    /// Fails with `Underflow` and changes nothing if any counter would drop
    /// below zero.
    pub async fn remove(&self, ctx: &Context, positions: &[u64]) -> Result<(), FilterErrorKind> {
        let mut minimums = multiplicities(positions);
        let decrements: Vec<(String, i64)> = minimums
            .iter()
            .map(|(field, count)| (field.clone(), -count))
            .chain(std::iter::once((TOTAL_FIELD.to_string(), -1)))
            .collect();
        minimums.push((TOTAL_FIELD.to_string(), 1));

        let batch = Batch::new()
            .with(StoreOp::RequireAtLeast {
                key: self.key.clone(),
                minimums,
            })
            .with(StoreOp::IncrementFields {
                key: self.key.clone(),
                deltas: decrements,
            });

        match self.store.execute(ctx, batch).await? {
            BatchOutcome::Rejected(rejection) => {
                warn!(
                    key = %self.key,
                    field = %rejection.field,
                    actual = rejection.actual,
                    required = rejection.required,
                    "Remove rejected, counter would underflow"
                );
                Err(FilterErrorKind::Underflow {
                    field: rejection.field,
                })
            }
            outcome => {
                expect_applied(outcome, 2)?;
                debug!(key = %self.key, "Counters decremented");
                Ok(())
            }
        }
    }

    /// True iff every counter in `positions` is greater than zero
    pub async fn exists(&self, ctx: &Context, positions: &[u64]) -> Result<bool, FilterErrorKind> {
        let fields: Vec<String> = multiplicities(positions)
            .into_iter()
            .map(|(field, _)| field)
            .collect();
        let expected = fields.len();
        let batch = Batch::new().with(StoreOp::GetFields {
            key: self.key.clone(),
            fields,
        });

        let outcome = self.store.execute(ctx, batch).await?;
        let reply = expect_applied(outcome, 1)?
            .pop()
            .ok_or_else(|| StoreError::Protocol("missing counters reply".to_string()))?;
        let counters = into_fields(reply, expected)?;

        Ok(counters.iter().all(|c| c.is_some_and(|v| v > 0)))
    }

    /// Net number of adds not yet offset by removes
    pub async fn count(&self, ctx: &Context) -> Result<u64, FilterErrorKind> {
        let batch = Batch::new().with(StoreOp::GetFields {
            key: self.key.clone(),
            fields: vec![TOTAL_FIELD.to_string()],
        });

        let outcome = self.store.execute(ctx, batch).await?;
        let reply = expect_applied(outcome, 1)?
            .pop()
            .ok_or_else(|| StoreError::Protocol("missing total reply".to_string()))?;
        let total = into_fields(reply, 1)?
            .first()
            .copied()
            .flatten()
            .unwrap_or(0);

        u64::try_from(total).map_err(|_| {
            FilterErrorKind::Store(StoreError::Protocol(format!(
                "negative total {} under {}",
                total, self.key
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;

    fn adapter() -> (Arc<InMemoryStore>, CountingStoreAdapter<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let adapter = CountingStoreAdapter::new(store.clone(), "cbf", "cbf:meta");
        (store, adapter)
    }

    #[test]
    fn test_multiplicities_group_repeats() {
        assert_eq!(
            multiplicities(&[9, 3, 9, 1]),
            vec![("1".to_string(), 1), ("3".to_string(), 1), ("9".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_add_increments_counters_and_total() {
        let (store, adapter) = adapter();
        let ctx = Context::background();

        adapter.add(&ctx, &[1, 2, 3]).await.unwrap();
        adapter.add(&ctx, &[3, 4, 5]).await.unwrap();

        assert_eq!(store.field("cbf", "3").await, Some(2));
        assert_eq!(store.field("cbf", "1").await, Some(1));
        assert_eq!(adapter.count(&ctx).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_remove_restores_counters() {
        let (store, adapter) = adapter();
        let ctx = Context::background();

        adapter.add(&ctx, &[1, 2, 3]).await.unwrap();
        adapter.add(&ctx, &[3, 4, 5]).await.unwrap();
        adapter.remove(&ctx, &[1, 2, 3]).await.unwrap();

        assert!(!adapter.exists(&ctx, &[1, 2, 3]).await.unwrap());
        assert!(adapter.exists(&ctx, &[3, 4, 5]).await.unwrap());
        assert_eq!(store.field("cbf", "3").await, Some(1));
        assert_eq!(adapter.count(&ctx).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_repeated_position_counts_twice() {
        let (store, adapter) = adapter();
        let ctx = Context::background();

        adapter.add(&ctx, &[7, 7, 8]).await.unwrap();
        assert_eq!(store.field("cbf", "7").await, Some(2));

        adapter.remove(&ctx, &[7, 7, 8]).await.unwrap();
        assert_eq!(store.field("cbf", "7").await, Some(0));
        assert_eq!(adapter.count(&ctx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_underflow_aborts_whole_remove() {
        let (store, adapter) = adapter();
        let ctx = Context::background();

        adapter.add(&ctx, &[1, 2]).await.unwrap();
        let err = adapter.remove(&ctx, &[1, 2, 3]).await.unwrap_err();

        assert_eq!(err, FilterErrorKind::Underflow { field: "3".into() });
        assert_eq!(store.field("cbf", "1").await, Some(1));
        assert_eq!(store.field("cbf", "2").await, Some(1));
        assert_eq!(adapter.count(&ctx).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_filter() {
        let (_, adapter) = adapter();
        let ctx = Context::background();

        assert_eq!(adapter.count(&ctx).await.unwrap(), 0);
        assert!(!adapter.exists(&ctx, &[1, 2]).await.unwrap());
        assert_eq!(
            adapter.remove(&ctx, &[1]).await.unwrap_err(),
            FilterErrorKind::Underflow { field: "1".into() }
        );
    }

    #[tokio::test]
    async fn test_add_many_counts_each_element() {
        let (_, adapter) = adapter();
        let ctx = Context::background();

        adapter
            .add_many(&ctx, &[vec![1, 2], vec![2, 3], vec![4, 5]])
            .await
            .unwrap();

        assert_eq!(adapter.count(&ctx).await.unwrap(), 3);
        assert!(adapter.exists(&ctx, &[2, 3]).await.unwrap());
    }
}
