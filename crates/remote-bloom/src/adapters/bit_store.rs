//! Bit Store Adapter
//!
//! Maps a plain Bloom filter onto one binary value in the store. Each call
//! is a single batch, so an add never becomes visible with only some of its
//! bits set.

use std::sync::Arc;

use tracing::debug;

use super::metadata::claim_metadata;
use super::replies::{expect_applied, into_bit_count, into_bits};
use crate::context::Context;
use crate::domain::FilterMetadata;
use crate::error::{FilterErrorKind, StoreError};
use crate::ports::{Batch, FilterStore, StoreOp};

/// Plain filter state addressed by one key
pub struct BitStoreAdapter<S: ?Sized> {
    store: Arc<S>,
    key: String,
    meta_key: String,
}

impl<S: ?Sized> Clone for BitStoreAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: self.key.clone(),
            meta_key: self.meta_key.clone(),
        }
    }
}

impl<S: FilterStore + ?Sized> BitStoreAdapter<S> {
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

    /// Set every bit in `positions`. Idempotent.
    pub async fn add(&self, ctx: &Context, positions: &[u64]) -> Result<(), FilterErrorKind> {
        self.add_many(ctx, &[positions.to_vec()]).await
    }

    /// Set the bits of several elements in one batch
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
            batch.push(StoreOp::SetBits {
                key: self.key.clone(),
                offsets: positions.clone(),
            });
        }

        let outcome = self.store.execute(ctx, batch).await?;
        expect_applied(outcome, position_sets.len())?;
        debug!(key = %self.key, elements = position_sets.len(), "Bits set");
        Ok(())
    }

    /// True iff every bit in `positions` is set
    pub async fn exists(&self, ctx: &Context, positions: &[u64]) -> Result<bool, FilterErrorKind> {
        let found = self.exists_many(ctx, &[positions.to_vec()]).await?;
        Ok(found.first().copied().unwrap_or(false))
    }

    /// Membership of several elements read in one batch
    pub async fn exists_many(
        &self,
        ctx: &Context,
        position_sets: &[Vec<u64>],
    ) -> Result<Vec<bool>, FilterErrorKind> {
        if position_sets.is_empty() {
            return Ok(Vec::new());
        }
        let mut batch = Batch::new();
        for positions in position_sets {
            batch.push(StoreOp::GetBits {
                key: self.key.clone(),
                offsets: positions.clone(),
            });
        }

        let outcome = self.store.execute(ctx, batch).await?;
        let replies = expect_applied(outcome, position_sets.len())?;

        let mut found = Vec::with_capacity(replies.len());
        for (reply, positions) in replies.into_iter().zip(position_sets) {
            let bits = into_bits(reply, positions.len())?;
            found.push(bits.iter().all(|&b| b));
        }
        Ok(found)
    }

    /// Number of bits set across the whole array
    pub async fn set_bits(&self, ctx: &Context) -> Result<u64, FilterErrorKind> {
        let batch = Batch::new().with(StoreOp::CountBits {
            key: self.key.clone(),
        });

        let outcome = self.store.execute(ctx, batch).await?;
        let reply = expect_applied(outcome, 1)?
            .pop()
            .ok_or_else(|| StoreError::Protocol("missing bit count reply".to_string()))?;
        Ok(into_bit_count(reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;

    fn adapter() -> (Arc<InMemoryStore>, BitStoreAdapter<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let adapter = BitStoreAdapter::new(store.clone(), "bf", "bf:meta");
        (store, adapter)
    }

    #[tokio::test]
    async fn test_add_then_exists() {
        let (_, adapter) = adapter();
        let ctx = Context::background();

        adapter.add(&ctx, &[1, 5, 900]).await.unwrap();

        assert!(adapter.exists(&ctx, &[1, 5, 900]).await.unwrap());
        assert!(adapter.exists(&ctx, &[5]).await.unwrap());
        assert!(!adapter.exists(&ctx, &[1, 5, 901]).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (_, adapter) = adapter();
        let ctx = Context::background();

        adapter.add(&ctx, &[2, 4, 8]).await.unwrap();
        adapter.add(&ctx, &[2, 4, 8]).await.unwrap();

        assert_eq!(adapter.set_bits(&ctx).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_value_rounded_to_bytes() {
        let (store, adapter) = adapter();
        let ctx = Context::background();

        adapter.add(&ctx, &[9585]).await.unwrap();

        // ceil(9586 / 8) = 1199 bytes
        assert_eq!(store.bit_len("bf").await, Some(1199 * 8));
    }

    #[tokio::test]
    async fn test_many_in_one_batch() {
        let (_, adapter) = adapter();
        let ctx = Context::background();

        adapter
            .add_many(&ctx, &[vec![1, 2], vec![3, 4]])
            .await
            .unwrap();
        let found = adapter
            .exists_many(&ctx, &[vec![1, 2], vec![3, 4], vec![5, 6]])
            .await
            .unwrap();

        assert_eq!(found, vec![true, true, false]);
    }

    #[tokio::test]
    async fn test_failed_add_sets_nothing() {
        let (store, adapter) = adapter();
        let ctx = Context::background();
        store.fail_next(StoreError::Aborted("EXECABORT".into())).await;

        let err = adapter.add(&ctx, &[1, 2, 3]).await.unwrap_err();

        assert_eq!(
            err,
            FilterErrorKind::Store(StoreError::Aborted("EXECABORT".into()))
        );
        assert!(!adapter.exists(&ctx, &[1]).await.unwrap());
    }
}
