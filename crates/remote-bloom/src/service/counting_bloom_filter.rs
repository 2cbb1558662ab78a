//! Shared Counting Bloom Filter
//!
//! Same positions as the plain filter, but each position is a counter so
//! elements can be removed. A running total of adds not yet offset by
//! removes is kept next to the counters and updated in the same batch.
//!
//! INVARIANTS:
//! - Counters and the total are never negative: a remove that would take
//!   any of them below zero fails with `Underflow` and changes nothing
//! - add(x) then remove(x) restores every counter it touched

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::CountingStoreAdapter;
use crate::context::Context;
use crate::domain::element::encode;
use crate::domain::{calculate_fpr, FilterConfig, FilterElement, FilterOptions, FilterVariant};
use crate::error::{ConfigError, FilterError, FilterErrorKind, Operation};
use crate::metrics::{MetricsRecorder, NoOpMetrics};
use crate::ports::{CountingMembershipFilter, FilterStore, MembershipFilter};

/// Counting Bloom filter whose counters live in a [`FilterStore`]
///
/// Removing an element that was never added can drive shared counters to
/// zero and create false negatives for other elements. Callers own that
/// contract.
pub struct CountingBloomFilter<S: ?Sized> {
    config: Arc<FilterConfig>,
    adapter: CountingStoreAdapter<S>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<S: ?Sized> Clone for CountingBloomFilter<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            adapter: self.adapter.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: FilterStore + ?Sized> CountingBloomFilter<S> {
    /// Open (creating on first use) the counting filter `name`
    pub async fn new(
        ctx: &Context,
        store: Arc<S>,
        name: impl Into<String>,
        expected_items: u64,
        false_positive_rate: f64,
    ) -> Result<Self, FilterError> {
        Self::with_options(
            ctx,
            store,
            name,
            expected_items,
            false_positive_rate,
            &FilterOptions::default(),
        )
        .await
    }

    /// [`CountingBloomFilter::new`] with explicit options
    pub async fn with_options(
        ctx: &Context,
        store: Arc<S>,
        name: impl Into<String>,
        expected_items: u64,
        false_positive_rate: f64,
        options: &FilterOptions,
    ) -> Result<Self, FilterError> {
        let name = name.into();
        let open_error = |kind: FilterErrorKind| FilterError::new(name.clone(), Operation::Open, kind);

        if let Some(missing) = store.capabilities().missing_for_counters() {
            return Err(open_error(ConfigError::MissingCapability(missing).into()));
        }
        let config = FilterConfig::new(name.clone(), expected_items, false_positive_rate, options)
            .map_err(|e| open_error(e.into()))?;

        let adapter =
            CountingStoreAdapter::new(store, options.data_key(&name), options.meta_key(&name));
        adapter
            .ensure_metadata(ctx, &config.metadata(FilterVariant::Counting))
            .await
            .map_err(open_error)?;

        info!(
            filter = %name,
            counters = config.bit_count,
            hashes = config.hash_count,
            hash_family = ?config.hash_family,
            "Counting Bloom filter opened"
        );

        Ok(Self {
            config: Arc::new(config),
            adapter,
            metrics: Arc::new(NoOpMetrics),
        })
    }

    /// Attach a metrics recorder, counting this filter as opened
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        metrics.record_filter_opened(self.config.bit_count, self.config.hash_count);
        self.metrics = metrics;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn expected_fpr(&self) -> f64 {
        self.config.expected_fpr()
    }

    /// Add an element. Each call counts once; retrying a successful add
    /// counts it twice.
    pub async fn add<E: FilterElement + ?Sized>(
        &self,
        ctx: &Context,
        element: &E,
    ) -> Result<(), FilterError> {
        let positions = self.positions(Operation::Add, element)?;
        let start = Instant::now();

        self.adapter
            .add(ctx, &positions)
            .await
            .map_err(|kind| self.error(Operation::Add, kind))?;

        self.metrics.record_add(1, start.elapsed());
        debug!(filter = %self.config.name, "Element added");
        Ok(())
    }

    /// Add several elements in one atomic batch
    pub async fn add_all<E: FilterElement>(
        &self,
        ctx: &Context,
        elements: &[E],
    ) -> Result<(), FilterError> {
        let position_sets = elements
            .iter()
            .map(|e| self.positions(Operation::Add, e))
            .collect::<Result<Vec<_>, _>>()?;
        let start = Instant::now();

        self.adapter
            .add_many(ctx, &position_sets)
            .await
            .map_err(|kind| self.error(Operation::Add, kind))?;

        self.metrics.record_add(elements.len(), start.elapsed());
        debug!(filter = %self.config.name, elements = elements.len(), "Elements added");
        Ok(())
    }

    /// Remove one previous add of an element
    ///
    /// Fails with `Underflow` and leaves every counter untouched when any
    /// counter of the element, or the total, is already at zero.
    pub async fn remove<E: FilterElement + ?Sized>(
        &self,
        ctx: &Context,
        element: &E,
    ) -> Result<(), FilterError> {
        let positions = self.positions(Operation::Remove, element)?;

        self.adapter
            .remove(ctx, &positions)
            .await
            .map_err(|kind| self.error(Operation::Remove, kind))?;

        self.metrics.record_remove();
        debug!(filter = %self.config.name, "Element removed");
        Ok(())
    }

    /// Test an element; true iff every counter of the element is above zero
    pub async fn exists<E: FilterElement + ?Sized>(
        &self,
        ctx: &Context,
        element: &E,
    ) -> Result<bool, FilterError> {
        let positions = self.positions(Operation::Exists, element)?;
        let start = Instant::now();

        let found = self
            .adapter
            .exists(ctx, &positions)
            .await
            .map_err(|kind| self.error(Operation::Exists, kind))?;

        self.metrics.record_lookup(start.elapsed(), found);
        Ok(found)
    }

    /// Net number of adds not yet offset by removes
    pub async fn count(&self, ctx: &Context) -> Result<u64, FilterError> {
        self.adapter
            .count(ctx)
            .await
            .map_err(|kind| self.error(Operation::Count, kind))
    }

    /// False positive rate at the current count
    pub async fn current_fpr(&self, ctx: &Context) -> Result<f64, FilterError> {
        let count = self.count(ctx).await?;
        Ok(calculate_fpr(
            self.config.bit_count,
            count,
            self.config.hash_count,
        ))
    }

    fn positions<E: FilterElement + ?Sized>(
        &self,
        op: Operation,
        element: &E,
    ) -> Result<Vec<u64>, FilterError> {
        let bytes = encode(element).map_err(|e| self.error(op, e.into()))?;
        Ok(self.config.positions(&bytes))
    }

    fn error(&self, op: Operation, kind: FilterErrorKind) -> FilterError {
        if matches!(kind, FilterErrorKind::Store(_)) {
            self.metrics.record_store_error();
        }
        FilterError::new(self.config.name.clone(), op, kind)
    }
}

#[async_trait]
impl<S: FilterStore + ?Sized> MembershipFilter for CountingBloomFilter<S> {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn add(&self, ctx: &Context, element: &[u8]) -> Result<(), FilterError> {
        CountingBloomFilter::add(self, ctx, element).await
    }

    async fn exists(&self, ctx: &Context, element: &[u8]) -> Result<bool, FilterError> {
        CountingBloomFilter::exists(self, ctx, element).await
    }
}

#[async_trait]
impl<S: FilterStore + ?Sized> CountingMembershipFilter for CountingBloomFilter<S> {
    async fn remove(&self, ctx: &Context, element: &[u8]) -> Result<(), FilterError> {
        CountingBloomFilter::remove(self, ctx, element).await
    }

    async fn count(&self, ctx: &Context) -> Result<u64, FilterError> {
        CountingBloomFilter::count(self, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::TOTAL_FIELD;
    use crate::error::StoreError;
    use crate::metrics::Metrics;
    use crate::ports::StoreCapabilities;

    async fn open(store: &Arc<InMemoryStore>, name: &str) -> CountingBloomFilter<InMemoryStore> {
        CountingBloomFilter::new(&Context::background(), store.clone(), name, 1000, 0.01)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_remove_count() {
        let store = Arc::new(InMemoryStore::new());
        let filter = open(&store, "cbf").await;
        let ctx = Context::background();

        filter.add(&ctx, "hello").await.unwrap();
        filter.add(&ctx, "world").await.unwrap();
        assert_eq!(filter.count(&ctx).await.unwrap(), 2);

        filter.remove(&ctx, "hello").await.unwrap();
        assert!(!filter.exists(&ctx, "hello").await.unwrap());
        assert!(filter.exists(&ctx, "world").await.unwrap());
        assert_eq!(filter.count(&ctx).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_filter_counts_zero() {
        let store = Arc::new(InMemoryStore::new());
        let filter = open(&store, "cbf").await;

        assert_eq!(filter.count(&Context::background()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_adds_need_matching_removes() {
        let store = Arc::new(InMemoryStore::new());
        let filter = open(&store, "cbf").await;
        let ctx = Context::background();

        filter.add(&ctx, "dup").await.unwrap();
        filter.add(&ctx, "dup").await.unwrap();
        filter.remove(&ctx, "dup").await.unwrap();

        assert!(filter.exists(&ctx, "dup").await.unwrap());
        assert_eq!(filter.count(&ctx).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_of_absent_element_underflows() {
        let store = Arc::new(InMemoryStore::new());
        let filter = open(&store, "cbf").await;
        let ctx = Context::background();
        filter.add(&ctx, "present").await.unwrap();

        let err = filter.remove(&ctx, "absent").await.unwrap_err();

        assert!(err.is_underflow());
        assert_eq!(err.operation(), Operation::Remove);
        assert_eq!(filter.count(&ctx).await.unwrap(), 1);
        assert!(filter.exists(&ctx, "present").await.unwrap());
        assert_eq!(store.field("cbf", TOTAL_FIELD).await, Some(1));
    }

    #[tokio::test]
    async fn test_counter_sum_is_count_times_k() {
        let store = Arc::new(InMemoryStore::new());
        let filter = open(&store, "cbf").await;
        let ctx = Context::background();

        let elements: Vec<String> = (0..25).map(|i| format!("item-{}", i)).collect();
        filter.add_all(&ctx, &elements).await.unwrap();
        filter.remove(&ctx, "item-3").await.unwrap();

        let sum = store.field_sum("cbf", TOTAL_FIELD).await;
        assert_eq!(sum, 24 * 7);
        assert_eq!(filter.count(&ctx).await.unwrap(), 24);
    }

    #[tokio::test]
    async fn test_current_fpr_grows_with_count() {
        let store = Arc::new(InMemoryStore::new());
        let filter = open(&store, "cbf").await;
        let ctx = Context::background();

        assert_eq!(filter.current_fpr(&ctx).await.unwrap(), 0.0);

        let elements: Vec<String> = (0..1000).map(|i| format!("item-{}", i)).collect();
        filter.add_all(&ctx, &elements).await.unwrap();

        let fpr = filter.current_fpr(&ctx).await.unwrap();
        assert!((fpr - filter.expected_fpr()).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_missing_capability_rejected() {
        let store = Arc::new(InMemoryStore::new().with_capabilities(StoreCapabilities {
            integer_fields: false,
            ..StoreCapabilities::all()
        }));

        let err = CountingBloomFilter::new(&Context::background(), store, "cbf", 1000, 0.01)
            .await
            .err()
            .unwrap();

        assert_eq!(
            err.kind(),
            &FilterErrorKind::Config(ConfigError::MissingCapability("integer fields"))
        );
    }

    #[tokio::test]
    async fn test_store_error_on_remove() {
        let store = Arc::new(InMemoryStore::new());
        let metrics = Arc::new(Metrics::new());
        let filter = open(&store, "cbf").await.with_metrics(metrics.clone());
        let ctx = Context::background();
        filter.add(&ctx, "hello").await.unwrap();
        store
            .fail_next(StoreError::Connection("reset by peer".into()))
            .await;

        let err = filter.remove(&ctx, "hello").await.unwrap_err();

        assert_eq!(err.filter(), "cbf");
        assert_eq!(err.operation(), Operation::Remove);
        assert!(err.is_store());
        assert_eq!(metrics.snapshot().store_errors, 1);
        assert_eq!(metrics.snapshot().elements_removed, 0);
        assert!(filter.exists(&ctx, "hello").await.unwrap());
    }

    #[tokio::test]
    async fn test_usable_through_trait_object() {
        let store = Arc::new(InMemoryStore::new());
        let filter: Arc<dyn CountingMembershipFilter> = Arc::new(open(&store, "cbf").await);
        let ctx = Context::background();

        filter.add(&ctx, b"a").await.unwrap();
        filter.add(&ctx, b"b").await.unwrap();
        filter.remove(&ctx, b"a").await.unwrap();

        assert_eq!(filter.count(&ctx).await.unwrap(), 1);
        assert!(!filter.exists(&ctx, b"a").await.unwrap());
    }
}
