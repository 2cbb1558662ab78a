//! Shared Bloom Filter
//!
//! Facade over the Bit Store Adapter. Holds nothing but the immutable
//! configuration; every bit lives in the store, so any number of handles in
//! any number of processes see one filter.
//!
//! INVARIANTS:
//! - No false negatives: once `add(x)` returns Ok, `exists(x)` is true for
//!   every handle on the same name
//! - Every add/exists for an element derives the same positions

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::BitStoreAdapter;
use crate::context::Context;
use crate::domain::element::encode;
use crate::domain::{
    calculate_fpr, estimate_cardinality, FilterConfig, FilterElement, FilterOptions,
    FilterVariant,
};
use crate::error::{ConfigError, FilterError, FilterErrorKind, Operation};
use crate::metrics::{MetricsRecorder, NoOpMetrics};
use crate::ports::{FilterStore, MembershipFilter};

/// Plain Bloom filter whose bits live in a [`FilterStore`]
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(InMemoryStore::new());
/// let ctx = Context::background();
///
/// let filter = BloomFilter::new(&ctx, store, "bf", 1000, 0.01).await?;
/// filter.add(&ctx, "hello").await?;
/// assert!(filter.exists(&ctx, "hello").await?);
/// ```
pub struct BloomFilter<S: ?Sized> {
    config: Arc<FilterConfig>,
    adapter: BitStoreAdapter<S>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<S: ?Sized> Clone for BloomFilter<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            adapter: self.adapter.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: FilterStore + ?Sized> BloomFilter<S> {
    /// Open (creating on first use) the filter `name` sized for `expected_items`
    /// at `false_positive_rate`
    ///
    /// Fails with a consistency error if `name` already exists with a
    /// different sizing, hash family or variant.
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

    /// [`BloomFilter::new`] with explicit options
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

        if let Some(missing) = store.capabilities().missing_for_bits() {
            return Err(open_error(ConfigError::MissingCapability(missing).into()));
        }
        let config = FilterConfig::new(name.clone(), expected_items, false_positive_rate, options)
            .map_err(|e| open_error(e.into()))?;

        let adapter = BitStoreAdapter::new(store, options.data_key(&name), options.meta_key(&name));
        adapter
            .ensure_metadata(ctx, &config.metadata(FilterVariant::Plain))
            .await
            .map_err(open_error)?;

        info!(
            filter = %name,
            bits = config.bit_count,
            hashes = config.hash_count,
            hash_family = ?config.hash_family,
            "Bloom filter opened"
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

    /// False positive rate once the expected number of elements is present
    pub fn expected_fpr(&self) -> f64 {
        self.config.expected_fpr()
    }

    /// Add an element. Safe to retry.
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

    /// Test an element; `false` is definite, `true` may be a false positive
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

    /// Test several elements read in one atomic batch
    pub async fn exists_all<E: FilterElement>(
        &self,
        ctx: &Context,
        elements: &[E],
    ) -> Result<Vec<bool>, FilterError> {
        let position_sets = elements
            .iter()
            .map(|e| self.positions(Operation::Exists, e))
            .collect::<Result<Vec<_>, _>>()?;
        let start = Instant::now();

        let found = self
            .adapter
            .exists_many(ctx, &position_sets)
            .await
            .map_err(|kind| self.error(Operation::Exists, kind))?;

        let elapsed = start.elapsed() / found.len().max(1) as u32;
        for &f in &found {
            self.metrics.record_lookup(elapsed, f);
        }
        Ok(found)
    }

    /// Estimate how many distinct elements have been added
    ///
    /// Derived from the number of set bits; `u64::MAX` once every bit is set.
    pub async fn estimated_count(&self, ctx: &Context) -> Result<u64, FilterError> {
        let set_bits = self
            .adapter
            .set_bits(ctx)
            .await
            .map_err(|kind| self.error(Operation::Estimate, kind))?;

        Ok(estimate_cardinality(
            self.config.bit_count,
            self.config.hash_count,
            set_bits,
        ))
    }

    /// False positive rate at the current estimated population
    pub async fn current_fpr(&self, ctx: &Context) -> Result<f64, FilterError> {
        let estimate = self.estimated_count(ctx).await?;
        Ok(calculate_fpr(
            self.config.bit_count,
            estimate,
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
impl<S: FilterStore + ?Sized> MembershipFilter for BloomFilter<S> {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn add(&self, ctx: &Context, element: &[u8]) -> Result<(), FilterError> {
        BloomFilter::add(self, ctx, element).await
    }

    async fn exists(&self, ctx: &Context, element: &[u8]) -> Result<bool, FilterError> {
        BloomFilter::exists(self, ctx, element).await
    }
}
