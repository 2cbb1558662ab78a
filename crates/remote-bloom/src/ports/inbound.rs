//! Inbound Ports (Driving Ports)
//!
//! The API callers use. Element types are fixed per trait object so the
//! traits stay object safe; `BloomFilter` and `CountingBloomFilter` also
//! offer generic inherent methods accepting any [`FilterElement`].
//!
//! [`FilterElement`]: crate::domain::FilterElement

use async_trait::async_trait;

use crate::context::Context;
use crate::error::FilterError;

/// Shared probabilistic membership (Driving Port)
#[async_trait]
pub trait MembershipFilter: Send + Sync {
    /// Name of the shared structure
    fn name(&self) -> &str;

    /// Add an element
    async fn add(&self, ctx: &Context, element: &[u8]) -> Result<(), FilterError>;

    /// Test an element; `false` is definite, `true` may be a false positive
    async fn exists(&self, ctx: &Context, element: &[u8]) -> Result<bool, FilterError>;
}

/// Membership with removal and a net add count (Driving Port)
#[async_trait]
pub trait CountingMembershipFilter: MembershipFilter {
    /// Remove one previous add of an element
    async fn remove(&self, ctx: &Context, element: &[u8]) -> Result<(), FilterError>;

    /// Net number of adds not yet offset by removes
    async fn count(&self, ctx: &Context) -> Result<u64, FilterError>;
}
