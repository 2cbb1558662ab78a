//! Ports Layer
//!
//! Defines the interfaces (traits) for:
//! - Driving Ports (inbound) - API for filter callers
//! - Driven Ports (outbound) - the key-value store holding filter state

pub mod inbound;
pub mod outbound;

pub use inbound::{CountingMembershipFilter, MembershipFilter};
pub use outbound::{
    Batch, BatchOutcome, FilterStore, Rejection, StoreCapabilities, StoreOp, StoreReply,
};
