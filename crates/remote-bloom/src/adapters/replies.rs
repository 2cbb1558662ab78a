//! Unpacking store replies
//!
//! A reply of the wrong shape means the store broke its contract, which is
//! reported as a protocol error.

use crate::error::StoreError;
use crate::ports::{BatchOutcome, StoreReply};

/// Replies of a batch that carried no guard
pub(crate) fn expect_applied(outcome: BatchOutcome, expected: usize) -> Result<Vec<StoreReply>, StoreError> {
    match outcome {
        BatchOutcome::Applied(replies) if replies.len() == expected => Ok(replies),
        BatchOutcome::Applied(replies) => Err(StoreError::Protocol(format!(
            "expected {} replies, got {}",
            expected,
            replies.len()
        ))),
        BatchOutcome::Rejected(rejection) => Err(StoreError::Protocol(format!(
            "unguarded batch rejected on {}/{}",
            rejection.key, rejection.field
        ))),
    }
}

pub(crate) fn into_bits(reply: StoreReply, expected: usize) -> Result<Vec<bool>, StoreError> {
    match reply {
        StoreReply::Bits(bits) if bits.len() == expected => Ok(bits),
        other => Err(unexpected("bits", &other)),
    }
}

pub(crate) fn into_bit_count(reply: StoreReply) -> Result<u64, StoreError> {
    match reply {
        StoreReply::BitCount(count) => Ok(count),
        other => Err(unexpected("bit count", &other)),
    }
}

pub(crate) fn into_fields(reply: StoreReply, expected: usize) -> Result<Vec<Option<i64>>, StoreError> {
    match reply {
        StoreReply::Fields(values) if values.len() == expected => Ok(values),
        other => Err(unexpected("fields", &other)),
    }
}

fn unexpected(wanted: &str, got: &StoreReply) -> StoreError {
    StoreError::Protocol(format!("expected {} reply, got {:?}", wanted, got))
}
