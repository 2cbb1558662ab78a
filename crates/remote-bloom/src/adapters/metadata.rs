//! Persisted filter sizing
//!
//! The first process to open a name records its sizing with set-if-absent
//! semantics; every later open compares its own sizing against the record.
//! Claim and read happen in one batch, so two processes racing to create the
//! same name with different parameters cannot both succeed.

use tracing::warn;

use super::replies::{expect_applied, into_fields};
use crate::context::Context;
use crate::domain::FilterMetadata;
use crate::error::{FilterErrorKind, StoreError};
use crate::ports::{Batch, FilterStore, StoreOp};

/// Record `expected` under `meta_key` or verify the existing record matches
pub(crate) async fn claim_metadata<S: FilterStore + ?Sized>(
    store: &S,
    ctx: &Context,
    meta_key: &str,
    expected: &FilterMetadata,
) -> Result<(), FilterErrorKind> {
    let fields = expected.fields();
    let batch = Batch::new().with(StoreOp::ClaimFields {
        key: meta_key.to_string(),
        values: fields
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect(),
    });

    let outcome = store.execute(ctx, batch).await?;
    let reply = expect_applied(outcome, 1)?
        .pop()
        .ok_or_else(|| StoreError::Protocol("missing claim reply".to_string()))?;
    let stored = into_fields(reply, fields.len())?;

    for ((field, expected), stored) in fields.into_iter().zip(stored) {
        let stored = stored.ok_or_else(|| {
            StoreError::Protocol(format!("claimed field {} missing from {}", field, meta_key))
        })?;
        if stored != expected {
            warn!(
                key = %meta_key,
                field = field,
                stored = stored,
                expected = expected,
                "Persisted filter sizing disagrees with requested sizing"
            );
            return Err(FilterErrorKind::Consistency {
                field,
                stored,
                expected,
            });
        }
    }

    Ok(())
}
