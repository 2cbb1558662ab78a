//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};

use remote_bloom::InMemoryStore;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Route crate logs to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One store shared by every handle in a test, standing in for a remote server
pub fn shared_store() -> Arc<InMemoryStore> {
    init_tracing();
    Arc::new(InMemoryStore::new())
}

pub fn elements(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}-{}", prefix, i)).collect()
}
