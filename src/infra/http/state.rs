use std::sync::Arc;

use crate::cache::{CacheKeyDeriver, ConditionalCacheGate};

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<ConditionalCacheGate>,
    pub keys: Arc<CacheKeyDeriver>,
}

impl AppState {
    pub fn new(gate: Arc<ConditionalCacheGate>, keys: Arc<CacheKeyDeriver>) -> Self {
        Self { gate, keys }
    }
}
