//! Document store collaborator interface.
//!
//! The core only ever hands the store a compiled pipeline or a
//! predicate-plus-options pair and gets rows (or an error) back. The
//! in-memory reference implementation lives in [`memory`]; production
//! deployments substitute their own implementation behind the same
//! trait.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryDocumentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query exceeded the {0} second deadline")]
    Timeout(u64),
    #[error("store execution failed: {0}")]
    Execution(String),
}

impl StoreError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

/// Options for a plain find-by-predicate query.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<(String, i64)>,
    pub skip: i64,
    pub limit: i64,
}

/// Capability interface over the backing document collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run an aggregation pipeline and drain the result into an owned,
    /// ordered row sequence.
    async fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Value>, StoreError>;

    /// Run a predicate query with sort/skip/limit options.
    async fn find(&self, predicate: &Value, options: &FindOptions) -> Result<Vec<Value>, StoreError>;
}
