//! Deadline-bounded execution against the document store.
//!
//! One store call per plan, rows drained into an owned sequence, errors
//! surfaced unchanged. No retries and no partial results: a failure
//! discards everything accumulated so far.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::instrument;

use crate::infra::docstore::{DocumentStore, FindOptions, StoreError};

use super::pipeline::CompiledPipeline;

pub struct AggregationExecutor {
    store: Arc<dyn DocumentStore>,
    deadline: Duration,
}

impl AggregationExecutor {
    pub fn new(store: Arc<dyn DocumentStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Run an aggregation pipeline. The pipeline is consumed; it cannot
    /// be executed twice.
    #[instrument(skip_all, fields(stages = pipeline.stages().len()))]
    pub async fn execute(&self, pipeline: CompiledPipeline) -> Result<Vec<Value>, StoreError> {
        let stages = pipeline.into_stages();
        self.bounded(self.store.aggregate(&stages)).await
    }

    /// Run a plain predicate query for the list endpoints.
    #[instrument(skip_all)]
    pub async fn find(
        &self,
        predicate: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        self.bounded(self.store.find(predicate, options)).await
    }

    async fn bounded<F>(&self, query: F) -> Result<Vec<Value>, StoreError>
    where
        F: Future<Output = Result<Vec<Value>, StoreError>>,
    {
        match tokio::time::timeout(self.deadline, query).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.deadline.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use crate::domain::ExploreRequest;
    use crate::query::pipeline::build_pipeline;

    use super::*;

    struct StalledStore;

    #[async_trait]
    impl DocumentStore for StalledStore {
        async fn aggregate(&self, _pipeline: &[Value]) -> Result<Vec<Value>, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn find(
            &self,
            _predicate: &Value,
            _options: &FindOptions,
        ) -> Result<Vec<Value>, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_a_store_error() {
        let executor =
            AggregationExecutor::new(Arc::new(StalledStore), Duration::from_secs(10));
        let pipeline = build_pipeline(&ExploreRequest::default(), json!({}));
        let err = executor.execute(pipeline).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(10)));
    }
}
