//! Keyed persistence for component results and review status.
//!
//! One [`ResultStore`] contract, two adapters:
//! - [`ObjectStore`]: one object per component under a per-review prefix
//! - [`TableStore`]: rows keyed by `(review_id, component_type)`
//!
//! The backend is chosen once via [`open_store`] and injected; nothing
//! downstream branches on which one is active.

pub mod object;
pub mod table;

pub use object::ObjectStore;
pub use table::TableStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StorageError;
use crate::models::{ComponentResult, ComponentType, ReviewId, ReviewState, ReviewStatus};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Durable keyed storage for one or many reviews.
///
/// Implementations must make a completed `put` visible to `get`/`get_all`
/// issued afterwards by the same process. TTL is stored, never enforced.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store or overwrite the record for `(review_id, component_type)`.
    async fn put(
        &self,
        review_id: &ReviewId,
        component_type: &ComponentType,
        data: &Value,
        ttl: i64,
    ) -> Result<(), StorageError>;

    async fn get(
        &self,
        review_id: &ReviewId,
        component_type: &ComponentType,
    ) -> Result<Option<ComponentResult>, StorageError>;

    /// Every stored component of a review, in no particular order.
    async fn get_all(&self, review_id: &ReviewId) -> Result<Vec<ComponentResult>, StorageError>;

    /// Overwrite the single status record of a review.
    async fn set_status(
        &self,
        review_id: &ReviewId,
        status: ReviewState,
        message: &str,
    ) -> Result<(), StorageError>;

    async fn get_status(&self, review_id: &ReviewId) -> Result<Option<ReviewStatus>, StorageError>;

    /// Short name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Open the configured backend. Called once per process.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn ResultStore>, StorageError> {
    let store: Arc<dyn ResultStore> = match config.backend {
        StorageBackend::Object => Arc::new(ObjectStore::open(&config.root).await?),
        StorageBackend::Table => Arc::new(TableStore::connect(&config.database_url).await?),
    };

    info!("Using {} result store", store.backend_name());
    Ok(store)
}

/// Persist a component result, logging instead of propagating failures.
///
/// For analyses that run in-process behind a [`TaskInvoker`](crate::invoker::TaskInvoker);
/// remote analyzers write their own results. Returns `false` when the write
/// failed.
pub async fn store_result(store: &dyn ResultStore, record: &ComponentResult) -> bool {
    match store
        .put(&record.review_id, &record.component_type, &record.data, record.ttl)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            error!(
                "Error storing {} result for review {}: {}",
                record.component_type, record.review_id, e
            );
            false
        }
    }
}

/// Update the review status, logging instead of propagating failures.
///
/// Status is observability only; a failed write never aborts a review.
pub async fn record_status(
    store: &dyn ResultStore,
    review_id: &ReviewId,
    status: ReviewState,
    message: &str,
) -> bool {
    match store.set_status(review_id, status, message).await {
        Ok(()) => {
            info!("Updated review {} status to {}", review_id, status);
            true
        }
        Err(e) => {
            error!("Error updating review {} status to {}: {}", review_id, status, e);
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn component(name: &str) -> ComponentType {
        ComponentType::new(name).unwrap()
    }

    /// Both backends, each rooted in its own scratch directory.
    pub(crate) async fn all_backends(dir: &TempDir) -> Vec<Arc<dyn ResultStore>> {
        let object = ObjectStore::open(&dir.path().join("objects")).await.unwrap();
        let db_url = format!("sqlite://{}", dir.path().join("results.db").display());
        let table = TableStore::connect(&db_url).await.unwrap();
        vec![Arc::new(object), Arc::new(table)]
    }

    fn component_set(results: &[ComponentResult]) -> BTreeSet<String> {
        results
            .iter()
            .map(|r| r.component_type.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_get_all_returns_exactly_three_components_on_every_backend() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let review_id = ReviewId::generate();
            for name in ["quota", "metrics", "flow"] {
                store
                    .put(&review_id, &component(name), &json!({ "name": name }), 0)
                    .await
                    .unwrap();
            }

            let results = store.get_all(&review_id).await.unwrap();
            assert_eq!(results.len(), 3, "backend {}", store.backend_name());
            let expected: BTreeSet<String> =
                ["flow", "metrics", "quota"].iter().map(|s| s.to_string()).collect();
            assert_eq!(component_set(&results), expected);
        }
    }

    #[tokio::test]
    async fn test_get_all_is_independent_of_write_order() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let forward = ReviewId::generate();
            let backward = ReviewId::generate();
            let names = ["phone", "logs", "cloudtrail", "quota"];

            for name in names {
                store.put(&forward, &component(name), &json!(1), 0).await.unwrap();
            }
            for name in names.iter().rev() {
                store.put(&backward, &component(name), &json!(1), 0).await.unwrap();
            }

            assert_eq!(
                component_set(&store.get_all(&forward).await.unwrap()),
                component_set(&store.get_all(&backward).await.unwrap())
            );
        }
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let review_id = ReviewId::generate();
            let quota = component("quota");

            store.put(&review_id, &quota, &json!({"v": 1}), 10).await.unwrap();
            store.put(&review_id, &quota, &json!({"v": 2}), 20).await.unwrap();

            let all = store.get_all(&review_id).await.unwrap();
            assert_eq!(all.len(), 1, "backend {}", store.backend_name());

            let record = store.get(&review_id, &quota).await.unwrap().unwrap();
            assert_eq!(record.data, json!({"v": 2}));
            assert_eq!(record.ttl, 20);
        }
    }

    #[tokio::test]
    async fn test_reviews_are_partitioned() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let first = ReviewId::generate();
            let second = ReviewId::generate();

            store.put(&first, &component("quota"), &json!(1), 0).await.unwrap();
            store.put(&second, &component("flow"), &json!(2), 0).await.unwrap();

            let results = store.get_all(&first).await.unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].review_id, first);
            assert!(store.get(&first, &component("flow")).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_missing_records_are_absent() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let review_id = ReviewId::generate();
            assert!(store.get(&review_id, &component("quota")).await.unwrap().is_none());
            assert!(store.get_all(&review_id).await.unwrap().is_empty());
            assert!(store.get_status(&review_id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_expired_ttl_is_still_readable() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let review_id = ReviewId::generate();
            let past = Utc::now().timestamp() - 86_400;

            store
                .put(&review_id, &component("metrics"), &json!({"stale": true}), past)
                .await
                .unwrap();

            let record = store.get(&review_id, &component("metrics")).await.unwrap();
            assert_eq!(record.map(|r| r.ttl), Some(past));
            assert_eq!(store.get_all(&review_id).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_status_write_is_idempotent() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let review_id = ReviewId::generate();

            store
                .set_status(&review_id, ReviewState::Completed, "done")
                .await
                .unwrap();
            store
                .set_status(&review_id, ReviewState::Completed, "done")
                .await
                .unwrap();

            let status = store.get_status(&review_id).await.unwrap().unwrap();
            assert_eq!(status.review_id, review_id);
            assert_eq!(status.status, ReviewState::Completed);
            assert_eq!(status.message, "done");
        }
    }

    #[tokio::test]
    async fn test_status_is_last_write_wins_and_not_a_component() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let review_id = ReviewId::generate();

            store
                .set_status(&review_id, ReviewState::InProgress, "Starting analysis")
                .await
                .unwrap();
            store
                .set_status(&review_id, ReviewState::Failed, "All analyzers failed")
                .await
                .unwrap();

            let status = store.get_status(&review_id).await.unwrap().unwrap();
            assert_eq!(status.status, ReviewState::Failed);
            assert_eq!(status.message, "All analyzers failed");
            assert!(store.get_all(&review_id).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_concurrent_disjoint_writers() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let review_id = ReviewId::generate();
            let names = ["quota", "metrics", "phone", "flow", "cloudtrail", "logs"];

            let writes = names.iter().map(|name| {
                let store = Arc::clone(&store);
                async move {
                    store
                        .put(&review_id, &component(name), &json!({ "by": name }), 0)
                        .await
                }
            });
            for result in futures::future::join_all(writes).await {
                result.unwrap();
            }

            assert_eq!(store.get_all(&review_id).await.unwrap().len(), names.len());
        }
    }

    /// Store whose writes always fail.
    struct RefusingStore;

    fn refused() -> StorageError {
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "store is read-only",
        ))
    }

    #[async_trait]
    impl ResultStore for RefusingStore {
        async fn put(
            &self,
            _review_id: &ReviewId,
            _component_type: &ComponentType,
            _data: &Value,
            _ttl: i64,
        ) -> Result<(), StorageError> {
            Err(refused())
        }

        async fn get(
            &self,
            _review_id: &ReviewId,
            _component_type: &ComponentType,
        ) -> Result<Option<ComponentResult>, StorageError> {
            Ok(None)
        }

        async fn get_all(&self, _review_id: &ReviewId) -> Result<Vec<ComponentResult>, StorageError> {
            Ok(Vec::new())
        }

        async fn set_status(
            &self,
            _review_id: &ReviewId,
            _status: ReviewState,
            _message: &str,
        ) -> Result<(), StorageError> {
            Err(refused())
        }

        async fn get_status(&self, _review_id: &ReviewId) -> Result<Option<ReviewStatus>, StorageError> {
            Ok(None)
        }

        fn backend_name(&self) -> &'static str {
            "refusing"
        }
    }

    #[tokio::test]
    async fn test_swallowing_helpers_report_failure() {
        let store = RefusingStore;
        let review_id = ReviewId::generate();
        let record = ComponentResult::new(review_id, component("logs"), json!({"lines": 10}), 0);

        assert!(!store_result(&store, &record).await);
        assert!(!record_status(&store, &review_id, ReviewState::Failed, "boom").await);
    }

    #[tokio::test]
    async fn test_swallowing_helpers_report_success() {
        let dir = TempDir::new().unwrap();
        for store in all_backends(&dir).await {
            let review_id = ReviewId::generate();
            let record = ComponentResult::new(review_id, component("quota"), json!({}), 0);

            assert!(store_result(store.as_ref(), &record).await);
            assert!(
                record_status(store.as_ref(), &review_id, ReviewState::InProgress, "go").await
            );
        }
    }
}
