//! Result aggregation.
//!
//! Reads back whatever was persisted for a review and indexes it by
//! component type. Absent components are not an error.

use crate::error::AggregationError;
use crate::models::{AggregatedReview, ComponentType, ReviewId};
use crate::store::ResultStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds [`AggregatedReview`] projections from the result store.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn ResultStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    /// Collect every stored component of `review_id`.
    pub async fn aggregate(&self, review_id: &ReviewId) -> Result<AggregatedReview, AggregationError> {
        let results = self
            .store
            .get_all(review_id)
            .await
            .map_err(|source| AggregationError::Read {
                review_id: review_id.to_string(),
                source,
            })?;

        let review = AggregatedReview::from_results(results);
        info!(
            "Aggregated {} components for review {}",
            review.len(),
            review_id
        );
        Ok(review)
    }
}

/// Declared components with no stored record, in declaration order.
pub fn missing_components<'a>(
    declared: impl IntoIterator<Item = &'a ComponentType>,
    review: &AggregatedReview,
) -> Vec<ComponentType> {
    let missing: Vec<ComponentType> = declared
        .into_iter()
        .filter(|c| !review.contains(c))
        .cloned()
        .collect();

    if !missing.is_empty() {
        debug!("Components without results: {:?}", missing);
    }
    missing
}
