//! Review coordination.
//!
//! The coordinator owns a review from creation to terminal status:
//!
//! 1. mint a [`ReviewId`] and mark the review `in_progress`
//! 2. fan out every declared task concurrently with one shared payload
//! 3. wait for all of them; failures are collected, not raised
//! 4. if nothing succeeded, fail without aggregating
//! 5. otherwise run the report stage once and mark the review terminal
//!
//! Status writes are best-effort and never influence these decisions.

use crate::error::ReviewError;
use crate::invoker::{TaskInvoker, TaskResult};
use crate::models::{
    AnalysisTask, ComponentType, ReviewId, ReviewParameters, ReviewState, ReviewSummary,
    TaskPayload, RESERVED_PAYLOAD_KEYS,
};
use crate::report::{ReportRequest, ReportStage};
use crate::store::{record_status, ResultStore};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

const SECONDS_PER_DAY: i64 = 86_400;

/// Fields copied into every task payload besides the review id and window.
#[derive(Debug, Clone, Default)]
pub struct ReviewContext {
    pub target: Map<String, Value>,
    pub passthrough: Map<String, Value>,
    /// Days until stored results expire.
    pub ttl_days: u32,
}

impl ReviewContext {
    /// Keys that would collide on the wire: fixed payload field names used
    /// in either map, and keys present in both maps.
    pub fn conflicting_keys(&self) -> Vec<String> {
        let mut conflicts: Vec<String> = self
            .target
            .keys()
            .chain(self.passthrough.keys())
            .filter(|k| RESERVED_PAYLOAD_KEYS.contains(&k.as_str()))
            .cloned()
            .collect();
        conflicts.extend(
            self.passthrough
                .keys()
                .filter(|k| self.target.contains_key(*k))
                .cloned(),
        );

        conflicts.sort();
        conflicts.dedup();
        conflicts
    }

    /// Drop colliding keys. Fixed fields beat both maps, target beats passthrough.
    fn without_conflicts(mut self) -> Self {
        for key in self.conflicting_keys() {
            warn!("Dropping colliding payload field '{}'", key);
            if RESERVED_PAYLOAD_KEYS.contains(&key.as_str()) {
                self.target.remove(&key);
            }
            self.passthrough.remove(&key);
        }
        self
    }
}

/// Expiry timestamp (epoch seconds) `ttl_days` after `now`.
pub fn compute_ttl(now: DateTime<Utc>, ttl_days: u32) -> i64 {
    now.timestamp() + i64::from(ttl_days) * SECONDS_PER_DAY
}

/// Fan-in result: which tasks succeeded and what the others reported.
#[derive(Debug, Default)]
struct FanIn {
    succeeded: Vec<ComponentType>,
    errors: Vec<String>,
}

impl FanIn {
    fn collect(outcomes: Vec<(&AnalysisTask, TaskResult)>) -> Self {
        let mut fan_in = FanIn::default();

        for (task, result) in outcomes {
            match result.error_message() {
                None => {
                    info!("Analyzer {} completed successfully", task.name);
                    fan_in.succeeded.push(task.name.clone());
                }
                Some(message) => {
                    error!("Analyzer {} failed: {}", task.name, message);
                    fan_in.errors.push(format!("{}: {}", task.name, message));
                }
            }
        }

        fan_in
    }
}

/// Runs reviews over a fixed task set.
pub struct Coordinator {
    store: Arc<dyn ResultStore>,
    invoker: Arc<dyn TaskInvoker>,
    reporter: Arc<dyn ReportStage>,
    tasks: Vec<AnalysisTask>,
    context: ReviewContext,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn ResultStore>,
        invoker: Arc<dyn TaskInvoker>,
        reporter: Arc<dyn ReportStage>,
        tasks: Vec<AnalysisTask>,
        context: ReviewContext,
    ) -> Self {
        Self {
            store,
            invoker,
            reporter,
            tasks,
            context: context.without_conflicts(),
        }
    }

    pub fn tasks(&self) -> &[AnalysisTask] {
        &self.tasks
    }

    /// Run one complete review with a freshly minted id.
    pub async fn start_review(&self, params: ReviewParameters) -> ReviewSummary {
        let review_id = ReviewId::generate();
        self.run_review(review_id, params).await
    }

    async fn run_review(&self, review_id: ReviewId, params: ReviewParameters) -> ReviewSummary {
        info!("Starting operational review {}", review_id);

        record_status(
            self.store.as_ref(),
            &review_id,
            ReviewState::InProgress,
            "Starting analysis",
        )
        .await;

        let payload = self.build_payload(review_id, params, Utc::now());

        info!("Invoking {} analyzers in parallel", self.tasks.len());
        let fan_in = FanIn::collect(self.fan_out(&payload).await);

        if fan_in.succeeded.is_empty() {
            let failure = ReviewError::TotalFailure(fan_in.errors.clone());
            return self.finish_failed(review_id, fan_in, failure).await;
        }

        if !fan_in.errors.is_empty() {
            warn!("Some analyzers failed: {}", fan_in.errors.join("; "));
        }

        let request = ReportRequest {
            review_id,
            target: self.context.target.clone(),
            days_back: params.days_back,
            declared: self.tasks.iter().map(|t| t.name.clone()).collect(),
        };

        info!("Invoking report generator");
        match self.reporter.run(&request).await {
            Ok(reference) => self.finish_completed(review_id, fan_in, reference).await,
            Err(e) => {
                self.finish_failed(review_id, fan_in, ReviewError::Aggregation(e))
                    .await
            }
        }
    }

    /// The payload shared by every task of one review.
    pub fn build_payload(
        &self,
        review_id: ReviewId,
        params: ReviewParameters,
        now: DateTime<Utc>,
    ) -> TaskPayload {
        TaskPayload {
            review_id,
            days_back: params.days_back,
            ttl: compute_ttl(now, self.context.ttl_days),
            target: self.context.target.clone(),
            passthrough: self.context.passthrough.clone(),
        }
    }

    /// Invoke every task concurrently and wait for all of them.
    async fn fan_out<'a>(&'a self, payload: &TaskPayload) -> Vec<(&'a AnalysisTask, TaskResult)> {
        let invocations = self.tasks.iter().map(|task| async move {
            let result = self.invoker.invoke(&task.target, payload).await;
            (task, result)
        });

        join_all(invocations).await
    }

    async fn finish_completed(
        &self,
        review_id: ReviewId,
        fan_in: FanIn,
        reference: String,
    ) -> ReviewSummary {
        let message = "Review completed successfully".to_string();
        record_status(self.store.as_ref(), &review_id, ReviewState::Completed, &message).await;

        info!("Review {} completed successfully", review_id);

        ReviewSummary {
            review_id,
            status: ReviewState::Completed,
            succeeded_count: fan_in.succeeded.len(),
            failed_count: fan_in.errors.len(),
            errors: fan_in.errors,
            aggregate_ref: Some(reference),
            message,
        }
    }

    async fn finish_failed(
        &self,
        review_id: ReviewId,
        fan_in: FanIn,
        failure: ReviewError,
    ) -> ReviewSummary {
        let message = failure.to_string();
        error!("{}", message);
        record_status(self.store.as_ref(), &review_id, ReviewState::Failed, &message).await;

        ReviewSummary {
            review_id,
            status: ReviewState::Failed,
            succeeded_count: fan_in.succeeded.len(),
            failed_count: fan_in.errors.len(),
            errors: fan_in.errors,
            aggregate_ref: None,
            message,
        }
    }
}
