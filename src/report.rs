//! Consolidated report stage.
//!
//! The coordinator calls a [`ReportStage`] once, after every task returned
//! and at least one succeeded. The default stage aggregates the stored
//! results and publishes them as a single JSON document.

use crate::aggregator::{missing_components, Aggregator};
use crate::error::AggregationError;
use crate::models::{AggregatedReview, ComponentType, ReviewId, ReviewSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

/// Input handed to the report stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub review_id: ReviewId,
    /// Target identity as configured; opaque here.
    pub target: Map<String, Value>,
    pub days_back: u32,
    /// Every component declared for the review, succeeded or not.
    pub declared: Vec<ComponentType>,
}

/// Aggregation step as seen by the coordinator.
#[async_trait]
pub trait ReportStage: Send + Sync {
    /// Consolidate the review and return a reference to the artifact.
    async fn run(&self, request: &ReportRequest) -> Result<String, AggregationError>;
}

/// The consolidated document written for a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedReport {
    pub review_id: ReviewId,
    pub generated_at: DateTime<Utc>,
    pub days_back: u32,
    pub target: Map<String, Value>,
    pub components: AggregatedReview,
    pub missing_components: Vec<ComponentType>,
}

impl ConsolidatedReport {
    pub fn new(request: &ReportRequest, components: AggregatedReview) -> Self {
        let missing_components = missing_components(&request.declared, &components);

        Self {
            review_id: request.review_id,
            generated_at: Utc::now(),
            days_back: request.days_back,
            target: request.target.clone(),
            components,
            missing_components,
        }
    }
}

/// File name of the artifact for a review.
pub fn report_file_name(review_id: &ReviewId) -> String {
    format!("ops-review-{}.json", review_id)
}

/// Aggregates from the result store and writes
/// `<output_dir>/ops-review-<review_id>.json`.
pub struct JsonReportStage {
    aggregator: Aggregator,
    output_dir: PathBuf,
}

impl JsonReportStage {
    pub fn new(aggregator: Aggregator, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            aggregator,
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl ReportStage for JsonReportStage {
    async fn run(&self, request: &ReportRequest) -> Result<String, AggregationError> {
        info!("Starting report generation for review {}", request.review_id);

        let components = self.aggregator.aggregate(&request.review_id).await?;
        let report = ConsolidatedReport::new(request, components);
        let body = generate_json_report(&report)?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(report_file_name(&request.review_id));
        tokio::fs::write(&path, body).await?;

        let reference = path.display().to_string();
        info!("Report generated successfully: {}", reference);
        Ok(reference)
    }
}

/// Serialize a consolidated report as pretty JSON.
pub fn generate_json_report(report: &ConsolidatedReport) -> Result<String, AggregationError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// A previously written report artifact.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Most recent report artifacts in `dir`, newest first.
pub fn list_reports(dir: &Path, limit: usize) -> std::io::Result<Vec<ReportEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("ops-review-") || !name.ends_with(".json") {
            continue;
        }

        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        entries.push(ReportEntry {
            path: entry.path(),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
        });
    }

    // Review ids sort by time, so file name breaks ties on equal mtimes
    entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
    entries.truncate(limit);

    Ok(entries)
}

/// Human-readable summary for terminal output.
pub fn generate_summary_text(summary: &ReviewSummary) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "{} Review {}: {}",
        summary.status.emoji(),
        summary.review_id,
        summary.status
    ));
    lines.push(format!("   Analyzers completed: {}", summary.succeeded_count));
    lines.push(format!("   Analyzers failed: {}", summary.failed_count));

    if let Some(ref reference) = summary.aggregate_ref {
        lines.push(format!("   Report: {}", reference));
    }

    if !summary.message.is_empty() {
        lines.push(format!("   Message: {}", summary.message));
    }

    if !summary.errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        for error in &summary.errors {
            lines.push(format!("- {}", error));
        }
    }

    lines.join("\n")
}
