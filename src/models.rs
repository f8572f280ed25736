//! Data models for the review pipeline.
//!
//! This module contains the core data structures shared by the coordinator,
//! the result store backends and the aggregation stage.

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier of one review run.
///
/// Backed by a ULID, so identifiers minted later sort after earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(Ulid);

impl ReviewId {
    /// Mint a fresh identifier for a new review.
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Time at which the identifier was minted.
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.0.datetime())
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReviewId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.trim())
            .map(Self)
            .map_err(|e| StorageError::InvalidKey(format!("review id '{}': {}", s, e)))
    }
}

/// Name of an analysis component, e.g. `quota` or `metrics`.
///
/// Lowercase ASCII letters, digits, `_` and `-` only. The object store uses it
/// as a file name, so separators and the reserved `status` key are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentType(String);

/// Key reserved for the per-review status record.
pub const RESERVED_STATUS_KEY: &str = "status";

impl ComponentType {
    /// Validate and wrap a component name.
    pub fn new(name: impl Into<String>) -> Result<Self, StorageError> {
        let name = name.into();

        if name.is_empty() || name.len() > 64 {
            return Err(StorageError::InvalidKey(format!(
                "component type must be 1-64 characters: '{}'",
                name
            )));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(StorageError::InvalidKey(format!(
                "component type may only contain [a-z0-9_-]: '{}'",
                name
            )));
        }

        if name == RESERVED_STATUS_KEY {
            return Err(StorageError::InvalidKey(format!(
                "'{}' is reserved for review status",
                name
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ComponentType {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ComponentType> for String {
    fn from(value: ComponentType) -> Self {
        value.0
    }
}

/// One declared analysis in the fixed task set of a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTask {
    /// Component the analysis produces; also used as the task name.
    pub name: ComponentType,
    /// Where the analysis is invoked (an HTTP endpoint for the default invoker).
    pub target: String,
}

impl AnalysisTask {
    pub fn new(name: ComponentType, target: impl Into<String>) -> Self {
        Self {
            name,
            target: target.into(),
        }
    }
}

/// Wire names of the fixed payload fields. Target and passthrough maps may
/// not use them.
pub const RESERVED_PAYLOAD_KEYS: [&str; 3] = ["reviewId", "daysBack", "ttl"];

/// Payload shared by every task of one review.
///
/// Target identity and passthrough fields are opaque to the pipeline and are
/// flattened next to the fixed fields on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub review_id: ReviewId,
    pub days_back: u32,
    /// Expiry timestamp in epoch seconds, attached to every stored record.
    pub ttl: i64,
    #[serde(flatten)]
    pub target: Map<String, Value>,
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

/// A persisted analysis output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResult {
    pub review_id: ReviewId,
    pub component_type: ComponentType,
    pub data: Value,
    /// Advisory expiry (epoch seconds). Never consulted on read.
    pub ttl: i64,
}

impl ComponentResult {
    pub fn new(review_id: ReviewId, component_type: ComponentType, data: Value, ttl: i64) -> Self {
        Self {
            review_id,
            component_type,
            data,
            ttl,
        }
    }
}

/// Lifecycle state of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ReviewState {
    /// Completed and failed reviews never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewState::Completed | ReviewState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Pending => "pending",
            ReviewState::InProgress => "in_progress",
            ReviewState::Completed => "completed",
            ReviewState::Failed => "failed",
        }
    }

    /// Returns an emoji representation of the state.
    pub fn emoji(&self) -> &'static str {
        match self {
            ReviewState::Pending => "⏸️",
            ReviewState::InProgress => "⏳",
            ReviewState::Completed => "✅",
            ReviewState::Failed => "❌",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewState {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewState::Pending),
            "in_progress" => Ok(ReviewState::InProgress),
            "completed" => Ok(ReviewState::Completed),
            "failed" => Ok(ReviewState::Failed),
            other => Err(StorageError::Corrupt(format!("unknown review state '{}'", other))),
        }
    }
}

/// The single status record kept per review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatus {
    pub review_id: ReviewId,
    pub status: ReviewState,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

/// Read-time projection of every stored component of a review.
///
/// Components that were never stored are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatedReview {
    components: BTreeMap<ComponentType, Value>,
}

impl AggregatedReview {
    /// Index stored results by component type.
    pub fn from_results(results: impl IntoIterator<Item = ComponentResult>) -> Self {
        let components = results
            .into_iter()
            .map(|r| (r.component_type, r.data))
            .collect();
        Self { components }
    }

    pub fn get(&self, component: &ComponentType) -> Option<&Value> {
        self.components.get(component)
    }

    pub fn contains(&self, component: &ComponentType) -> bool {
        self.components.contains_key(component)
    }

    pub fn component_types(&self) -> impl Iterator<Item = &ComponentType> {
        self.components.keys()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Caller-supplied parameters for one review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewParameters {
    /// Lookback window in days.
    pub days_back: u32,
}

impl Default for ReviewParameters {
    fn default() -> Self {
        Self { days_back: 14 }
    }
}

/// Externally observable outcome of a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub review_id: ReviewId,
    pub status: ReviewState,
    pub succeeded_count: usize,
    pub failed_count: usize,
    /// One `"<task>: <message>"` entry per failed task, in declaration order.
    pub errors: Vec<String>,
    /// Reference to the consolidated artifact; `None` when the review failed.
    pub aggregate_ref: Option<String>,
    /// Terminal status message as written to the store.
    pub message: String,
}

impl ReviewSummary {
    pub fn is_completed(&self) -> bool {
        self.status == ReviewState::Completed
    }
}
