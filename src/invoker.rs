//! Remote task invocation.
//!
//! One blocking request per analysis task, folded into a [`TaskResult`].
//! Nothing here retries, and nothing here returns `Err`: transport failures,
//! non-2xx responses and application-reported errors all become
//! [`TaskResult::Error`].

use crate::models::TaskPayload;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

/// Outcome of a single task invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    /// The task's own response document; opaque to the coordinator.
    Success(Value),
    /// Human-readable failure description.
    Error(String),
}

impl TaskResult {
    pub fn error_message(&self) -> Option<&str> {
        match self {
            TaskResult::Success(_) => None,
            TaskResult::Error(message) => Some(message),
        }
    }

    /// Interpret a successfully delivered response body.
    ///
    /// A present, non-null `error` field marks an application failure.
    pub fn from_response_body(body: Value) -> Self {
        match body.get("error") {
            Some(Value::Null) | None => TaskResult::Success(body),
            Some(Value::String(message)) => TaskResult::Error(message.clone()),
            Some(other) => TaskResult::Error(other.to_string()),
        }
    }
}

/// Runs one analysis with one payload.
#[async_trait]
pub trait TaskInvoker: Send + Sync {
    async fn invoke(&self, target: &str, payload: &TaskPayload) -> TaskResult;
}

/// Invokes analyses exposed as HTTP endpoints: `POST <target>` with the
/// payload as JSON.
#[derive(Debug, Clone)]
pub struct HttpTaskInvoker {
    http_client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpTaskInvoker {
    /// Build an invoker. `timeout` bounds each request; `None` waits forever.
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http_client: builder.build()?,
            timeout,
        })
    }

    fn describe_transport_error(&self, target: &str, e: &reqwest::Error) -> String {
        if e.is_timeout() {
            match self.timeout {
                Some(t) => format!("request timed out after {}s", t.as_secs_f64()),
                None => "request timed out".to_string(),
            }
        } else if e.is_connect() {
            format!("cannot connect to {}", target)
        } else {
            format!("request failed: {}", e)
        }
    }

    async fn call(&self, target: &str, payload: &TaskPayload) -> TaskResult {
        let response = match self.http_client.post(target).json(payload).send().await {
            Ok(response) => response,
            Err(e) => return TaskResult::Error(self.describe_transport_error(target, &e)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return TaskResult::Error(format!("HTTP {}: {}", status.as_u16(), body.trim()));
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return TaskResult::Error(self.describe_transport_error(target, &e)),
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => TaskResult::from_response_body(body),
            Err(e) => TaskResult::Error(format!("invalid response: {}", e)),
        }
    }
}

#[async_trait]
impl TaskInvoker for HttpTaskInvoker {
    async fn invoke(&self, target: &str, payload: &TaskPayload) -> TaskResult {
        info!("Invoking analyzer: {}", target);
        debug!("Payload for {}: review {}", target, payload.review_id);

        let result = self.call(target, payload).await;

        match result.error_message() {
            None => info!("Successfully invoked {}", target),
            Some(message) => error!("Error invoking {}: {}", target, message),
        }
        result
    }
}
