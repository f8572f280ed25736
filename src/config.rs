//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.opsreview.toml` files.

use crate::coordinator::ReviewContext;
use crate::models::{AnalysisTask, ComponentType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".opsreview.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Review parameters.
    #[serde(default)]
    pub review: ReviewConfig,

    /// Result store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Target identity copied into every task payload.
    #[serde(default = "default_target")]
    pub target: Map<String, Value>,

    /// Extra shared fields copied into every task payload.
    #[serde(default)]
    pub passthrough: Map<String, Value>,

    /// The fixed set of analyses run for each review.
    #[serde(default = "default_tasks")]
    pub tasks: Vec<TaskConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            review: ReviewConfig::default(),
            storage: StorageConfig::default(),
            target: default_target(),
            passthrough: Map::new(),
            tasks: default_tasks(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory consolidated reports are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

/// Review settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Lookback window in days.
    #[serde(default = "default_days_back")]
    pub days_back: u32,

    /// Days until stored results expire (advisory).
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,

    /// Per-task request timeout. Unset means tasks may run indefinitely.
    #[serde(default)]
    pub task_timeout_seconds: Option<u64>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            days_back: default_days_back(),
            ttl_days: default_ttl_days(),
            task_timeout_seconds: None,
        }
    }
}

impl ReviewConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_seconds.map(Duration::from_secs)
    }
}

fn default_days_back() -> u32 {
    14
}

fn default_ttl_days() -> u32 {
    90
}

/// Which result store adapter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One object per component under a per-review prefix (default)
    #[default]
    Object,
    /// SQLite table keyed by (review, component)
    Table,
}

/// Result store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Active backend, fixed for the lifetime of the process.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory of the object store.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// SQLite URL of the table store.
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_storage_root(),
            database_url: default_database_url(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".opsreview")
}

fn default_database_url() -> String {
    "sqlite://.opsreview/results.db".to_string()
}

/// One declared analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Component the analysis produces.
    pub name: String,
    /// Endpoint the analysis is invoked at.
    pub endpoint: String,
}

fn default_target() -> Map<String, Value> {
    let mut target = Map::new();
    target.insert("instanceArn".to_string(), Value::String(String::new()));
    target
}

fn default_tasks() -> Vec<TaskConfig> {
    ["quota", "metrics", "phone", "flow", "cloudtrail", "logs"]
        .into_iter()
        .map(|name| TaskConfig {
            name: name.to_string(),
            endpoint: format!("http://localhost:8080/{}", name),
        })
        .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(days) = args.days_back() {
            self.review.days_back = days;
        }

        if let Some(backend) = args.backend {
            self.storage.backend = backend;
        }

        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = output_dir.clone();
        }

        if let Some(timeout) = args.task_timeout {
            self.review.task_timeout_seconds = Some(timeout);
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Resolve the declared task set.
    ///
    /// Fails on invalid or duplicate component names, since two tasks
    /// writing the same component would overwrite each other.
    pub fn analysis_tasks(&self) -> Result<Vec<AnalysisTask>> {
        let mut tasks: Vec<AnalysisTask> = Vec::with_capacity(self.tasks.len());

        for task in &self.tasks {
            let name = ComponentType::new(task.name.clone())
                .with_context(|| format!("Invalid task name: {}", task.name))?;

            if tasks.iter().any(|t| t.name == name) {
                anyhow::bail!("Duplicate task name: {}", name);
            }
            tasks.push(AnalysisTask::new(name, task.endpoint.clone()));
        }

        if tasks.is_empty() {
            anyhow::bail!("No analysis tasks configured");
        }

        Ok(tasks)
    }

    /// Payload context for the coordinator.
    ///
    /// Fails when `[target]` or `[passthrough]` reuse a fixed payload field
    /// name, or when the two tables share a key.
    pub fn review_context(&self) -> Result<ReviewContext> {
        let context = ReviewContext {
            target: self.target.clone(),
            passthrough: self.passthrough.clone(),
            ttl_days: self.review.ttl_days,
        };

        let conflicts = context.conflicting_keys();
        if !conflicts.is_empty() {
            anyhow::bail!(
                "Payload fields collide with reserved or duplicate keys: {}",
                conflicts.join(", ")
            );
        }

        Ok(context)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
