//! Table-keyed result store on SQLite.
//!
//! Component rows use the composite key `(review_id, component_type)`; the
//! status lives in its own one-row-per-review table so it never shows up in
//! `get_all`.

use super::ResultStore;
use crate::error::StorageError;
use crate::models::{ComponentResult, ComponentType, ReviewId, ReviewState, ReviewStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

type ComponentRow = (String, String, String, i64);
type StatusRow = (String, String, String, String);

/// SQLite-backed store with one row per component.
#[derive(Debug, Clone)]
pub struct TableStore {
    pool: SqlitePool,
}

impl TableStore {
    /// Connect to `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let in_memory = database_url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        // Every in-memory connection is its own database, so pin exactly one
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(10)
                .idle_timeout(Duration::from_secs(600))
        };

        let pool = pool_options
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("Table store connected: {}", database_url);

        Ok(Self { pool })
    }
}

fn decode_component(row: ComponentRow) -> Result<ComponentResult, StorageError> {
    let (review_id, component_type, data, ttl) = row;

    Ok(ComponentResult {
        review_id: review_id.parse()?,
        component_type: ComponentType::new(component_type)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?,
        data: serde_json::from_str(&data)?,
        ttl,
    })
}

fn decode_status(row: StatusRow) -> Result<ReviewStatus, StorageError> {
    let (review_id, status, message, updated_at) = row;

    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| StorageError::Corrupt(format!("updated_at '{}': {}", updated_at, e)))?
        .with_timezone(&Utc);

    Ok(ReviewStatus {
        review_id: review_id.parse()?,
        status: status.parse()?,
        message,
        updated_at,
    })
}

#[async_trait]
impl ResultStore for TableStore {
    async fn put(
        &self,
        review_id: &ReviewId,
        component_type: &ComponentType,
        data: &Value,
        ttl: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO component_results (review_id, component_type, data, ttl, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(review_id, component_type) DO UPDATE SET
                data = excluded.data,
                ttl = excluded.ttl,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(review_id.to_string())
        .bind(component_type.as_str())
        .bind(serde_json::to_string(data)?)
        .bind(ttl)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(
            "Stored result for {} in table store review {}",
            component_type, review_id
        );
        Ok(())
    }

    async fn get(
        &self,
        review_id: &ReviewId,
        component_type: &ComponentType,
    ) -> Result<Option<ComponentResult>, StorageError> {
        let row: Option<ComponentRow> = sqlx::query_as(
            r#"
            SELECT review_id, component_type, data, ttl
            FROM component_results
            WHERE review_id = ? AND component_type = ?
            "#,
        )
        .bind(review_id.to_string())
        .bind(component_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_component).transpose()
    }

    async fn get_all(&self, review_id: &ReviewId) -> Result<Vec<ComponentResult>, StorageError> {
        let rows: Vec<ComponentRow> = sqlx::query_as(
            r#"
            SELECT review_id, component_type, data, ttl
            FROM component_results
            WHERE review_id = ?
            "#,
        )
        .bind(review_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let component_type = row.1.clone();
            match decode_component(row) {
                Ok(record) => results.push(record),
                Err(e) => warn!("Skipping unreadable row {}: {}", component_type, e),
            }
        }

        info!(
            "Retrieved {} results from table store for review {}",
            results.len(),
            review_id
        );
        Ok(results)
    }

    async fn set_status(
        &self,
        review_id: &ReviewId,
        status: ReviewState,
        message: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO review_status (review_id, status, message, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(review_id) DO UPDATE SET
                status = excluded.status,
                message = excluded.message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(review_id.to_string())
        .bind(status.as_str())
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_status(&self, review_id: &ReviewId) -> Result<Option<ReviewStatus>, StorageError> {
        let row: Option<StatusRow> = sqlx::query_as(
            r#"
            SELECT review_id, status, message, updated_at
            FROM review_status
            WHERE review_id = ?
            "#,
        )
        .bind(review_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_status).transpose()
    }

    fn backend_name(&self) -> &'static str {
        "table"
    }
}
