use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::request::{NewRequest, Request, RequestStatus};

pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("database query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("database call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// Short label used in logs and the poll error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Connect(_) => "connect",
            StoreError::Query(_) => "query",
            StoreError::Timeout(_) => "timeout",
        }
    }
}

/// Read side of the `requests` table as seen by the watcher.
///
/// Implementations must return only rows with `created_at > since`,
/// ascending by `created_at`.
#[async_trait]
pub trait RequestSource: Send + Sync {
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<Request>, StoreError>;

    /// Move a `pending` request to `notified`. Rows already moved on by
    /// staff are left alone.
    async fn mark_notified(&self, id: i64) -> Result<(), StoreError>;
}

/// Write and read-back side used by the intake endpoint.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a validated request; `created_at` is assigned by the store.
    async fn insert_request(&self, req: &NewRequest) -> Result<Request, StoreError>;

    /// Newest first, optionally only rows in `status`.
    async fn list_recent(
        &self,
        limit: i64,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Request>, StoreError>;

    /// `None` when no row has this id.
    async fn update_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<Option<Request>, StoreError>;

    /// `false` when no row has this id.
    async fn delete_request(&self, id: i64) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
