//! In-memory request store used by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{RequestSource, RequestStore, StoreError};
use crate::models::request::{NewRequest, Request, RequestStatus};

#[derive(Default)]
struct Inner {
    rows: Vec<Request>,
    next_id: i64,
    failures_left: usize,
    fetches: usize,
    fail_status_writes: bool,
}

#[derive(Default)]
pub struct MemoryRequestSource {
    inner: Mutex<Inner>,
}

impl MemoryRequestSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request with an explicit `created_at`.
    pub async fn insert_at(&self, req: NewRequest, created_at: DateTime<Utc>) -> Request {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let row = Request {
            id: inner.next_id,
            room_number: req.room_number,
            description: req.description,
            name: req.name,
            building: req.building,
            priority: req.priority,
            status: RequestStatus::Pending,
            created_at,
        };
        inner.rows.push(row.clone());
        row
    }

    /// Insert a request stamped with the current time.
    pub async fn insert(&self, req: NewRequest) -> Request {
        self.insert_at(req, Utc::now()).await
    }

    /// Make the next `n` fetches fail with a connection error.
    pub async fn fail_next(&self, n: usize) {
        self.inner.lock().await.failures_left = n;
    }

    /// Number of `fetch_since` calls served so far, failed ones included.
    pub async fn fetch_count(&self) -> usize {
        self.inner.lock().await.fetches
    }

    /// Make every `mark_notified` call fail until switched back off.
    pub async fn fail_status_writes(&self, fail: bool) {
        self.inner.lock().await.fail_status_writes = fail;
    }

    pub async fn get(&self, id: i64) -> Option<Request> {
        let inner = self.inner.lock().await;
        inner.rows.iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl RequestSource for MemoryRequestSource {
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<Request>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.fetches += 1;

        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            return Err(StoreError::Connect(sqlx::Error::PoolTimedOut));
        }

        let mut rows: Vec<Request> = inner
            .rows
            .iter()
            .filter(|r| r.created_at > since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn mark_notified(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_status_writes {
            return Err(StoreError::Connect(sqlx::Error::PoolTimedOut));
        }
        if let Some(row) = inner
            .rows
            .iter_mut()
            .find(|r| r.id == id && r.status == RequestStatus::Pending)
        {
            row.status = RequestStatus::Notified;
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for MemoryRequestSource {
    async fn insert_request(&self, req: &NewRequest) -> Result<Request, StoreError> {
        Ok(self.insert(req.clone()).await)
    }

    async fn list_recent(
        &self,
        limit: i64,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Request>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<Request> = inner
            .rows
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn update_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<Option<Request>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.rows.iter_mut().find(|r| r.id == id).map(|row| {
            row.status = status;
            row.clone()
        }))
    }

    async fn delete_request(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.rows.len();
        inner.rows.retain(|r| r.id != id);
        Ok(inner.rows.len() < before)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_request(room: &str) -> NewRequest {
        NewRequest {
            room_number: room.into(),
            description: "leaking tap".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_since_is_strict_and_ascending() {
        let source = MemoryRequestSource::new();
        let t0 = Utc::now();
        source.insert_at(new_request("3"), t0 + Duration::seconds(3)).await;
        source.insert_at(new_request("1"), t0 + Duration::seconds(1)).await;
        source.insert_at(new_request("0"), t0).await;
        source.insert_at(new_request("2"), t0 + Duration::seconds(2)).await;

        let rows = source.fetch_since(t0).await.unwrap();
        let rooms: Vec<&str> = rows.iter().map(|r| r.room_number.as_str()).collect();
        assert_eq!(rooms, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_fail_next_then_recovers() {
        let source = MemoryRequestSource::new();
        source.insert_at(new_request("7"), Utc::now()).await;
        source.fail_next(1).await;

        let since = Utc::now() - Duration::minutes(1);
        assert!(matches!(
            source.fetch_since(since).await,
            Err(StoreError::Connect(_))
        ));
        assert_eq!(source.fetch_since(since).await.unwrap().len(), 1);
        assert_eq!(source.fetch_count().await, 2);
    }

    #[tokio::test]
    async fn test_mark_notified_only_moves_pending_rows() {
        let source = MemoryRequestSource::new();
        let a = source.insert(new_request("1")).await;
        let b = source.insert(new_request("2")).await;
        source
            .update_status(b.id, RequestStatus::Completed)
            .await
            .unwrap();

        source.mark_notified(a.id).await.unwrap();
        source.mark_notified(b.id).await.unwrap();

        assert_eq!(source.get(a.id).await.unwrap().status, RequestStatus::Notified);
        assert_eq!(source.get(b.id).await.unwrap().status, RequestStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_delete() {
        let source = MemoryRequestSource::new();
        let a = source.insert(new_request("1")).await;
        source.insert(new_request("2")).await;
        source
            .update_status(a.id, RequestStatus::InProgress)
            .await
            .unwrap();

        let rows = source
            .list_recent(10, Some(RequestStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, a.id);

        assert!(source.delete_request(a.id).await.unwrap());
        assert!(!source.delete_request(a.id).await.unwrap());
        assert!(source.update_status(a.id, RequestStatus::Completed).await.unwrap().is_none());
        assert_eq!(source.list_recent(10, None).await.unwrap().len(), 1);
    }
}
