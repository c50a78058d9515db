use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};

use super::{RequestSource, RequestStore, StoreError};
use crate::models::request::{NewRequest, Request, RequestStatus};

const MAX_CONNECTIONS: u32 = 5;

const FETCH_SINCE_SQL: &str = r#"
    SELECT id, room_number, description, name, building, priority, status, created_at
    FROM requests
    WHERE created_at > $1
    ORDER BY created_at, id
"#;

const LIST_RECENT_SQL: &str = r#"
    SELECT id, room_number, description, name, building, priority, status, created_at
    FROM requests
    WHERE $2::text IS NULL OR status = $2
    ORDER BY created_at DESC, id DESC
    LIMIT $1
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect eagerly; fails if the database is unreachable.
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Build the pool without touching the database. Connections are opened
    /// on first use, so an outage at startup surfaces as per-call errors.
    pub fn connect_lazy(database_url: &str, acquire_timeout: Duration) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// The connection returns to the pool when dropped, on every exit path.
    async fn conn(&self) -> Result<PoolConnection<Postgres>, StoreError> {
        self.pool.acquire().await.map_err(StoreError::Connect)
    }
}

#[async_trait]
impl RequestSource for PgStore {
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<Request>, StoreError> {
        let mut conn = self.conn().await?;

        let rows = sqlx::query_as::<_, Request>(FETCH_SINCE_SQL)
            .bind(since)
            .fetch_all(&mut *conn)
            .await
            .map_err(StoreError::Query)?;

        tracing::debug!(count = rows.len(), since = %since, "fetched requests since watermark");
        Ok(rows)
    }

    async fn mark_notified(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        sqlx::query("UPDATE requests SET status = 'notified' WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::Query)?;
        Ok(())
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn insert_request(&self, req: &NewRequest) -> Result<Request, StoreError> {
        let mut conn = self.conn().await?;

        sqlx::query_as::<_, Request>(
            r#"INSERT INTO requests (name, building, room_number, description, priority)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, room_number, description, name, building, priority, status, created_at"#,
        )
        .bind(&req.name)
        .bind(&req.building)
        .bind(&req.room_number)
        .bind(&req.description)
        .bind(req.priority)
        .fetch_one(&mut *conn)
        .await
        .map_err(StoreError::Query)
    }

    async fn list_recent(
        &self,
        limit: i64,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Request>, StoreError> {
        let mut conn = self.conn().await?;

        sqlx::query_as::<_, Request>(LIST_RECENT_SQL)
            .bind(limit)
            .bind(status)
            .fetch_all(&mut *conn)
            .await
            .map_err(StoreError::Query)
    }

    async fn update_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<Option<Request>, StoreError> {
        let mut conn = self.conn().await?;

        sqlx::query_as::<_, Request>(
            r#"UPDATE requests SET status = $2 WHERE id = $1
               RETURNING id, room_number, description, name, building, priority, status, created_at"#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::Query)
    }

    async fn delete_request(&self, id: i64) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;

        let result = sqlx::query("DELETE FROM requests WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::Query)?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query("SELECT 1")
            .execute(&mut *conn)
            .await
            .map_err(StoreError::Query)?;
        Ok(())
    }
}
