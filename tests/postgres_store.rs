//! `PgStore` against a real PostgreSQL server.
//!
//! Each test gets a fresh database from `#[sqlx::test]`, with the embedded
//! migrations applied unless noted.
//!
//! **Requirements:**
//! - PostgreSQL reachable at DATABASE_URL, with rights to create databases
//! - Run with `cargo test --test postgres_store -- --ignored`

use chrono::{DateTime, Duration, Utc};
use maintdesk::models::request::{NewRequest, Priority, RequestStatus};
use maintdesk::store::postgres::PgStore;
use maintdesk::store::{RequestSource, RequestStore};
use sqlx::PgPool;

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Insert a row with a fixed `created_at`, bypassing the column default.
async fn insert_at(pool: &PgPool, room: &str, created_at: DateTime<Utc>) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO requests (room_number, description, created_at) VALUES ($1, 'test', $2) RETURNING id",
    )
    .bind(room)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .unwrap()
}

fn new_request(room: &str) -> NewRequest {
    NewRequest {
        room_number: room.into(),
        description: "AC not working".into(),
        ..Default::default()
    }
}

#[sqlx::test(migrations = false)]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn test_migrate_is_repeatable_and_insert_returns_stored_row(pool: PgPool) {
    let store = PgStore::from_pool(pool.clone());
    store.migrate().await.unwrap();
    store.migrate().await.unwrap();

    let mut req = new_request("204");
    req.building = Some("Hostel B".into());
    req.priority = Priority::High;
    let row = store.insert_request(&req).await.unwrap();

    let stored: DateTime<Utc> = sqlx::query_scalar("SELECT created_at FROM requests WHERE id = $1")
        .bind(row.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.created_at, stored);
    assert_eq!(row.room_number, "204");
    assert_eq!(row.building.as_deref(), Some("Hostel B"));
    assert_eq!(row.priority, Priority::High);
    assert_eq!(row.status, RequestStatus::Pending);
}

#[sqlx::test]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn test_fetch_since_is_strict_and_ascending(pool: PgPool) {
    let store = PgStore::from_pool(pool.clone());

    let late = insert_at(&pool, "late", t0() + Duration::seconds(2)).await;
    let at_mark = insert_at(&pool, "at-mark", t0()).await;
    let tie_a = insert_at(&pool, "tie-a", t0() + Duration::seconds(1)).await;
    let before = insert_at(&pool, "before", t0() - Duration::seconds(1)).await;
    let tie_b = insert_at(&pool, "tie-b", t0() + Duration::seconds(1)).await;

    let rows = store.fetch_since(t0()).await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![tie_a, tie_b, late]);
    assert!(!ids.contains(&at_mark));
    assert!(!ids.contains(&before));

    assert!(store
        .fetch_since(t0() + Duration::seconds(2))
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test]
#[ignore = "needs PostgreSQL at DATABASE_URL"]
async fn test_status_lifecycle(pool: PgPool) {
    let store = PgStore::from_pool(pool);

    let a = store.insert_request(&new_request("1")).await.unwrap();
    let b = store.insert_request(&new_request("2")).await.unwrap();

    store.mark_notified(a.id).await.unwrap();
    let b = store
        .update_status(b.id, RequestStatus::Completed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b.status, RequestStatus::Completed);

    // only pending rows move to notified
    store.mark_notified(b.id).await.unwrap();
    let completed = store
        .list_recent(10, Some(RequestStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, b.id);

    let notified = store
        .list_recent(10, Some(RequestStatus::Notified))
        .await
        .unwrap();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].id, a.id);

    let all = store.list_recent(1, None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, b.id);

    assert!(store.delete_request(a.id).await.unwrap());
    assert!(!store.delete_request(a.id).await.unwrap());
    assert!(store
        .update_status(a.id, RequestStatus::InProgress)
        .await
        .unwrap()
        .is_none());
    store.ping().await.unwrap();
}
