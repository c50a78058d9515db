//! Intake endpoint tests against the in-memory request store.
//!
//! These drive the full router (middleware included) with `oneshot`, so no
//! database or network listener is needed.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use maintdesk::models::request::{NewRequest, RequestStatus};
use maintdesk::store::memory::MemoryRequestSource;
use maintdesk::store::{RequestSource, RequestStore};
use maintdesk::{api, AppState};
use serde_json::Value;
use tower::ServiceExt;

fn app() -> (Router, Arc<MemoryRequestSource>) {
    let store = Arc::new(MemoryRequestSource::new());
    let state = Arc::new(AppState {
        store: store.clone(),
    });
    (api::router(state), store)
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn error_code(resp: axum::response::Response) -> String {
    let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    json["error"]["code"].as_str().unwrap().to_string()
}

fn form_post(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/submit")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_healthz_sets_request_id_and_security_headers() {
    let (app, _) = app();
    let resp = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(body_string(resp).await, "ok");
}

#[tokio::test]
async fn test_index_serves_the_form() {
    let (app, _) = app();
    let resp = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_string(resp).await;
    assert!(html.contains(r#"action="/submit""#));
    assert!(html.contains(r#"name="room_number""#));
    assert!(html.contains(r#"name="description""#));
}

#[tokio::test]
async fn test_form_submission_inserts_row() {
    let (app, store) = app();
    let since = Utc::now() - Duration::minutes(1);

    let resp = app
        .oneshot(form_post(
            "name=Priya&building=Hostel+B&room_number=204&description=AC+not+working",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "Request submitted successfully!");

    let rows = store.fetch_since(since).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].room_number, "204");
    assert_eq!(rows[0].description, "AC not working");
    assert_eq!(rows[0].building.as_deref(), Some("Hostel B"));
    assert_eq!(rows[0].status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_form_without_room_is_rejected() {
    let (app, store) = app();
    let resp = app
        .oneshot(form_post("name=Priya&description=leak"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(json["error"]["code"], "validation_failed");
    assert_eq!(json["error"]["message"], "room_number is required");

    let rows = store
        .fetch_since(Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_json_create_returns_created_row() {
    let (app, _) = app();
    let resp = app
        .oneshot(
            Request::post("/api/v1/requests")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"room_number": " 12 ", "description": "door jammed", "building": ""}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(json["room_number"], "12");
    assert_eq!(json["building"], Value::Null);
    assert!(json["id"].as_i64().unwrap() > 0);
    assert!(json["created_at"].is_string());
}

#[tokio::test]
async fn test_list_returns_newest_first_with_limit() {
    let (app, store) = app();
    let now = Utc::now();
    for (i, room) in ["101", "102", "103"].iter().enumerate() {
        store
            .insert_at(
                NewRequest {
                    room_number: room.to_string(),
                    description: "flickering light".into(),
                    ..Default::default()
                },
                now + Duration::seconds(i as i64),
            )
            .await;
    }

    let resp = app
        .oneshot(
            Request::get("/api/v1/requests?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    let rooms: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["room_number"].as_str().unwrap())
        .collect();
    assert_eq!(rooms, vec!["103", "102"]);
}

#[tokio::test]
async fn test_metrics_and_readiness() {
    let (app, _) = app();

    let resp = app
        .clone()
        .oneshot(form_post("room_number=7&description=broken+chair"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp)
        .await
        .contains("maintdesk_requests_submitted_total"));
}

#[tokio::test]
async fn test_unknown_api_route_is_404() {
    let (app, _) = app();
    let resp = app
        .oneshot(Request::get("/api/v1/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_update_and_filtered_list() {
    let (app, store) = app();
    let row = store
        .insert(NewRequest {
            room_number: "204".into(),
            description: "AC not working".into(),
            ..Default::default()
        })
        .await;
    store
        .insert(NewRequest {
            room_number: "205".into(),
            description: "window stuck".into(),
            ..Default::default()
        })
        .await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/v1/requests/{}", row.id),
            r#"{"status": "in_progress"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(json["status"], "in_progress");

    let resp = app
        .clone()
        .oneshot(
            Request::get("/api/v1/requests?status=in_progress")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    let rooms: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["room_number"].as_str().unwrap())
        .collect();
    assert_eq!(rooms, vec!["204"]);

    let resp = app
        .oneshot(
            Request::get("/api/v1/requests?status=all")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_status_update_rejects_unknown_status_and_missing_row() {
    let (app, store) = app();
    let row = store
        .insert(NewRequest {
            room_number: "3".into(),
            description: "leak".into(),
            ..Default::default()
        })
        .await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/v1/requests/{}", row.id),
            r#"{"status": "done"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(resp).await, "malformed_request");

    let resp = app
        .oneshot(json_request(
            "PUT",
            "/api/v1/requests/9999",
            r#"{"status": "completed"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(resp).await, "not_found");
}

#[tokio::test]
async fn test_delete_request() {
    let (app, store) = app();
    let row = store
        .insert(NewRequest {
            room_number: "8".into(),
            description: "broken bed".into(),
            ..Default::default()
        })
        .await;
    let uri = format!("/api/v1/requests/{}", row.id);

    let resp = app
        .clone()
        .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(store.list_recent(10, None).await.unwrap().is_empty());

    let resp = app
        .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_extractor_failures_use_error_envelope() {
    let (app, _) = app();

    // JSON body without a JSON content type
    let resp = app
        .clone()
        .oneshot(
            Request::post("/api/v1/requests")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from(r#"{"room_number": "1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(error_code(resp).await, "malformed_request");

    let resp = app
        .clone()
        .oneshot(
            Request::get("/api/v1/requests?limit=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(resp).await, "malformed_request");

    let resp = app
        .clone()
        .oneshot(
            Request::get("/api/v1/requests?status=done")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(resp).await, "validation_failed");

    let resp = app
        .oneshot(
            Request::delete("/api/v1/requests/abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(resp).await, "malformed_request");
}
