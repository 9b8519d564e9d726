//! Integration tests for d2d-server HTTP endpoints
//!
//! Tests cover:
//! - Submission intake with one and two images
//! - Submission failures (missing image, upload failure, insert failure)
//! - Collection paging, ordering and filtering
//! - Health endpoint and dashboard assets

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{Duration, Local, NaiveDate};
use d2d_common::db::{init_memory_pool, records, NewCollectionRecord};
use d2d_common::time;
use d2d_server::services::classifier::ClassifierError;
use d2d_server::services::media_store::MediaStoreError;
use d2d_server::services::{Classifier, Ingestor, LabelAggregator, MediaStore, Prediction};
use d2d_server::{build_router, AppState};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method

const BOUNDARY: &str = "d2d-test-boundary";

/// Hands out sequential URLs, or fails every upload
#[derive(Default)]
struct FakeStore {
    uploads: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl MediaStore for FakeStore {
    async fn store(&self, _bytes: &[u8], _content_type: &str) -> Result<String, MediaStoreError> {
        if self.fail {
            return Err(MediaStoreError::ApiError(401, "invalid credentials".to_string()));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://media.example/door2door/{}.jpg", n))
    }
}

struct FakeClassifier {
    name: String,
    labels: Vec<&'static str>,
    fail: bool,
}

impl FakeClassifier {
    fn labels(name: &str, labels: Vec<&'static str>) -> Arc<dyn Classifier> {
        Arc::new(Self {
            name: name.to_string(),
            labels,
            fail: false,
        })
    }

    fn failing(name: &str) -> Arc<dyn Classifier> {
        Arc::new(Self {
            name: name.to_string(),
            labels: vec![],
            fail: true,
        })
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, _image_url: &str) -> Result<Vec<Prediction>, ClassifierError> {
        if self.fail {
            return Err(ClassifierError::ApiError(503, "model offline".to_string()));
        }
        Ok(self
            .labels
            .iter()
            .map(|label| Prediction {
                label: label.to_string(),
                confidence: Some(0.9),
            })
            .collect())
    }
}

/// Test helper: four models, one of them down
fn default_classifiers() -> Vec<Arc<dyn Classifier>> {
    vec![
        FakeClassifier::labels("bin-fill", vec!["plastic", "paper"]),
        FakeClassifier::labels("bin-type", vec!["paper", "organic"]),
        FakeClassifier::failing("bin-contamination"),
        FakeClassifier::labels("bin-lid", vec![]),
    ]
}

fn setup_app_with(db: SqlitePool, store: FakeStore, classifiers: Vec<Arc<dyn Classifier>>, limit: usize) -> axum::Router {
    let ingestor = Ingestor::new(Arc::new(store), Arc::new(LabelAggregator::new(classifiers)));
    build_router(AppState::new(db, Arc::new(ingestor), limit))
}

fn setup_app(db: SqlitePool) -> axum::Router {
    setup_app_with(db, FakeStore::default(), default_classifiers(), 1024 * 1024)
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

/// Test helper: hand-built multipart/form-data body
fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn submit_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/submitCleaningData")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn extract_text(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    String::from_utf8(bytes.to_vec()).expect("Should be UTF-8")
}

async fn assert_internal_error(response: axum::response::Response) {
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body, serde_json::json!({ "message": "Internal server error" }));
}

fn new_record(house_id: &str) -> NewCollectionRecord {
    NewCollectionRecord {
        house_id: house_id.to_string(),
        image1: format!("https://media.example/{}.jpg", house_id),
        image1_prediction: vec!["plastic".to_string()],
        image2: None,
    }
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test]
async fn test_submit_two_images() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db.clone());

    let request = submit_request(&[
        Part::Text("house_id", "H-101"),
        Part::File("image1", "front.jpg", b"jpeg-bytes-1"),
        Part::File("image2", "back.jpg", b"jpeg-bytes-2"),
    ]);
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["message"], "Data saved successfully");

    let data = &body["data"];
    assert!(data["id"].as_i64().unwrap() > 0);
    assert_eq!(data["house_id"], "H-101");
    assert_eq!(data["Image1"], "https://media.example/door2door/1.jpg");
    assert_eq!(data["Image2"], "https://media.example/door2door/2.jpg");
    // Union of the successful models, first occurrence order
    assert_eq!(data["Image1_prediction"], serde_json::json!(["plastic", "paper", "organic"]));
    assert_eq!(data["Image2_prediction"], serde_json::json!(["plastic", "paper", "organic"]));
    assert!(data["createdAt"].as_str().unwrap().ends_with('Z'));

    let stored = records::get_record(&db, data["id"].as_i64().unwrap())
        .await
        .unwrap()
        .expect("record stored");
    assert_eq!(stored.house_id, "H-101");
}

#[tokio::test]
async fn test_submit_single_image_leaves_second_slot_null() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db);

    let request = submit_request(&[
        Part::Text("house_id", "H-102"),
        Part::File("image1", "front.jpg", b"jpeg-bytes"),
    ]);
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert!(body["data"]["Image2"].is_null());
    assert!(body["data"]["Image2_prediction"].is_null());
}

#[tokio::test]
async fn test_submit_empty_image2_counts_as_absent() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db);

    let request = submit_request(&[
        Part::Text("house_id", "H-103"),
        Part::File("image1", "front.jpg", b"jpeg-bytes"),
        Part::File("image2", "", b""),
    ]);
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert!(body["data"]["Image2"].is_null());
}

#[tokio::test]
async fn test_submit_with_all_classifiers_failing_stores_empty_labels() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app_with(
        db,
        FakeStore::default(),
        vec![FakeClassifier::failing("a"), FakeClassifier::failing("b")],
        1024 * 1024,
    );

    let request = submit_request(&[
        Part::Text("house_id", "H-104"),
        Part::File("image1", "front.jpg", b"jpeg-bytes"),
    ]);
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["data"]["Image1_prediction"], serde_json::json!([]));
}

#[tokio::test]
async fn test_submit_without_image1_is_internal_error() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db.clone());

    let request = submit_request(&[Part::Text("house_id", "H-105")]);
    let response = app.oneshot(request).await.unwrap();
    assert_internal_error(response).await;

    let count = records::count_records(&db, &Default::default()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_submit_without_house_id_is_internal_error() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db);

    let request = submit_request(&[Part::File("image1", "front.jpg", b"jpeg-bytes")]);
    let response = app.oneshot(request).await.unwrap();
    assert_internal_error(response).await;
}

#[tokio::test]
async fn test_submit_upload_failure_writes_nothing() {
    let db = init_memory_pool().await.unwrap();
    let store = FakeStore {
        fail: true,
        ..Default::default()
    };
    let app = setup_app_with(db.clone(), store, default_classifiers(), 1024 * 1024);

    let request = submit_request(&[
        Part::Text("house_id", "H-106"),
        Part::File("image1", "front.jpg", b"jpeg-bytes"),
    ]);
    let response = app.oneshot(request).await.unwrap();
    assert_internal_error(response).await;

    let count = records::count_records(&db, &Default::default()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_submit_insert_failure_is_internal_error() {
    let db = init_memory_pool().await.unwrap();
    sqlx::query("DROP TABLE collection_data")
        .execute(&db)
        .await
        .unwrap();
    let app = setup_app(db);

    let request = submit_request(&[
        Part::Text("house_id", "H-107"),
        Part::File("image1", "front.jpg", b"jpeg-bytes"),
    ]);
    let response = app.oneshot(request).await.unwrap();
    assert_internal_error(response).await;
}

#[tokio::test]
async fn test_submit_over_body_limit_is_rejected() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app_with(db.clone(), FakeStore::default(), default_classifiers(), 256);

    let big = vec![0xFFu8; 4096];
    let request = submit_request(&[
        Part::Text("house_id", "H-108"),
        Part::File("image1", "huge.jpg", &big),
    ]);
    let response = app.oneshot(request).await.unwrap();
    assert_internal_error(response).await;

    let count = records::count_records(&db, &Default::default()).await.unwrap();
    assert_eq!(count, 0);
}

// =============================================================================
// Collection query
// =============================================================================

#[tokio::test]
async fn test_collection_pagination_over_45_records() {
    let db = init_memory_pool().await.unwrap();
    let base = time::now() - Duration::hours(1);
    for i in 0..45 {
        records::insert_record_at(&db, &new_record(&format!("H-{}", i)), base + Duration::seconds(i))
            .await
            .unwrap();
    }
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(get_request("/api/collection-data?page=1&limit=20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;

    assert_eq!(body["data"].as_array().unwrap().len(), 20);
    assert_eq!(
        body["pagination"],
        serde_json::json!({
            "page": 1,
            "limit": 20,
            "totalCount": 45,
            "totalPages": 3,
            "hasNextPage": true,
            "hasPrevPage": false
        })
    );
    // Newest first
    assert_eq!(body["data"][0]["house_id"], "H-44");

    let response = app
        .oneshot(get_request("/api/collection-data?page=3&limit=20"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["pagination"]["hasNextPage"], false);
    assert_eq!(body["pagination"]["hasPrevPage"], true);
    assert_eq!(body["data"][4]["house_id"], "H-0");
}

#[tokio::test]
async fn test_collection_defaults_and_page_past_end() {
    let db = init_memory_pool().await.unwrap();
    records::insert_record(&db, &new_record("H-1")).await.unwrap();
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(get_request("/api/collection-data"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["limit"], 20);
    assert_eq!(body["pagination"]["totalCount"], 1);

    let response = app
        .oneshot(get_request("/api/collection-data?page=7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["data"], serde_json::json!([]));
    assert_eq!(body["pagination"]["page"], 7);
    assert_eq!(body["pagination"]["hasPrevPage"], true);
}

#[tokio::test]
async fn test_collection_empty_table() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db);

    let response = app.oneshot(get_request("/api/collection-data")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["pagination"]["totalCount"], 0);
    assert_eq!(body["pagination"]["totalPages"], 0);
    assert_eq!(body["pagination"]["hasNextPage"], false);
}

#[tokio::test]
async fn test_collection_date_filter_is_half_open_local_day() {
    let db = init_memory_pool().await.unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let (start, end) = time::day_bounds(day, &Local).unwrap();

    records::insert_record_at(&db, &new_record("before"), start - Duration::milliseconds(1))
        .await
        .unwrap();
    records::insert_record_at(&db, &new_record("first"), start).await.unwrap();
    records::insert_record_at(&db, &new_record("last"), end - Duration::milliseconds(1))
        .await
        .unwrap();
    records::insert_record_at(&db, &new_record("next-day"), end).await.unwrap();
    let app = setup_app(db);

    let response = app
        .oneshot(get_request("/api/collection-data?date=2024-05-01"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;

    let houses: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["house_id"].as_str().unwrap())
        .collect();
    assert_eq!(houses, vec!["last", "first"]);
    assert_eq!(body["pagination"]["totalCount"], 2);
}

#[tokio::test]
async fn test_collection_house_filter_is_exact() {
    let db = init_memory_pool().await.unwrap();
    for house in ["H-1", "H-1", "H-10", "h-1"] {
        records::insert_record(&db, &new_record(house)).await.unwrap();
    }
    let app = setup_app(db);

    let response = app
        .oneshot(get_request("/api/collection-data?house_id=H-1"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["pagination"]["totalCount"], 2);
    for record in body["data"].as_array().unwrap() {
        assert_eq!(record["house_id"], "H-1");
    }
}

#[tokio::test]
async fn test_collection_invalid_parameters_are_internal_errors() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db);

    for uri in [
        "/api/collection-data?page=abc",
        "/api/collection-data?page=0",
        "/api/collection-data?limit=-1",
        "/api/collection-data?date=not-a-date",
    ] {
        let response = app.clone().oneshot(get_request(uri)).await.unwrap();
        assert_internal_error(response).await;
    }
}

#[tokio::test]
async fn test_collection_reads_leading_integer_of_page_and_limit() {
    let db = init_memory_pool().await.unwrap();
    for i in 0..3 {
        records::insert_record(&db, &new_record(&format!("H-{}", i))).await.unwrap();
    }
    let app = setup_app(db);

    let response = app
        .oneshot(get_request("/api/collection-data?page=2x&limit=2.5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["pagination"]["page"], 2);
    assert_eq!(body["pagination"]["limit"], 2);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Health and dashboard
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "d2d-server");
    assert_eq!(body["classifiers"], 4);
    assert!(body["version"].is_string());
    assert!(body["build"].is_string());
}

#[tokio::test]
async fn test_dashboard_assets_are_served() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db);

    let response = app.clone().oneshot(get_request("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = extract_text(response.into_body()).await;
    assert!(html.contains("Collection Data Dashboard"));
    assert!(html.contains("/static/app.js"));

    let response = app.clone().oneshot(get_request("/static/app.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/javascript"
    );
    let js = extract_text(response.into_body()).await;
    assert!(js.contains("/api/collection-data"));

    let response = app.oneshot(get_request("/static/app.css")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/css");
}

#[tokio::test]
async fn test_dashboard_hides_query_failures_behind_empty_table() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db);

    let response = app.clone().oneshot(get_request("/")).await.unwrap();
    let html = extract_text(response.into_body()).await;
    // No error banner element exists to show a server message in
    assert!(!html.contains("id=\"status\""));

    let response = app.oneshot(get_request("/static/app.js")).await.unwrap();
    let js = extract_text(response.into_body()).await;

    // The failure branch logs to the console and renders the empty state
    let failure = js
        .split("catch (error)")
        .nth(1)
        .and_then(|rest| rest.split("finally").next())
        .expect("fetch failure branch");
    assert!(failure.contains("console.error"));
    assert!(failure.contains("renderRows([])"));
    assert!(!failure.contains("textContent"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let db = init_memory_pool().await.unwrap();
    let app = setup_app(db);

    let response = app.oneshot(get_request("/api/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
