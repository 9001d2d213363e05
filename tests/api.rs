use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use parking_server::engine::clock::ManualClock;
use parking_server::engine::retry::RetryPolicy;
use parking_server::engine::TicketEngine;
use parking_server::routes::create_routes;
use parking_server::store::MemoryStore;
use parking_server::AppState;

const OWNER: &str = "owner-1";
const STAFF: &str = "staff-1";

fn test_app() -> (Router, Arc<ManualClock>) {
    let start = Utc.with_ymd_and_hms(2024, 4, 15, 14, 30, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let retry = RetryPolicy {
        max_attempts: 2,
        base_backoff_ms: 1,
    };
    let engine = TicketEngine::new(Arc::new(MemoryStore::new()), clock.clone(), retry);
    (create_routes(AppState::new(engine)), clock)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn staffed_lot(app: &Router, total_spots: i32) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/lots",
        Some(OWNER),
        Some(json!({
            "name": "Ben Thanh Parking",
            "address": "1 Le Loi, District 1",
            "location": { "latitude": 10.7725, "longitude": 106.6980 },
            "total_spots": total_spots,
            "hourly_price": 15000,
            "bank_id": "vcb",
            "bank_account": "0123456789"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let lot_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app,
        Method::POST,
        &format!("/lots/{lot_id}/staff"),
        Some(OWNER),
        Some(json!({ "staff_id": STAFF })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    lot_id
}

async fn open(app: &Router, lot_id: &str, plate: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/lots/{lot_id}/tickets"),
        Some(STAFF),
        Some(json!({ "license_plate": plate })),
    )
    .await
}

fn decimal(value: &Value) -> Decimal {
    serde_json::from_value(value.clone()).unwrap()
}

#[tokio::test]
async fn health_check_reports_ok() {
    let (app, _) = test_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["status"], json!("ok"));
}

#[tokio::test]
async fn ticket_lifecycle_over_http() {
    let (app, clock) = test_app();
    let lot_id = staffed_lot(&app, 10).await;

    let (status, body) = open(&app, &lot_id, " 51a-123.45 ").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["license_plate"], json!("51A-123.45"));
    assert_eq!(body["data"]["status"], json!("active"));
    let ticket_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, Method::GET, &format!("/lots/{lot_id}/occupancy"), None, None).await;
    assert_eq!(body["data"]["available_spots"], json!(9));
    assert_eq!(body["data"]["active_vehicles"], json!(["51A-123.45"]));

    clock.advance(Duration::minutes(90));
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/lots/{lot_id}/tickets/{ticket_id}/estimate"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["billed_hours"], json!(2));
    assert_eq!(decimal(&body["data"]["estimated_fee"]), Decimal::from(30000));
    let qr = body["data"]["payment_qr_url"].as_str().unwrap();
    assert!(qr.starts_with("https://img.vietqr.io/image/vcb-0123456789-compact2.png?amount=30000"));

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/lots/{lot_id}/tickets/{ticket_id}/checkout"),
        Some(STAFF),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("completed"));
    assert_eq!(decimal(&body["data"]["total_amount"]), Decimal::from(30000));

    let (_, body) = send(&app, Method::GET, &format!("/lots/{lot_id}/occupancy"), None, None).await;
    assert_eq!(body["data"]["available_spots"], json!(10));
    assert_eq!(body["data"]["active_vehicles"], json!([]));
}

#[tokio::test]
async fn conflicts_carry_error_codes() {
    let (app, _) = test_app();
    let lot_id = staffed_lot(&app, 1).await;

    let (status, body) = open(&app, &lot_id, "30F-999.99").await;
    assert_eq!(status, StatusCode::CREATED);
    let ticket_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = open(&app, &lot_id, "30F-999.99").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("LOT_FULL"));

    let checkout = format!("/lots/{lot_id}/tickets/{ticket_id}/checkout");
    let (status, _) = send(&app, Method::POST, &checkout, Some(STAFF), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, &checkout, Some(STAFF), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!("ALREADY_CLOSED"));
}

#[tokio::test]
async fn duplicate_plate_is_rejected() {
    let (app, _) = test_app();
    let lot_id = staffed_lot(&app, 5).await;

    assert_eq!(open(&app, &lot_id, "29A-111.11").await.0, StatusCode::CREATED);
    let (status, body) = open(&app, &lot_id, "29a-111.11").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!("DUPLICATE_ACTIVE_TICKET"));
    assert_eq!(body["error"]["details"]["license_plate"], json!("29A-111.11"));
}

#[tokio::test]
async fn mutations_require_identity() {
    let (app, _) = test_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/lots",
        None,
        Some(json!({ "name": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("AUTH_ERROR"));
}

#[tokio::test]
async fn strangers_cannot_open_tickets() {
    let (app, _) = test_app();
    let lot_id = staffed_lot(&app, 5).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/lots/{lot_id}/tickets"),
        Some("someone-else"),
        Some(json!({ "license_plate": "29A-111.11" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("FORBIDDEN"));
}

#[tokio::test]
async fn unknown_lot_is_not_found() {
    let (app, _) = test_app();
    let (status, body) = send(
        &app,
        Method::GET,
        "/lots/00000000-0000-0000-0000-000000000000",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn staff_can_find_their_lot() {
    let (app, _) = test_app();
    let lot_id = staffed_lot(&app, 5).await;

    let (status, body) = send(&app, Method::GET, "/staff/me/lot", Some(STAFF), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!(lot_id));

    let (status, _) = send(&app, Method::GET, "/staff/me/lot", Some("nobody"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn plate_status_shows_active_parking() {
    let (app, clock) = test_app();
    let lot_id = staffed_lot(&app, 5).await;
    open(&app, &lot_id, "51A-123.45").await;
    clock.advance(Duration::minutes(15));

    let (status, body) = send(&app, Method::GET, "/plates/51a-123.45/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["license_plate"], json!("51A-123.45"));
    assert_eq!(body["data"]["active"]["lot_name"], json!("Ben Thanh Parking"));
    assert_eq!(body["data"]["active"]["billed_hours"], json!(1));
}

#[tokio::test]
async fn nearby_rejects_zero_limit() {
    let (app, _) = test_app();
    let (status, body) = send(&app, Method::GET, "/nearby?lat=10.77&lng=106.69&limit=0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let (app, _) = test_app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("content-security-policy"));
}

#[tokio::test]
async fn reconcile_endpoint_is_owner_only() {
    let (app, _) = test_app();
    let lot_id = staffed_lot(&app, 5).await;
    let uri = format!("/lots/{lot_id}/reconcile");

    let (status, body) = send(&app, Method::POST, &uri, Some(STAFF), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("FORBIDDEN"));

    let (status, body) = send(&app, Method::POST, &uri, Some(OWNER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["drifted"], json!(false));
}

#[tokio::test]
async fn oversized_price_is_a_validation_error() {
    let (app, _) = test_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/lots",
        Some(OWNER),
        Some(json!({
            "name": "Ben Thanh Parking",
            "address": "1 Le Loi, District 1",
            "location": { "latitude": 10.7725, "longitude": 106.6980 },
            "total_spots": 10,
            "hourly_price": 100000000000000i64
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}
