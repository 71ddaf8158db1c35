//! End-to-end tests for the dashboard API.
//!
//! Each test builds the real router over an in-memory database and drives it
//! with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use fasttrack::api::{ApiState, api_routes};
use fasttrack::auth::AuthService;
use fasttrack::auth::widget::{self, WidgetLogin};
use fasttrack::config::AuthConfig;
use fasttrack::meals::{FoodLog, MealType};
use fasttrack::store::{Database, LibSqlBackend};

const BOT_TOKEN: &str = "123456:TEST-TOKEN";

struct Harness {
    app: Router,
    auth: Arc<AuthService>,
    db: Arc<dyn Database>,
}

async fn harness() -> Harness {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let auth = Arc::new(AuthService::new(
        Arc::clone(&db),
        &AuthConfig::default(),
        SecretString::from(BOT_TOKEN),
    ));
    let app = api_routes(ApiState {
        auth: Arc::clone(&auth),
        db: Arc::clone(&db),
    });
    Harness { app, auth, db }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn logged_in(h: &Harness, telegram_id: i64) -> String {
    let code = h.auth.generate_code().await.unwrap();
    h.auth
        .verify_code(&code.code, telegram_id, "Ana")
        .await
        .unwrap()
        .token
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness().await;
    let (status, body) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn code_login_flow() {
    let h = harness().await;

    let (status, body) = send(
        &h.app,
        Request::post("/api/auth/code/generate")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let code = body["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 8);
    assert!(body["expiresAt"].is_string());

    let status_uri = format!("/api/auth/code/status?code={code}");
    let (_, body) = send(&h.app, get(&status_uri)).await;
    assert_eq!(body["status"], "pending");

    // The user types the code into the bot
    h.auth.verify_code(&code, 42, "Ana").await.unwrap();

    let (status, body) = send(&h.app, get(&status_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "verified");
    assert_eq!(body["user"]["telegram_id"], 42);
    assert_eq!(body["user"]["first_name"], "Ana");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&h.app, get_with_token("/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["telegram_id"], 42);
    assert!(body["session"]["expires_at"].is_string());

    let (status, body) = send(
        &h.app,
        Request::post("/api/auth/logout")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(&h.app, get_with_token("/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired session");
}

#[tokio::test]
async fn code_status_errors() {
    let h = harness().await;

    let (status, body) = send(&h.app, get("/api/auth/code/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Code is required");

    let (status, body) = send(&h.app, get("/api/auth/code/status?code=ZZZZZZZZ")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "invalid");
    assert_eq!(body["error"], "Code not found");
}

#[tokio::test]
async fn bearer_header_is_required() {
    let h = harness().await;

    let (status, body) = send(&h.app, get("/api/auth/me")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing or invalid authorization header");

    let request = Request::get("/api/calories/today")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing or invalid authorization header");

    let (status, body) = send(&h.app, get_with_token("/api/auth/me", "not-a-session")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired session");
}

fn widget_payload(auth_date: i64) -> WidgetLogin {
    let mut data = WidgetLogin {
        id: 77,
        first_name: "Sam".into(),
        last_name: None,
        username: Some("samfasts".into()),
        photo_url: None,
        auth_date,
        hash: String::new(),
    };
    data.hash = widget::sign(&data, BOT_TOKEN).unwrap();
    data
}

fn widget_json(data: &WidgetLogin) -> Value {
    serde_json::json!({
        "id": data.id,
        "first_name": data.first_name,
        "username": data.username,
        "auth_date": data.auth_date,
        "hash": data.hash,
    })
}

#[tokio::test]
async fn widget_login_issues_session() {
    let h = harness().await;
    let data = widget_payload(Utc::now().timestamp());

    let (status, body) = send(&h.app, post_json("/api/auth/telegram", widget_json(&data))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["telegram_id"], 77);
    assert_eq!(body["user"]["username"], "samfasts");
    assert_eq!(body["user"]["onboarding_step"], "weight");

    let token = body["token"].as_str().unwrap();
    let (status, _) = send(&h.app, get_with_token("/api/auth/me", token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn widget_login_rejects_bad_data() {
    let h = harness().await;

    let mut tampered = widget_payload(Utc::now().timestamp());
    tampered.first_name = "Mallory".into();
    let (status, body) =
        send(&h.app, post_json("/api/auth/telegram", widget_json(&tampered))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid authentication data");

    let stale = widget_payload(Utc::now().timestamp() - 2 * 86_400);
    let (status, body) = send(&h.app, post_json("/api/auth/telegram", widget_json(&stale))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication expired");
}

fn food(telegram_id: i64, calories: f64, meal_type: MealType) -> FoodLog {
    FoodLog {
        id: Uuid::new_v4(),
        telegram_id,
        calories,
        protein: None,
        carbs: None,
        fat: None,
        items: Vec::new(),
        meal_type: Some(meal_type),
        notes: None,
        logged_at: Utc::now(),
    }
}

#[tokio::test]
async fn calorie_endpoints() {
    let h = harness().await;
    let token = logged_in(&h, 42).await;

    h.db.insert_food_log(&food(42, 300.0, MealType::Breakfast))
        .await
        .unwrap();
    h.db.insert_food_log(&food(42, 700.0, MealType::Dinner))
        .await
        .unwrap();
    // Someone else's meal stays out of the report
    h.db.insert_food_log(&food(7, 999.0, MealType::Dinner))
        .await
        .unwrap();

    let (status, body) = send(&h.app, get_with_token("/api/calories/today", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalCalories"], 1000);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert!(body.get("period").is_none());

    let (status, body) = send(
        &h.app,
        get_with_token("/api/calories/period?period=7d", &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"], "7d");
    assert_eq!(body["daysInPeriod"], 7);
    assert_eq!(body["totalCalories"], 143);

    let (_, body) = send(
        &h.app,
        get_with_token("/api/calories/period?period=1y", &token),
    )
    .await;
    assert_eq!(body["period"], "1y");
    assert_eq!(body["daysInPeriod"], 1);

    let (_, body) = send(&h.app, get_with_token("/api/calories/period", &token)).await;
    assert_eq!(body["period"], "1d");
    assert_eq!(body["daysInPeriod"], 1);
}
