use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn create_test_app(mock_server: &MockServer) -> (Router, String) {
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    (appointment_routes(config.to_arc()), config.jwt_secret)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn days_ahead(days: i64) -> String {
    (Utc::now() + Duration::days(days)).format("%Y-%m-%d").to_string()
}

async fn mount_appointment(mock_server: &MockServer, row: Value) {
    let id = row["id"].as_str().unwrap().to_string();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let mock_server = MockServer::start().await;
    let (app, _) = create_test_app(&mock_server);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_get_appointment_is_tenant_scoped() {
    let mock_server = MockServer::start().await;
    let (app, secret) = create_test_app(&mock_server);

    let user = TestUser::receptionist("front@clinic.test");
    let id = Uuid::new_v4().to_string();
    let other_tenant = Uuid::new_v4().to_string();
    mount_appointment(&mock_server, MockSupabaseResponses::appointment_response(
        &id, &other_tenant, &Uuid::new_v4().to_string(), &days_ahead(5), "10:00:00", "10:30:00", "confirmed",
    )).await;

    let token = JwtTestUtils::create_test_token(&user, &secret, Some(1));
    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}", id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reschedule_returns_created() {
    let mock_server = MockServer::start().await;
    let (app, secret) = create_test_app(&mock_server);

    let user = TestUser::default();
    let (id, new_id) = (Uuid::new_v4().to_string(), Uuid::new_v4().to_string());
    let doctor_id = Uuid::new_v4().to_string();
    let (original_date, new_date) = (days_ahead(10), days_ahead(11));

    mount_appointment(&mock_server, MockSupabaseResponses::appointment_response(
        &id, &user.tenant_id, &doctor_id, &original_date, "10:00:00", "10:30:00", "confirmed",
    )).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_availabilities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_date", format!("eq.{}", new_date)))
        .and(query_param("status", "in.(pending,confirmed)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let mut created = MockSupabaseResponses::appointment_response(
        &new_id, &user.tenant_id, &doctor_id, &new_date, "14:00:00", "14:30:00", "pending",
    );
    created["reschedule_count"] = json!(1);
    created["original_appointment_id"] = json!(id);
    created["rescheduled_from_id"] = json!(id);

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "pending", "reschedule_count": 1, "start_time": "14:00:00" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(body_partial_json(json!({ "status": "cancelled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &id, &user.tenant_id, &doctor_id, &original_date, "10:00:00", "10:30:00", "cancelled",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointment_status_history"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notification_outbox"))
        .and(header("Prefer", "return=minimal"))
        .and(body_partial_json(json!({ "kind": "reschedule", "channels": ["email"] })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&user, &secret, Some(1));
    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/reschedule", id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({
            "new_date": new_date,
            "new_start_time": "14:00",
            "reason": "patient request"
        }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["reschedule_count"], 1);
    assert_eq!(body["new_appointment"]["id"], json!(new_id));
    assert_eq!(body["original_appointment"]["status"], "cancelled");
    assert_eq!(body["notification_sent"], true);
}

#[tokio::test]
async fn test_reschedule_conflict_lists_ids() {
    let mock_server = MockServer::start().await;
    let (app, secret) = create_test_app(&mock_server);

    let user = TestUser::admin("owner@clinic.test");
    let (id, taken_id) = (Uuid::new_v4().to_string(), Uuid::new_v4().to_string());
    let doctor_id = Uuid::new_v4().to_string();
    let new_date = days_ahead(11);

    mount_appointment(&mock_server, MockSupabaseResponses::appointment_response(
        &id, &user.tenant_id, &doctor_id, &days_ahead(10), "10:00:00", "10:30:00", "confirmed",
    )).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_availabilities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_date", format!("eq.{}", new_date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &taken_id, &user.tenant_id, &doctor_id, &new_date, "14:00:00", "14:30:00", "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&user, &secret, Some(1));
    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/reschedule", id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({
            "new_date": new_date,
            "new_start_time": "14:00",
            "new_end_time": "14:30",
            "reason": "patient request"
        }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert_eq!(body["details"]["conflicting_appointment_ids"], json!([taken_id]));
}

#[tokio::test]
async fn test_reschedule_validation_error() {
    let mock_server = MockServer::start().await;
    let (app, secret) = create_test_app(&mock_server);

    let user = TestUser::default();
    let token = JwtTestUtils::create_test_token(&user, &secret, Some(1));
    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/reschedule", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({
            "new_date": "tomorrow",
            "new_start_time": "14:00",
            "reason": "patient request"
        }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reschedule_without_new_date_is_bad_request() {
    let mock_server = MockServer::start().await;
    let (app, secret) = create_test_app(&mock_server);

    let user = TestUser::default();
    let token = JwtTestUtils::create_test_token(&user, &secret, Some(1));
    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/reschedule", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({
            "new_start_time": "14:00",
            "reason": "patient request"
        }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].as_str().is_some_and(|msg| msg.contains("new_date")), "{}", body);
}

#[tokio::test]
async fn test_status_update_with_unknown_status_is_bad_request() {
    let mock_server = MockServer::start().await;
    let (app, secret) = create_test_app(&mock_server);

    let user = TestUser::default();
    let token = JwtTestUtils::create_test_token(&user, &secret, Some(1));
    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/{}/status", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": "archived" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_status_update_rejects_terminal_edge() {
    let mock_server = MockServer::start().await;
    let (app, secret) = create_test_app(&mock_server);

    let user = TestUser::default();
    let id = Uuid::new_v4().to_string();
    mount_appointment(&mock_server, MockSupabaseResponses::appointment_response(
        &id, &user.tenant_id, &Uuid::new_v4().to_string(), &days_ahead(2), "10:00:00", "10:30:00", "cancelled",
    )).await;

    let token = JwtTestUtils::create_test_token(&user, &secret, Some(1));
    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/{}/status", id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": "confirmed" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["details"]["from"], "cancelled");
    assert_eq!(body["details"]["allowed"], json!([]));
}

#[tokio::test]
async fn test_rebook_eligibility_endpoint() {
    let mock_server = MockServer::start().await;
    let (app, secret) = create_test_app(&mock_server);

    let user = TestUser::default();
    let id = Uuid::new_v4().to_string();
    mount_appointment(&mock_server, MockSupabaseResponses::appointment_response(
        &id, &user.tenant_id, &Uuid::new_v4().to_string(), &days_ahead(-3), "10:00:00", "10:30:00", "completed",
    )).await;

    let token = JwtTestUtils::create_test_token(&user, &secret, Some(1));
    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}/rebook", id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["can_rebook"], true);
    assert_eq!(body["reasons"], json!([]));
}

#[tokio::test]
async fn test_conflict_check_endpoint() {
    let mock_server = MockServer::start().await;
    let (app, secret) = create_test_app(&mock_server);

    let user = TestUser::default();
    let doctor_id = Uuid::new_v4().to_string();
    let date = days_ahead(4);
    let booked = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &booked, &user.tenant_id, &doctor_id, &date, "10:00:00", "10:30:00", "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&user, &secret, Some(1));
    let request = Request::builder()
        .method("GET")
        .uri(format!(
            "/conflicts/check?doctor_id={}&date={}&start_time=10:15&end_time=10:45",
            doctor_id, date
        ))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["has_conflict"], true);
    assert_eq!(body["conflicting_appointments"][0]["id"], json!(booked));
}
