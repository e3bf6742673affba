//! API layer - HTTP handlers and routing
//!
//! Endpoints live under `/api/v1`:
//! - Student endpoints (`/student/...`)
//! - Parent endpoints (`/parent/...`)
//! - Holiday endpoints (`/holiday/...`)
//!
//! `GET /health` and `GET /` are also served at the root.

pub mod common;
pub mod holidays;
pub mod middleware;
pub mod parents;
pub mod students;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedSubject, RotatedToken};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .merge(students::protected_router())
        .merge(parents::protected_router())
        .merge(holidays::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(students::public_router())
        .merge(parents::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    // Cookie auth needs an explicit origin with credentials
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => tracing::warn!("Ignoring invalid CORS origin '{}': {}", cors_origin, e),
    }

    Router::new()
        .route("/health", get(health))
        .route("/", get(welcome))
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
///
/// The service reports `UP` while it can answer; the database state is
/// reported next to it.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match state.pool.ping().await {
        Ok(()) => "UP",
        Err(e) => {
            tracing::warn!("Health check ping failed: {:#}", e);
            "DOWN"
        }
    };
    Json(json!({
        "status": "UP",
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /
async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Student Management System" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{create_test_pool, migrations};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    async fn setup() -> (Router, AppState) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let mut config = Config::default();
        config.auth.token_secret = Some("router-test-secret".to_string());
        let state = AppState::from_config(pool, &config);
        (build_router(state.clone(), &config.server.cors_origin), state)
    }

    fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("token={}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Response) {
        let response = app.clone().oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register_and_login(app: &Router, email: &str) -> String {
        let (status, _) = send(
            app,
            post(
                "/api/v1/student/",
                None,
                json!({
                    "first_name": "Grace",
                    "last_name": "Hopper",
                    "email": email,
                    "password": "cobol1959",
                    "subject_names": ["Math", "Physics"],
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, response) = send(
            app,
            post(
                "/api/v1/student/login",
                None,
                json!({ "email": email, "password": "cobol1959" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.contains("HttpOnly"));

        let body = json_body(response).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert!(cookie.starts_with(&format!("token={};", token)));
        token
    }

    #[tokio::test]
    async fn test_health_and_welcome() {
        let (app, _) = setup().await;

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, response) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "UP");
        assert_eq!(body["database"], "UP");
        assert!(body["timestamp"].is_string());

        let request = Request::builder()
            .uri("/api/v1/health")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.0, StatusCode::OK);

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let body = json_body(send(&app, request).await.1).await;
        assert_eq!(body["message"], "Welcome to the Student Management System");
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let (app, _) = setup().await;

        let (status, response) = send(
            &app,
            post("/api/v1/student/details", None, json!({ "email": "x@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "Access denied. Sign in again!");

        let (status, _) = send(
            &app,
            post("/api/v1/holiday/create", Some("garbage"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_student_flow_with_cookie() {
        let (app, _) = setup().await;
        let token = register_and_login(&app, "grace@example.com").await;

        let (status, response) = send(
            &app,
            post(
                "/api/v1/student/details",
                Some(&token),
                json!({ "email": "grace@example.com" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["email"], "grace@example.com");
        assert_eq!(body["data"]["subjects"].as_array().unwrap().len(), 2);
        assert!(body.get("token").is_none());
        assert!(body["data"].get("password_hash").is_none());

        let (status, response) = send(
            &app,
            post("/api/v1/student/all", Some(&token), json!({ "limit": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["total_students"], 1);
        assert_eq!(body["data"]["total_pages"], 1);
    }

    #[tokio::test]
    async fn test_validation_errors_are_listed() {
        let (app, _) = setup().await;

        let (status, response) = send(
            &app,
            post(
                "/api/v1/student/",
                None,
                json!({ "first_name": "A", "email": "nope", "subject_names": [] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["details"]["errors"].as_array().unwrap().len() >= 4);
    }

    #[tokio::test]
    async fn test_mistyped_body_is_a_validation_error() {
        let (app, _) = setup().await;
        let token = register_and_login(&app, "types@example.com").await;

        let (status, response) = send(
            &app,
            post(
                "/api/v1/holiday/assign-holiday",
                Some(&token),
                json!({ "studentIds": "1", "holidayId": 1 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"]["errors"].as_array().unwrap().len(), 1);

        let broken = Request::builder()
            .method("POST")
            .uri("/api/v1/student/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"email\":"))
            .unwrap();
        let (status, response) = send(&app, broken).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");

        // The student list body is optional
        let bare = Request::builder()
            .method("POST")
            .uri("/api/v1/student/all")
            .header(header::COOKIE, format!("token={}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, bare).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_holiday_flow() {
        let (app, state) = setup().await;
        let token = register_and_login(&app, "ada@example.com").await;
        let student_id = state
            .session_guard
            .issuer()
            .verify(&token)
            .unwrap()
            .id;

        let start = chrono::Utc::now().date_naive() + chrono::Duration::days(10);
        let end = start + chrono::Duration::days(5);

        let (status, response) = send(
            &app,
            post(
                "/api/v1/holiday/create",
                Some(&token),
                json!({
                    "name": "Spring break",
                    "start_date": start.to_string(),
                    "end_date": end.to_string(),
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let holiday_id = json_body(response).await["data"]["holiday"]["id"]
            .as_i64()
            .unwrap();

        // Same start date conflicts
        let (status, _) = send(
            &app,
            post(
                "/api/v1/holiday/create",
                Some(&token),
                json!({ "name": "Duplicate", "start_date": start.to_string() }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, response) = send(
            &app,
            post(
                "/api/v1/holiday/assign-holiday",
                Some(&token),
                json!({ "studentIds": [student_id], "holidayId": holiday_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            json_body(response).await["data"]["assignedStudents"],
            json!([student_id])
        );

        let (status, response) = send(
            &app,
            post(
                "/api/v1/holiday/assign-holiday",
                Some(&token),
                json!({ "studentIds": [student_id + 50], "holidayId": holiday_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"]["details"]["invalidIds"],
            json!([student_id + 50])
        );

        let range = json!({
            "start_date": (start + chrono::Duration::days(2)).to_string(),
            "end_date": (end + chrono::Duration::days(10)).to_string(),
        });
        let body = json_body(
            send(&app, post("/api/v1/holiday/holiday-list-by-date", Some(&token), range.clone()))
                .await
                .1,
        )
        .await;
        assert_eq!(body["data"]["length"], 1);
        assert_eq!(body["data"]["holiday_list"][0]["students"][0]["id"], student_id);

        let body = json_body(
            send(&app, post("/api/v1/holiday/holiday-students", Some(&token), range.clone()))
                .await
                .1,
        )
        .await;
        assert_eq!(body["data"]["students"].as_array().unwrap().len(), 1);

        let body = json_body(
            send(&app, post("/api/v1/holiday/no-holiday-students", Some(&token), range))
                .await
                .1,
        )
        .await;
        assert!(body["data"]["students"].as_array().unwrap().is_empty());

        let (status, _) = send(
            &app,
            post(
                "/api/v1/holiday/delete-holiday",
                Some(&token),
                json!({ "holidayId": holiday_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            post(
                "/api/v1/holiday/delete-holiday",
                Some(&token),
                json!({ "holidayId": holiday_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_near_expiry_token_is_rotated() {
        let (app, state) = setup().await;
        let old = state.session_guard.issuer().issue_with_ttl(42, 30).unwrap();

        let (status, response) = send(
            &app,
            post("/api/v1/holiday/holiday-list-by-date", Some(&old), json!({
                "start_date": "2030-01-01",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        let body = json_body(response).await;
        let fresh = body["token"].as_str().unwrap();
        assert_ne!(fresh, old);
        assert!(cookie.starts_with(&format!("token={};", fresh)));

        let (status, response) = send(
            &app,
            post("/api/v1/holiday/holiday-list-by-date", Some(&old), json!({
                "start_date": "2030-01-01",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            json_body(response).await["error"]["message"],
            "Token has expired. Sign in again!"
        );
    }

    #[tokio::test]
    async fn test_parent_links_student() {
        let (app, state) = setup().await;
        let student_token = register_and_login(&app, "kid@example.com").await;
        let student_id = state
            .session_guard
            .issuer()
            .verify(&student_token)
            .unwrap()
            .id;

        let (status, _) = send(
            &app,
            post(
                "/api/v1/parent/",
                None,
                json!({
                    "first_name": "Marie",
                    "last_name": "Curie",
                    "email": "marie@example.com",
                    "password": "radium1898",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, response) = send(
            &app,
            post(
                "/api/v1/parent/login",
                None,
                json!({ "email": "marie@example.com", "password": "radium1898" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = json_body(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();

        let (status, _) = send(
            &app,
            post("/api/v1/parent/link-student", Some(&token), json!({ "studentId": student_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let body = json_body(
            send(&app, post("/api/v1/parent/parent-details", Some(&token), json!({})))
                .await
                .1,
        )
        .await;
        assert_eq!(body["data"]["email"], "marie@example.com");
        assert_eq!(body["data"]["student"]["id"], student_id);

        let (status, _) = send(
            &app,
            post("/api/v1/student/details-linked-parent", Some(&token), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
