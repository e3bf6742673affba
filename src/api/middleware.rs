//! API middleware
//!
//! Shared application state, the error envelope, and the authentication
//! middleware that evaluates (and possibly rotates) the session token.

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxHolidayRepository, SqlxParentRepository, SqlxStudentRepository, SqlxSubjectRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    AuthError, HolidayService, MemoryRevocationStore, ParentService, SessionGuard,
    StudentService, TokenIssuer,
};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "token";

/// Lifetime of the session cookie, in seconds
pub const SESSION_COOKIE_MAX_AGE: i64 = 24 * 60 * 60;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub student_service: Arc<StudentService>,
    pub parent_service: Arc<ParentService>,
    pub holiday_service: Arc<HolidayService>,
    pub session_guard: SessionGuard,
    /// Add `Secure` to the session cookie
    pub cookie_secure: bool,
}

impl AppState {
    /// Wire repositories and services over `pool`.
    pub fn from_config(pool: DynDatabasePool, config: &Config) -> Self {
        let issuer = Arc::new(TokenIssuer::from_config(&config.auth));
        let revocations = MemoryRevocationStore::from_config(&config.auth).boxed();

        let students = SqlxStudentRepository::boxed(pool.clone());
        let subjects = SqlxSubjectRepository::boxed(pool.clone());
        let parents = SqlxParentRepository::boxed(pool.clone());
        let holidays = SqlxHolidayRepository::boxed(pool.clone());

        Self {
            student_service: Arc::new(StudentService::new(
                students.clone(),
                subjects,
                issuer.clone(),
            )),
            parent_service: Arc::new(ParentService::new(parents, students.clone(), issuer.clone())),
            holiday_service: Arc::new(HolidayService::new(
                holidays,
                students,
                config.holidays.max_end_date,
            )),
            session_guard: SessionGuard::new(issuer, revocations, config.auth.grace_interval_secs),
            cookie_secure: config.auth.cookie_secure,
            pool,
        }
    }
}

/// Id of the student or parent the request is authenticated as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedSubject(pub i64);

/// Replacement token issued while authenticating this request, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotatedToken(pub Option<String>);

impl<S> FromRequestParts<S> for AuthenticatedSubject
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedSubject>()
            .copied()
            .ok_or_else(|| ApiError::unauthorized("Access denied. Sign in again!"))
    }
}

impl<S> FromRequestParts<S> for RotatedToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RotatedToken>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    /// Field errors collected by validation
    pub fn validation_failed(errors: Vec<String>) -> Self {
        Self::with_details(
            "VALIDATION_ERROR",
            "Validation failed",
            serde_json::json!({ "errors": errors }),
        )
    }

    /// Log `err` and hide it behind a generic message.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" | "BAD_REQUEST" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => ApiError::unauthorized(err.to_string()),
            AuthError::Revoked | AuthError::Invalid => ApiError::forbidden(err.to_string()),
            AuthError::Internal(e) => ApiError::internal(e),
            AuthError::Revocation(e) => ApiError::internal(e),
            AuthError::RotationCollision => ApiError::internal(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "Rejected request body");
        ApiError::validation_failed(vec![rejection.body_text()])
    }
}

/// Extract the session token: bearer header first, then the `token` cookie.
pub fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    let cookie_prefix = format!("{}=", SESSION_COOKIE);
    for cookie_header in request.headers().get_all(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix(&cookie_prefix) {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        SESSION_COOKIE, token, SESSION_COOKIE_MAX_AGE
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Append a session cookie to `response`.
pub fn set_session_cookie(response: &mut Response, token: &str, secure: bool) {
    match HeaderValue::from_str(&session_cookie(token, secure)) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Session cookie is not a valid header value: {}", e),
    }
}

/// Authentication middleware
///
/// Rejects the request unless the session guard accepts its token. When the
/// guard rotates the token, the replacement is exposed to the handler as
/// [`RotatedToken`] and sent back as a cookie.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&request);
    let outcome = state.session_guard.evaluate(token.as_deref()).await?;

    request
        .extensions_mut()
        .insert(AuthenticatedSubject(outcome.subject_id));
    request
        .extensions_mut()
        .insert(RotatedToken(outcome.rotated.clone()));

    let mut response = next.run(request).await;
    if let Some(fresh) = outcome.rotated {
        set_session_cookie(&mut response, &fresh, state.cookie_secure);
    }
    Ok(response)
}
