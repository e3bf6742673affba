//! Parent API endpoints

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Router,
};
use serde::Deserialize;

use super::common::{ApiResponse, JsonBody, LoginRequest};
use super::middleware::{
    set_session_cookie, ApiError, AppState, AuthenticatedSubject, RotatedToken,
};
use crate::models::{Parent, ParentWithStudent};
use crate::services::{ParentServiceError, RegisterParentInput, UpdateParentInput};

impl From<ParentServiceError> for ApiError {
    fn from(err: ParentServiceError) -> Self {
        match err {
            ParentServiceError::Validation(errors) => ApiError::validation_failed(errors),
            ParentServiceError::BadRequest(msg) => ApiError::bad_request(msg),
            ParentServiceError::Unauthorized => ApiError::unauthorized(err.to_string()),
            ParentServiceError::NotFound(msg) => ApiError::not_found(msg),
            ParentServiceError::Conflict(msg) => ApiError::conflict(msg),
            ParentServiceError::Token(e) => ApiError::internal(e),
            ParentServiceError::Internal(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    #[serde(rename = "studentId")]
    pub student_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/parent", axum::routing::post(register))
        .route("/parent/", axum::routing::post(register))
        .route("/parent/login", axum::routing::post(login))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/parent/link-student", axum::routing::post(link_student))
        .route("/parent/parent-details", axum::routing::post(details))
        .route("/parent/update-parent", axum::routing::post(update))
}

/// POST /api/v1/parent/
async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = state
        .parent_service
        .register(RegisterParentInput {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok(ApiResponse::new("Parent registered successfully", parent).created())
}

/// POST /api/v1/parent/login
async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<Response, ApiError> {
    let token = state
        .parent_service
        .login(&body.email, &body.password)
        .await?;

    let mut response = ApiResponse::message("Login successful")
        .with_token(RotatedToken(Some(token.clone())))
        .into_response();
    set_session_cookie(&mut response, &token, state.cookie_secure);
    Ok(response)
}

/// POST /api/v1/parent/link-student
///
/// Links the signed-in parent to a student.
async fn link_student(
    State(state): State<AppState>,
    AuthenticatedSubject(parent_id): AuthenticatedSubject,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<LinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let linked = state
        .parent_service
        .link_student(parent_id, body.student_id)
        .await?;
    Ok(ApiResponse::new("Student linked successfully", linked)
        .with_token(rotated)
        .created())
}

/// POST /api/v1/parent/parent-details
async fn details(
    State(state): State<AppState>,
    AuthenticatedSubject(parent_id): AuthenticatedSubject,
    rotated: RotatedToken,
) -> Result<ApiResponse<ParentWithStudent>, ApiError> {
    let parent = state.parent_service.details(parent_id).await?;
    Ok(ApiResponse::new("Parent details fetched successfully", parent).with_token(rotated))
}

/// POST /api/v1/parent/update-parent
async fn update(
    State(state): State<AppState>,
    AuthenticatedSubject(parent_id): AuthenticatedSubject,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<UpdateRequest>,
) -> Result<ApiResponse<Parent>, ApiError> {
    let parent = state
        .parent_service
        .update(
            parent_id,
            UpdateParentInput {
                first_name: body.first_name,
                last_name: body.last_name,
                email: body.email,
            },
        )
        .await?;
    Ok(ApiResponse::new("Parent updated successfully", parent).with_token(rotated))
}
