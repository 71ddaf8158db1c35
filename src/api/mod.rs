//! HTTP API for the web dashboard.
//!
//! Every error body is `{"error": "..."}`.

pub mod auth;
pub mod calories;
pub mod extract;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::auth::AuthService;
use crate::error::{AuthError, DatabaseError};
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub db: Arc<dyn Database>,
}

/// Build the Axum router with all dashboard routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/code/generate", post(auth::generate_code))
        .route("/api/auth/code/status", get(auth::code_status))
        .route("/api/auth/telegram", post(auth::telegram_login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/calories/today", get(calories::today))
        .route("/api/calories/period", get(calories::period))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "fasttrack"
    }))
}

/// An error returned from a handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// Detail is logged, never returned.
    #[error("{public}")]
    Internal { public: &'static str, detail: String },
}

impl ApiError {
    pub fn internal(public: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Internal {
            public,
            detail: detail.to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal { public, detail } = &self {
            error!(error = %detail, "{public}");
        }
        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        Self::internal("Internal server error", e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidSession
            | AuthError::InvalidWidgetData
            | AuthError::WidgetDataExpired => Self::Unauthorized(e.to_string()),
            AuthError::CodeSpaceExhausted => Self::internal("Failed to generate unique code", e),
            AuthError::Database(db) => db.into(),
            other => Self::BadRequest(other.to_string()),
        }
    }
}
