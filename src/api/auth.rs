//! Login-code, widget and session endpoints.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::extract::{BearerToken, SessionUser};
use super::{ApiError, ApiState};
use crate::auth::{CodeState, WidgetLogin};
use crate::onboarding::{OnboardingStep, UserSummary};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedCode {
    code: String,
    expires_at: DateTime<Utc>,
}

/// `POST /api/auth/code/generate`
pub async fn generate_code(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let code = state.auth.generate_code().await?;
    Ok(Json(GeneratedCode {
        code: code.code,
        expires_at: code.expires_at,
    })
    .into_response())
}

#[derive(Deserialize)]
pub struct CodeQuery {
    code: Option<String>,
}

/// `GET /api/auth/code/status?code=`
pub async fn code_status(
    State(state): State<ApiState>,
    Query(query): Query<CodeQuery>,
) -> Result<Response, ApiError> {
    let code = query
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Code is required".into()))?;

    let body = match state.auth.code_status(&code).await? {
        CodeState::Invalid => {
            return Ok((
                StatusCode::NOT_FOUND,
                Json(json!({ "status": "invalid", "error": "Code not found" })),
            )
                .into_response());
        }
        CodeState::Expired => json!({ "status": "expired" }),
        CodeState::Pending { expires_at } => json!({
            "status": "pending",
            "expiresAt": expires_at,
        }),
        CodeState::Verified {
            token,
            expires_at,
            user,
        } => json!({
            "status": "verified",
            "token": token,
            "expiresAt": expires_at,
            "user": user,
        }),
    };
    Ok(Json(body).into_response())
}

#[derive(Serialize)]
struct WidgetUser {
    telegram_id: i64,
    first_name: String,
    username: Option<String>,
    photo_url: Option<String>,
    onboarding_step: OnboardingStep,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WidgetLoginResponse {
    user: WidgetUser,
    token: String,
    expires_at: DateTime<Utc>,
}

/// `POST /api/auth/telegram`
pub async fn telegram_login(
    State(state): State<ApiState>,
    body: Result<Json<WidgetLogin>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(data) = body.map_err(|_| ApiError::Unauthorized("Invalid authentication data".into()))?;
    let authenticated = state.auth.login_with_widget(&data).await?;
    info!(telegram_id = data.id, "Widget login");

    Ok(Json(WidgetLoginResponse {
        user: WidgetUser {
            telegram_id: authenticated.user.telegram_id,
            first_name: authenticated.user.first_name,
            username: data.username,
            photo_url: data.photo_url,
            onboarding_step: authenticated.user.onboarding_step,
        },
        token: authenticated.session.token,
        expires_at: authenticated.session.expires_at,
    })
    .into_response())
}

#[derive(Serialize)]
struct SessionInfo {
    expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct MeResponse {
    user: UserSummary,
    session: SessionInfo,
}

/// `GET /api/auth/me`
pub async fn me(SessionUser(auth): SessionUser) -> impl IntoResponse {
    Json(MeResponse {
        user: auth.user.summary(),
        session: SessionInfo {
            expires_at: auth.session.expires_at,
        },
    })
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<ApiState>,
    BearerToken(token): BearerToken,
) -> Result<Response, ApiError> {
    state.auth.logout(&token).await?;
    Ok(Json(json!({ "success": true })).into_response())
}
