//! Calorie breakdown endpoints.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::extract::SessionUser;
use super::{ApiError, ApiState};
use crate::meals::{MealBreakdown, Period, breakdown};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaloriesResponse {
    data: Vec<MealBreakdown>,
    total_calories: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    days_in_period: Option<u32>,
}

async fn report(
    state: &ApiState,
    auth: &crate::auth::Authenticated,
    period: Period,
) -> Result<CaloriesResponse, ApiError> {
    let (start, end) = period.range(auth.user.tz(), Utc::now());
    let logs = state
        .db
        .list_food_logs_between(auth.user.telegram_id, start, end)
        .await?;
    let report = breakdown(&logs, period.days());
    Ok(CaloriesResponse {
        data: report.data,
        total_calories: report.total_calories,
        period: None,
        days_in_period: None,
    })
}

/// `GET /api/calories/today`
pub async fn today(
    State(state): State<ApiState>,
    SessionUser(auth): SessionUser,
) -> Result<Json<CaloriesResponse>, ApiError> {
    report(&state, &auth, Period::Day).await.map(Json)
}

#[derive(Deserialize)]
pub struct PeriodQuery {
    period: Option<String>,
}

/// `GET /api/calories/period?period=1d|7d|30d`
///
/// `period` is echoed as given; unknown values are reported over one day.
pub async fn period(
    State(state): State<ApiState>,
    SessionUser(auth): SessionUser,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<CaloriesResponse>, ApiError> {
    let period = Period::parse(query.period.as_deref());
    let mut body = report(&state, &auth, period).await?;
    body.period = Some(query.period.unwrap_or_else(|| Period::Day.as_str().to_string()));
    body.days_in_period = Some(period.days());
    Ok(Json(body))
}
