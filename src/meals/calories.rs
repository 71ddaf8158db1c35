//! Calorie breakdowns for the dashboard.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::model::FoodLog;

/// Reporting window for `/api/calories/period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    /// Unknown or missing values fall back to a single day.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("7d") => Self::Week,
            Some("30d") => Self::Month,
            _ => Self::Day,
        }
    }

    pub fn days(&self) -> u32 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "1d",
            Self::Week => "7d",
            Self::Month => "30d",
        }
    }

    /// UTC range covering the last `days()` local days, today included.
    pub fn range(&self, tz: Tz, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let (today_start, end) = local_day_bounds(tz, now);
        let start = today_start - Duration::days(i64::from(self.days()) - 1);
        (start, end)
    }
}

/// Start and end (exclusive) of the local day containing `now`, as UTC.
pub fn local_day_bounds(tz: Tz, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_date = now.with_timezone(&tz).date_naive();
    let start = local_midnight(tz, local_date);
    let end = local_midnight(tz, local_date + Duration::days(1));
    (start, end)
}

fn local_midnight(tz: Tz, date: chrono::NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    // Zones that skip midnight on DST days start the day at the first valid instant.
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

/// One slice of the meal pie.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealBreakdown {
    pub meal_type: String,
    pub calories: i64,
    pub percentage: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalorieReport {
    pub data: Vec<MealBreakdown>,
    pub total_calories: i64,
}

/// Group logs by meal; values are divided by `days` and rounded.
pub fn breakdown(logs: &[FoodLog], days: u32) -> CalorieReport {
    let mut by_meal: BTreeMap<&'static str, f64> = BTreeMap::new();
    for log in logs {
        *by_meal.entry(log.meal_label()).or_default() += log.calories;
    }

    let divisor = f64::from(days.max(1));
    let total: f64 = by_meal.values().sum();
    let data = by_meal
        .into_iter()
        .map(|(meal, calories)| MealBreakdown {
            meal_type: meal.to_string(),
            calories: (calories / divisor).round() as i64,
            percentage: if total > 0.0 {
                (calories / total * 100.0).round() as i64
            } else {
                0
            },
        })
        .collect();

    CalorieReport {
        data,
        total_calories: (total / divisor).round() as i64,
    }
}
