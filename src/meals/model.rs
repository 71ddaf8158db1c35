//! Food log records.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Meal slot, derived from the local hour a meal is logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Snack,
    Dinner,
    Supper,
}

impl MealType {
    pub fn from_local_hour(hour: u32) -> Self {
        match hour {
            5..=10 => Self::Breakfast,
            11..=14 => Self::Lunch,
            15..=17 => Self::Snack,
            18..=21 => Self::Dinner,
            _ => Self::Supper,
        }
    }

    /// Meal slot for an instant, in the given timezone.
    pub fn at(instant: DateTime<Utc>, tz: Tz) -> Self {
        Self::from_local_hour(instant.with_timezone(&tz).hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Snack => "snack",
            Self::Dinner => "dinner",
            Self::Supper => "supper",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "breakfast" => Some(Self::Breakfast),
            "lunch" => Some(Self::Lunch),
            "snack" => Some(Self::Snack),
            "dinner" => Some(Self::Dinner),
            "supper" => Some(Self::Supper),
            _ => None,
        }
    }
}

/// One recognized item on the plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub portion: Option<String>,
}

/// A logged meal.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodLog {
    pub id: Uuid,
    pub telegram_id: i64,
    pub calories: f64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub items: Vec<FoodItem>,
    pub meal_type: Option<MealType>,
    pub notes: Option<String>,
    pub logged_at: DateTime<Utc>,
}

impl FoodLog {
    /// Name used when grouping by meal; untyped rows land in `other`.
    pub fn meal_label(&self) -> &'static str {
        self.meal_type.map(|m| m.as_str()).unwrap_or("other")
    }
}

/// Per-day rollup written by the daily summary agent.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub telegram_id: i64,
    pub date: NaiveDate,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub meal_count: u32,
    pub fasting_hours: f64,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}
