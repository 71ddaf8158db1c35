//! User record built up during onboarding.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::state::OnboardingStep;

/// A bot user, keyed by Telegram id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub telegram_id: i64,
    pub first_name: String,
    pub current_weight: Option<f64>,
    pub goal_weight: Option<f64>,
    pub height: Option<f64>,
    /// IANA timezone name.
    pub timezone: String,
    pub onboarding_step: OnboardingStep,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A user on first contact: nothing collected yet, step `weight`.
    pub fn new(telegram_id: i64, first_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            telegram_id,
            first_name: first_name.into(),
            current_weight: None,
            goal_weight: None,
            height: None,
            timezone: "UTC".to_string(),
            onboarding_step: OnboardingStep::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_onboarded(&self) -> bool {
        self.onboarding_step.is_terminal()
    }

    /// The user's timezone, falling back to UTC for unknown names.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    /// Kilograms between current and goal weight, if both are known.
    pub fn weight_to_lose(&self) -> Option<f64> {
        Some(self.current_weight? - self.goal_weight?)
    }

    /// Public projection returned by the HTTP API.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            telegram_id: self.telegram_id,
            first_name: self.first_name.clone(),
            current_weight: self.current_weight,
            goal_weight: self.goal_weight,
            height: self.height,
            onboarding_step: self.onboarding_step,
        }
    }
}

/// The fields of [`User`] the web dashboard sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub telegram_id: i64,
    pub first_name: String,
    pub current_weight: Option<f64>,
    pub goal_weight: Option<f64>,
    pub height: Option<f64>,
    pub onboarding_step: OnboardingStep,
}

/// One weigh-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightLog {
    pub id: uuid::Uuid,
    pub telegram_id: i64,
    pub weight: f64,
    pub logged_at: DateTime<Utc>,
}
