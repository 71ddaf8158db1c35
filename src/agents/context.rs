//! User history gathered for the insights and Q&A prompts.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::fasting::{FastingPeriod, format_duration};
use crate::meals::FoodLog;
use crate::onboarding::{User, WeightLog};
use crate::store::Database;

pub const WEIGHT_HISTORY: usize = 30;
pub const FAST_HISTORY: usize = 14;
pub const FOOD_HISTORY: usize = 50;

/// Aggregates over completed fasts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FastingStats {
    pub completed: usize,
    pub average_hours: f64,
    pub longest_hours: f64,
}

#[derive(Debug, Clone)]
pub struct UserContext {
    pub user: User,
    /// Most recent first.
    pub weights: Vec<WeightLog>,
    /// Most recent first; may include the open fast.
    pub fasts: Vec<FastingPeriod>,
    /// Most recent first.
    pub foods: Vec<FoodLog>,
}

impl UserContext {
    pub async fn gather(db: &dyn Database, user: User) -> Result<Self, DatabaseError> {
        let id = user.telegram_id;
        let weights = db.list_weight_logs(id, WEIGHT_HISTORY).await?;
        let fasts = db.list_fasts(id, FAST_HISTORY).await?;
        let foods = db.list_recent_food_logs(id, FOOD_HISTORY).await?;
        Ok(Self {
            user,
            weights,
            fasts,
            foods,
        })
    }

    /// `None` until at least one fast has been completed.
    pub fn fasting_stats(&self) -> Option<FastingStats> {
        let hours: Vec<f64> = self
            .fasts
            .iter()
            .filter_map(|f| {
                let ended = f.ended_at?;
                Some((ended - f.started_at).num_minutes() as f64 / 60.0)
            })
            .collect();
        if hours.is_empty() {
            return None;
        }
        let total: f64 = hours.iter().sum();
        Some(FastingStats {
            completed: hours.len(),
            average_hours: total / hours.len() as f64,
            longest_hours: hours.iter().copied().fold(0.0, f64::max),
        })
    }

    /// Plain-text block for the model. Times are shown in the user's zone.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let tz = self.user.tz();
        let mut out = String::new();

        let _ = writeln!(out, "PROFILE");
        let _ = writeln!(out, "- Name: {}", self.user.first_name);
        let _ = writeln!(out, "- Current weight: {}", kg(self.user.current_weight));
        let _ = writeln!(out, "- Goal weight: {}", kg(self.user.goal_weight));
        match self.user.height {
            Some(h) => {
                let _ = writeln!(out, "- Height: {h:.0} cm");
            }
            None => {
                let _ = writeln!(out, "- Height: unknown");
            }
        }
        if let Some(diff) = self.user.weight_to_lose() {
            let _ = writeln!(out, "- Weight to lose: {diff:.1} kg");
        }
        let _ = writeln!(out, "- Timezone: {}", self.user.timezone);
        let _ = writeln!(
            out,
            "- Local time now: {}",
            now.with_timezone(&tz).format("%Y-%m-%d %H:%M")
        );

        let _ = writeln!(out, "\nWEIGHT HISTORY (most recent first)");
        if self.weights.is_empty() {
            let _ = writeln!(out, "- No weight logs yet");
        }
        for w in &self.weights {
            let _ = writeln!(
                out,
                "- {}: {:.1} kg",
                w.logged_at.with_timezone(&tz).format("%Y-%m-%d"),
                w.weight
            );
        }

        let _ = writeln!(out, "\nFASTING");
        match self.fasting_stats() {
            Some(s) => {
                let _ = writeln!(
                    out,
                    "- Completed fasts: {}, average {:.1} h, longest {:.1} h",
                    s.completed, s.average_hours, s.longest_hours
                );
            }
            None => {
                let _ = writeln!(out, "- No completed fasts yet");
            }
        }
        for f in &self.fasts {
            let start = f.started_at.with_timezone(&tz).format("%Y-%m-%d %H:%M");
            if f.is_open() {
                let _ = writeln!(
                    out,
                    "- Currently fasting since {start} ({} so far)",
                    format_duration(f.duration(now))
                );
            } else {
                let _ = writeln!(out, "- {start}: {}", format_duration(f.duration(now)));
            }
        }

        let _ = writeln!(out, "\nMEALS (most recent first)");
        if self.foods.is_empty() {
            let _ = writeln!(out, "- No meals logged yet");
        }
        for meal in &self.foods {
            let items: Vec<&str> = meal.items.iter().map(|i| i.name.as_str()).collect();
            let _ = write!(
                out,
                "- {} {}: {:.0} kcal",
                meal.logged_at.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
                meal.meal_label(),
                meal.calories
            );
            if !items.is_empty() {
                let _ = write!(out, " ({})", items.join(", "));
            }
            out.push('\n');
        }

        out
    }
}

fn kg(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1} kg"))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;
    use crate::meals::{FoodItem, MealType};
    use crate::onboarding::OnboardingStep;
    use crate::store::LibSqlBackend;

    fn onboarded_user() -> User {
        let mut user = User::new(7, "Ada");
        user.current_weight = Some(82.0);
        user.goal_weight = Some(75.0);
        user.height = Some(170.0);
        user.timezone = "Europe/Berlin".into();
        user.onboarding_step = OnboardingStep::Completed;
        user
    }

    fn fast(start: DateTime<Utc>, hours: i64) -> FastingPeriod {
        FastingPeriod {
            id: Uuid::new_v4(),
            telegram_id: 7,
            started_at: start,
            ended_at: Some(start + Duration::hours(hours)),
        }
    }

    #[test]
    fn stats_ignore_open_fast() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap();
        let ctx = UserContext {
            user: onboarded_user(),
            weights: vec![],
            fasts: vec![
                FastingPeriod::start(7, t0 + Duration::days(2)),
                fast(t0, 16),
                fast(t0 + Duration::days(1), 18),
            ],
            foods: vec![],
        };
        let stats = ctx.fasting_stats().unwrap();
        assert_eq!(stats.completed, 2);
        assert!((stats.average_hours - 17.0).abs() < 1e-9);
        assert!((stats.longest_hours - 18.0).abs() < 1e-9);
    }

    #[test]
    fn no_completed_fasts_has_no_stats() {
        let ctx = UserContext {
            user: onboarded_user(),
            weights: vec![],
            fasts: vec![FastingPeriod::start(7, Utc::now())],
            foods: vec![],
        };
        assert!(ctx.fasting_stats().is_none());
    }

    #[test]
    fn render_uses_local_time_and_lists_meals() {
        let logged = Utc.with_ymd_and_hms(2025, 3, 1, 11, 30, 0).unwrap();
        let ctx = UserContext {
            user: onboarded_user(),
            weights: vec![],
            fasts: vec![],
            foods: vec![FoodLog {
                id: Uuid::new_v4(),
                telegram_id: 7,
                calories: 640.0,
                protein: Some(30.0),
                carbs: None,
                fat: None,
                items: vec![FoodItem {
                    name: "pasta".into(),
                    calories: Some(640.0),
                    portion: None,
                }],
                meal_type: Some(MealType::Lunch),
                notes: None,
                logged_at: logged,
            }],
        };
        let text = ctx.render(logged);
        assert!(text.contains("Weight to lose: 7.0 kg"));
        assert!(text.contains("2025-03-01 12:30 lunch: 640 kcal (pasta)"));
        assert!(text.contains("No weight logs yet"));
        assert!(text.contains("No completed fasts yet"));
    }

    #[tokio::test]
    async fn gather_reads_history() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let user = db.ensure_user(&onboarded_user()).await.unwrap();
        db.insert_weight_log(&WeightLog {
            id: Uuid::new_v4(),
            telegram_id: 7,
            weight: 82.0,
            logged_at: Utc::now(),
        })
        .await
        .unwrap();
        db.start_fast(&FastingPeriod::start(7, Utc::now())).await.unwrap();

        let ctx = UserContext::gather(&db, user).await.unwrap();
        assert_eq!(ctx.weights.len(), 1);
        assert_eq!(ctx.fasts.len(), 1);
        assert!(ctx.foods.is_empty());
    }
}
