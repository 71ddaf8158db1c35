//! Fasting tracker: one open period per user, toggled from the menu.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::Database;

/// A fasting window. Open while `ended_at` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FastingPeriod {
    pub id: Uuid,
    pub telegram_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl FastingPeriod {
    pub fn start(telegram_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            telegram_id,
            started_at: at,
            ended_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Elapsed time, up to `now` for an open period.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.ended_at.unwrap_or(now) - self.started_at
    }
}

/// `Xh Ym`, or `Ym` under an hour.
pub fn format_duration(d: Duration) -> String {
    let total_minutes = d.num_minutes().max(0);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Result of pressing the fasting button.
#[derive(Debug, Clone, PartialEq)]
pub enum FastToggle {
    Started(FastingPeriod),
    Ended {
        period: FastingPeriod,
        duration: Duration,
    },
}

impl FastToggle {
    pub fn message(&self) -> String {
        match self {
            Self::Started(_) => "🕐 Fast started!\n\n\
                                 I've recorded the start time. Tap \"⏰ Break Fast\" again \
                                 when you're ready to eat.\n\n\
                                 Good luck! Remember: staying hydrated helps."
                .to_string(),
            Self::Ended { duration, .. } => format!(
                "⏰ Fast ended!\n\nYou fasted for {}. Great job!\n\n\
                 📸 Want to log your first meal? Send me a photo!",
                format_duration(*duration)
            ),
        }
    }
}

pub struct FastingService {
    db: Arc<dyn Database>,
}

impl FastingService {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// End the open fast if there is one, otherwise start a new one.
    pub async fn toggle(&self, telegram_id: i64) -> Result<FastToggle, DatabaseError> {
        let now = Utc::now();
        if let Some(open) = self.db.get_open_fast(telegram_id).await? {
            if self.db.end_fast(open.id, now).await? {
                let duration = open.duration(now);
                info!(telegram_id, minutes = duration.num_minutes(), "Fast ended");
                let period = FastingPeriod {
                    ended_at: Some(now),
                    ..open
                };
                return Ok(FastToggle::Ended { period, duration });
            }
            // Closed concurrently; fall through and start a fresh one.
            warn!(telegram_id, fast_id = %open.id, "Open fast was closed concurrently");
        }
        self.start(telegram_id, now).await.map(FastToggle::Started)
    }

    /// Open a new period. A concurrent start surfaces as `Constraint`.
    pub async fn start(
        &self,
        telegram_id: i64,
        at: DateTime<Utc>,
    ) -> Result<FastingPeriod, DatabaseError> {
        let period = FastingPeriod::start(telegram_id, at);
        self.db.start_fast(&period).await?;
        info!(telegram_id, fast_id = %period.id, "Fast started");
        Ok(period)
    }
}
