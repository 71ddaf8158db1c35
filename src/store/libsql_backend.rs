//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::code::{CodeStatus, LoginCode, Session};
use crate::error::DatabaseError;
use crate::fasting::FastingPeriod;
use crate::meals::{DailySummary, FoodItem, FoodLog, MealType};
use crate::onboarding::model::{User, WeightLog};
use crate::onboarding::state::OnboardingStep;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp encoding. Fixed width, so text order is time order.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str, context: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Query(format!("{context} id parse: {e}")))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

/// Read the first row of a query, mapped through `f`.
async fn first_row<T>(
    mut rows: libsql::Rows,
    context: &str,
    f: impl FnOnce(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Option<T>, DatabaseError> {
    match rows.next().await {
        Ok(Some(row)) => f(&row).map(Some),
        Ok(None) => Ok(None),
        Err(e) => Err(DatabaseError::Query(format!("{context}: {e}"))),
    }
}

/// Read every row of a query, mapped through `f`.
async fn all_rows<T>(
    mut rows: libsql::Rows,
    context: &str,
    f: impl Fn(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => out.push(f(&row)?),
            Ok(None) => break,
            Err(e) => return Err(DatabaseError::Query(format!("{context}: {e}"))),
        }
    }
    Ok(out)
}

// ── Row mappers ─────────────────────────────────────────────────────

const USER_COLUMNS: &str = "telegram_id, first_name, current_weight, goal_weight, height, timezone, onboarding_step, created_at, updated_at";

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let step_str: String = row.get(6).unwrap_or_else(|_| "weight".to_string());
    let created_str: String = row.get(7).unwrap_or_default();
    let updated_str: String = row.get(8).unwrap_or_default();
    Ok(User {
        telegram_id: row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("user.telegram_id: {e}")))?,
        first_name: row.get(1).unwrap_or_default(),
        current_weight: row.get::<f64>(2).ok(),
        goal_weight: row.get::<f64>(3).ok(),
        height: row.get::<f64>(4).ok(),
        timezone: row.get(5).unwrap_or_else(|_| "UTC".to_string()),
        onboarding_step: step_str.parse().unwrap_or_default(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_weight_log(row: &libsql::Row) -> Result<WeightLog, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("weight_log.id: {e}")))?;
    let logged_str: String = row.get(3).unwrap_or_default();
    Ok(WeightLog {
        id: parse_uuid(&id_str, "weight_log")?,
        telegram_id: row.get(1).unwrap_or_default(),
        weight: row.get(2).unwrap_or_default(),
        logged_at: parse_datetime(&logged_str),
    })
}

const FAST_COLUMNS: &str = "id, telegram_id, started_at, ended_at";

fn row_to_fast(row: &libsql::Row) -> Result<FastingPeriod, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("fast.id: {e}")))?;
    let started_str: String = row.get(2).unwrap_or_default();
    let ended_str: Option<String> = row.get(3).ok();
    Ok(FastingPeriod {
        id: parse_uuid(&id_str, "fast")?,
        telegram_id: row.get(1).unwrap_or_default(),
        started_at: parse_datetime(&started_str),
        ended_at: parse_optional_datetime(&ended_str),
    })
}

const FOOD_COLUMNS: &str =
    "id, telegram_id, calories, protein, carbs, fat, items, meal_type, notes, logged_at";

fn row_to_food_log(row: &libsql::Row) -> Result<FoodLog, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("food_log.id: {e}")))?;
    let items_str: String = row.get(6).unwrap_or_else(|_| "[]".to_string());
    let items: Vec<FoodItem> = serde_json::from_str(&items_str).unwrap_or_default();
    let meal_str: Option<String> = row.get(7).ok();
    let logged_str: String = row.get(9).unwrap_or_default();
    Ok(FoodLog {
        id: parse_uuid(&id_str, "food_log")?,
        telegram_id: row.get(1).unwrap_or_default(),
        calories: row.get(2).unwrap_or_default(),
        protein: row.get::<f64>(3).ok(),
        carbs: row.get::<f64>(4).ok(),
        fat: row.get::<f64>(5).ok(),
        items,
        meal_type: meal_str.as_deref().and_then(MealType::parse),
        notes: row.get(8).ok(),
        logged_at: parse_datetime(&logged_str),
    })
}

const CODE_COLUMNS: &str = "id, code, status, attempts, telegram_id, session_token, created_at, expires_at, verified_at";

fn row_to_login_code(row: &libsql::Row) -> Result<LoginCode, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("login_code.id: {e}")))?;
    let status_str: String = row.get(2).unwrap_or_else(|_| "pending".to_string());
    let created_str: String = row.get(6).unwrap_or_default();
    let expires_str: String = row.get(7).unwrap_or_default();
    let verified_str: Option<String> = row.get(8).ok();
    Ok(LoginCode {
        id: parse_uuid(&id_str, "login_code")?,
        code: row.get(1).unwrap_or_default(),
        status: CodeStatus::parse(&status_str),
        attempts: row.get::<i64>(3).unwrap_or(0) as u32,
        telegram_id: row.get::<i64>(4).ok(),
        session_token: row.get(5).ok(),
        created_at: parse_datetime(&created_str),
        expires_at: parse_datetime(&expires_str),
        verified_at: parse_optional_datetime(&verified_str),
    })
}

const SESSION_COLUMNS: &str = "token, telegram_id, created_at, expires_at";

fn row_to_session(row: &libsql::Row) -> Result<Session, DatabaseError> {
    let created_str: String = row.get(2).unwrap_or_default();
    let expires_str: String = row.get(3).unwrap_or_default();
    Ok(Session {
        token: row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("session.token: {e}")))?,
        telegram_id: row.get(1).unwrap_or_default(),
        created_at: parse_datetime(&created_str),
        expires_at: parse_datetime(&expires_str),
    })
}

const SUMMARY_COLUMNS: &str = "telegram_id, date, total_calories, total_protein, total_carbs, total_fat, meal_count, fasting_hours, summary, updated_at";

#[cfg(test)]
fn row_to_daily_summary(row: &libsql::Row) -> Result<DailySummary, DatabaseError> {
    let date_str: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("daily_summary.date: {e}")))?;
    let updated_str: String = row.get(9).unwrap_or_default();
    Ok(DailySummary {
        telegram_id: row.get(0).unwrap_or_default(),
        date: chrono::NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| DatabaseError::Query(format!("daily_summary.date parse: {e}")))?,
        total_calories: row.get(2).unwrap_or_default(),
        total_protein: row.get(3).unwrap_or_default(),
        total_carbs: row.get(4).unwrap_or_default(),
        total_fat: row.get(5).unwrap_or_default(),
        meal_count: row.get::<i64>(6).unwrap_or(0) as u32,
        fasting_hours: row.get(7).unwrap_or_default(),
        summary: row.get(8).unwrap_or_default(),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user(&self, telegram_id: i64) -> Result<Option<User>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ?1"),
                params![telegram_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;
        first_row(rows, "get_user", row_to_user).await
    }

    async fn ensure_user(&self, user: &User) -> Result<User, DatabaseError> {
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO users (telegram_id, first_name, current_weight, goal_weight,
                    height, timezone, onboarding_step, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user.telegram_id,
                    user.first_name.clone(),
                    opt_real(user.current_weight),
                    opt_real(user.goal_weight),
                    opt_real(user.height),
                    user.timezone.clone(),
                    user.onboarding_step.as_str(),
                    fmt_ts(user.created_at),
                    fmt_ts(user.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("ensure_user", e))?;

        if inserted > 0 {
            info!(telegram_id = user.telegram_id, "User created");
        }

        self.get_user(user.telegram_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".to_string(),
                id: user.telegram_id.to_string(),
            })
    }

    async fn advance_onboarding(
        &self,
        user: &User,
        from: OnboardingStep,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE users SET current_weight = ?2, goal_weight = ?3, height = ?4,
                    timezone = ?5, onboarding_step = ?6, updated_at = ?7
                 WHERE telegram_id = ?1 AND onboarding_step = ?8",
                params![
                    user.telegram_id,
                    opt_real(user.current_weight),
                    opt_real(user.goal_weight),
                    opt_real(user.height),
                    user.timezone.clone(),
                    user.onboarding_step.as_str(),
                    fmt_ts(Utc::now()),
                    from.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("advance_onboarding: {e}")))?;

        debug!(telegram_id = user.telegram_id, from = %from, to = %user.onboarding_step, advanced = count > 0, "Onboarding step write");
        Ok(count > 0)
    }

    async fn insert_weight_log(&self, log: &WeightLog) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO weight_logs (id, telegram_id, weight, logged_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    log.id.to_string(),
                    log.telegram_id,
                    log.weight,
                    fmt_ts(log.logged_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("insert_weight_log", e))?;
        Ok(())
    }

    async fn list_weight_logs(
        &self,
        telegram_id: i64,
        limit: usize,
    ) -> Result<Vec<WeightLog>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "SELECT id, telegram_id, weight, logged_at FROM weight_logs
                 WHERE telegram_id = ?1 ORDER BY logged_at DESC LIMIT ?2",
                params![telegram_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_weight_logs: {e}")))?;
        all_rows(rows, "list_weight_logs", row_to_weight_log).await
    }

    // ── Fasting ─────────────────────────────────────────────────────

    async fn start_fast(&self, period: &FastingPeriod) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO fasting_periods (id, telegram_id, started_at, ended_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    period.id.to_string(),
                    period.telegram_id,
                    fmt_ts(period.started_at),
                    opt_text(period.ended_at.map(fmt_ts).as_deref()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("start_fast", e))?;
        Ok(())
    }

    async fn get_open_fast(
        &self,
        telegram_id: i64,
    ) -> Result<Option<FastingPeriod>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {FAST_COLUMNS} FROM fasting_periods
                     WHERE telegram_id = ?1 AND ended_at IS NULL"
                ),
                params![telegram_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_open_fast: {e}")))?;
        first_row(rows, "get_open_fast", row_to_fast).await
    }

    async fn end_fast(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE fasting_periods SET ended_at = ?2 WHERE id = ?1 AND ended_at IS NULL",
                params![id.to_string(), fmt_ts(ended_at)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("end_fast: {e}")))?;
        Ok(count > 0)
    }

    async fn list_fasts(
        &self,
        telegram_id: i64,
        limit: usize,
    ) -> Result<Vec<FastingPeriod>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {FAST_COLUMNS} FROM fasting_periods
                     WHERE telegram_id = ?1 ORDER BY started_at DESC LIMIT ?2"
                ),
                params![telegram_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_fasts: {e}")))?;
        all_rows(rows, "list_fasts", row_to_fast).await
    }

    // ── Food ────────────────────────────────────────────────────────

    async fn insert_food_log(&self, log: &FoodLog) -> Result<(), DatabaseError> {
        let items = serde_json::to_string(&log.items)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                &format!("INSERT INTO food_logs ({FOOD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    log.id.to_string(),
                    log.telegram_id,
                    log.calories,
                    opt_real(log.protein),
                    opt_real(log.carbs),
                    opt_real(log.fat),
                    items,
                    opt_text(log.meal_type.map(|m| m.as_str())),
                    opt_text(log.notes.as_deref()),
                    fmt_ts(log.logged_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("insert_food_log", e))?;

        debug!(food_log_id = %log.id, telegram_id = log.telegram_id, calories = log.calories, "Food logged");
        Ok(())
    }

    async fn list_food_logs_between(
        &self,
        telegram_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FoodLog>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {FOOD_COLUMNS} FROM food_logs
                     WHERE telegram_id = ?1 AND logged_at >= ?2 AND logged_at < ?3
                     ORDER BY logged_at ASC"
                ),
                params![telegram_id, fmt_ts(start), fmt_ts(end)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_food_logs_between: {e}")))?;
        all_rows(rows, "list_food_logs_between", row_to_food_log).await
    }

    async fn list_recent_food_logs(
        &self,
        telegram_id: i64,
        limit: usize,
    ) -> Result<Vec<FoodLog>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {FOOD_COLUMNS} FROM food_logs
                     WHERE telegram_id = ?1 ORDER BY logged_at DESC LIMIT ?2"
                ),
                params![telegram_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_recent_food_logs: {e}")))?;
        all_rows(rows, "list_recent_food_logs", row_to_food_log).await
    }

    async fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO daily_summaries ({SUMMARY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT (telegram_id, date) DO UPDATE SET
                        total_calories = ?3, total_protein = ?4, total_carbs = ?5,
                        total_fat = ?6, meal_count = ?7, fasting_hours = ?8,
                        summary = ?9, updated_at = ?10"
                ),
                params![
                    summary.telegram_id,
                    summary.date.format("%Y-%m-%d").to_string(),
                    summary.total_calories,
                    summary.total_protein,
                    summary.total_carbs,
                    summary.total_fat,
                    i64::from(summary.meal_count),
                    summary.fasting_hours,
                    summary.summary.clone(),
                    fmt_ts(summary.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("upsert_daily_summary", e))?;
        Ok(())
    }

    // ── Login codes ─────────────────────────────────────────────────

    async fn insert_login_code(&self, code: &LoginCode) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO login_codes ({CODE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    code.id.to_string(),
                    code.code.clone(),
                    code.status.as_str(),
                    i64::from(code.attempts),
                    opt_int(code.telegram_id),
                    opt_text(code.session_token.as_deref()),
                    fmt_ts(code.created_at),
                    fmt_ts(code.expires_at),
                    opt_text(code.verified_at.map(fmt_ts).as_deref()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("insert_login_code", e))?;
        debug!(code_id = %code.id, "Login code stored");
        Ok(())
    }

    async fn get_login_code(&self, code: &str) -> Result<Option<LoginCode>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CODE_COLUMNS} FROM login_codes WHERE code = upper(?1)
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![code],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_login_code: {e}")))?;
        first_row(rows, "get_login_code", row_to_login_code).await
    }

    async fn get_pending_login_code(
        &self,
        code: &str,
    ) -> Result<Option<LoginCode>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CODE_COLUMNS} FROM login_codes WHERE code = upper(?1) AND status = 'pending'"
                ),
                params![code],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_pending_login_code: {e}")))?;
        first_row(rows, "get_pending_login_code", row_to_login_code).await
    }

    async fn expire_login_code(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE login_codes SET status = 'expired' WHERE id = ?1 AND status = 'pending'",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("expire_login_code: {e}")))?;
        Ok(count > 0)
    }

    async fn record_login_code_failure(
        &self,
        id: Uuid,
        max_attempts: u32,
    ) -> Result<Option<u32>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "UPDATE login_codes
                 SET attempts = attempts + 1,
                     status = CASE WHEN attempts + 1 >= ?2 THEN 'expired' ELSE status END
                 WHERE id = ?1 AND status = 'pending'
                 RETURNING attempts",
                params![id.to_string(), i64::from(max_attempts)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_login_code_failure: {e}")))?;
        first_row(rows, "record_login_code_failure", |row| {
            row.get::<i64>(0)
                .map(|n| n as u32)
                .map_err(|e| DatabaseError::Query(format!("attempts: {e}")))
        })
        .await
    }

    async fn consume_login_code(
        &self,
        id: Uuid,
        telegram_id: i64,
        session_token: &str,
        verified_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE login_codes
                 SET status = 'verified', telegram_id = ?2, session_token = ?3, verified_at = ?4
                 WHERE id = ?1 AND status = 'pending'",
                params![id.to_string(), telegram_id, session_token, fmt_ts(verified_at)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("consume_login_code: {e}")))?;
        Ok(count > 0)
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn create_session(&self, session: &Session) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"),
                params![
                    session.token.clone(),
                    session.telegram_id,
                    fmt_ts(session.created_at),
                    fmt_ts(session.expires_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("create_session", e))?;
        Ok(())
    }

    async fn get_valid_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token = ?1 AND expires_at > ?2"),
                params![token, fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_valid_session: {e}")))?;
        first_row(rows, "get_valid_session", row_to_session).await
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token = ?1"),
                params![token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;
        first_row(rows, "get_session", row_to_session).await
    }

    async fn delete_session(&self, token: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        Ok(count > 0)
    }

    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![fmt_ts(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_expired_sessions: {e}")))?;

        if count > 0 {
            info!(count, "Pruned expired sessions");
        }
        Ok(count as usize)
    }
}

#[cfg(test)]
impl LibSqlBackend {
    pub(crate) async fn get_daily_summary(
        &self,
        telegram_id: i64,
        date: chrono::NaiveDate,
    ) -> Result<Option<DailySummary>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUMMARY_COLUMNS} FROM daily_summaries WHERE telegram_id = ?1 AND date = ?2"
                ),
                params![telegram_id, date.format("%Y-%m-%d").to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_daily_summary: {e}")))?;
        first_row(rows, "get_daily_summary", row_to_daily_summary).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    async fn db_with_user(id: i64) -> LibSqlBackend {
        let db = test_db().await;
        db.ensure_user(&User::new(id, "Ada")).await.unwrap();
        db
    }

    fn food(telegram_id: i64, calories: f64, at: DateTime<Utc>) -> FoodLog {
        FoodLog {
            id: Uuid::new_v4(),
            telegram_id,
            calories,
            protein: Some(20.0),
            carbs: None,
            fat: Some(10.5),
            items: vec![FoodItem {
                name: "eggs".into(),
                calories: Some(calories),
                portion: Some("2 large".into()),
            }],
            meal_type: Some(MealType::Breakfast),
            notes: None,
            logged_at: at,
        }
    }

    // ── User tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn ensure_user_is_idempotent() {
        let db = test_db().await;
        let first = db.ensure_user(&User::new(5, "Ada")).await.unwrap();
        assert_eq!(first.onboarding_step, OnboardingStep::Weight);

        let mut changed = first.clone();
        changed.current_weight = Some(80.0);
        changed.onboarding_step = OnboardingStep::Goal;
        assert!(db.advance_onboarding(&changed, OnboardingStep::Weight).await.unwrap());

        // A second ensure must not reset progress
        let again = db.ensure_user(&User::new(5, "Ada")).await.unwrap();
        assert_eq!(again.onboarding_step, OnboardingStep::Goal);
        assert_eq!(again.current_weight, Some(80.0));
    }

    #[tokio::test]
    async fn get_user_not_found() {
        let db = test_db().await;
        assert!(db.get_user(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn advance_requires_expected_step() {
        let db = db_with_user(1).await;
        let mut user = db.get_user(1).await.unwrap().unwrap();
        user.current_weight = Some(80.0);
        user.onboarding_step = OnboardingStep::Goal;
        assert!(db.advance_onboarding(&user, OnboardingStep::Weight).await.unwrap());
        // Replaying the same transition is a no-op
        assert!(!db.advance_onboarding(&user, OnboardingStep::Weight).await.unwrap());
        let stored = db.get_user(1).await.unwrap().unwrap();
        assert_eq!(stored.onboarding_step, OnboardingStep::Goal);
    }

    #[tokio::test]
    async fn weight_logs_newest_first() {
        let db = db_with_user(1).await;
        let now = Utc::now();
        for (i, w) in [80.0, 79.5, 79.0].into_iter().enumerate() {
            db.insert_weight_log(&WeightLog {
                id: Uuid::new_v4(),
                telegram_id: 1,
                weight: w,
                logged_at: now + Duration::days(i as i64),
            })
            .await
            .unwrap();
        }
        let logs = db.list_weight_logs(1, 2).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].weight, 79.0);
    }

    // ── Fasting tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn one_open_fast_per_user() {
        let db = db_with_user(1).await;
        db.start_fast(&FastingPeriod::start(1, Utc::now())).await.unwrap();
        let err = db
            .start_fast(&FastingPeriod::start(1, Utc::now()))
            .await
            .unwrap_err();
        assert!(err.is_constraint());
    }

    #[tokio::test]
    async fn end_fast_is_conditional() {
        let db = db_with_user(1).await;
        let period = FastingPeriod::start(1, Utc::now() - Duration::hours(16));
        db.start_fast(&period).await.unwrap();

        assert!(db.end_fast(period.id, Utc::now()).await.unwrap());
        assert!(!db.end_fast(period.id, Utc::now()).await.unwrap());
        assert!(db.get_open_fast(1).await.unwrap().is_none());

        // A new one can be opened after closing
        db.start_fast(&FastingPeriod::start(1, Utc::now())).await.unwrap();
        assert_eq!(db.list_fasts(1, 10).await.unwrap().len(), 2);
    }

    // ── Food tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn food_log_roundtrip_and_range() {
        let db = db_with_user(1).await;
        let now = Utc::now();
        let inside = food(1, 350.0, now);
        db.insert_food_log(&inside).await.unwrap();
        db.insert_food_log(&food(1, 900.0, now - Duration::days(2)))
            .await
            .unwrap();

        let logs = db
            .list_food_logs_between(1, now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        let fetched = &logs[0];
        assert_eq!(fetched.id, inside.id);
        assert_eq!(fetched.protein, Some(20.0));
        assert_eq!(fetched.carbs, None);
        assert_eq!(fetched.items, inside.items);
        assert_eq!(fetched.meal_type, Some(MealType::Breakfast));

        let recent = db.list_recent_food_logs(1, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].calories, 350.0);
    }

    #[tokio::test]
    async fn daily_summary_upserts() {
        let db = db_with_user(1).await;
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let mut summary = DailySummary {
            telegram_id: 1,
            date,
            total_calories: 1200.0,
            total_protein: 80.0,
            total_carbs: 100.0,
            total_fat: 40.0,
            meal_count: 2,
            fasting_hours: 16.0,
            summary: "Solid day".into(),
            updated_at: Utc::now(),
        };
        db.upsert_daily_summary(&summary).await.unwrap();
        summary.total_calories = 1500.0;
        summary.meal_count = 3;
        db.upsert_daily_summary(&summary).await.unwrap();

        let stored = db.get_daily_summary(1, date).await.unwrap().unwrap();
        assert_eq!(stored.total_calories, 1500.0);
        assert_eq!(stored.meal_count, 3);
    }

    // ── Login code tests ────────────────────────────────────────────

    #[tokio::test]
    async fn pending_codes_are_unique() {
        let db = test_db().await;
        let ttl = Duration::seconds(60);
        db.insert_login_code(&LoginCode::new("ABCD2345".into(), ttl))
            .await
            .unwrap();
        let err = db
            .insert_login_code(&LoginCode::new("ABCD2345".into(), ttl))
            .await
            .unwrap_err();
        assert!(err.is_constraint(), "{err}");
    }

    #[tokio::test]
    async fn code_lookup_is_case_insensitive() {
        let db = test_db().await;
        let code = LoginCode::new("ABCD2345".into(), Duration::seconds(60));
        db.insert_login_code(&code).await.unwrap();
        let found = db.get_pending_login_code("abcd2345").await.unwrap().unwrap();
        assert_eq!(found.id, code.id);
        assert_eq!(found.status, CodeStatus::Pending);
    }

    #[tokio::test]
    async fn consume_only_once() {
        let db = test_db().await;
        let code = LoginCode::new("ABCD2345".into(), Duration::seconds(60));
        db.insert_login_code(&code).await.unwrap();

        assert!(db.consume_login_code(code.id, 7, "tok", Utc::now()).await.unwrap());
        assert!(!db.consume_login_code(code.id, 8, "tok2", Utc::now()).await.unwrap());

        let stored = db.get_login_code("ABCD2345").await.unwrap().unwrap();
        assert_eq!(stored.status, CodeStatus::Verified);
        assert_eq!(stored.telegram_id, Some(7));
        assert_eq!(stored.session_token.as_deref(), Some("tok"));
        assert!(db.get_pending_login_code("ABCD2345").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failures_expire_at_limit() {
        let db = test_db().await;
        let code = LoginCode::new("ABCD2345".into(), Duration::seconds(60));
        db.insert_login_code(&code).await.unwrap();

        assert_eq!(db.record_login_code_failure(code.id, 3).await.unwrap(), Some(1));
        assert_eq!(db.record_login_code_failure(code.id, 3).await.unwrap(), Some(2));
        assert_eq!(db.record_login_code_failure(code.id, 3).await.unwrap(), Some(3));
        // No longer pending
        assert_eq!(db.record_login_code_failure(code.id, 3).await.unwrap(), None);

        let stored = db.get_login_code("ABCD2345").await.unwrap().unwrap();
        assert_eq!(stored.status, CodeStatus::Expired);
    }

    #[tokio::test]
    async fn expired_code_frees_the_value() {
        let db = test_db().await;
        let ttl = Duration::seconds(60);
        let first = LoginCode::new("ABCD2345".into(), ttl);
        db.insert_login_code(&first).await.unwrap();
        assert!(db.expire_login_code(first.id).await.unwrap());
        assert!(!db.expire_login_code(first.id).await.unwrap());
        db.insert_login_code(&LoginCode::new("ABCD2345".into(), ttl))
            .await
            .unwrap();
    }

    // ── Session tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn session_validity_and_prune() {
        let db = test_db().await;
        let live = Session::new(1, Duration::days(7));
        let mut dead = Session::new(1, Duration::days(7));
        dead.expires_at = Utc::now() - Duration::minutes(1);
        db.create_session(&live).await.unwrap();
        db.create_session(&dead).await.unwrap();

        let now = Utc::now();
        assert!(db.get_valid_session(&live.token, now).await.unwrap().is_some());
        assert!(db.get_valid_session(&dead.token, now).await.unwrap().is_none());

        assert_eq!(db.prune_expired_sessions(now).await.unwrap(), 1);
        assert!(db.get_session(&dead.token).await.unwrap().is_none());

        assert!(db.delete_session(&live.token).await.unwrap());
        assert!(!db.delete_session(&live.token).await.unwrap());
    }

    #[tokio::test]
    async fn local_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fasttrack.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.ensure_user(&User::new(3, "Ada")).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.get_user(3).await.unwrap().is_some());
    }
}
