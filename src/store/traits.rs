//! Unified `Database` trait: single async interface for all persistence.
//!
//! Uniqueness and single-use rules are enforced by the schema (partial
//! unique indexes) and by conditional updates, never by read-then-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::code::{LoginCode, Session};
use crate::error::DatabaseError;
use crate::fasting::FastingPeriod;
use crate::meals::{DailySummary, FoodLog};
use crate::onboarding::model::{User, WeightLog};
use crate::onboarding::state::OnboardingStep;

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user(&self, telegram_id: i64) -> Result<Option<User>, DatabaseError>;

    /// Insert `user` unless a row with its id exists, then return the stored row.
    async fn ensure_user(&self, user: &User) -> Result<User, DatabaseError>;

    /// Persist `user` only if its stored step is still `from`. Returns
    /// `false` when another message advanced the user first.
    async fn advance_onboarding(
        &self,
        user: &User,
        from: OnboardingStep,
    ) -> Result<bool, DatabaseError>;

    async fn insert_weight_log(&self, log: &WeightLog) -> Result<(), DatabaseError>;

    /// Most recent first.
    async fn list_weight_logs(
        &self,
        telegram_id: i64,
        limit: usize,
    ) -> Result<Vec<WeightLog>, DatabaseError>;

    // ── Fasting ─────────────────────────────────────────────────────

    /// Open a fasting period. Fails with `Constraint` if one is already open.
    async fn start_fast(&self, period: &FastingPeriod) -> Result<(), DatabaseError>;

    async fn get_open_fast(&self, telegram_id: i64)
    -> Result<Option<FastingPeriod>, DatabaseError>;

    /// Close an open period. Returns `false` if it was already closed.
    async fn end_fast(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<bool, DatabaseError>;

    /// Most recent first.
    async fn list_fasts(
        &self,
        telegram_id: i64,
        limit: usize,
    ) -> Result<Vec<FastingPeriod>, DatabaseError>;

    // ── Food ────────────────────────────────────────────────────────

    async fn insert_food_log(&self, log: &FoodLog) -> Result<(), DatabaseError>;

    /// Logs with `start <= logged_at < end`, oldest first.
    async fn list_food_logs_between(
        &self,
        telegram_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FoodLog>, DatabaseError>;

    /// Most recent first.
    async fn list_recent_food_logs(
        &self,
        telegram_id: i64,
        limit: usize,
    ) -> Result<Vec<FoodLog>, DatabaseError>;

    async fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<(), DatabaseError>;

    // ── Login codes ─────────────────────────────────────────────────

    /// Insert a new code. Fails with `Constraint` if another pending row
    /// carries the same code.
    async fn insert_login_code(&self, code: &LoginCode) -> Result<(), DatabaseError>;

    /// Latest row for an (uppercase) code, whatever its status.
    async fn get_login_code(&self, code: &str) -> Result<Option<LoginCode>, DatabaseError>;

    /// The pending row for an (uppercase) code.
    async fn get_pending_login_code(&self, code: &str)
    -> Result<Option<LoginCode>, DatabaseError>;

    /// Mark a pending code expired. Returns `false` if it was not pending.
    async fn expire_login_code(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Count one failed verification, expiring the code when the count reaches
    /// `max_attempts`. Returns the new count, or `None` if the code is no
    /// longer pending.
    async fn record_login_code_failure(
        &self,
        id: Uuid,
        max_attempts: u32,
    ) -> Result<Option<u32>, DatabaseError>;

    /// Pending → verified, bound to a user and session. Returns `false` if
    /// the code was no longer pending.
    async fn consume_login_code(
        &self,
        id: Uuid,
        telegram_id: i64,
        session_token: &str,
        verified_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    async fn create_session(&self, session: &Session) -> Result<(), DatabaseError>;

    /// The session for `token` if it expires after `now`.
    async fn get_valid_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, DatabaseError>;

    async fn get_session(&self, token: &str) -> Result<Option<Session>, DatabaseError>;

    async fn delete_session(&self, token: &str) -> Result<bool, DatabaseError>;

    /// Delete sessions that expired at or before `now`.
    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError>;
}
