//! AuthService: login codes, web sessions, and the Telegram widget login.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, DatabaseError};
use crate::onboarding::model::{User, UserSummary};
use crate::store::Database;

use super::code::{self, LoginCode, MAX_ATTEMPTS, Session};
use super::widget::{self, WidgetLogin};

/// Regeneration attempts when a fresh code collides with a pending one.
pub const CODE_INSERT_ATTEMPTS: usize = 5;

/// What the dashboard sees when polling a code.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeState {
    Invalid,
    Expired,
    Pending {
        expires_at: DateTime<Utc>,
    },
    Verified {
        token: String,
        expires_at: DateTime<Utc>,
        user: Option<UserSummary>,
    },
}

/// An authenticated web request's identity.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub session: Session,
    pub user: User,
}

pub struct AuthService {
    db: Arc<dyn Database>,
    code_ttl: TimeDelta,
    session_ttl: TimeDelta,
    bot_token: SecretString,
}

impl AuthService {
    pub fn new(db: Arc<dyn Database>, config: &AuthConfig, bot_token: SecretString) -> Self {
        Self {
            db,
            code_ttl: to_delta(config.login_code_ttl),
            session_ttl: to_delta(config.session_ttl),
            bot_token,
        }
    }

    /// Create a fresh pending code, retrying on collisions.
    pub async fn generate_code(&self) -> Result<LoginCode, AuthError> {
        for attempt in 1..=CODE_INSERT_ATTEMPTS {
            let candidate = LoginCode::new(code::generate_code(), self.code_ttl);
            match self.db.insert_login_code(&candidate).await {
                Ok(()) => {
                    info!(code_id = %candidate.id, "Login code generated");
                    return Ok(candidate);
                }
                Err(e) if e.is_constraint() => {
                    debug!(attempt, "Login code collided with a pending code");
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!(attempts = CODE_INSERT_ATTEMPTS, "Could not generate a unique login code");
        Err(AuthError::CodeSpaceExhausted)
    }

    /// Poll a code's state, expiring it lazily once its time is up.
    ///
    /// Past its expiry a code reads as expired whatever its status, so a
    /// verified code stops handing out its session token.
    pub async fn code_status(&self, raw: &str) -> Result<CodeState, AuthError> {
        let Some(found) = self.db.get_login_code(&code::normalize_code(raw)).await? else {
            return Ok(CodeState::Invalid);
        };

        if found.is_expired_at(Utc::now()) {
            if found.status == code::CodeStatus::Pending {
                self.db.expire_login_code(found.id).await?;
            }
            return Ok(CodeState::Expired);
        }

        match found.status {
            code::CodeStatus::Verified => {
                let Some(token) = found.session_token else {
                    return Ok(CodeState::Expired);
                };
                let session = self.db.get_session(&token).await?;
                let user = match found.telegram_id {
                    Some(id) => self.db.get_user(id).await?.map(|u| u.summary()),
                    None => None,
                };
                Ok(CodeState::Verified {
                    expires_at: session.map(|s| s.expires_at).unwrap_or(found.expires_at),
                    token,
                    user,
                })
            }
            code::CodeStatus::Expired => Ok(CodeState::Expired),
            code::CodeStatus::Pending => Ok(CodeState::Pending {
                expires_at: found.expires_at,
            }),
        }
    }

    /// Exchange a code typed into the bot for a web session bound to the sender.
    pub async fn verify_code(
        &self,
        raw: &str,
        telegram_id: i64,
        first_name: &str,
    ) -> Result<Session, AuthError> {
        let normalized = code::normalize_code(raw);
        let pending = self
            .db
            .get_pending_login_code(&normalized)
            .await?
            .ok_or(AuthError::InvalidCode)?;

        if let Err(e) = pending.check_usable(Utc::now()) {
            self.db.expire_login_code(pending.id).await?;
            info!(code_id = %pending.id, reason = %e, "Login code rejected");
            return Err(e);
        }

        match self.bind(&pending, telegram_id, first_name).await {
            Ok(session) => {
                info!(code_id = %pending.id, telegram_id, "Login code verified");
                Ok(session)
            }
            Err(AuthError::AlreadyUsed) => Err(AuthError::AlreadyUsed),
            Err(e) => {
                warn!(code_id = %pending.id, error = %e, "Login code verification failed");
                match self.db.record_login_code_failure(pending.id, MAX_ATTEMPTS).await {
                    Ok(Some(attempts)) if attempts >= MAX_ATTEMPTS => {
                        info!(code_id = %pending.id, attempts, "Login code burned after failures");
                    }
                    Ok(_) => {}
                    Err(db_err) => warn!(error = %db_err, "Failed to record login code failure"),
                }
                Err(AuthError::VerificationFailed)
            }
        }
    }

    /// Steps after the code checks: user, session, conditional consume.
    async fn bind(
        &self,
        pending: &LoginCode,
        telegram_id: i64,
        first_name: &str,
    ) -> Result<Session, AuthError> {
        self.db
            .ensure_user(&User::new(telegram_id, first_name))
            .await?;

        let session = Session::new(telegram_id, self.session_ttl);
        self.db.create_session(&session).await?;

        let consumed = match self
            .db
            .consume_login_code(pending.id, telegram_id, &session.token, Utc::now())
            .await
        {
            Ok(consumed) => consumed,
            Err(e) => {
                self.discard_session(&session.token).await;
                return Err(e.into());
            }
        };
        if !consumed {
            self.discard_session(&session.token).await;
            info!(code_id = %pending.id, "Login code consumed concurrently");
            return Err(AuthError::AlreadyUsed);
        }
        Ok(session)
    }

    async fn discard_session(&self, token: &str) {
        if let Err(e) = self.db.delete_session(token).await {
            warn!(error = %e, "Failed to delete orphaned session");
        }
    }

    /// Resolve a bearer token to its session and user.
    pub async fn validate_session(&self, token: &str) -> Result<Authenticated, AuthError> {
        let session = self
            .db
            .get_valid_session(token, Utc::now())
            .await?
            .ok_or(AuthError::InvalidSession)?;
        let user = self
            .db
            .get_user(session.telegram_id)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        Ok(Authenticated { session, user })
    }

    /// Delete a session. Unknown tokens are not an error.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if self.db.delete_session(token).await? {
            info!("Session logged out");
        }
        Ok(())
    }

    /// Sign in with the Telegram Login Widget.
    pub async fn login_with_widget(&self, data: &WidgetLogin) -> Result<Authenticated, AuthError> {
        widget::verify(data, self.bot_token.expose_secret(), Utc::now())?;
        let user = self
            .db
            .ensure_user(&User::new(data.id, data.first_name.clone()))
            .await?;
        let session = Session::new(user.telegram_id, self.session_ttl);
        self.db.create_session(&session).await?;
        info!(telegram_id = user.telegram_id, "Widget login succeeded");
        Ok(Authenticated { session, user })
    }

    pub async fn prune_sessions(&self) -> Result<usize, DatabaseError> {
        self.db.prune_expired_sessions(Utc::now()).await
    }
}

/// Periodically delete expired sessions.
pub fn spawn_session_sweep(
    auth: Arc<AuthService>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = auth.prune_sessions().await {
                warn!(error = %e, "Session sweep failed");
            }
        }
    })
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::code::CodeStatus;
    use crate::store::LibSqlBackend;

    const TOKEN: &str = "123456:TEST-TOKEN";

    async fn service() -> (AuthService, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let svc = AuthService::new(
            db.clone(),
            &AuthConfig::default(),
            SecretString::from(TOKEN.to_string()),
        );
        (svc, db)
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let (svc, db) = service().await;
        let code = svc.generate_code().await.unwrap();

        let session = svc
            .verify_code(&code.code.to_lowercase(), 7, "Ada")
            .await
            .unwrap();
        assert_eq!(session.telegram_id, 7);
        assert!(db.get_user(7).await.unwrap().is_some());

        let again = svc.verify_code(&code.code, 7, "Ada").await;
        assert!(matches!(again, Err(AuthError::InvalidCode)));
    }

    #[tokio::test]
    async fn status_follows_lifecycle() {
        let (svc, _db) = service().await;
        assert_eq!(svc.code_status("ZZZZZZZZ").await.unwrap(), CodeState::Invalid);

        let code = svc.generate_code().await.unwrap();
        assert!(matches!(
            svc.code_status(&code.code).await.unwrap(),
            CodeState::Pending { .. }
        ));

        let session = svc.verify_code(&code.code, 7, "Ada").await.unwrap();
        match svc.code_status(&code.code).await.unwrap() {
            CodeState::Verified { token, user, .. } => {
                assert_eq!(token, session.token);
                assert_eq!(user.unwrap().telegram_id, 7);
            }
            other => panic!("expected verified, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_code_is_rejected_and_marked() {
        let (svc, db) = service().await;
        let mut stale = LoginCode::new("ABCD2345".into(), TimeDelta::seconds(60));
        stale.expires_at = Utc::now() - TimeDelta::seconds(1);
        db.insert_login_code(&stale).await.unwrap();

        assert!(matches!(
            svc.verify_code("ABCD2345", 7, "Ada").await,
            Err(AuthError::CodeExpired)
        ));
        let stored = db.get_login_code("ABCD2345").await.unwrap().unwrap();
        assert_eq!(stored.status, CodeStatus::Expired);
    }

    #[tokio::test]
    async fn polling_expires_lazily() {
        let (svc, db) = service().await;
        let mut stale = LoginCode::new("ABCD2345".into(), TimeDelta::seconds(60));
        stale.expires_at = Utc::now() - TimeDelta::seconds(1);
        db.insert_login_code(&stale).await.unwrap();

        assert_eq!(svc.code_status("abcd2345").await.unwrap(), CodeState::Expired);
        let stored = db.get_login_code("ABCD2345").await.unwrap().unwrap();
        assert_eq!(stored.status, CodeStatus::Expired);
    }

    #[tokio::test]
    async fn verified_code_reads_expired_after_ttl() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let config = AuthConfig {
            login_code_ttl: Duration::from_millis(300),
            ..AuthConfig::default()
        };
        let svc = AuthService::new(db.clone(), &config, SecretString::from(TOKEN.to_string()));

        let code = svc.generate_code().await.unwrap();
        svc.verify_code(&code.code, 7, "Ada").await.unwrap();
        assert!(matches!(
            svc.code_status(&code.code).await.unwrap(),
            CodeState::Verified { .. }
        ));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(svc.code_status(&code.code).await.unwrap(), CodeState::Expired);
        // The row keeps its verified status; only the poll result changes
        let stored = db.get_login_code(&code.code).await.unwrap().unwrap();
        assert_eq!(stored.status, CodeStatus::Verified);
    }

    /// Delegates to libSQL but refuses to create sessions.
    struct SessionlessDb(LibSqlBackend);

    #[async_trait::async_trait]
    impl Database for SessionlessDb {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            self.0.run_migrations().await
        }
        async fn get_user(&self, telegram_id: i64) -> Result<Option<User>, DatabaseError> {
            self.0.get_user(telegram_id).await
        }
        async fn ensure_user(&self, user: &User) -> Result<User, DatabaseError> {
            self.0.ensure_user(user).await
        }
        async fn advance_onboarding(
            &self,
            user: &User,
            from: crate::onboarding::OnboardingStep,
        ) -> Result<bool, DatabaseError> {
            self.0.advance_onboarding(user, from).await
        }
        async fn insert_weight_log(
            &self,
            log: &crate::onboarding::WeightLog,
        ) -> Result<(), DatabaseError> {
            self.0.insert_weight_log(log).await
        }
        async fn list_weight_logs(
            &self,
            telegram_id: i64,
            limit: usize,
        ) -> Result<Vec<crate::onboarding::WeightLog>, DatabaseError> {
            self.0.list_weight_logs(telegram_id, limit).await
        }
        async fn start_fast(
            &self,
            period: &crate::fasting::FastingPeriod,
        ) -> Result<(), DatabaseError> {
            self.0.start_fast(period).await
        }
        async fn get_open_fast(
            &self,
            telegram_id: i64,
        ) -> Result<Option<crate::fasting::FastingPeriod>, DatabaseError> {
            self.0.get_open_fast(telegram_id).await
        }
        async fn end_fast(
            &self,
            id: uuid::Uuid,
            ended_at: DateTime<Utc>,
        ) -> Result<bool, DatabaseError> {
            self.0.end_fast(id, ended_at).await
        }
        async fn list_fasts(
            &self,
            telegram_id: i64,
            limit: usize,
        ) -> Result<Vec<crate::fasting::FastingPeriod>, DatabaseError> {
            self.0.list_fasts(telegram_id, limit).await
        }
        async fn insert_food_log(&self, log: &crate::meals::FoodLog) -> Result<(), DatabaseError> {
            self.0.insert_food_log(log).await
        }
        async fn list_food_logs_between(
            &self,
            telegram_id: i64,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<crate::meals::FoodLog>, DatabaseError> {
            self.0.list_food_logs_between(telegram_id, start, end).await
        }
        async fn list_recent_food_logs(
            &self,
            telegram_id: i64,
            limit: usize,
        ) -> Result<Vec<crate::meals::FoodLog>, DatabaseError> {
            self.0.list_recent_food_logs(telegram_id, limit).await
        }
        async fn upsert_daily_summary(
            &self,
            summary: &crate::meals::DailySummary,
        ) -> Result<(), DatabaseError> {
            self.0.upsert_daily_summary(summary).await
        }
        async fn insert_login_code(&self, code: &LoginCode) -> Result<(), DatabaseError> {
            self.0.insert_login_code(code).await
        }
        async fn get_login_code(&self, code: &str) -> Result<Option<LoginCode>, DatabaseError> {
            self.0.get_login_code(code).await
        }
        async fn get_pending_login_code(
            &self,
            code: &str,
        ) -> Result<Option<LoginCode>, DatabaseError> {
            self.0.get_pending_login_code(code).await
        }
        async fn expire_login_code(&self, id: uuid::Uuid) -> Result<bool, DatabaseError> {
            self.0.expire_login_code(id).await
        }
        async fn record_login_code_failure(
            &self,
            id: uuid::Uuid,
            max_attempts: u32,
        ) -> Result<Option<u32>, DatabaseError> {
            self.0.record_login_code_failure(id, max_attempts).await
        }
        async fn consume_login_code(
            &self,
            id: uuid::Uuid,
            telegram_id: i64,
            session_token: &str,
            verified_at: DateTime<Utc>,
        ) -> Result<bool, DatabaseError> {
            self.0
                .consume_login_code(id, telegram_id, session_token, verified_at)
                .await
        }
        async fn create_session(&self, _session: &Session) -> Result<(), DatabaseError> {
            Err(DatabaseError::Query("create_session: disk I/O error".into()))
        }
        async fn get_valid_session(
            &self,
            token: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<Session>, DatabaseError> {
            self.0.get_valid_session(token, now).await
        }
        async fn get_session(&self, token: &str) -> Result<Option<Session>, DatabaseError> {
            self.0.get_session(token).await
        }
        async fn delete_session(&self, token: &str) -> Result<bool, DatabaseError> {
            self.0.delete_session(token).await
        }
        async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
            self.0.prune_expired_sessions(now).await
        }
    }

    #[tokio::test]
    async fn three_failed_verifications_burn_code() {
        let db: Arc<dyn Database> =
            Arc::new(SessionlessDb(LibSqlBackend::new_memory().await.unwrap()));
        let svc = AuthService::new(
            db.clone(),
            &AuthConfig::default(),
            SecretString::from(TOKEN.to_string()),
        );
        let code = svc.generate_code().await.unwrap();

        for _ in 0..MAX_ATTEMPTS {
            assert!(matches!(
                svc.verify_code(&code.code, 7, "Ada").await,
                Err(AuthError::VerificationFailed)
            ));
        }

        let stored = db.get_login_code(&code.code).await.unwrap().unwrap();
        assert_eq!(stored.attempts, MAX_ATTEMPTS);
        assert_eq!(stored.status, CodeStatus::Expired);

        // Time remains on the code, but it can no longer be used
        assert!(!stored.is_expired_at(Utc::now()));
        assert!(svc.verify_code(&code.code, 7, "Ada").await.is_err());
        assert_eq!(svc.code_status(&code.code).await.unwrap(), CodeState::Expired);
    }

    #[tokio::test]
    async fn exhausted_attempts_burn_code() {
        let (svc, db) = service().await;
        let mut tried = LoginCode::new("ABCD2345".into(), TimeDelta::seconds(600));
        tried.attempts = MAX_ATTEMPTS;
        db.insert_login_code(&tried).await.unwrap();

        assert!(matches!(
            svc.verify_code("ABCD2345", 7, "Ada").await,
            Err(AuthError::TooManyAttempts)
        ));
        assert!(db.get_pending_login_code("ABCD2345").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_verifications_bind_once() {
        let (svc, db) = service().await;
        let code = svc.generate_code().await.unwrap();

        let (a, b) = tokio::join!(
            svc.verify_code(&code.code, 7, "Ada"),
            svc.verify_code(&code.code, 8, "Bob")
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

        let winner = a.or(b).unwrap();
        let stored = db.get_login_code(&code.code).await.unwrap().unwrap();
        assert_eq!(stored.session_token.as_deref(), Some(winner.token.as_str()));
    }

    #[tokio::test]
    async fn sessions_validate_and_logout() {
        let (svc, _db) = service().await;
        let code = svc.generate_code().await.unwrap();
        let session = svc.verify_code(&code.code, 7, "Ada").await.unwrap();

        let auth = svc.validate_session(&session.token).await.unwrap();
        assert_eq!(auth.user.telegram_id, 7);

        svc.logout(&session.token).await.unwrap();
        assert!(matches!(
            svc.validate_session(&session.token).await,
            Err(AuthError::InvalidSession)
        ));
        // Second logout is harmless
        svc.logout(&session.token).await.unwrap();
    }

    #[tokio::test]
    async fn widget_login_creates_user_and_session() {
        let (svc, _db) = service().await;
        let mut data = WidgetLogin {
            id: 99,
            first_name: "Widget".into(),
            last_name: None,
            username: None,
            photo_url: None,
            auth_date: Utc::now().timestamp(),
            hash: String::new(),
        };
        data.hash = widget::sign(&data, TOKEN).unwrap();

        let auth = svc.login_with_widget(&data).await.unwrap();
        assert_eq!(auth.user.telegram_id, 99);
        assert!(svc.validate_session(&auth.session.token).await.is_ok());
    }
}
