//! Message router: classifies each bot message and dispatches it.
//!
//! Handlers never propagate errors past [`MessageRouter::handle`]. Failures
//! are logged and the user gets an apology without internal detail.

pub mod classify;
pub mod dedup;
pub mod replies;

pub use classify::{MenuAction, Route, classify};
pub use dedup::DedupCache;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::agents::{AgentInvoker, AgentKind, AgentRequest};
use crate::auth::AuthService;
use crate::channels::{Channel, IncomingMessage, Keyboard, OutgoingResponse};
use crate::error::{AuthError, DatabaseError};
use crate::fasting::FastingService;
use crate::onboarding::{OnboardingInput, OnboardingManager, TimezoneResolver, User};
use crate::store::Database;

pub struct MessageRouter {
    channel: Arc<dyn Channel>,
    db: Arc<dyn Database>,
    onboarding: OnboardingManager,
    auth: Arc<AuthService>,
    fasting: FastingService,
    agents: AgentInvoker,
    dedup: DedupCache,
}

impl MessageRouter {
    pub fn new(
        channel: Arc<dyn Channel>,
        db: Arc<dyn Database>,
        auth: Arc<AuthService>,
        resolver: Arc<dyn TimezoneResolver>,
        agents: AgentInvoker,
        dedup_window: Duration,
    ) -> Self {
        Self {
            channel,
            onboarding: OnboardingManager::new(db.clone(), resolver),
            fasting: FastingService::new(db.clone()),
            db,
            auth,
            agents,
            dedup: DedupCache::new(dedup_window),
        }
    }

    /// Handle one incoming message end to end.
    pub async fn handle(&self, msg: &IncomingMessage) {
        let route = classify(&msg.content);
        debug!(user_id = msg.user_id, message_id = msg.message_id, ?route, "Routing message");

        let result = match route {
            Route::Photo { file_id } => self.on_photo(msg, file_id).await,
            Route::Location {
                latitude,
                longitude,
            } => {
                self.on_onboarding_input(msg, OnboardingInput::Location { latitude, longitude })
                    .await
            }
            Route::Start { deep_link_code } => self.on_start(msg, deep_link_code).await,
            Route::Menu(action) => self.on_menu(msg, action).await,
            Route::LoginCode(code) => self.on_login_code(msg, code).await,
            Route::Text(text) => self.on_text(msg, text).await,
        };

        if let Err(e) = result {
            error!(user_id = msg.user_id, error = %e, "Failed to handle message");
            self.reply(msg, OutgoingResponse::text(replies::GENERIC_ERROR))
                .await;
        }
    }

    async fn reply(&self, msg: &IncomingMessage, response: OutgoingResponse) {
        if let Err(e) = self.channel.respond(msg, response).await {
            warn!(user_id = msg.user_id, error = %e, "Failed to send reply");
        }
    }

    async fn reply_menu(&self, msg: &IncomingMessage, text: impl Into<String>) {
        self.reply(msg, OutgoingResponse::text(text).with_keyboard(Keyboard::Menu))
            .await;
    }

    /// The sender, if onboarding is complete. Otherwise tells them so.
    async fn onboarded_user(
        &self,
        msg: &IncomingMessage,
        not_ready: &str,
    ) -> Result<Option<User>, DatabaseError> {
        match self.db.get_user(msg.user_id).await? {
            Some(user) if user.is_onboarded() => Ok(Some(user)),
            _ => {
                self.reply(msg, OutgoingResponse::text(not_ready)).await;
                Ok(None)
            }
        }
    }

    /// Send the progress notice, run the agent, send its reply.
    async fn run_agent(&self, msg: &IncomingMessage, kind: AgentKind, request: AgentRequest) {
        self.reply_menu(msg, kind.progress_notice()).await;
        let reply = self.agents.invoke(kind, request).await;
        self.reply_menu(msg, reply.into_text(kind)).await;
    }

    async fn on_start(
        &self,
        msg: &IncomingMessage,
        deep_link_code: Option<&str>,
    ) -> Result<(), DatabaseError> {
        if let Some(code) = deep_link_code {
            return self.on_login_code(msg, code).await;
        }
        match self.onboarding.start(msg.user_id, msg.display_name()).await {
            Ok(response) => self.reply(msg, response).await,
            Err(e) => {
                error!(user_id = msg.user_id, error = %e, "Failed to start onboarding");
                self.reply(msg, OutgoingResponse::text(replies::SETUP_ERROR))
                    .await;
            }
        }
        Ok(())
    }

    async fn on_login_code(&self, msg: &IncomingMessage, code: &str) -> Result<(), DatabaseError> {
        match self
            .auth
            .verify_code(code, msg.user_id, msg.display_name())
            .await
        {
            Ok(_session) => {
                info!(user_id = msg.user_id, "Web login confirmed from bot");
                self.reply(msg, OutgoingResponse::text(replies::LOGIN_SUCCESS))
                    .await;
                Ok(())
            }
            Err(AuthError::Database(e)) => Err(e),
            Err(e) => {
                self.reply(msg, OutgoingResponse::text(replies::login_failed(&e.to_string())))
                    .await;
                Ok(())
            }
        }
    }

    async fn on_text(&self, msg: &IncomingMessage, text: &str) -> Result<(), DatabaseError> {
        let Some(user) = self.db.get_user(msg.user_id).await? else {
            self.reply(msg, OutgoingResponse::text(replies::BEGIN_JOURNEY))
                .await;
            return Ok(());
        };

        if user.is_onboarded() {
            self.run_agent(msg, AgentKind::Questions, AgentRequest::with_text(user, text))
                .await;
            return Ok(());
        }

        if let Some(response) = self.onboarding.handle(&user, OnboardingInput::Text(text)).await? {
            self.reply(msg, response).await;
        }
        Ok(())
    }

    /// Feed a non-text onboarding input. Ignored for unknown or finished users.
    async fn on_onboarding_input(
        &self,
        msg: &IncomingMessage,
        input: OnboardingInput<'_>,
    ) -> Result<(), DatabaseError> {
        let user = match self.db.get_user(msg.user_id).await? {
            Some(user) if !user.is_onboarded() => user,
            _ => {
                debug!(user_id = msg.user_id, "Ignoring location outside onboarding");
                return Ok(());
            }
        };
        if let Some(response) = self.onboarding.handle(&user, input).await? {
            self.reply(msg, response).await;
        }
        Ok(())
    }

    async fn on_menu(&self, msg: &IncomingMessage, action: MenuAction) -> Result<(), DatabaseError> {
        match action {
            MenuAction::LogFood => self.reply_menu(msg, replies::LOG_FOOD).await,
            MenuAction::AskQuestions => self.reply_menu(msg, replies::ASK_QUESTIONS).await,
            MenuAction::DailySummary => {
                if let Some(user) = self.onboarded_user(msg, replies::ONBOARDING_REQUIRED).await? {
                    self.run_agent(msg, AgentKind::Summary, AgentRequest::new(user))
                        .await;
                }
            }
            MenuAction::GetInsights => {
                if let Some(user) = self
                    .onboarded_user(msg, replies::INSIGHTS_ONBOARDING_REQUIRED)
                    .await?
                {
                    self.run_agent(msg, AgentKind::Insights, AgentRequest::new(user))
                        .await;
                }
            }
            MenuAction::BreakFast => {
                if let Some(user) = self.onboarded_user(msg, replies::ONBOARDING_REQUIRED).await? {
                    let text = match self.fasting.toggle(user.telegram_id).await {
                        Ok(toggle) => toggle.message(),
                        Err(e) if e.is_constraint() => {
                            warn!(user_id = msg.user_id, error = %e, "Concurrent fast start");
                            replies::FAST_START_ERROR.to_string()
                        }
                        Err(e) => {
                            error!(user_id = msg.user_id, error = %e, "Failed to toggle fast");
                            replies::FAST_ERROR.to_string()
                        }
                    };
                    self.reply_menu(msg, text).await;
                }
            }
        }
        Ok(())
    }

    async fn on_photo(&self, msg: &IncomingMessage, file_id: &str) -> Result<(), DatabaseError> {
        if !self.dedup.first_sighting(msg.chat_id, msg.message_id).await {
            debug!(
                chat_id = msg.chat_id,
                message_id = msg.message_id,
                "Dropping duplicate photo delivery"
            );
            return Ok(());
        }
        let Some(user) = self.onboarded_user(msg, replies::ONBOARDING_REQUIRED).await? else {
            return Ok(());
        };

        self.reply_menu(msg, AgentKind::Food.progress_notice()).await;
        let photo = match self.channel.download_photo(file_id).await {
            Ok(photo) => photo,
            Err(e) => {
                error!(user_id = msg.user_id, error = %e, "Failed to download photo");
                self.reply_menu(msg, AgentKind::Food.failure_message()).await;
                return Ok(());
            }
        };
        let reply = self
            .agents
            .invoke(AgentKind::Food, AgentRequest::with_photo(user, photo))
            .await;
        self.reply_menu(msg, reply.into_text(AgentKind::Food)).await;
        Ok(())
    }
}
