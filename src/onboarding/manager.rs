//! OnboardingManager: applies onboarding transitions and persists them.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::channels::{Keyboard, OutgoingResponse};
use crate::error::DatabaseError;
use crate::store::Database;

use super::machine::{self, OnboardingInput, Outcome};
use super::model::User;
use super::prompts;
use super::timezone::TimezoneResolver;
use super::validation::ValidationError;

/// Coordinates the onboarding flow: state lookup, transition, persistence.
pub struct OnboardingManager {
    db: Arc<dyn Database>,
    resolver: Arc<dyn TimezoneResolver>,
}

impl OnboardingManager {
    pub fn new(db: Arc<dyn Database>, resolver: Arc<dyn TimezoneResolver>) -> Self {
        Self { db, resolver }
    }

    /// Handle `/start`: welcome back a finished user, otherwise create the
    /// user if needed and ask for whatever is still missing.
    pub async fn start(
        &self,
        telegram_id: i64,
        first_name: &str,
    ) -> Result<OutgoingResponse, DatabaseError> {
        if let Some(user) = self.db.get_user(telegram_id).await?
            && user.is_onboarded()
        {
            return Ok(OutgoingResponse::text(prompts::welcome_back(&user.first_name))
                .with_keyboard(Keyboard::Menu));
        }
        let user = self.db.ensure_user(&User::new(telegram_id, first_name)).await?;
        Ok(prompts::step_prompt(&user))
    }

    /// Feed one input into the state machine for `user`.
    ///
    /// Returns `None` when the input has no meaning at the current step.
    pub async fn handle(
        &self,
        user: &User,
        input: OnboardingInput<'_>,
    ) -> Result<Option<OutgoingResponse>, DatabaseError> {
        let outcome = match machine::apply(user, input, self.resolver.as_ref(), Utc::now()) {
            Ok(outcome) => outcome,
            Err(invalid) => {
                debug!(telegram_id = user.telegram_id, step = %user.onboarding_step, %invalid, "Onboarding input rejected");
                let keyboard = match invalid {
                    ValidationError::UnknownTimezone => Keyboard::ManualTimezone,
                    _ => Keyboard::Keep,
                };
                return Ok(Some(
                    OutgoingResponse::text(invalid.to_string()).with_keyboard(keyboard),
                ));
            }
        };

        match outcome {
            Outcome::Ignored => Ok(None),
            Outcome::Reprompt(reply) => Ok(Some(reply)),
            Outcome::Advanced {
                user: next,
                weight_log,
                reply,
            } => {
                if !self.db.advance_onboarding(&next, user.onboarding_step).await? {
                    // Another message moved this user first; re-ask from the stored step.
                    let current = self.db.get_user(user.telegram_id).await?.ok_or_else(|| {
                        DatabaseError::NotFound {
                            entity: "user".to_string(),
                            id: user.telegram_id.to_string(),
                        }
                    })?;
                    return Ok(Some(prompts::step_prompt(&current)));
                }
                if let Some(log) = weight_log {
                    self.db.insert_weight_log(&log).await?;
                }
                info!(
                    telegram_id = next.telegram_id,
                    from = %user.onboarding_step,
                    to = %next.onboarding_step,
                    "Onboarding advanced"
                );
                Ok(Some(reply))
            }
        }
    }
}
