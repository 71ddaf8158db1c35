//! Pure onboarding transitions: given a user and one input, decide the next
//! user state and the reply. Persistence lives in the manager.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::channels::{Keyboard, OutgoingResponse};

use super::model::{User, WeightLog};
use super::prompts::{self, buttons};
use super::state::OnboardingStep;
use super::timezone::{TimezoneResolver, parse_timezone};
use super::validation::{
    ValidationError, parse_positive_number, validate_height, validate_weight,
};

/// One piece of user input relevant to onboarding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OnboardingInput<'a> {
    Text(&'a str),
    Location { latitude: f64, longitude: f64 },
}

/// What an input did to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Moved exactly one step forward.
    Advanced {
        user: User,
        weight_log: Option<WeightLog>,
        reply: OutgoingResponse,
    },
    /// State unchanged, but the user should see a different prompt.
    Reprompt(OutgoingResponse),
    /// Input has no meaning at this step.
    Ignored,
}

/// Apply `input` to `user`.
///
/// Invalid input yields the re-prompt error and leaves the user untouched.
pub fn apply(
    user: &User,
    input: OnboardingInput<'_>,
    resolver: &dyn TimezoneResolver,
    now: DateTime<Utc>,
) -> Result<Outcome, ValidationError> {
    let step = user.onboarding_step;
    let mut next = user.clone();
    next.updated_at = now;

    match (step, input) {
        (OnboardingStep::Completed, _) => Err(ValidationError::AlreadyCompleted),

        (OnboardingStep::Timezone, OnboardingInput::Location { latitude, longitude }) => {
            let tz = resolver
                .resolve(latitude, longitude)
                .unwrap_or_else(|| "UTC".to_string());
            Ok(complete(next, tz))
        }
        (_, OnboardingInput::Location { .. }) => Ok(Outcome::Ignored),

        (OnboardingStep::Weight, OnboardingInput::Text(text)) => {
            let kg = validate_weight(parse_positive_number(text)?)?;
            next.current_weight = Some(kg);
            next.onboarding_step = OnboardingStep::Goal;
            let log = WeightLog {
                id: Uuid::new_v4(),
                telegram_id: user.telegram_id,
                weight: kg,
                logged_at: now,
            };
            Ok(Outcome::Advanced {
                reply: prompts::step_prompt(&next),
                user: next,
                weight_log: Some(log),
            })
        }
        (OnboardingStep::Goal, OnboardingInput::Text(text)) => {
            let kg = validate_weight(parse_positive_number(text)?)?;
            next.goal_weight = Some(kg);
            next.onboarding_step = OnboardingStep::Height;
            Ok(advanced(next))
        }
        (OnboardingStep::Height, OnboardingInput::Text(text)) => {
            let cm = validate_height(parse_positive_number(text)?)?;
            next.height = Some(cm);
            next.onboarding_step = OnboardingStep::Timezone;
            Ok(advanced(next))
        }
        (OnboardingStep::Timezone, OnboardingInput::Text(text)) => {
            if text.trim() == buttons::TIMEZONE_MANUAL {
                return Ok(Outcome::Reprompt(
                    OutgoingResponse::text(prompts::TIMEZONE_MANUAL_PROMPT)
                        .with_keyboard(Keyboard::ManualTimezone),
                ));
            }
            let tz = parse_timezone(text).ok_or(ValidationError::UnknownTimezone)?;
            Ok(complete(next, tz.name().to_string()))
        }
    }
}

fn advanced(user: User) -> Outcome {
    Outcome::Advanced {
        reply: prompts::step_prompt(&user),
        user,
        weight_log: None,
    }
}

fn complete(mut user: User, timezone: String) -> Outcome {
    user.timezone = timezone;
    user.onboarding_step = OnboardingStep::Completed;
    let text = format!(
        "{}\n\n{}",
        prompts::timezone_detected(&user.timezone),
        prompts::completion_message(&user)
    );
    Outcome::Advanced {
        reply: OutgoingResponse::text(text).with_keyboard(Keyboard::Menu),
        user,
        weight_log: None,
    }
}
