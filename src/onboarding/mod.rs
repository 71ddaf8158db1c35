//! Onboarding: the first-contact conversation.
//!
//! A new user is walked through weight, goal weight, height and timezone,
//! one message per step. Only a completed user gets the main menu.

pub mod machine;
pub mod manager;
pub mod model;
pub mod prompts;
pub mod state;
pub mod timezone;
pub mod validation;

pub use machine::{OnboardingInput, Outcome};
pub use manager::OnboardingManager;
pub use model::{User, UserSummary, WeightLog};
pub use state::OnboardingStep;
pub use timezone::{PolygonResolver, TimezoneResolver};
pub use validation::ValidationError;
