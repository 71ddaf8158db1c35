//! User-facing copy for onboarding, plus the menu button labels.

use crate::channels::{Keyboard, OutgoingResponse};
use crate::onboarding::model::User;
use crate::onboarding::state::OnboardingStep;

/// Menu labels. Matching is exact, emoji included.
pub mod buttons {
    pub const LOG_FOOD: &str = "🤳🏼 Log Food";
    pub const BREAK_FAST: &str = "⏰ Break Fast";
    pub const DAILY_SUMMARY: &str = "☀️ Daily Summary";
    pub const GET_INSIGHTS: &str = "🧠 Get Insights";
    pub const ASK_QUESTIONS: &str = "💬 Ask Questions";

    pub const SHARE_LOCATION: &str = "📍 Share my location";
    pub const TIMEZONE_MANUAL: &str = "Enter manually instead";

    /// Rows of the main menu keyboard.
    pub const MENU_ROWS: &[&[&str]] = &[
        &[LOG_FOOD, BREAK_FAST],
        &[DAILY_SUMMARY, GET_INSIGHTS],
        &[ASK_QUESTIONS],
    ];

    /// Suggested zones on the manual-entry keyboard.
    pub const COMMON_TIMEZONES: &[&[&str]] = &[
        &["Europe/London", "Europe/Berlin"],
        &["America/New_York", "America/Los_Angeles"],
        &["Asia/Singapore", "Australia/Sydney"],
    ];
}

pub fn weight_prompt(first_name: &str) -> String {
    format!(
        "Hi {first_name}! Welcome to FastTrack, where we'll hit your weight goals together \
         using principles from The Obesity Code by Dr. Jason Fung.\n\n\
         Let's get you set up! First, what's your current weight in kg?\n\n\
         (Just type a number, e.g., 75)"
    )
}

pub const GOAL_PROMPT: &str =
    "Great! Now, what's your goal weight in kg?\n\n(Just type a number, e.g., 68)";
pub const HEIGHT_PROMPT: &str =
    "Almost done! What's your height in cm?\n\n(Just type a number, e.g., 170)";
pub const TIMEZONE_PROMPT: &str = "Last step! So I can track your fasting windows and meals in \
     your local time, tap the button below to share your location.\n\n\
     (Only your timezone is stored, never your location.)";
pub const TIMEZONE_MANUAL_PROMPT: &str = "No problem! Type your timezone, e.g. Europe/London or \
     America/New_York, or pick one below.";
pub const COMPLETED_PROMPT: &str = "You're all set! Choose an option below to get started:";

pub fn welcome_back(first_name: &str) -> String {
    format!(
        "Welcome back, {first_name}! Ready to continue your fasting journey?\n\n\
         Choose an option below:"
    )
}

pub fn timezone_detected(tz: &str) -> String {
    format!("🌍 Timezone set to {tz}.")
}

/// Completion message, with "to lose" when the goal is below the current weight.
pub fn completion_message(user: &User) -> String {
    let current = user.current_weight.unwrap_or_default();
    let goal = user.goal_weight.unwrap_or_default();
    let name = &user.first_name;
    match user.weight_to_lose() {
        Some(diff) if diff > 0.0 => format!(
            "You're all set, {name}!\n\nCurrent: {current} kg\nGoal: {goal} kg\n\
             To lose: {diff:.1} kg\n\nLet's make it happen! Choose an option below:"
        ),
        _ => format!(
            "You're all set, {name}!\n\nCurrent: {current} kg\nGoal: {goal} kg\n\n\
             Let's get started! Choose an option below:"
        ),
    }
}

/// The question to ask for the user's current step.
pub fn step_prompt(user: &User) -> OutgoingResponse {
    match user.onboarding_step {
        OnboardingStep::Weight => {
            OutgoingResponse::text(weight_prompt(&user.first_name)).with_keyboard(Keyboard::Remove)
        }
        OnboardingStep::Goal => OutgoingResponse::text(GOAL_PROMPT).with_keyboard(Keyboard::Remove),
        OnboardingStep::Height => {
            OutgoingResponse::text(HEIGHT_PROMPT).with_keyboard(Keyboard::Remove)
        }
        OnboardingStep::Timezone => {
            OutgoingResponse::text(TIMEZONE_PROMPT).with_keyboard(Keyboard::LocationRequest)
        }
        OnboardingStep::Completed => {
            OutgoingResponse::text(COMPLETED_PROMPT).with_keyboard(Keyboard::Menu)
        }
    }
}
