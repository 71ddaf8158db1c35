//! Bot copy outside onboarding.

pub const BEGIN_JOURNEY: &str = "Type /start to begin your FastTrack journey!";

pub const ONBOARDING_REQUIRED: &str = "Please complete onboarding first. Type /start to begin.";
pub const INSIGHTS_ONBOARDING_REQUIRED: &str =
    "Please complete onboarding first to get personalized insights. Type /start to begin.";

pub const LOG_FOOD: &str =
    "📸 Send me a photo of your meal and I'll estimate the calories for you!";
pub const ASK_QUESTIONS: &str =
    "❓ Ask me anything about intermittent fasting, nutrition, or your weight loss journey!";

pub const LOGIN_SUCCESS: &str =
    "✅ Login successful!\n\nYou can now access the FastTrack dashboard in your browser.";

pub fn login_failed(reason: &str) -> String {
    format!(
        "❌ {reason}.\n\nPlease check the code and try again, or request a new one from the login page."
    )
}

pub const FAST_START_ERROR: &str = "Sorry, there was an error starting your fast. Please try again.";
pub const FAST_ERROR: &str = "Sorry, there was an error updating your fast. Please try again.";

pub const SETUP_ERROR: &str =
    "Sorry, there was an error setting up your account. Please try again.";
pub const GENERIC_ERROR: &str = "Sorry, something went wrong. Please try again.";
