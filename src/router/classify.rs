//! Sorting incoming messages into the routes the bot understands.

use crate::channels::MessageContent;
use crate::onboarding::prompts::buttons;
use crate::onboarding::validation::is_login_code;

/// Main-menu buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    LogFood,
    BreakFast,
    DailySummary,
    GetInsights,
    AskQuestions,
}

impl MenuAction {
    /// Exact label match, emoji included.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            buttons::LOG_FOOD => Some(Self::LogFood),
            buttons::BREAK_FAST => Some(Self::BreakFast),
            buttons::DAILY_SUMMARY => Some(Self::DailySummary),
            buttons::GET_INSIGHTS => Some(Self::GetInsights),
            buttons::ASK_QUESTIONS => Some(Self::AskQuestions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route<'a> {
    Photo { file_id: &'a str },
    Location { latitude: f64, longitude: f64 },
    /// `/start`, optionally carrying a login code from a deep link.
    Start { deep_link_code: Option<&'a str> },
    Menu(MenuAction),
    LoginCode(&'a str),
    Text(&'a str),
}

pub fn classify(content: &MessageContent) -> Route<'_> {
    let text = match content {
        MessageContent::Photo { file_id, .. } => return Route::Photo { file_id },
        MessageContent::Location {
            latitude,
            longitude,
        } => {
            return Route::Location {
                latitude: *latitude,
                longitude: *longitude,
            };
        }
        MessageContent::Text(text) => text.trim(),
    };

    if let Some(args) = start_command_args(text) {
        let deep_link_code = args.split_whitespace().next().filter(|c| is_login_code(c));
        return Route::Start { deep_link_code };
    }
    if let Some(action) = MenuAction::from_label(text) {
        return Route::Menu(action);
    }
    if is_login_code(text) {
        return Route::LoginCode(text);
    }
    Route::Text(text)
}

/// Arguments after `/start` or `/start@botname`; `None` for any other text.
fn start_command_args(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("/start")?;
    if rest.is_empty() {
        return Some("");
    }
    if let Some(after_bot) = rest.strip_prefix('@') {
        let end = after_bot.find(char::is_whitespace).unwrap_or(after_bot.len());
        return Some(after_bot[end..].trim());
    }
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}
