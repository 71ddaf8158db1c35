//! Input validation for the numeric onboarding steps and login codes.

use std::sync::LazyLock;

use regex::Regex;

use crate::auth::code::CODE_ALPHABET;
use crate::auth::code::CODE_LENGTH;

pub const WEIGHT_RANGE_KG: (f64, f64) = (20.0, 300.0);
pub const HEIGHT_RANGE_CM: (f64, f64) = (100.0, 250.0);

/// Leading numeric prefix, the way a user types "75", "75.5kg" or "170 cm".
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)").expect("static regex")
});

/// Why an onboarding answer was rejected. `Display` is the re-prompt text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a valid positive number.")]
    NotAPositiveNumber,

    #[error("Please enter a weight between 20 and 300 kg.")]
    WeightOutOfRange,

    #[error("Please enter a height between 100 and 250 cm.")]
    HeightOutOfRange,

    #[error("I couldn't recognize that timezone. Please enter it like Europe/London or America/New_York.")]
    UnknownTimezone,

    #[error("You're already set up!")]
    AlreadyCompleted,
}

/// Parse a strictly positive number from free text.
pub fn parse_positive_number(text: &str) -> Result<f64, ValidationError> {
    let m = LEADING_NUMBER
        .find(text.trim())
        .ok_or(ValidationError::NotAPositiveNumber)?;
    let value: f64 = m
        .as_str()
        .parse()
        .map_err(|_| ValidationError::NotAPositiveNumber)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::NotAPositiveNumber);
    }
    Ok(value)
}

pub fn validate_weight(kg: f64) -> Result<f64, ValidationError> {
    in_range(kg, WEIGHT_RANGE_KG).ok_or(ValidationError::WeightOutOfRange)
}

pub fn validate_height(cm: f64) -> Result<f64, ValidationError> {
    in_range(cm, HEIGHT_RANGE_CM).ok_or(ValidationError::HeightOutOfRange)
}

fn in_range(value: f64, (min, max): (f64, f64)) -> Option<f64> {
    (min..=max).contains(&value).then_some(value)
}

/// Whether `text` has the shape of a login code.
///
/// Case-insensitive, but only over the code alphabet, so ordinary 8-letter
/// words containing `I`/`O` never hijack a conversation.
pub fn is_login_code(text: &str) -> bool {
    text.chars().count() == CODE_LENGTH
        && text
            .chars()
            .all(|c| c.is_ascii() && CODE_ALPHABET.contains(&(c.to_ascii_uppercase() as u8)))
}
