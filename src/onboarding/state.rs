//! Onboarding steps: which piece of setup the user still owes us.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The steps of the onboarding conversation.
///
/// Progresses linearly: Weight → Goal → Height → Timezone → Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    #[default]
    Weight,
    Goal,
    Height,
    Timezone,
    Completed,
}

impl OnboardingStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingStep) -> bool {
        use OnboardingStep::*;
        matches!(
            (self, target),
            (Weight, Goal) | (Goal, Height) | (Height, Timezone) | (Timezone, Completed)
        )
    }

    /// Whether onboarding is done.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Get the next step in the linear progression, if any.
    pub fn next(&self) -> Option<OnboardingStep> {
        use OnboardingStep::*;
        match self {
            Weight => Some(Goal),
            Goal => Some(Height),
            Height => Some(Timezone),
            Timezone => Some(Completed),
            Completed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::Goal => "goal",
            Self::Height => "height",
            Self::Timezone => "timezone",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnboardingStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weight" => Ok(Self::Weight),
            "goal" => Ok(Self::Goal),
            "height" => Ok(Self::Height),
            "timezone" => Ok(Self::Timezone),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown onboarding step: {other}")),
        }
    }
}
