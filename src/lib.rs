//! FastTrack: an intermittent-fasting coach on Telegram with a web dashboard.

pub mod agents;
pub mod api;
pub mod auth;
pub mod channels;
pub mod config;
pub mod error;
pub mod fasting;
pub mod llm;
pub mod meals;
pub mod onboarding;
pub mod router;
pub mod store;
