//! Web dashboard authentication.

pub mod code;
pub mod service;
pub mod widget;

pub use code::{CodeStatus, LoginCode, Session};
pub use service::{AuthService, Authenticated, CodeState, spawn_session_sweep};
pub use widget::WidgetLogin;
