//! Login codes and web sessions.
//!
//! A code is generated by the dashboard, typed into the bot, and exchanged
//! for a session token. Codes are single-use and short-lived.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Unambiguous uppercase alphanumerics: no `0`, `O`, `1`, `I`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 8;

/// Failed verifications before a code is burned.
pub const MAX_ATTEMPTS: u32 = 3;

/// Session token length in random bytes (hex-encoded to twice this).
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Draw a fresh code from the OS RNG.
pub fn generate_code() -> String {
    let mut rng = OsRng;
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Draw a fresh session token: 64 lowercase hex chars.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill(&mut bytes);
    hex::encode(bytes)
}

/// Canonical form of user-typed code text.
pub fn normalize_code(text: &str) -> String {
    text.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    Pending,
    Verified,
    Expired,
}

impl CodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "verified" => Self::Verified,
            "expired" => Self::Expired,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A login code row.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginCode {
    pub id: Uuid,
    pub code: String,
    pub status: CodeStatus,
    pub attempts: u32,
    pub telegram_id: Option<i64>,
    pub session_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl LoginCode {
    pub fn new(code: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code,
            status: CodeStatus::Pending,
            attempts: 0,
            telegram_id: None,
            session_token: None,
            created_at: now,
            expires_at: now + ttl,
            verified_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether a verification may proceed. Mirrors the order of the checks
    /// the bot reports back to the user.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), AuthError> {
        match self.status {
            CodeStatus::Verified => return Err(AuthError::AlreadyUsed),
            CodeStatus::Expired => return Err(AuthError::InvalidCode),
            CodeStatus::Pending => {}
        }
        if self.is_expired_at(now) {
            return Err(AuthError::CodeExpired);
        }
        if self.attempts >= MAX_ATTEMPTS {
            return Err(AuthError::TooManyAttempts);
        }
        Ok(())
    }

    /// Count a failed verification; burns the code at the limit.
    pub fn register_failure(&mut self) {
        self.attempts += 1;
        if self.attempts >= MAX_ATTEMPTS {
            self.status = CodeStatus::Expired;
        }
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// A web dashboard session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub telegram_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(telegram_id: i64, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token: generate_session_token(),
            telegram_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
