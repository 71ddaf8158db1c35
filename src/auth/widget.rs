//! Telegram Login Widget verification.
//!
//! The widget posts the user's fields plus `hash`, an HMAC-SHA256 over the
//! sorted `key=value` lines keyed with SHA256(bot token).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Widget payloads older than this are rejected.
pub const MAX_AUTH_AGE_SECS: i64 = 86_400;

/// Fields posted by the Telegram Login Widget.
#[derive(Debug, Clone, Deserialize)]
pub struct WidgetLogin {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub auth_date: i64,
    pub hash: String,
}

impl WidgetLogin {
    /// Every present field except `hash`, sorted by key, one `key=value` per line.
    pub fn data_check_string(&self) -> String {
        let mut fields: Vec<(&str, String)> = vec![
            ("auth_date", self.auth_date.to_string()),
            ("first_name", self.first_name.clone()),
            ("id", self.id.to_string()),
        ];
        if let Some(v) = &self.last_name {
            fields.push(("last_name", v.clone()));
        }
        if let Some(v) = &self.photo_url {
            fields.push(("photo_url", v.clone()));
        }
        if let Some(v) = &self.username {
            fields.push(("username", v.clone()));
        }
        fields.sort_by(|a, b| a.0.cmp(b.0));
        fields
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn mac_for(bot_token: &str) -> Result<HmacSha256, AuthError> {
    let secret = Sha256::digest(bot_token.as_bytes());
    HmacSha256::new_from_slice(&secret).map_err(|_| AuthError::InvalidWidgetData)
}

/// Hex signature the widget would send for `data`.
pub fn sign(data: &WidgetLogin, bot_token: &str) -> Result<String, AuthError> {
    let mut mac = mac_for(bot_token)?;
    mac.update(data.data_check_string().as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check the signature and freshness of a widget payload.
pub fn verify(data: &WidgetLogin, bot_token: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
    let expected = hex::decode(data.hash.trim()).map_err(|_| AuthError::InvalidWidgetData)?;
    let mut mac = mac_for(bot_token)?;
    mac.update(data.data_check_string().as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| AuthError::InvalidWidgetData)?;

    if now.timestamp() - data.auth_date > MAX_AUTH_AGE_SECS {
        return Err(AuthError::WidgetDataExpired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456:TEST-TOKEN";

    fn payload(auth_date: i64) -> WidgetLogin {
        let mut data = WidgetLogin {
            id: 42,
            first_name: "Ada".into(),
            last_name: None,
            username: Some("ada".into()),
            photo_url: None,
            auth_date,
            hash: String::new(),
        };
        data.hash = sign(&data, TOKEN).unwrap();
        data
    }

    #[test]
    fn check_string_is_sorted_and_skips_missing() {
        let data = payload(1_700_000_000);
        assert_eq!(
            data.data_check_string(),
            "auth_date=1700000000\nfirst_name=Ada\nid=42\nusername=ada"
        );
    }

    #[test]
    fn accepts_fresh_signed_payload() {
        let now = Utc::now();
        assert!(verify(&payload(now.timestamp() - 60), TOKEN, now).is_ok());
    }

    #[test]
    fn rejects_tampered_fields() {
        let now = Utc::now();
        let mut data = payload(now.timestamp());
        data.id = 43;
        assert!(matches!(verify(&data, TOKEN, now), Err(AuthError::InvalidWidgetData)));
    }

    #[test]
    fn rejects_other_bot_token() {
        let now = Utc::now();
        let data = payload(now.timestamp());
        assert!(matches!(
            verify(&data, "999:OTHER", now),
            Err(AuthError::InvalidWidgetData)
        ));
    }

    #[test]
    fn rejects_stale_payload() {
        let now = Utc::now();
        let data = payload(now.timestamp() - MAX_AUTH_AGE_SECS - 1);
        assert!(matches!(verify(&data, TOKEN, now), Err(AuthError::WidgetDataExpired)));
    }

    #[test]
    fn rejects_non_hex_hash() {
        let now = Utc::now();
        let mut data = payload(now.timestamp());
        data.hash = "not-hex".into();
        assert!(matches!(verify(&data, TOKEN, now), Err(AuthError::InvalidWidgetData)));
    }
}
