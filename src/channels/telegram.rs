//! Telegram channel: long-polls the Bot API for updates.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{
    Channel, IncomingMessage, Keyboard, MessageContent, MessageStream, OutgoingResponse, PhotoData,
};
use crate::error::ChannelError;
use crate::onboarding::prompts::buttons;

const API_BASE: &str = "https://api.telegram.org";

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.bot_token.expose_secret())
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{API_BASE}/file/bot{}/{file_path}", self.bot_token.expose_secret())
    }

    /// Check if a username is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == username)
    }

    /// Check if any of the provided identities is allowed.
    pub fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// Send a text message, splitting it at Telegram's limit. The keyboard is
    /// attached to the last chunk.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { reply_markup.as_ref() } else { None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single chunk, Markdown first with plain-text fallback.
    async fn send_message_chunk(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup.clone();
        }

        let markdown_resp = self.post("sendMessage", &body).await?;
        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        if let Some(obj) = body.as_object_mut() {
            obj.remove("parse_mode");
        }
        let plain_resp = self.post("sendMessage", &body).await?;
        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
                ),
            });
        }
        Ok(())
    }

    async fn post(&self, method: &str, body: &Value) -> Result<reqwest::Response, ChannelError> {
        self.client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };
                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };
                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.send_message(msg.chat_id, &response.content, reply_markup(response.keyboard))
            .await
    }

    async fn download_photo(&self, file_id: &str) -> Result<PhotoData, ChannelError> {
        let download_err = |reason: String| ChannelError::DownloadFailed {
            name: "telegram".into(),
            reason,
        };

        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&json!({ "file_id": file_id }))
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        let data: Value = resp.json().await.map_err(|e| download_err(e.to_string()))?;
        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| download_err(format!("getFile returned no file_path: {data}")))?;

        let resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(download_err(format!("file download returned {}", resp.status())));
        }
        let bytes = resp.bytes().await.map_err(|e| download_err(e.to_string()))?;

        tracing::debug!(file_id, size = bytes.len(), "Downloaded Telegram photo");
        Ok(PhotoData {
            bytes: bytes.to_vec(),
            mime_type: mime_for_path(file_path).to_string(),
        })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Turn one `getUpdates` entry into a message, dropping unsupported kinds
/// and senders outside the allowlist.
fn parse_update(update: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let from = message.get("from")?;
    let user_id = from.get("id").and_then(Value::as_i64)?;
    let username = from.get("username").and_then(Value::as_str).unwrap_or("unknown");

    let user_id_str = user_id.to_string();
    if !check_user_allowed(allowed_users, [username, user_id_str.as_str()]) {
        tracing::warn!(
            username,
            user_id,
            "Telegram: ignoring message from unauthorized user"
        );
        return None;
    }

    let content = if let Some(text) = message.get("text").and_then(Value::as_str) {
        MessageContent::Text(text.to_string())
    } else if let Some(sizes) = message.get("photo").and_then(Value::as_array) {
        MessageContent::Photo {
            file_id: largest_photo(sizes)?,
            caption: message
                .get("caption")
                .and_then(Value::as_str)
                .map(String::from),
        }
    } else if let Some(location) = message.get("location") {
        MessageContent::Location {
            latitude: location.get("latitude").and_then(Value::as_f64)?,
            longitude: location.get("longitude").and_then(Value::as_f64)?,
        }
    } else {
        return None;
    };

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .unwrap_or(user_id);
    let message_id = message.get("message_id").and_then(Value::as_i64).unwrap_or(0);

    let mut incoming =
        IncomingMessage::new("telegram", user_id, content).with_chat(chat_id, message_id);
    if let Some(name) = from.get("first_name").and_then(Value::as_str) {
        incoming = incoming.with_first_name(name);
    }
    Some(incoming)
}

/// File id of the biggest size in a `PhotoSize` array.
fn largest_photo(sizes: &[Value]) -> Option<String> {
    sizes
        .iter()
        .max_by_key(|s| {
            s.get("file_size").and_then(Value::as_u64).unwrap_or_else(|| {
                let w = s.get("width").and_then(Value::as_u64).unwrap_or(0);
                let h = s.get("height").and_then(Value::as_u64).unwrap_or(0);
                w * h
            })
        })
        .and_then(|s| s.get("file_id"))
        .and_then(Value::as_str)
        .map(String::from)
}

fn mime_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/jpeg",
    }
}

fn text_rows(rows: &[&[&str]]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| Value::Array(row.iter().map(|label| json!({ "text": label })).collect()))
            .collect(),
    )
}

/// The `reply_markup` object for a keyboard, if one should be sent.
fn reply_markup(keyboard: Keyboard) -> Option<Value> {
    match keyboard {
        Keyboard::Keep => None,
        Keyboard::Remove => Some(json!({ "remove_keyboard": true })),
        Keyboard::Menu => Some(json!({
            "keyboard": text_rows(buttons::MENU_ROWS),
            "resize_keyboard": true,
            "is_persistent": true,
        })),
        Keyboard::LocationRequest => Some(json!({
            "keyboard": [
                [{ "text": buttons::SHARE_LOCATION, "request_location": true }],
                [{ "text": buttons::TIMEZONE_MANUAL }],
            ],
            "resize_keyboard": true,
            "one_time_keyboard": true,
        })),
        Keyboard::ManualTimezone => Some(json!({
            "keyboard": text_rows(buttons::COMMON_TIMEZONES),
            "resize_keyboard": true,
            "one_time_keyboard": true,
        })),
    }
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
