//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// What the user sent.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    /// A photo; `file_id` refers to the largest available size.
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Location { latitude: f64, longitude: f64 },
}

/// A normalized inbound message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel name this message came from.
    pub channel: String,
    /// Stable sender id (Telegram user id).
    pub user_id: i64,
    /// Display name for greetings.
    pub first_name: Option<String>,
    /// Conversation to reply into.
    pub chat_id: i64,
    /// Channel-native message id, unique per chat.
    pub message_id: i64,
    pub content: MessageContent,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: i64, content: MessageContent) -> Self {
        Self {
            channel: channel.to_string(),
            user_id,
            first_name: None,
            chat_id: user_id,
            message_id: 0,
            content,
        }
    }

    pub fn text(channel: &str, user_id: i64, text: &str) -> Self {
        Self::new(channel, user_id, MessageContent::Text(text.to_string()))
    }

    pub fn with_first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = Some(name.into());
        self
    }

    pub fn with_chat(mut self, chat_id: i64, message_id: i64) -> Self {
        self.chat_id = chat_id;
        self.message_id = message_id;
        self
    }

    /// Name to greet the user with.
    pub fn display_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or("there")
    }
}

/// Reply keyboard attached to an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Keyboard {
    /// Leave whatever keyboard the client shows.
    #[default]
    Keep,
    /// Hide the keyboard (numeric onboarding answers).
    Remove,
    /// Main menu shown after onboarding.
    Menu,
    /// Share-location button plus manual fallback.
    LocationRequest,
    /// A few common zones to tap.
    ManualTimezone,
}

/// A reply to send back to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingResponse {
    pub content: String,
    pub keyboard: Keyboard,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            keyboard: Keyboard::Keep,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// A downloaded photo ready for a vision model.
#[derive(Debug, Clone)]
pub struct PhotoData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A messaging platform the bot talks through.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a reply into the conversation `msg` came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Fetch the bytes of a photo referenced by a message.
    async fn download_photo(&self, file_id: &str) -> Result<PhotoData, ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
