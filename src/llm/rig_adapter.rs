//! Bridges rig's `CompletionModel` to our [`LlmProvider`] trait.

use async_trait::async_trait;
use rig::OneOrMany;
use rig::completion::{AssistantContent, CompletionModel, Message};
use rig::message::{ImageDetail, ImageMediaType, UserContent};
use serde_json::json;

use super::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, InlineImage, LlmProvider,
    Role,
};
use crate::error::LlmError;

/// Wraps any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> LlmError {
        LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: reason.into(),
        }
    }
}

/// System turns become the preamble; the rest become rig chat history.
fn split_messages(
    messages: Vec<ChatMessage>,
) -> Result<(Option<String>, Vec<Message>), String> {
    let mut preamble: Vec<String> = Vec::new();
    let mut history = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg.role {
            Role::System => preamble.push(msg.content),
            Role::User => history.push(user_message(msg.content, msg.image)?),
        }
    }
    let preamble = (!preamble.is_empty()).then(|| preamble.join("\n\n"));
    Ok((preamble, history))
}

fn user_message(text: String, image: Option<InlineImage>) -> Result<Message, String> {
    let Some(image) = image else {
        return Ok(Message::user(text));
    };
    let parts = vec![
        UserContent::text(text),
        UserContent::image_base64(
            image.data,
            Some(media_type(&image.media_type)),
            Some(ImageDetail::Auto),
        ),
    ];
    let content = OneOrMany::many(parts).map_err(|e| e.to_string())?;
    Ok(Message::User { content })
}

fn media_type(mime: &str) -> ImageMediaType {
    match mime {
        "image/png" => ImageMediaType::PNG,
        "image/webp" => ImageMediaType::WEBP,
        "image/gif" => ImageMediaType::GIF,
        _ => ImageMediaType::JPEG,
    }
}

fn response_text(choice: &OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|c| match c {
            AssistantContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, mut history) =
            split_messages(request.messages).map_err(|e| self.error(e))?;
        let prompt = history
            .pop()
            .ok_or_else(|| self.error("request has no user message"))?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        if request.json_mode {
            builder = builder.additional_params(json!({
                "response_format": { "type": "json_object" }
            }));
        }

        let response = self
            .model
            .completion(builder.build())
            .await
            .map_err(|e| self.error(e.to_string()))?;

        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);
        let finish_reason = match request.max_tokens {
            Some(limit) if output_tokens >= limit => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content: response_text(&response.choice),
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens,
            finish_reason,
            response_id: None,
        })
    }
}
