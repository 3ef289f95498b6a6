//! Telegram Bot API client over [`reqwest`].
//!
//! Method calls go to `{api_url}/bot{token}/{method}`. Text calls send
//! JSON bodies; photo and document uploads use multipart forms.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::telegram::types::{ApiResponse, Message, Update, User};
use crate::transport::{ChatId, ChatTransport, MessageId, MessageRef, TransportError};

/// Timeout for ordinary method calls.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for uploads, which carry whole artifacts.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Slack added on top of the long-poll wait for `getUpdates`.
const LONG_POLL_SLACK: Duration = Duration::from_secs(10);

/// Telegram rejects longer message texts.
const MAX_TEXT_CHARS: usize = 4096;

/// Telegram rejects longer media captions.
const MAX_CAPTION_CHARS: usize = 1024;

/// File name used for photo uploads.
const PHOTO_FILENAME: &str = "image.png";

pub struct TelegramApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl TelegramApi {
    /// * `api_url` - Bot API base URL, e.g. `https://api.telegram.org`.
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Verify the token and return the bot's own account.
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call_json("getMe", &json!({}), CALL_TIMEOUT).await
    }

    /// Long-poll for updates with ids `>= offset`, waiting up to
    /// `wait` for at least one to arrive.
    pub async fn get_updates(
        &self,
        offset: i64,
        wait: Duration,
    ) -> Result<Vec<Update>, TransportError> {
        let body = json!({
            "offset": offset,
            "timeout": wait.as_secs(),
            "allowed_updates": ["message"],
        });
        self.call_json("getUpdates", &body, wait + LONG_POLL_SLACK)
            .await
    }

    // ---- private helpers ----

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn call_json<B, T>(
        &self,
        method: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        Self::parse_response(response).await
    }

    async fn call_multipart<T: DeserializeOwned>(
        &self,
        method: &str,
        form: Form,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(self.method_url(method))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;

        Self::parse_response(response).await
    }

    /// Unwrap the `{ok, result}` envelope. Error statuses still carry
    /// the envelope, so the body is decoded before the status is judged.
    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(request_error)?;

        let envelope: ApiResponse<T> = serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::InvalidResponse(format!("HTTP {status}: {e}"))
        })?;

        if !envelope.ok {
            return Err(TransportError::Api {
                code: envelope.error_code.unwrap_or(i64::from(status.as_u16())),
                description: envelope.description.unwrap_or_default(),
                retry_after: envelope.parameters.and_then(|p| p.retry_after),
            });
        }

        envelope
            .result
            .ok_or_else(|| TransportError::InvalidResponse("missing result".into()))
    }

    fn media_form(
        chat_id: ChatId,
        field: &'static str,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
        reply_to: Option<MessageId>,
    ) -> Form {
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", truncate_chars(caption, MAX_CAPTION_CHARS))
            .part(field, Part::bytes(bytes).file_name(filename.to_string()));

        if let Some(message_id) = reply_to {
            form = form.text("reply_parameters", reply_parameters(message_id).to_string());
        }
        form
    }
}

#[async_trait]
impl ChatTransport for TelegramApi {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef, TransportError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": truncate_chars(text, MAX_TEXT_CHARS),
        });
        if let Some(message_id) = reply_to {
            body["reply_parameters"] = reply_parameters(message_id);
        }

        let message: Message = self.call_json("sendMessage", &body, CALL_TIMEOUT).await?;
        Ok(message_ref(&message))
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
            "text": truncate_chars(text, MAX_TEXT_CHARS),
        });
        // Answers with the edited Message (or `true` for inline messages).
        let _: serde_json::Value = self.call_json("editMessageText", &body, CALL_TIMEOUT).await?;
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
        });
        let _: bool = self.call_json("deleteMessage", &body, CALL_TIMEOUT).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: Vec<u8>,
        caption: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef, TransportError> {
        let form = Self::media_form(chat_id, "photo", photo, PHOTO_FILENAME, caption, reply_to);
        let message: Message = self.call_multipart("sendPhoto", form).await?;
        Ok(message_ref(&message))
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        document: Vec<u8>,
        filename: &str,
        caption: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef, TransportError> {
        let form = Self::media_form(chat_id, "document", document, filename, caption, reply_to);
        let message: Message = self.call_multipart("sendDocument", form).await?;
        Ok(message_ref(&message))
    }
}

/// Map a reqwest error without leaking the token-bearing URL.
fn request_error(e: reqwest::Error) -> TransportError {
    TransportError::Request(e.without_url().to_string())
}

fn reply_parameters(message_id: MessageId) -> serde_json::Value {
    json!({"message_id": message_id, "allow_sending_without_reply": true})
}

fn message_ref(message: &Message) -> MessageRef {
    MessageRef {
        chat_id: message.chat.id,
        message_id: message.message_id,
    }
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
