//! Chat transport abstraction.
//!
//! The interaction flow only needs a handful of outbound operations. The
//! Telegram client implements them for production; tests use a recording
//! fake.

use async_trait::async_trait;

pub type ChatId = i64;
pub type MessageId = i64;

/// Address of a message the bot has sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Errors from the chat transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("Transport request failed: {0}")]
    Request(String),

    /// The chat service rejected the call.
    #[error("Chat API error ({code}): {description}")]
    Api {
        code: i64,
        description: String,
        /// Seconds to wait before the next call, when rate limited.
        retry_after: Option<u64>,
    },

    #[error("Invalid chat API response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message, optionally as a reply.
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef, TransportError>;

    /// Replace the text of a message the bot sent earlier.
    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), TransportError>;

    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError>;

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: Vec<u8>,
        caption: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef, TransportError>;

    async fn send_document(
        &self,
        chat_id: ChatId,
        document: Vec<u8>,
        filename: &str,
        caption: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef, TransportError>;
}
