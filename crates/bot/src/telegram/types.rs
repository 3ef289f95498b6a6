//! Subset of the Telegram Bot API object model the bot reads.

use serde::Deserialize;

use crate::transport::{ChatId, MessageId};

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// What an inbound text message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// `/name` or `/name@bot`, with the rest of the line.
    Command { name: &'a str, args: &'a str },
    /// Free text to generate from, exactly as sent.
    Prompt(&'a str),
}

impl Message {
    /// Classify the message text. `None` for non-text or blank messages.
    pub fn inbound(&self) -> Option<Inbound<'_>> {
        let raw = self.text.as_deref()?;
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        let Some(command) = text.strip_prefix('/') else {
            return Some(Inbound::Prompt(raw));
        };

        let (head, args) = command
            .split_once(char::is_whitespace)
            .map(|(h, a)| (h, a.trim()))
            .unwrap_or((command, ""));
        let name = head.split('@').next().unwrap_or(head);

        Some(Inbound::Command { name, args })
    }
}
