//! Telegram Bot API transport: HTTP client, object model, and the
//! long-polling update loop.

pub mod api;
pub mod poller;
pub mod types;

pub use api::TelegramApi;
