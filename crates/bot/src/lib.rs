//! `comfybot-bot` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod dispatcher;
pub mod interaction;
pub mod messages;
pub mod registry;
pub mod telegram;
pub mod transport;
