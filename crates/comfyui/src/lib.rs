//! ComfyUI REST client and job lifecycle.
//!
//! Provides the HTTP API wrapper, the typed history model, retry with
//! exponential backoff, and the submit / poll / fetch job runner used by
//! the chat front end.

pub mod api;
pub mod history;
pub mod job;
pub mod retry;
