//! Chat-completion adapter.
//!
//! Thin client for an OpenAI-style chat endpoint. The enhancer and the
//! judge are two logical models over the same endpoint and key; both go
//! through [`ChatClient::complete`].

mod client;
mod types;

pub use client::ChatClient;
pub use types::{ChatCompletion, ChatMessage, ChatRole};
