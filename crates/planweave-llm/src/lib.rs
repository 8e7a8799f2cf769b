//! Chat model integration for the planweave engine.
//!
//! Provides the [`ChatClient`] abstraction with an OpenAI-compatible HTTP
//! implementation and a scripted mock, transient-failure retry, and the
//! [`Recognizer`] that turns a natural-language instruction into plan text
//! the graph parser accepts.
//!
//! This crate does NOT care about:
//! - Parsing or executing plans (see `planweave-core`)
//! - Which commands exist (callers supply the catalog)

pub mod client;
pub mod recognizer;
pub mod retry;

pub use client::{
    ChatClient, ChatError, ChatMessage, ChatRequest, MockChatClient, OpenAiClient,
    OpenAiClientConfig,
};
pub use recognizer::{normalize_plan_text, Recognizer, RecognizerConfig};
pub use retry::{complete_with_retry, RetryPolicy};
