// src/llm/mod.rs
pub mod client;
pub mod prompts;

pub use client::{ChatClient, LlmError, OpenAiChatClient};
