// Client side of the firm's intake assistant: the live voice session and the
// grounded text chat, both talking to the hosted model API.

pub mod chat;
pub mod config;
pub mod error;
pub mod persona;
pub mod rest;
pub mod voice;
pub mod wire;

pub use chat::{ChatClient, ChatError, ChatReply, Conversation};
pub use config::AssistantConfig;
pub use error::AssistantError;
pub use voice::{AssistantState, LiveAssistant};
