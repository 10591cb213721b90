//! Convenience re-exports for the common client types.

pub use crate::audio::{AudioFormat, SpeechClient, SpeechOutcome, SpeechRequest};
pub use crate::chat::{ChatClient, ChatMessage, Role};
pub use crate::config::{AppConfig, ChatConfig, ConfigIssue, IssueLevel, SpeechConfig, TokenConfig};
pub use crate::error::{Error, Result};
pub use crate::player::AudioPlayer;
pub use crate::token::{
    Credentials, FileTokenStore, HttpTokenFetcher, MemoryTokenStore, Refreshed, StaticToken,
    TokenFetcher, TokenManager, TokenProvider, TokenRecord, TokenStore,
};
