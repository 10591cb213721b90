//! azgpt - Azure OpenAI chat and Azure text-to-speech with cached bearer tokens.
//!
//! The heart of the crate is [`token::TokenManager`], which hands out bearer
//! tokens from a small JSON cache in the home directory and only goes to the
//! token endpoint once the cached token has passed its expiration time. The
//! [`chat::ChatClient`] and [`audio::SpeechClient`] consume it through the
//! [`token::TokenProvider`] trait.

pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod player;
pub mod prelude;
pub mod token;
pub mod util;

pub use error::{Error, Result};
