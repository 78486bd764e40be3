pub mod client;
pub mod error;
pub mod types;

pub use client::{BotApi, ChatClient};
pub use error::{FailureKind, TelegramError};
