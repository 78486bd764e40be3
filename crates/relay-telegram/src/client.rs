use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use relay_codec::ChatRef;

use crate::error::TelegramError;
use crate::types::{
    AnswerInlineQuery, ApiResponse, Empty, ForwardMessage, GetUpdates, InlineArticle,
    InlineKeyboardMarkup, Message, SendMessage, SendPhoto, Update, User,
};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Long-poll wait requested from `getUpdates`.
pub const LONG_POLL_SECS: u64 = 30;

/// Upper bound for one HTTP round trip; must exceed the long-poll wait.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(LONG_POLL_SECS + 30);

const ALLOWED_UPDATES: &[&str] = &["message", "my_chat_member", "inline_query"];

/// Outbound operations the relay needs from the chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn forward_message(
        &self,
        chat: &ChatRef,
        from_chat: &ChatRef,
        message_id: i64,
    ) -> Result<Message, TelegramError>;

    async fn send_photo(
        &self,
        chat: &ChatRef,
        photo_url: &str,
        caption: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError>;

    async fn send_message(
        &self,
        chat: &ChatRef,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError>;

    async fn answer_inline_query(
        &self,
        query_id: &str,
        results: &[InlineArticle],
        cache_time: u32,
    ) -> Result<(), TelegramError>;

    async fn get_me(&self) -> Result<User, TelegramError>;
}

/// Bot API client over HTTPS.
#[derive(Clone)]
pub struct BotApi {
    http: reqwest::Client,
    /// `{api_url}/bot{token}`; never logged.
    endpoint: String,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi").finish_non_exhaustive()
    }
}

impl BotApi {
    pub fn new(token: &str, api_url: &str) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: LONG_POLL_SECS,
                allowed_updates: ALLOWED_UPDATES,
            },
        )
        .await
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, TelegramError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        trace!("Bot API call {}", method);
        // Error responses carry the same JSON envelope, so the status code
        // is not checked here.
        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .json(params)
            .send()
            .await
            .map_err(|e| TelegramError::Http(e.without_url()))?;

        let body: ApiResponse<R> = response
            .json()
            .await
            .map_err(|e| TelegramError::Decode(e.without_url().to_string()))?;
        body.into_result()
    }
}

#[async_trait]
impl ChatClient for BotApi {
    async fn forward_message(
        &self,
        chat: &ChatRef,
        from_chat: &ChatRef,
        message_id: i64,
    ) -> Result<Message, TelegramError> {
        self.call(
            "forwardMessage",
            &ForwardMessage {
                chat_id: chat,
                from_chat_id: from_chat,
                message_id,
            },
        )
        .await
    }

    async fn send_photo(
        &self,
        chat: &ChatRef,
        photo_url: &str,
        caption: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        self.call(
            "sendPhoto",
            &SendPhoto {
                chat_id: chat,
                photo: photo_url,
                caption,
                reply_markup: markup,
            },
        )
        .await
    }

    async fn send_message(
        &self,
        chat: &ChatRef,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id: chat,
                text,
                reply_markup: markup,
            },
        )
        .await
    }

    async fn answer_inline_query(
        &self,
        query_id: &str,
        results: &[InlineArticle],
        cache_time: u32,
    ) -> Result<(), TelegramError> {
        let _: bool = self
            .call(
                "answerInlineQuery",
                &AnswerInlineQuery {
                    inline_query_id: query_id,
                    results,
                    cache_time,
                },
            )
            .await?;
        Ok(())
    }

    async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &Empty {}).await
    }
}
