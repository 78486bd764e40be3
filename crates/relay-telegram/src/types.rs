//! Bot API wire types, limited to the fields the relay reads or sends.

use serde::{Deserialize, Serialize};

use relay_codec::ChatRef;
use relay_types::models::{ChatType, Subscriber};

use crate::error::TelegramError;

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub error_code: Option<i32>,
    pub description: Option<String>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseParameters {
    pub migrate_to_chat_id: Option<i64>,
    pub retry_after: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn into_result(self) -> Result<T, TelegramError> {
        if self.ok {
            return self
                .result
                .ok_or_else(|| TelegramError::Decode("ok response without result".into()));
        }

        let parameters = self.parameters.unwrap_or_default();
        Err(TelegramError::Api {
            code: self.error_code.unwrap_or(0),
            description: self.description.unwrap_or_default(),
            migrate_to_chat_id: parameters.migrate_to_chat_id,
            retry_after: parameters.retry_after,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ChatType,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Chat {
    pub fn chat_ref(&self) -> ChatRef {
        ChatRef::Id(self.id)
    }

    pub fn to_subscriber(&self, source: &str) -> Subscriber {
        let mut subscriber = Subscriber::new(self.id.to_string(), self.kind).with_source(source);
        subscriber.title = self.title.clone();
        subscriber.username = self.username.clone();
        subscriber.first_name = self.first_name.clone();
        subscriber.last_name = self.last_name.clone();
        subscriber
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub reply_to_message: Option<Box<Message>>,
    pub video: Option<serde_json::Value>,
    pub document: Option<serde_json::Value>,
    pub animation: Option<serde_json::Value>,
    pub audio: Option<serde_json::Value>,
    pub voice: Option<serde_json::Value>,
}

impl Message {
    /// Whether the message carries a playable or downloadable file.
    pub fn has_media(&self) -> bool {
        self.video.is_some()
            || self.document.is_some()
            || self.animation.is_some()
            || self.audio.is_some()
            || self.voice.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
}

impl ChatMember {
    pub fn is_gone(&self) -> bool {
        matches!(self.status.as_str(), "kicked" | "left")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub from: User,
    pub new_chat_member: ChatMember,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: User,
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub my_chat_member: Option<ChatMemberUpdated>,
    pub inline_query: Option<InlineQuery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    pub fn single_url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: text.into(),
                url: url.into(),
            }]],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputTextMessageContent {
    pub message_text: String,
}

/// An `article` answer to an inline query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineArticle {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Unique within one answer, at most 64 bytes.
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub input_message_content: InputTextMessageContent,
    pub reply_markup: InlineKeyboardMarkup,
}

impl InlineArticle {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        message_text: impl Into<String>,
        reply_markup: InlineKeyboardMarkup,
    ) -> Self {
        Self {
            kind: "article",
            id: id.into(),
            title: title.into(),
            description: None,
            thumbnail_url: None,
            input_message_content: InputTextMessageContent {
                message_text: message_text.into(),
            },
            reply_markup,
        }
    }
}

// -- Requests --

#[derive(Debug, Serialize)]
pub(crate) struct GetUpdates<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timeout: u64,
    pub allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
pub(crate) struct ForwardMessage<'a> {
    pub chat_id: &'a ChatRef,
    pub from_chat_id: &'a ChatRef,
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendPhoto<'a> {
    pub chat_id: &'a ChatRef,
    pub photo: &'a str,
    pub caption: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessage<'a> {
    pub chat_id: &'a ChatRef,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerInlineQuery<'a> {
    pub inline_query_id: &'a str,
    pub results: &'a [InlineArticle],
    pub cache_time: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_becomes_api_error() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: group chat was upgraded to a supergroup chat","parameters":{"migrate_to_chat_id":-1001999}}"#;
        let response: ApiResponse<Message> = serde_json::from_str(body).unwrap();
        match response.into_result() {
            Err(TelegramError::Api { code, migrate_to_chat_id, .. }) => {
                assert_eq!(code, 400);
                assert_eq!(migrate_to_chat_id, Some(-1001999));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn updates_parse_messages_and_membership() {
        let body = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"message_id":5,"chat":{"id":-1002,"type":"supergroup","title":"Film Club"},
              "from":{"id":7,"is_bot":false,"first_name":"Sam"},"text":"/search matrix"}},
            {"update_id":11,"my_chat_member":{"chat":{"id":42,"type":"private","first_name":"Ana"},
              "from":{"id":42,"first_name":"Ana"},
              "new_chat_member":{"status":"kicked","user":{"id":99,"is_bot":true,"first_name":"Relay"}}}}
        ]}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(body).unwrap();
        let updates = response.into_result().unwrap();
        assert_eq!(updates.len(), 2);

        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.kind, ChatType::Supergroup);
        assert!(!message.has_media());
        let sub = message.chat.to_subscriber("message");
        assert_eq!(sub.chat_id, "-1002");
        assert_eq!(sub.title.as_deref(), Some("Film Club"));
        assert_eq!(sub.source.as_deref(), Some("message"));

        let member = updates[1].my_chat_member.as_ref().unwrap();
        assert!(member.new_chat_member.is_gone());
    }

    #[test]
    fn forwarded_video_counts_as_media() {
        let body = r#"{"message_id":9,"chat":{"id":1,"type":"private"},"video":{"file_id":"abc"}}"#;
        let message: Message = serde_json::from_str(body).unwrap();
        assert!(message.has_media());
    }

    #[test]
    fn inline_query_update_deserializes() {
        let body = r#"{"update_id":9,"inline_query":{"id":"q1","from":{"id":5,"is_bot":false,"first_name":"Ann"},"query":"matrix","offset":""}}"#;
        let update: Update = serde_json::from_str(body).unwrap();
        let query = update.inline_query.unwrap();
        assert_eq!(query.id, "q1");
        assert_eq!(query.query, "matrix");
        assert!(update.message.is_none());
    }

    #[test]
    fn inline_answer_serializes_articles() {
        let mut article = InlineArticle::new(
            "movies_1",
            "The Matrix",
            "🎬 The Matrix",
            InlineKeyboardMarkup::single_url("Open", "https://t.me/bot?start=forward_chan_1"),
        );
        article.description = Some("A hacker learns the truth.".into());
        let request = AnswerInlineQuery {
            inline_query_id: "q1",
            results: std::slice::from_ref(&article),
            cache_time: 1,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["cache_time"], 1);
        let result = &value["results"][0];
        assert_eq!(result["type"], "article");
        assert_eq!(result["id"], "movies_1");
        assert_eq!(result["description"], "A hacker learns the truth.");
        assert!(result.get("thumbnail_url").is_none());
        assert_eq!(result["input_message_content"]["message_text"], "🎬 The Matrix");
        assert_eq!(
            result["reply_markup"]["inline_keyboard"][0][0]["url"],
            "https://t.me/bot?start=forward_chan_1"
        );
    }

    #[test]
    fn forward_request_serializes_chat_refs() {
        let to = ChatRef::Id(42);
        let from = ChatRef::Username("moviechan".into());
        let request = ForwardMessage {
            chat_id: &to,
            from_chat_id: &from,
            message_id: 55,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"chat_id": 42, "from_chat_id": "@moviechan", "message_id": 55})
        );
    }
}
