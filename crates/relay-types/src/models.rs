use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat kind as reported by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
    #[serde(other)]
    Other,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
            Self::Other => "other",
        }
    }

    /// Lenient parse for values read back from the subscriber table.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "private" => Self::Private,
            "group" => Self::Group,
            "supergroup" => Self::Supergroup,
            "channel" => Self::Channel,
            _ => Self::Other,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat registered to receive catalog notifications.
///
/// `chat_id` is the identity: re-registering a chat updates it in place.
/// Subscribers are never hard-deleted; a permanent delivery failure only
/// clears `is_active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: String,
    pub chat_type: ChatType,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub source: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    pub fn new(chat_id: impl Into<String>, chat_type: ChatType) -> Self {
        Self {
            chat_id: chat_id.into(),
            chat_type,
            title: None,
            username: None,
            first_name: None,
            last_name: None,
            is_active: true,
            source: None,
            updated_at: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// One row of a catalog table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub id: i64,
    pub title: String,
    pub cover: Option<String>,
    pub link: Option<String>,
    pub synopsis: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Progress marker for one source table: the last row already processed.
///
/// Ordering is `(timestamp, id)`; a watermark only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Watermark {
    pub timestamp: DateTime<Utc>,
    pub id: i64,
}

impl Watermark {
    pub fn at(row: &CatalogRow) -> Self {
        Self {
            timestamp: row.created_at,
            id: row.id,
        }
    }

    /// Move to `row` if it lies strictly ahead. Returns whether it moved.
    pub fn advance_to(&mut self, row: &CatalogRow) -> bool {
        let next = Self::at(row);
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}
