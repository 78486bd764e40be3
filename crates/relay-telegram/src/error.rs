/// How a delivery failure should be treated by the fan-out loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The chat will never accept messages again (blocked, kicked, migrated).
    Permanent,
    /// Worth trying again on a later notification.
    Transient,
}

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Bot API error {code}: {description}")]
    Api {
        code: i32,
        description: String,
        migrate_to_chat_id: Option<i64>,
        retry_after: Option<u64>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed Bot API response: {0}")]
    Decode(String),
}

/// Bad-request descriptions that mean the chat is gone for good.
const PERMANENT_BAD_REQUESTS: &[&str] = &[
    "migrated",
    "upgraded to a supergroup",
    "chat not found",
    "user is deactivated",
];

impl TelegramError {
    pub fn api(code: i32, description: impl Into<String>) -> Self {
        Self::Api {
            code,
            description: description.into(),
            migrate_to_chat_id: None,
            retry_after: None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Api { code: 403, .. } => FailureKind::Permanent,
            Self::Api { migrate_to_chat_id: Some(_), .. } => FailureKind::Permanent,
            Self::Api { code: 400, description, .. } => {
                let description = description.to_ascii_lowercase();
                if PERMANENT_BAD_REQUESTS.iter().any(|p| description.contains(p)) {
                    FailureKind::Permanent
                } else {
                    FailureKind::Transient
                }
            }
            _ => FailureKind::Transient,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind() == FailureKind::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_and_kicked_are_permanent() {
        assert!(TelegramError::api(403, "Forbidden: bot was blocked by the user").is_permanent());
        assert!(TelegramError::api(403, "Forbidden: bot was kicked from the group chat").is_permanent());
    }

    #[test]
    fn migrated_chat_is_permanent() {
        let err = TelegramError::Api {
            code: 400,
            description: "Bad Request: group chat was upgraded to a supergroup chat".into(),
            migrate_to_chat_id: Some(-1001234),
            retry_after: None,
        };
        assert!(err.is_permanent());
        assert!(TelegramError::api(400, "Bad Request: chat not found").is_permanent());
    }

    #[test]
    fn other_failures_are_transient() {
        assert_eq!(
            TelegramError::api(429, "Too Many Requests: retry after 5").kind(),
            FailureKind::Transient
        );
        assert_eq!(
            TelegramError::api(400, "Bad Request: wrong file identifier").kind(),
            FailureKind::Transient
        );
        assert_eq!(TelegramError::api(502, "Bad Gateway").kind(), FailureKind::Transient);
        assert_eq!(
            TelegramError::Decode("eof".into()).kind(),
            FailureKind::Transient
        );
    }
}
