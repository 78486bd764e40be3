//! Forward payloads: `forward_<fields…>` strings that address a message in a
//! source chat.
//!
//! Encodings:
//!   forward_<internalId>_<messageId>          private channel (numeric id)
//!   forward_<handle>_<messageId>              public chat or channel
//!   forward_<handle>_<topicId>_<messageId>    accepted on parse only
//!
//! Links into a forum topic (`t.me/<handle>/<topic>/<msg>`) produce the
//! three-field form: message ids are unique per chat, so the topic is not
//! needed to find the message. The four-field form is still understood, but
//! its topic never reaches the forward call, where a thread id would address
//! the destination chat.
//!
//! Parsing works from the right: the last field is always the message id,
//! a numeric field before it is a topic id unless it is the only other field,
//! and what remains is the chat. A numeric chat field always means a private
//! channel, never a public handle.

use std::fmt;

use serde::{Serialize, Serializer};
use url::Url;

pub const PAYLOAD_PREFIX: &str = "forward_";

const LINK_HOSTS: &[&str] = &["t.me", "telegram.me"];

/// Placeholder values catalog rows use for "no link".
const PLACEHOLDER_LINKS: &[&str] = &["", "#"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ForwardPayload {
    PrivateChannel { internal_id: u64, message_id: i64 },
    PublicChat { handle: String, message_id: i64 },
    PublicTopic { handle: String, topic_id: i64, message_id: i64 },
}

/// Chat reference accepted by the Bot API: a numeric id or an `@handle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Id(i64),
    Username(String),
}

impl ChatRef {
    /// Interpret a stored chat id: numeric ids stay numeric, anything else
    /// is treated as a handle.
    pub fn from_chat_id(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Username(raw.trim_start_matches('@').to_string()),
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => write!(f, "@{name}"),
        }
    }
}

impl Serialize for ChatRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Id(id) => serializer.serialize_i64(*id),
            Self::Username(_) => serializer.collect_str(self),
        }
    }
}

/// Where a redeemed payload forwards from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub chat: ChatRef,
    pub message_id: i64,
}

impl ForwardPayload {
    /// Canonicalize a catalog link. Returns `None` for anything that is not a
    /// recognised message link; never panics on untrusted input.
    ///
    /// A deep link that already carries `start=<payload>` (e.g. a link to the
    /// bot itself) is unwrapped and the embedded payload re-parsed.
    pub fn from_link(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if PLACEHOLDER_LINKS.contains(&trimmed) {
            return None;
        }

        let url = Url::parse(trimmed).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?.to_ascii_lowercase();
        if !LINK_HOSTS.contains(&host.as_str()) {
            return None;
        }

        if let Some((_, start)) = url.query_pairs().find(|(key, _)| key == "start") {
            return Self::parse(&start);
        }

        let parts: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        match parts.as_slice() {
            ["c", internal_id, message_id] => {
                let internal_id = parse_internal_id(internal_id)?;
                let message_id = parse_message_id(message_id)?;
                Some(Self::PrivateChannel { internal_id, message_id })
            }
            ["c", ..] => None,
            [handle, message_id] if is_handle(handle) => Some(Self::PublicChat {
                handle: handle.to_string(),
                message_id: parse_message_id(message_id)?,
            }),
            [handle, topic_id, message_id] if is_handle(handle) => {
                parse_message_id(topic_id)?;
                Some(Self::PublicChat {
                    handle: handle.to_string(),
                    message_id: parse_message_id(message_id)?,
                })
            }
            _ => None,
        }
    }

    /// Parse an encoded payload (the inverse of `Display`).
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.trim().strip_prefix(PAYLOAD_PREFIX)?;
        let fields: Vec<&str> = rest.split('_').collect();
        if fields.iter().any(|f| f.is_empty()) {
            return None;
        }

        let (last, head) = fields.split_last()?;
        let message_id = parse_message_id(last)?;

        match head {
            [] => None,
            [chat] if is_digits(chat) => Some(Self::PrivateChannel {
                internal_id: parse_internal_id(chat)?,
                message_id,
            }),
            [.., topic] if head.len() > 1 && is_digits(topic) => {
                let handle = head[..head.len() - 1].join("_");
                if !is_handle(&handle) {
                    return None;
                }
                Some(Self::PublicTopic {
                    handle,
                    topic_id: parse_message_id(topic)?,
                    message_id,
                })
            }
            _ => {
                let handle = head.join("_");
                if !is_handle(&handle) {
                    return None;
                }
                Some(Self::PublicChat { handle, message_id })
            }
        }
    }

    /// Where to forward from. `None` only if a private channel id is too
    /// large to form a chat id.
    pub fn resolve_target(&self) -> Option<ForwardTarget> {
        let target = match self {
            Self::PrivateChannel { internal_id, message_id } => ForwardTarget {
                chat: ChatRef::Id(supergroup_chat_id(*internal_id)?),
                message_id: *message_id,
            },
            Self::PublicChat { handle, message_id } | Self::PublicTopic { handle, message_id, .. } => {
                ForwardTarget {
                    chat: ChatRef::Username(handle.clone()),
                    message_id: *message_id,
                }
            }
        };
        Some(target)
    }
}

impl fmt::Display for ForwardPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateChannel { internal_id, message_id } => {
                write!(f, "{PAYLOAD_PREFIX}{internal_id}_{message_id}")
            }
            Self::PublicChat { handle, message_id } => {
                write!(f, "{PAYLOAD_PREFIX}{handle}_{message_id}")
            }
            Self::PublicTopic { handle, topic_id, message_id } => {
                write!(f, "{PAYLOAD_PREFIX}{handle}_{topic_id}_{message_id}")
            }
        }
    }
}

/// Private channel ids become `-100<id>` on the Bot API.
fn supergroup_chat_id(internal_id: u64) -> Option<i64> {
    format!("-100{internal_id}").parse().ok()
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_handle(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !is_digits(s)
}

fn parse_message_id(s: &str) -> Option<i64> {
    if !is_digits(s) {
        return None;
    }
    s.parse::<i64>().ok().filter(|id| *id > 0)
}

fn parse_internal_id(s: &str) -> Option<u64> {
    if !is_digits(s) {
        return None;
    }
    let id = s.parse::<u64>().ok().filter(|id| *id > 0)?;
    supergroup_chat_id(id).map(|_| id)
}
