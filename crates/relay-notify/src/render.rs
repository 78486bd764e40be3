use relay_codec::{ForwardPayload, TokenCodec};
use relay_telegram::types::InlineKeyboardMarkup;
use relay_types::models::ChatType;

pub const OPEN_BUTTON_TEXT: &str = "▶️ Go to file";

/// Cover values that mean "no image".
const PLACEHOLDER_COVERS: &[&str] = &["", "#"];

/// What the caption offers besides the title.
///
/// Private chats redeem through the `/start` deep link directly. In groups a
/// deep link opens a private chat with the bot, so the caption also carries a
/// signed `/send_<token>` command that forwards the file into the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionStrategy {
    DeepLinkOnly,
    SendCommand,
}

impl CaptionStrategy {
    pub fn for_chat(chat_type: ChatType) -> Self {
        if chat_type.is_group() {
            Self::SendCommand
        } else {
            Self::DeepLinkOnly
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNotification {
    /// Cover URL; `None` means the caption goes out as a text message.
    pub photo: Option<String>,
    pub caption: String,
    pub markup: InlineKeyboardMarkup,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    bot_username: String,
    tokens: TokenCodec,
}

impl Renderer {
    pub fn new(bot_username: &str, tokens: TokenCodec) -> Self {
        Self {
            bot_username: bot_username.trim_start_matches('@').to_string(),
            tokens,
        }
    }

    pub fn deep_link(&self, payload: &ForwardPayload) -> String {
        format!("https://t.me/{}?start={}", self.bot_username, payload)
    }

    pub fn render(
        &self,
        title: &str,
        cover: Option<&str>,
        payload: &ForwardPayload,
        strategy: CaptionStrategy,
    ) -> RenderedNotification {
        let mut caption = format!("🎬 {}", title.trim());
        if strategy == CaptionStrategy::SendCommand {
            let token = self.tokens.encode(&payload.to_string());
            caption.push_str(&format!("\n\n/send_{token}"));
        }

        let photo = cover
            .map(str::trim)
            .filter(|c| !PLACEHOLDER_COVERS.contains(c))
            .map(str::to_string);

        RenderedNotification {
            photo,
            caption,
            markup: InlineKeyboardMarkup::single_url(OPEN_BUTTON_TEXT, self.deep_link(payload)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> Renderer {
        Renderer::new("@Filmchinbot", TokenCodec::new("s3cr3t").unwrap())
    }

    fn payload() -> ForwardPayload {
        ForwardPayload::PublicChat { handle: "moviechan".into(), message_id: 55 }
    }

    #[test]
    fn strategy_follows_chat_type() {
        assert_eq!(CaptionStrategy::for_chat(ChatType::Private), CaptionStrategy::DeepLinkOnly);
        assert_eq!(CaptionStrategy::for_chat(ChatType::Channel), CaptionStrategy::DeepLinkOnly);
        assert_eq!(CaptionStrategy::for_chat(ChatType::Group), CaptionStrategy::SendCommand);
        assert_eq!(CaptionStrategy::for_chat(ChatType::Supergroup), CaptionStrategy::SendCommand);
    }

    #[test]
    fn private_caption_has_no_token() {
        let rendered = renderer().render(
            "Inception",
            Some("https://img.example/1.jpg"),
            &payload(),
            CaptionStrategy::DeepLinkOnly,
        );
        assert_eq!(rendered.caption, "🎬 Inception");
        assert_eq!(rendered.photo.as_deref(), Some("https://img.example/1.jpg"));

        let button = &rendered.markup.inline_keyboard[0][0];
        assert_eq!(button.text, OPEN_BUTTON_TEXT);
        assert_eq!(button.url, "https://t.me/Filmchinbot?start=forward_moviechan_55");
    }

    #[test]
    fn group_caption_carries_redeemable_command() {
        let rendered = renderer().render("Inception", None, &payload(), CaptionStrategy::SendCommand);
        let (title, command) = rendered.caption.split_once("\n\n").unwrap();
        assert_eq!(title, "🎬 Inception");

        let token = command.strip_prefix("/send_").unwrap();
        let codec = TokenCodec::new("s3cr3t").unwrap();
        assert_eq!(codec.decode_forward(token), Some(payload()));
    }

    #[test]
    fn placeholder_cover_means_text_message() {
        for cover in [None, Some(""), Some("#"), Some("  ")] {
            let rendered = renderer().render("X", cover, &payload(), CaptionStrategy::DeepLinkOnly);
            assert_eq!(rendered.photo, None, "{cover:?}");
        }
    }
}
