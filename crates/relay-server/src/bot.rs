use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_codec::{ChatRef, ForwardPayload, TokenCodec};
use relay_notify::{CaptionStrategy, NotificationJob, Renderer};
use relay_telegram::types::{ChatMemberUpdated, InlineArticle, InlineQuery, Message, Update};
use relay_telegram::{BotApi, ChatClient, TelegramError};
use relay_types::models::ChatType;
use relay_types::store::{CatalogSource, SubscriberStore};

pub const GREETING: &str = "🎬 Send a movie title to search.";
pub const INVALID_LINK: &str = "Invalid movie link.";
pub const NO_MEDIA: &str = "This post has no media.";
pub const FORWARD_FAILED: &str = "❌ Could not fetch the file. Please try again.";
pub const INVALID_COMMAND: &str = "❌ Invalid command";
pub const NOTHING_FOUND: &str = "❌ Nothing found";
pub const SEARCH_USAGE: &str = "❌ Write a title after /search or reply to a message with it.";
pub const NO_SYNOPSIS: &str = "No synopsis available.";

/// Hits taken from each catalog table per search.
const SEARCH_LIMIT: u32 = 5;

/// Shorter inline queries get an empty answer.
const MIN_INLINE_QUERY_CHARS: usize = 2;

const INLINE_CACHE_SECS: u32 = 1;

/// Back-off after a failed Bot API call in a long-running loop.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// A parsed chat message.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Start(Option<&'a str>),
    Send(&'a str),
    Search(Option<&'a str>),
    /// Any other slash command, or one addressed to a different bot.
    Unknown,
    Text(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(text: &'a str, bot_username: &str) -> Self {
        let text = text.trim();
        let Some(body) = text.strip_prefix('/') else {
            return Self::Text(text);
        };

        let (head, rest) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, Some(rest.trim()).filter(|r| !r.is_empty())),
            None => (body, None),
        };

        if let Some(token) = send_token(head, bot_username) {
            return Self::Send(token);
        }

        let (name, mention) = match head.split_once('@') {
            Some((name, mention)) => (name, Some(mention)),
            None => (head, None),
        };
        if mention.is_some_and(|m| !m.eq_ignore_ascii_case(bot_username)) {
            return Self::Unknown;
        }

        match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start(rest),
            "search" => Self::Search(rest),
            _ => Self::Unknown,
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Text(_) => "message",
            _ => "command",
        }
    }
}

/// `send_<token>`, `send_<token>@bot` or `send@bot_<token>`.
fn send_token<'a>(head: &'a str, bot_username: &str) -> Option<&'a str> {
    if let Some(token) = strip_prefix_ignore_case(head, "send_") {
        return Some(token.split_once('@').map_or(token, |(token, _)| token));
    }
    let mention = strip_prefix_ignore_case(head, "send@")?;
    strip_prefix_ignore_case(mention, bot_username)?.strip_prefix('_')
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Handles inbound updates: registers chats, redeems links and tokens,
/// answers searches.
pub struct Bot {
    chat: Arc<dyn ChatClient>,
    subscribers: Arc<dyn SubscriberStore>,
    catalog: Arc<dyn CatalogSource>,
    renderer: Renderer,
    tokens: TokenCodec,
    tables: Vec<String>,
    username: String,
}

impl Bot {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        subscribers: Arc<dyn SubscriberStore>,
        catalog: Arc<dyn CatalogSource>,
        renderer: Renderer,
        tokens: TokenCodec,
        tables: Vec<String>,
        username: &str,
    ) -> Self {
        Self {
            chat,
            subscribers,
            catalog,
            renderer,
            tokens,
            tables,
            username: username.trim_start_matches('@').to_string(),
        }
    }

    pub async fn handle_update(&self, update: Update) {
        if let Some(member) = update.my_chat_member {
            self.handle_membership(member).await;
        }
        if let Some(message) = update.message {
            self.handle_message(message).await;
        }
        if let Some(query) = update.inline_query {
            self.handle_inline_query(query).await;
        }
    }

    async fn handle_membership(&self, update: ChatMemberUpdated) {
        let chat_id = update.chat.id.to_string();
        let status = update.new_chat_member.status.as_str();
        if update.new_chat_member.is_gone() {
            info!("Removed from chat {} ({})", chat_id, status);
            self.subscribers.deactivate(&chat_id).await;
        } else if matches!(status, "member" | "administrator") {
            info!("Added to chat {} as {}", chat_id, status);
            self.subscribers
                .upsert(&update.chat.to_subscriber("membership"))
                .await;
        }
    }

    async fn handle_message(&self, message: Message) {
        let text = message
            .text
            .as_deref()
            .or(message.caption.as_deref())
            .unwrap_or_default();
        let command = Command::parse(text, &self.username);

        self.subscribers
            .upsert(&message.chat.to_subscriber(command.source()))
            .await;

        let chat = message.chat.chat_ref();
        let group = message.chat.kind.is_group();
        match command {
            Command::Start(None) => self.reply(&chat, GREETING).await,
            Command::Start(Some(payload)) => self.redeem_link(&chat, payload).await,
            Command::Send(token) if group => self.redeem_token(&chat, token).await,
            Command::Search(query) if group => {
                let quoted = message
                    .reply_to_message
                    .as_ref()
                    .and_then(|m| m.text.as_deref())
                    .map(str::trim)
                    .filter(|q| !q.is_empty());
                match query.or(quoted) {
                    Some(query) => self.search(&chat, query, CaptionStrategy::SendCommand).await,
                    None => self.reply(&chat, SEARCH_USAGE).await,
                }
            }
            Command::Text(query) if message.chat.kind == ChatType::Private && !query.is_empty() => {
                self.search(&chat, query, CaptionStrategy::DeepLinkOnly).await
            }
            _ => {}
        }
    }

    /// `/start forward_…`: forward the referenced post into the chat.
    async fn redeem_link(&self, chat: &ChatRef, payload: &str) {
        let Some(payload) = ForwardPayload::parse(payload) else {
            debug!("Unparseable start payload '{}'", payload);
            return self.reply(chat, INVALID_LINK).await;
        };
        match self.forward(chat, &payload).await {
            Some(forwarded) if !forwarded.has_media() => self.reply(chat, NO_MEDIA).await,
            Some(_) => {}
            None => self.reply(chat, FORWARD_FAILED).await,
        }
    }

    /// `/send_<token>` in a group.
    async fn redeem_token(&self, chat: &ChatRef, token: &str) {
        let Some(payload) = self.tokens.decode_forward(token) else {
            info!("Rejected send token in {}", chat);
            return self.reply(chat, INVALID_COMMAND).await;
        };
        if self.forward(chat, &payload).await.is_none() {
            self.reply(chat, FORWARD_FAILED).await;
        }
    }

    async fn forward(&self, chat: &ChatRef, payload: &ForwardPayload) -> Option<Message> {
        let target = payload.resolve_target()?;
        match self
            .chat
            .forward_message(chat, &target.chat, target.message_id)
            .await
        {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Forward of {} into {} failed: {}", payload, chat, e);
                None
            }
        }
    }

    /// Title matches from every catalog table, up to [`SEARCH_LIMIT`] per
    /// table. Rows without a usable link are left out.
    async fn find(&self, query: &str) -> Vec<NotificationJob> {
        let mut hits = Vec::new();
        for table in &self.tables {
            match self.catalog.search(table, query, SEARCH_LIMIT).await {
                Ok(rows) => hits.extend(rows.into_iter().filter_map(|row| NotificationJob::new(table, row))),
                Err(e) => warn!("Search in {} failed: {:#}", table, e),
            }
        }
        hits
    }

    async fn search(&self, chat: &ChatRef, query: &str, strategy: CaptionStrategy) {
        let mut sent = 0;
        for job in self.find(query).await {
            let rendered = self.renderer.render(
                &job.row.title,
                job.row.cover.as_deref(),
                &job.payload,
                strategy,
            );
            let result = match &rendered.photo {
                Some(photo) => {
                    self.chat
                        .send_photo(chat, photo, &rendered.caption, Some(&rendered.markup))
                        .await
                }
                None => {
                    self.chat
                        .send_message(chat, &rendered.caption, Some(&rendered.markup))
                        .await
                }
            };
            match result {
                Ok(_) => sent += 1,
                Err(e) => warn!("Search result to {} failed: {}", chat, e),
            }
        }
        if sent == 0 {
            self.reply(chat, NOTHING_FOUND).await;
        }
    }

    /// Inline mode: one article per hit, with the synopsis as description.
    async fn handle_inline_query(&self, query: InlineQuery) {
        let text = query.query.trim();
        let articles = if text.chars().count() < MIN_INLINE_QUERY_CHARS {
            Vec::new()
        } else {
            self.find(text).await.iter().map(|job| self.article(job)).collect()
        };

        debug!("Inline query '{}' from {}: {} result(s)", text, query.from.id, articles.len());
        if let Err(e) = self
            .chat
            .answer_inline_query(&query.id, &articles, INLINE_CACHE_SECS)
            .await
        {
            warn!("Inline answer failed: {}", e);
        }
    }

    fn article(&self, job: &NotificationJob) -> InlineArticle {
        let rendered = self.renderer.render(
            &job.row.title,
            job.row.cover.as_deref(),
            &job.payload,
            CaptionStrategy::DeepLinkOnly,
        );
        let mut article = InlineArticle::new(
            format!("{}_{}", job.source_table, job.row.id),
            job.row.title.trim(),
            rendered.caption,
            rendered.markup,
        );
        article.description = Some(
            job.row
                .synopsis
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(NO_SYNOPSIS)
                .to_string(),
        );
        article.thumbnail_url = rendered.photo;
        article
    }

    async fn reply(&self, chat: &ChatRef, text: &str) {
        if let Err(e) = self.chat.send_message(chat, text, None).await {
            log_reply_error(chat, &e);
        }
    }
}

fn log_reply_error(chat: &ChatRef, e: &TelegramError) {
    if e.is_permanent() {
        debug!("Cannot reply to {}: {}", chat, e);
    } else {
        warn!("Reply to {} failed: {}", chat, e);
    }
}

/// The bot's handle from `getMe`, retried every `retry_delay` while the Bot
/// API is unreachable. `Ok(None)` if shutdown was requested first; `Err` only
/// when the token is rejected or the bot has no username.
pub async fn resolve_username(
    chat: &dyn ChatClient,
    retry_delay: Duration,
    shutdown: &CancellationToken,
) -> Result<Option<String>, TelegramError> {
    loop {
        match chat.get_me().await {
            Ok(me) => {
                return me
                    .username
                    .map(Some)
                    .ok_or_else(|| TelegramError::Decode("getMe returned no username".into()));
            }
            Err(e @ TelegramError::Api { code: 401, .. }) => return Err(e),
            Err(e) => warn!("getMe failed, retrying in {}s: {}", retry_delay.as_secs(), e),
        }
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(None),
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }
}

/// Long-poll `getUpdates` until `shutdown` is cancelled.
pub async fn run_update_loop(bot: Arc<Bot>, api: BotApi, shutdown: CancellationToken) {
    let mut offset = None;
    info!("Listening for updates as @{}", bot.username);

    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = api.get_updates(offset) => result,
        };

        match result {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    bot.handle_update(update).await;
                }
            }
            Err(e) => {
                warn!("getUpdates failed: {}", e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }
    info!("Update loop stopped");
}
