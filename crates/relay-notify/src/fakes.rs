use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::DateTime;
use tokio::sync::Notify;

use relay_codec::{ChatRef, TokenCodec};
use relay_telegram::TelegramError;
use relay_telegram::types::{Chat, InlineArticle, InlineKeyboardMarkup, Message, User};
use relay_telegram::ChatClient;
use relay_types::models::{CatalogRow, ChatType, Subscriber, Watermark};
use relay_types::store::{CatalogSource, SubscriberStore};

use crate::render::Renderer;

pub fn renderer() -> Renderer {
    Renderer::new("relaybot", TokenCodec::new("test-secret").unwrap())
}

/// Row whose link points at `t.me/films/<id>`.
pub fn catalog_row(id: i64, created_millis: i64) -> CatalogRow {
    let ts = DateTime::from_timestamp_millis(created_millis).unwrap();
    CatalogRow {
        id,
        title: format!("Film {id}"),
        cover: Some(format!("https://img.example/{id}.jpg")),
        link: Some(format!("https://t.me/films/{id}")),
        synopsis: None,
        created_at: ts,
        updated_at: ts,
    }
}

#[derive(Debug, Clone)]
pub struct SentItem {
    pub chat: String,
    pub photo: Option<String>,
    pub caption: String,
}

#[derive(Default)]
pub struct FakeChat {
    sent: Mutex<Vec<SentItem>>,
    attempts: AtomicUsize,
    failures: Mutex<HashMap<String, (i32, String)>>,
}

impl FakeChat {
    pub fn fail_with(&self, chat_id: &str, code: i32, description: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), (code, description.to_string()));
    }

    pub fn sent(&self) -> Vec<SentItem> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.chat).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
        self.attempts.store(0, Ordering::SeqCst);
    }

    fn record(&self, chat: &ChatRef, photo: Option<&str>, caption: &str) -> Result<Message, TelegramError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let key = chat.to_string();
        if let Some((code, description)) = self.failures.lock().unwrap().get(&key) {
            return Err(TelegramError::api(*code, description.clone()));
        }
        self.sent.lock().unwrap().push(SentItem {
            chat: key,
            photo: photo.map(str::to_string),
            caption: caption.to_string(),
        });
        Ok(message(chat))
    }
}

fn message(chat: &ChatRef) -> Message {
    let id = match chat {
        ChatRef::Id(id) => *id,
        ChatRef::Username(_) => 0,
    };
    Message {
        message_id: 1,
        chat: Chat {
            id,
            kind: ChatType::Private,
            title: None,
            username: None,
            first_name: None,
            last_name: None,
        },
        from: None,
        text: None,
        caption: None,
        reply_to_message: None,
        video: None,
        document: None,
        animation: None,
        audio: None,
        voice: None,
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn forward_message(
        &self,
        chat: &ChatRef,
        _from_chat: &ChatRef,
        _message_id: i64,
    ) -> Result<Message, TelegramError> {
        self.record(chat, None, "")
    }

    async fn send_photo(
        &self,
        chat: &ChatRef,
        photo_url: &str,
        caption: &str,
        _markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        self.record(chat, Some(photo_url), caption)
    }

    async fn send_message(
        &self,
        chat: &ChatRef,
        text: &str,
        _markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        self.record(chat, None, text)
    }

    async fn answer_inline_query(
        &self,
        _query_id: &str,
        _results: &[InlineArticle],
        _cache_time: u32,
    ) -> Result<(), TelegramError> {
        Ok(())
    }

    async fn get_me(&self) -> Result<User, TelegramError> {
        Ok(User {
            id: 1,
            is_bot: true,
            first_name: "Relay".into(),
            username: Some("relaybot".into()),
        })
    }
}

#[derive(Default)]
pub struct FakeSubscribers {
    rows: Mutex<Vec<Subscriber>>,
    deactivated: Mutex<Vec<String>>,
    unavailable: Mutex<bool>,
}

impl FakeSubscribers {
    pub fn with(rows: Vec<Subscriber>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn deactivated(&self) -> Vec<String> {
        self.deactivated.lock().unwrap().clone()
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_active)
            .map(|s| s.chat_id.clone())
            .collect()
    }
}

#[async_trait]
impl SubscriberStore for FakeSubscribers {
    async fn upsert(&self, subscriber: &Subscriber) {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|s| s.chat_id == subscriber.chat_id) {
            Some(existing) => *existing = subscriber.clone(),
            None => rows.push(subscriber.clone()),
        }
    }

    async fn deactivate(&self, chat_id: &str) {
        let mut rows = self.rows.lock().unwrap();
        for s in rows.iter_mut().filter(|s| s.chat_id == chat_id) {
            s.is_active = false;
        }
        self.deactivated.lock().unwrap().push(chat_id.to_string());
    }

    async fn list_active(&self) -> anyhow::Result<Vec<Subscriber>> {
        if *self.unavailable.lock().unwrap() {
            anyhow::bail!("subscriber table unavailable");
        }
        Ok(self.rows.lock().unwrap().iter().filter(|s| s.is_active).cloned().collect())
    }
}

/// In-memory catalog. `hold()` makes the next `rows_after` park until
/// `release()`; `entered` fires once a read is parked.
#[derive(Default)]
pub struct FakeCatalog {
    tables: Mutex<HashMap<String, Vec<CatalogRow>>>,
    broken: Mutex<Vec<String>>,
    reads: AtomicUsize,
    held: Mutex<bool>,
    pub entered: Notify,
    gate: Notify,
}

impl FakeCatalog {
    pub fn insert(&self, table: &str, row: CatalogRow) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn break_table(&self, table: &str) {
        self.broken.lock().unwrap().push(table.to_string());
    }

    pub fn fix_table(&self, table: &str) {
        self.broken.lock().unwrap().retain(|t| t != table);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn hold(&self) {
        *self.held.lock().unwrap() = true;
    }

    pub fn release(&self) {
        *self.held.lock().unwrap() = false;
        self.gate.notify_one();
    }

    fn check(&self, table: &str) -> anyhow::Result<()> {
        if self.broken.lock().unwrap().iter().any(|t| t == table) {
            anyhow::bail!("no such table: {table}");
        }
        Ok(())
    }

    fn sorted(&self, table: &str) -> Vec<CatalogRow> {
        let mut rows = self.tables.lock().unwrap().get(table).cloned().unwrap_or_default();
        rows.sort_by_key(|r| (r.created_at, r.id));
        rows
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn latest_row(&self, table: &str) -> anyhow::Result<Option<CatalogRow>> {
        self.check(table)?;
        Ok(self.sorted(table).pop())
    }

    async fn rows_after(
        &self,
        table: &str,
        after: Option<Watermark>,
        limit: u32,
    ) -> anyhow::Result<Vec<CatalogRow>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let held = *self.held.lock().unwrap();
        if held {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        self.check(table)?;
        Ok(self
            .sorted(table)
            .into_iter()
            .filter(|r| after.is_none_or(|w| r.created_at > w.timestamp))
            .take(limit as usize)
            .collect())
    }

    async fn search(&self, table: &str, query: &str, limit: u32) -> anyhow::Result<Vec<CatalogRow>> {
        self.check(table)?;
        let query = query.to_lowercase();
        Ok(self
            .sorted(table)
            .into_iter()
            .rev()
            .filter(|r| r.title.to_lowercase().contains(&query))
            .take(limit as usize)
            .collect())
    }
}
