//! Storage seams used by the poller and dispatcher.
//!
//! The SQLite implementations live in `relay-db`; tests substitute in-memory
//! fakes.

use async_trait::async_trait;

use crate::models::{CatalogRow, Subscriber, Watermark};

/// Durable record of chats that receive notifications.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Create or refresh a subscriber. Failures are logged, never returned.
    async fn upsert(&self, subscriber: &Subscriber);

    /// Soft-delete a subscriber after a permanent delivery failure.
    async fn deactivate(&self, chat_id: &str);

    /// Subscribers that should receive the next notification.
    async fn list_active(&self) -> anyhow::Result<Vec<Subscriber>>;
}

/// Read-only view over the catalog tables.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Most recent row by `(created_at, id)`, if the table has any.
    async fn latest_row(&self, table: &str) -> anyhow::Result<Option<CatalogRow>>;

    /// Rows strictly newer than `after` in ascending order, at most `limit`.
    /// `None` means every row is new.
    async fn rows_after(
        &self,
        table: &str,
        after: Option<Watermark>,
        limit: u32,
    ) -> anyhow::Result<Vec<CatalogRow>>;

    /// Case-insensitive title search.
    async fn search(&self, table: &str, query: &str, limit: u32) -> anyhow::Result<Vec<CatalogRow>>;
}
