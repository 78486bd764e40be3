//! Subscriber registry.
//!
//! Deployed subscriber tables are not uniform: older ones only carry
//! `chat_id`, `chat_type` and `is_active`. Every operation therefore walks an
//! ordered list of row shapes, widest first, and stops at the first one the
//! table accepts. Total failure is logged and swallowed on the write path so
//! that registry trouble never breaks message handling.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use tracing::{debug, error, warn};

use relay_types::models::{ChatType, Subscriber};
use relay_types::store::SubscriberStore;

use crate::{Database, TableName, migrations};

/// A row shape: the columns written or read in one attempt.
struct Shape {
    name: &'static str,
    columns: &'static [&'static str],
}

const UPSERT_SHAPES: &[Shape] = &[
    Shape {
        name: "full",
        columns: &[
            "chat_id",
            "chat_type",
            "title",
            "username",
            "first_name",
            "last_name",
            "is_active",
            "source",
            "updated_at",
        ],
    },
    Shape {
        name: "minimal",
        columns: &["chat_id", "chat_type", "is_active"],
    },
];

const DEACTIVATE_SHAPES: &[Shape] = &[
    Shape {
        name: "full",
        columns: &["is_active", "updated_at"],
    },
    Shape {
        name: "minimal",
        columns: &["is_active"],
    },
];

/// Read attempts. The last one drops the `is_active` filter: a table without
/// it degrades to broadcasting to every known chat.
const LIST_SHAPES: &[(Shape, bool)] = &[
    (
        Shape {
            name: "full",
            columns: &[
                "chat_id",
                "chat_type",
                "title",
                "username",
                "first_name",
                "last_name",
                "is_active",
                "source",
                "updated_at",
            ],
        },
        true,
    ),
    (
        Shape {
            name: "minimal",
            columns: &["chat_id", "chat_type"],
        },
        true,
    ),
    (
        Shape {
            name: "unfiltered",
            columns: &["chat_id", "chat_type"],
        },
        false,
    ),
];

#[derive(Clone)]
pub struct SubscriberRegistry {
    db: Arc<Database>,
    table: TableName,
}

impl SubscriberRegistry {
    pub fn new(db: Arc<Database>, table: TableName) -> Self {
        Self { db, table }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn ensure_table(&self) -> Result<()> {
        self.db
            .with_conn(|conn| migrations::ensure_subscriber_table(conn, &self.table))
    }

    /// Insert or refresh a subscriber. Returns the shape that was accepted,
    /// or `None` when every shape failed.
    pub fn upsert_now(&self, subscriber: &Subscriber) -> Option<&'static str> {
        let now = Utc::now();
        for shape in UPSERT_SHAPES {
            let values: Vec<Value> = shape
                .columns
                .iter()
                .map(|column| column_value(subscriber, column, now))
                .collect();

            match self.execute_upsert(shape, values) {
                Ok(()) => {
                    debug!("Subscriber {} upserted ({})", subscriber.chat_id, shape.name);
                    return Some(shape.name);
                }
                Err(e) => warn!(
                    "Subscriber upsert ({}) failed for {}: {}",
                    shape.name, subscriber.chat_id, e
                ),
            }
        }

        error!("Could not record subscriber {} in {}", subscriber.chat_id, self.table);
        None
    }

    /// Mark a subscriber inactive. Returns the shape that was accepted.
    pub fn deactivate_now(&self, chat_id: &str) -> Option<&'static str> {
        let now = Utc::now();
        for shape in DEACTIVATE_SHAPES {
            let assignments: Vec<String> = shape
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| format!("{column} = ?{}", i + 1))
                .collect();
            let mut values: Vec<Value> = shape
                .columns
                .iter()
                .map(|column| match *column {
                    "updated_at" => Value::Text(now.to_rfc3339()),
                    _ => Value::Integer(0),
                })
                .collect();
            values.push(Value::Text(chat_id.to_string()));

            let sql = format!(
                "UPDATE {} SET {} WHERE chat_id = ?{}",
                self.table,
                assignments.join(", "),
                values.len()
            );

            let result = self.db.with_conn(|conn| {
                conn.execute(&sql, rusqlite::params_from_iter(values))?;
                Ok(())
            });

            match result {
                Ok(()) => {
                    debug!("Subscriber {} deactivated ({})", chat_id, shape.name);
                    return Some(shape.name);
                }
                Err(e) => warn!(
                    "Subscriber deactivate ({}) failed for {}: {}",
                    shape.name, chat_id, e
                ),
            }
        }

        error!("Could not deactivate subscriber {} in {}", chat_id, self.table);
        None
    }

    pub fn list_active_now(&self) -> Result<Vec<Subscriber>> {
        let mut last_error = None;
        for (shape, active_only) in LIST_SHAPES {
            let mut sql = format!("SELECT {} FROM {}", shape.columns.join(", "), self.table);
            if *active_only {
                sql.push_str(" WHERE is_active = 1");
            }

            let result = self.db.with_conn(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| {
                        let mut values = Vec::with_capacity(shape.columns.len());
                        for i in 0..shape.columns.len() {
                            values.push(row.get::<_, Value>(i)?);
                        }
                        Ok(values)
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            });

            match result {
                Ok(rows) => {
                    if shape.name != LIST_SHAPES[0].0.name {
                        warn!("Listing subscribers with degraded shape '{}'", shape.name);
                    }
                    return Ok(rows
                        .into_iter()
                        .filter_map(|values| subscriber_from_values(shape.columns, values))
                        .collect());
                }
                Err(e) => {
                    debug!("Subscriber list ({}) failed: {}", shape.name, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("no subscriber read shape available")))
    }

    fn execute_upsert(&self, shape: &Shape, values: Vec<Value>) -> Result<()> {
        let placeholders: Vec<String> = (1..=shape.columns.len()).map(|i| format!("?{i}")).collect();
        let updates: Vec<String> = shape
            .columns
            .iter()
            .filter(|column| **column != "chat_id")
            .map(|column| format!("{column} = excluded.{column}"))
            .collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(chat_id) DO UPDATE SET {}",
            self.table,
            shape.columns.join(", "),
            placeholders.join(", "),
            updates.join(", ")
        );

        self.db.with_conn(|conn| {
            conn.execute(&sql, rusqlite::params_from_iter(values))?;
            Ok(())
        })
    }
}

#[async_trait]
impl SubscriberStore for SubscriberRegistry {
    async fn upsert(&self, subscriber: &Subscriber) {
        let this = self.clone();
        let subscriber = subscriber.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || this.upsert_now(&subscriber)).await {
            error!("Subscriber upsert task failed: {}", e);
        }
    }

    async fn deactivate(&self, chat_id: &str) {
        let this = self.clone();
        let chat_id = chat_id.to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || this.deactivate_now(&chat_id)).await {
            error!("Subscriber deactivate task failed: {}", e);
        }
    }

    async fn list_active(&self) -> Result<Vec<Subscriber>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.list_active_now())
            .await
            .map_err(|e| anyhow!("subscriber list task failed: {}", e))?
    }
}

fn column_value(subscriber: &Subscriber, column: &str, now: DateTime<Utc>) -> Value {
    let text = |v: &Option<String>| v.clone().map(Value::Text).unwrap_or(Value::Null);
    match column {
        "chat_id" => Value::Text(subscriber.chat_id.clone()),
        "chat_type" => Value::Text(subscriber.chat_type.as_str().to_string()),
        "title" => text(&subscriber.title),
        "username" => text(&subscriber.username),
        "first_name" => text(&subscriber.first_name),
        "last_name" => text(&subscriber.last_name),
        "is_active" => Value::Integer(i64::from(subscriber.is_active)),
        "source" => text(&subscriber.source),
        "updated_at" => Value::Text(now.to_rfc3339()),
        _ => Value::Null,
    }
}

fn subscriber_from_values(columns: &[&str], values: Vec<Value>) -> Option<Subscriber> {
    let mut subscriber = Subscriber::new(String::new(), ChatType::Other);
    for (column, value) in columns.iter().zip(values) {
        match *column {
            "chat_id" => subscriber.chat_id = value_to_string(value)?,
            "chat_type" => {
                subscriber.chat_type = value_to_string(value)
                    .map(|s| ChatType::parse(&s))
                    .unwrap_or(ChatType::Other)
            }
            "title" => subscriber.title = value_to_string(value),
            "username" => subscriber.username = value_to_string(value),
            "first_name" => subscriber.first_name = value_to_string(value),
            "last_name" => subscriber.last_name = value_to_string(value),
            "is_active" => subscriber.is_active = !matches!(value, Value::Integer(0)),
            "source" => subscriber.source = value_to_string(value),
            "updated_at" => {
                subscriber.updated_at = value_to_string(value)
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
            }
            _ => {}
        }
    }

    if subscriber.chat_id.is_empty() {
        return None;
    }
    Some(subscriber)
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}
