//! # Reflections
//!
//! Short text records about conversations, stored in the `reflections` table of
//! a Supabase project through its PostgREST interface.
//!
//! ## Schema
//! - id (**uuid**), user (**text**), summary (**text**), category (**text**),
//!   sentiment (**float**, -1 to 1 by convention), timestamp (**timestamptz**)
//!
//! ## Writes
//! - Only `summary` is validated, it must be non-blank text
//! - `user` and `category` take any JSON value, non-strings are stored as their JSON text
//! - `sentiment` takes a number or a numeric string, anything else is `0`
//! - Rows read back with NULL columns get the same defaults
//!
//! ## Paging
//! - Newest first by `timestamp`
//! - `limit` defaults to 50 and is capped at 200, `offset` defaults to 0
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;

pub const REFLECTIONS_TABLE: &str = "reflections";
pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;

const DEFAULT_USER: &str = "anonymous";
const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "StoredReflection")]
pub struct Reflection {
    pub id: Uuid,
    pub user: String,
    pub summary: String,
    pub category: String,
    pub sentiment: f64,
    pub timestamp: DateTime<Utc>,
}

/// Row as the table may hand it back, nullable columns included.
#[derive(Deserialize)]
struct StoredReflection {
    id: Uuid,
    user: Option<String>,
    summary: Option<String>,
    category: Option<String>,
    sentiment: Option<f64>,
    timestamp: DateTime<Utc>,
}

impl From<StoredReflection> for Reflection {
    fn from(row: StoredReflection) -> Self {
        Self {
            id: row.id,
            user: row.user.unwrap_or_else(|| DEFAULT_USER.to_string()),
            summary: row.summary.unwrap_or_default(),
            category: row.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            sentiment: row.sentiment.unwrap_or(0.0),
            timestamp: row.timestamp,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NewReflection {
    pub user: Option<Value>,
    pub summary: Option<Value>,
    pub category: Option<Value>,
    pub sentiment: Option<Value>,
}

impl NewReflection {
    pub fn into_reflection(self) -> Result<Reflection, AppError> {
        let summary = match self.summary {
            Some(Value::String(summary)) if !summary.trim().is_empty() => summary,
            _ => {
                return Err(AppError::MalformedPayload(
                    "Missing or invalid 'summary' text.",
                ));
            }
        };

        Ok(Reflection {
            id: Uuid::new_v4(),
            user: text_or(self.user, DEFAULT_USER),
            summary,
            category: text_or(self.category, DEFAULT_CATEGORY),
            sentiment: score(self.sentiment),
            timestamp: Utc::now(),
        })
    }
}

fn text_or(value: Option<Value>, default: &str) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => default.to_string(),
    }
}

fn score(value: Option<Value>) -> f64 {
    let score = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    };

    score.filter(|score| score.is_finite()).unwrap_or(0.0)
}

/// Parses raw `limit`/`offset` query values, falling back to the defaults on junk.
pub fn page(limit: Option<&str>, offset: Option<&str>) -> (usize, usize) {
    let limit = limit
        .and_then(|limit| limit.trim().parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_LIMIT)
        .min(MAX_LIMIT);
    let offset = offset
        .and_then(|offset| offset.trim().parse::<usize>().ok())
        .unwrap_or(0);

    (limit, offset)
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Datastore request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Datastore rejected request ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
}

#[async_trait]
pub trait ReflectionStore: Send + Sync {
    async fn insert(&self, reflection: &Reflection) -> Result<(), StoreError>;

    async fn recent(&self, limit: usize, offset: usize) -> Result<Vec<Reflection>, StoreError>;
}

pub struct SupabaseReflections {
    http: Client,
    table_url: String,
    key: String,
}

impl SupabaseReflections {
    pub fn new(http: Client, supabase_url: &str, key: &str) -> Self {
        Self {
            http,
            table_url: format!("{supabase_url}/rest/v1/{REFLECTIONS_TABLE}"),
            key: key.to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(StoreError::Rejected {
            status,
            body: response.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ReflectionStore for SupabaseReflections {
    async fn insert(&self, reflection: &Reflection) -> Result<(), StoreError> {
        let response = self
            .http
            .post(&self.table_url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", "return=minimal")
            .json(&[reflection])
            .send()
            .await?;

        Self::check(response).await?;

        Ok(())
    }

    async fn recent(&self, limit: usize, offset: usize) -> Result<Vec<Reflection>, StoreError> {
        let response = self
            .http
            .get(&self.table_url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .query(&[
                ("select", "*".to_string()),
                ("order", "timestamp.desc".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }
}

/// Process-local store with the same ordering as the Supabase table.
#[derive(Default)]
pub struct MemoryReflections {
    rows: RwLock<Vec<Reflection>>,
}

impl MemoryReflections {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReflectionStore for MemoryReflections {
    async fn insert(&self, reflection: &Reflection) -> Result<(), StoreError> {
        self.rows.write().push(reflection.clone());

        Ok(())
    }

    async fn recent(&self, limit: usize, offset: usize) -> Result<Vec<Reflection>, StoreError> {
        let mut rows = self.rows.read().clone();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}
