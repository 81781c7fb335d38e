//! Contract of the hosted table store and its REST/realtime client.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use shared::{
    domain::{Column, User, UserId, UserRow},
    protocol::ChangeEvent,
};
use thiserror::Error;

pub mod postgrest;
pub mod realtime;

pub use postgrest::PostgrestTable;

/// SQLSTATE reported by the store when a unique constraint is violated.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Push channel of row changes. Dropping it closes the subscription.
pub type ChangeFeed = BoxStream<'static, ChangeEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Error, Deserialize)]
#[error("{message}")]
pub struct ProviderError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::new(message)
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(value: reqwest::Error) -> Self {
        Self::new(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(Column, String),
    IdEq(UserId),
    /// Case-insensitive substring match on at least one of the columns.
    AnyContains(Vec<Column>, String),
    NotNull(Column),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: Column,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<u32>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_desc(mut self, column: Column) -> Self {
        self.order.push(Order {
            column,
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// The `usuarios` table as exposed by a store.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    /// Tag naming the backing store, carried into exports.
    fn source(&self) -> &str;

    async fn select(&self, query: &SelectQuery) -> Result<Vec<User>, ProviderError>;

    /// Non-null values of one text column, duplicates included.
    async fn select_values(&self, column: Column) -> Result<Vec<String>, ProviderError>;

    async fn count(&self) -> Result<u64, ProviderError>;

    async fn insert(&self, row: &UserRow) -> Result<User, ProviderError>;

    /// `Ok(None)` when no row has the id.
    async fn update(&self, id: UserId, row: &UserRow) -> Result<Option<User>, ProviderError>;

    /// Returns the number of deleted rows.
    async fn delete(&self, id: UserId) -> Result<u64, ProviderError>;

    async fn subscribe(&self, channel: &str) -> Result<ChangeFeed, ProviderError>;
}
