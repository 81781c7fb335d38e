//! User-record operations over a [`RemoteTable`], with connection lifecycle and validation.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Utc;
use futures::StreamExt;
use remote_store::{Filter, ProviderError, RemoteTable, SelectQuery};
use shared::{
    domain::{Column, User, UserFilters, UserId, UserInput, UserStats},
    error::DataError,
    protocol::{ChangeEvent, ExportEnvelope},
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod validation;

pub use validation::{field_errors, is_valid_email, validate};

pub const DEFAULT_CHANNEL: &str = "usuarios-changes";

/// Columns the free-text search looks into.
pub const SEARCH_COLUMNS: [Column; 3] = [Column::Nombre, Column::Email, Column::Ciudad];

/// Newest first; ids break ties between rows stamped in the same instant.
fn newest_first() -> SelectQuery {
    SelectQuery::new()
        .order_desc(Column::FechaCreacion)
        .order_desc(Column::Id)
}

/// Select for a filtered listing. Blank filters are dropped.
pub fn list_query(filters: &UserFilters) -> SelectQuery {
    let filters = filters.normalized();
    let mut query = newest_first();
    if let Some(term) = filters.search {
        query = query.filter(Filter::AnyContains(SEARCH_COLUMNS.to_vec(), term));
    }
    if let Some(profesion) = filters.profesion {
        query = query.filter(Filter::Eq(Column::Profesion, profesion));
    }
    if let Some(ciudad) = filters.ciudad {
        query = query.filter(Filter::Eq(Column::Ciudad, ciudad));
    }
    query
}

fn write_error(err: ProviderError) -> DataError {
    if err.is_unique_violation() {
        DataError::DuplicateEmail
    } else {
        DataError::Store(err.message)
    }
}

fn read_error(err: ProviderError) -> DataError {
    DataError::Store(err.message)
}

/// Live delivery of table changes. Dropping it stops the callbacks.
pub struct Subscription {
    channel: String,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        info!(channel = %self.channel, "dal: unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct DataAccess {
    table: Arc<dyn RemoteTable>,
    channel: String,
    ready: AtomicBool,
}

impl DataAccess {
    pub fn new(table: Arc<dyn RemoteTable>) -> Self {
        Self {
            table,
            channel: DEFAULT_CHANNEL.to_string(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn source(&self) -> &str {
        self.table.source()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Probes the store; on success every other operation becomes available.
    pub async fn init(&self) -> Result<(), DataError> {
        info!(source = self.source(), "dal: connecting");
        match self.table.select(&SelectQuery::new().limit(1)).await {
            Ok(_) => {
                self.ready.store(true, Ordering::Release);
                info!(source = self.source(), "dal: connected");
                Ok(())
            }
            Err(err) => {
                self.ready.store(false, Ordering::Release);
                error!(source = self.source(), %err, "dal: connection probe failed");
                Err(DataError::Connection(err.message))
            }
        }
    }

    fn ensure_ready(&self) -> Result<(), DataError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(DataError::NotInitialized)
        }
    }

    pub async fn create(&self, input: &UserInput) -> Result<User, DataError> {
        self.ensure_ready()?;
        let row = validate(input)?;

        match self.table.insert(&row).await {
            Ok(user) => {
                info!(user_id = user.id.0, "dal: user created");
                Ok(user)
            }
            Err(err) => {
                error!(%err, code = ?err.code, "dal: create failed");
                Err(write_error(err))
            }
        }
    }

    pub async fn read(&self, filters: &UserFilters) -> Result<Vec<User>, DataError> {
        self.ensure_ready()?;
        let query = list_query(filters);
        debug!(filters = ?query.filters, "dal: listing users");

        match self.table.select(&query).await {
            Ok(users) => {
                info!(count = users.len(), "dal: users listed");
                Ok(users)
            }
            Err(err) => {
                error!(%err, "dal: list failed");
                Err(read_error(err))
            }
        }
    }

    pub async fn read_one(&self, id: UserId) -> Result<User, DataError> {
        self.ensure_ready()?;
        let query = SelectQuery::new().filter(Filter::IdEq(id)).limit(1);

        match self.table.select(&query).await {
            Ok(users) => users.into_iter().next().ok_or(DataError::NotFound(id)),
            Err(err) => {
                error!(user_id = id.0, %err, "dal: lookup failed");
                Err(read_error(err))
            }
        }
    }

    pub async fn update(&self, id: UserId, input: &UserInput) -> Result<User, DataError> {
        self.ensure_ready()?;
        let row = validate(input)?;

        match self.table.update(id, &row).await {
            Ok(Some(user)) => {
                info!(user_id = id.0, "dal: user updated");
                Ok(user)
            }
            Ok(None) => {
                warn!(user_id = id.0, "dal: update matched no row");
                Err(DataError::NotFound(id))
            }
            Err(err) => {
                error!(user_id = id.0, %err, code = ?err.code, "dal: update failed");
                Err(write_error(err))
            }
        }
    }

    /// Deleting an id that does not exist succeeds.
    pub async fn delete(&self, id: UserId) -> Result<(), DataError> {
        self.ensure_ready()?;

        match self.table.delete(id).await {
            Ok(0) => {
                warn!(user_id = id.0, "dal: delete matched no row");
                Ok(())
            }
            Ok(_) => {
                info!(user_id = id.0, "dal: user deleted");
                Ok(())
            }
            Err(err) => {
                error!(user_id = id.0, %err, "dal: delete failed");
                Err(read_error(err))
            }
        }
    }

    /// Aggregate counts. Failures are logged and reported as zeros.
    pub async fn stats(&self) -> UserStats {
        match self.try_stats().await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(%err, "dal: stats unavailable");
                UserStats::default()
            }
        }
    }

    async fn try_stats(&self) -> Result<UserStats, DataError> {
        self.ensure_ready()?;
        let (total_users, professions, cities) = tokio::try_join!(
            self.table.count(),
            self.table.select_values(Column::Profesion),
            self.table.select_values(Column::Ciudad),
        )
        .map_err(read_error)?;

        let distinct = |values: Vec<String>| values.into_iter().collect::<HashSet<_>>().len();
        Ok(UserStats {
            total_users,
            total_professions: distinct(professions),
            total_cities: distinct(cities),
        })
    }

    /// Every record in listing order, wrapped for export. `None` when the read fails.
    pub async fn export(&self) -> Option<ExportEnvelope> {
        match self.read(&UserFilters::default()).await {
            Ok(users) => {
                info!(count = users.len(), "dal: export prepared");
                Some(ExportEnvelope::new(users, self.source(), Utc::now()))
            }
            Err(err) => {
                error!(%err, "dal: export failed");
                None
            }
        }
    }

    /// Calls `callback` once per table change, in delivery order.
    ///
    /// Returns `None` when not initialized or when the channel cannot be opened.
    pub async fn subscribe<F>(&self, callback: F) -> Option<Subscription>
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        if !self.is_ready() {
            debug!("dal: subscribe skipped, not initialized");
            return None;
        }

        let mut feed = match self.table.subscribe(&self.channel).await {
            Ok(feed) => feed,
            Err(err) => {
                warn!(channel = %self.channel, %err, "dal: realtime subscription failed");
                return None;
            }
        };

        let channel = self.channel.clone();
        let task_channel = channel.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = feed.next().await {
                debug!(
                    channel = %task_channel,
                    kind = ?event.kind,
                    user_id = ?event.user_id(),
                    "dal: change received"
                );
                callback(event);
            }
            info!(channel = %task_channel, "dal: change feed ended");
        });
        info!(channel = %channel, "dal: subscribed to changes");
        Some(Subscription { channel, task })
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
