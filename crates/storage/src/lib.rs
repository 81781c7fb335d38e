use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use remote_store::{ChangeFeed, Filter, ProviderError, RemoteTable, SelectQuery, UNIQUE_VIOLATION};
use serde_json::{json, Value};
use shared::{
    domain::{Column, User, UserId, UserRow, USERS_TABLE},
    protocol::{ChangeEvent, ChangeKind},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

const SOURCE: &str = "SQLite";
const USER_COLUMNS: &str = "id, nombre, email, telefono, edad, ciudad, profesion, fecha_creacion";
/// Fixed-width UTC stamps so text order matches time order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const CHANGE_BUFFER: usize = 256;

/// Local SQLite copy of the `usuarios` table, usable wherever the hosted store is.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self { pool, changes })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    fn publish(&self, kind: ChangeKind, record: Value, old_record: Value) {
        let event = ChangeEvent {
            schema: "public".to_string(),
            table: USERS_TABLE.to_string(),
            kind,
            commit_timestamp: Some(now_stamp()),
            record,
            old_record,
        };
        // No subscribers is not an error.
        let _ = self.changes.send(event);
    }
}

fn now_stamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

fn record_value(user: &User) -> Value {
    serde_json::to_value(user).unwrap_or(Value::Null)
}

fn provider_error(err: sqlx::Error) -> ProviderError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ProviderError::with_code(UNIQUE_VIOLATION, db_err.message())
        }
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => ProviderError::with_code(code, db_err.message()),
            None => ProviderError::new(db_err.message()),
        },
        _ => ProviderError::new(err.to_string()),
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, ProviderError> {
    let stamped: String = row.try_get("fecha_creacion").map_err(provider_error)?;
    let fecha_creacion = DateTime::parse_from_rfc3339(&stamped)
        .map_err(|err| ProviderError::new(format!("invalid fecha_creacion '{stamped}': {err}")))?
        .with_timezone(&Utc);

    Ok(User {
        id: UserId(row.try_get("id").map_err(provider_error)?),
        nombre: row.try_get("nombre").map_err(provider_error)?,
        email: row.try_get("email").map_err(provider_error)?,
        telefono: row.try_get("telefono").map_err(provider_error)?,
        edad: row.try_get("edad").map_err(provider_error)?,
        ciudad: row.try_get("ciudad").map_err(provider_error)?,
        profesion: row.try_get("profesion").map_err(provider_error)?,
        fecha_creacion,
    })
}

/// Column holding the Unicode lower-cased copy of a text column.
fn folded_column(column: Column) -> Option<&'static str> {
    match column {
        Column::Nombre => Some("nombre_folded"),
        Column::Email => Some("email_folded"),
        Column::Telefono => Some("telefono_folded"),
        Column::Ciudad => Some("ciudad_folded"),
        Column::Profesion => Some("profesion_folded"),
        Column::Id | Column::Edad | Column::FechaCreacion => None,
    }
}

fn fold(value: &str) -> String {
    value.to_lowercase()
}

fn fold_optional(value: &Option<String>) -> Option<String> {
    value.as_deref().map(fold)
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    match filter {
        Filter::Eq(column, value) => {
            builder.push(format!("{column} = "));
            builder.push_bind(value.clone());
        }
        Filter::IdEq(id) => {
            builder.push("id = ");
            builder.push_bind(id.0);
        }
        Filter::NotNull(column) => {
            builder.push(format!("{column} IS NOT NULL"));
        }
        Filter::AnyContains(columns, _) if columns.is_empty() => {
            builder.push("0");
        }
        Filter::AnyContains(columns, term) => {
            let pattern = format!("%{}%", escape_like(&fold(term)));
            builder.push("(");
            for (index, column) in columns.iter().enumerate() {
                if index > 0 {
                    builder.push(" OR ");
                }
                match folded_column(*column) {
                    Some(folded) => builder.push(format!("{folded} LIKE ")),
                    None => builder.push(format!("lower({column}) LIKE ")),
                };
                builder.push_bind(pattern.clone());
                builder.push(" ESCAPE '\\'");
            }
            builder.push(")");
        }
    }
}

fn build_select(query: &SelectQuery) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM {USERS_TABLE}"));
    for (index, filter) in query.filters.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        push_filter(&mut builder, filter);
    }
    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|order| {
                let direction = if order.descending { "DESC" } else { "ASC" };
                format!("{} {direction}", order.column)
            })
            .collect::<Vec<_>>()
            .join(", ");
        builder.push(format!(" ORDER BY {order}"));
    }
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(limit));
    }
    builder
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[async_trait]
impl RemoteTable for Storage {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn select(&self, query: &SelectQuery) -> Result<Vec<User>, ProviderError> {
        let rows = build_select(query)
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(provider_error)?;
        rows.iter().map(user_from_row).collect()
    }

    async fn select_values(&self, column: Column) -> Result<Vec<String>, ProviderError> {
        sqlx::query_scalar::<_, String>(&format!(
            "SELECT {column} FROM {USERS_TABLE} WHERE {column} IS NOT NULL"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(provider_error)
    }

    async fn count(&self) -> Result<u64, ProviderError> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {USERS_TABLE}"))
            .fetch_one(&self.pool)
            .await
            .map_err(provider_error)?;
        Ok(total.max(0) as u64)
    }

    async fn insert(&self, row: &UserRow) -> Result<User, ProviderError> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO {USERS_TABLE} (nombre, email, telefono, edad, ciudad, profesion, fecha_creacion,
                 nombre_folded, email_folded, telefono_folded, ciudad_folded, profesion_folded)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&row.nombre)
        .bind(&row.email)
        .bind(&row.telefono)
        .bind(row.edad)
        .bind(&row.ciudad)
        .bind(&row.profesion)
        .bind(now_stamp())
        .bind(fold(&row.nombre))
        .bind(fold(&row.email))
        .bind(fold_optional(&row.telefono))
        .bind(fold_optional(&row.ciudad))
        .bind(fold_optional(&row.profesion))
        .fetch_one(&self.pool)
        .await
        .map_err(provider_error)?;
        let user = user_from_row(&inserted)?;

        self.publish(ChangeKind::Insert, record_value(&user), Value::Null);
        Ok(user)
    }

    async fn update(&self, id: UserId, row: &UserRow) -> Result<Option<User>, ProviderError> {
        let updated = sqlx::query(&format!(
            "UPDATE {USERS_TABLE}
             SET nombre = ?, email = ?, telefono = ?, edad = ?, ciudad = ?, profesion = ?,
                 nombre_folded = ?, email_folded = ?, telefono_folded = ?, ciudad_folded = ?,
                 profesion_folded = ?
             WHERE id = ?
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&row.nombre)
        .bind(&row.email)
        .bind(&row.telefono)
        .bind(row.edad)
        .bind(&row.ciudad)
        .bind(&row.profesion)
        .bind(fold(&row.nombre))
        .bind(fold(&row.email))
        .bind(fold_optional(&row.telefono))
        .bind(fold_optional(&row.ciudad))
        .bind(fold_optional(&row.profesion))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(provider_error)?;

        let Some(updated) = updated else {
            return Ok(None);
        };
        let user = user_from_row(&updated)?;
        self.publish(ChangeKind::Update, record_value(&user), json!({ "id": id.0 }));
        Ok(Some(user))
    }

    async fn delete(&self, id: UserId) -> Result<u64, ProviderError> {
        let deleted = sqlx::query(&format!("DELETE FROM {USERS_TABLE} WHERE id = ?"))
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(provider_error)?
            .rows_affected();

        if deleted > 0 {
            self.publish(ChangeKind::Delete, Value::Null, json!({ "id": id.0 }));
        }
        Ok(deleted)
    }

    async fn subscribe(&self, channel: &str) -> Result<ChangeFeed, ProviderError> {
        let channel = channel.to_string();
        let feed = BroadcastStream::new(self.changes.subscribe()).filter_map(move |item| {
            let channel = channel.clone();
            async move {
                match item {
                    Ok(event) => Some(event),
                    Err(err) => {
                        warn!(channel = %channel, %err, "storage: change feed lagged");
                        None
                    }
                }
            }
        });
        Ok(feed.boxed())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
