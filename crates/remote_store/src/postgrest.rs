use async_trait::async_trait;
use reqwest::{header::CONTENT_RANGE, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::domain::{Column, User, UserId, UserRow, USERS_TABLE};
use tracing::debug;

use crate::{realtime, ChangeFeed, Filter, ProviderError, RemoteTable, SelectQuery};

const SOURCE: &str = "Supabase";

/// `usuarios` over a PostgREST endpoint (`{base_url}/rest/v1/usuarios`).
#[derive(Clone)]
pub struct PostgrestTable {
    http: Client,
    base_url: String,
    api_key: String,
}

impl PostgrestTable {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{USERS_TABLE}", self.base_url)
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.http
            .request(method, self.table_url())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn returning(&self, method: Method) -> RequestBuilder {
        self.request(method)
            .header("Prefer", "return=representation")
    }
}

/// Encodes a select as PostgREST query parameters.
pub fn query_params(query: &SelectQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    for filter in &query.filters {
        params.push(filter_param(filter));
    }
    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|order| {
                let direction = if order.descending { "desc" } else { "asc" };
                format!("{}.{direction}", order.column)
            })
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => (column.to_string(), format!("eq.{value}")),
        Filter::IdEq(id) => (Column::Id.to_string(), format!("eq.{id}")),
        Filter::NotNull(column) => (column.to_string(), "not.is.null".to_string()),
        Filter::AnyContains(columns, term) => {
            let pattern = quote_value(&format!("*{}*", escape_like(term)));
            let alternatives = columns
                .iter()
                .map(|column| format!("{column}.ilike.{pattern}"))
                .collect::<Vec<_>>()
                .join(",");
            ("or".to_string(), format!("({alternatives})"))
        }
    }
}

/// Makes `%` and `_` match themselves under `ilike`.
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Double-quotes a value so reserved characters (`,` `.` `(` `)`) stay literal inside `or=`.
fn quote_value(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Total from a `Content-Range` header such as `0-24/25` or `*/0`.
pub fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let response = check_status(response).await?;
    Ok(response.json::<T>().await?)
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

fn error_from_body(status: StatusCode, body: &str) -> ProviderError {
    serde_json::from_str::<ProviderError>(body).unwrap_or_else(|_| {
        let body = body.trim();
        if body.is_empty() {
            ProviderError::new(format!("HTTP {status}"))
        } else {
            ProviderError::new(format!("HTTP {status}: {body}"))
        }
    })
}

#[async_trait]
impl RemoteTable for PostgrestTable {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn select(&self, query: &SelectQuery) -> Result<Vec<User>, ProviderError> {
        let params = query_params(query);
        debug!(?params, "postgrest: select");
        let response = self.request(Method::GET).query(&params).send().await?;
        decode(response).await
    }

    async fn select_values(&self, column: Column) -> Result<Vec<String>, ProviderError> {
        let response = self
            .request(Method::GET)
            .query(&[
                ("select", column.as_str().to_string()),
                (column.as_str(), "not.is.null".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<Value> = decode(response).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(column.as_str()).and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn count(&self) -> Result<u64, ProviderError> {
        let response = self
            .request(Method::HEAD)
            .query(&[("select", "id")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check_status(response).await?;
        let header = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ProviderError::new("count response is missing Content-Range"))?;
        parse_content_range_total(header).ok_or_else(|| {
            ProviderError::new(format!("unparseable Content-Range header: {header}"))
        })
    }

    async fn insert(&self, row: &UserRow) -> Result<User, ProviderError> {
        let response = self.returning(Method::POST).json(row).send().await?;
        let inserted: Vec<User> = decode(response).await?;
        inserted
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::new("insert returned no rows"))
    }

    async fn update(&self, id: UserId, row: &UserRow) -> Result<Option<User>, ProviderError> {
        let response = self
            .returning(Method::PATCH)
            .query(&[("id", format!("eq.{id}"))])
            .json(row)
            .send()
            .await?;
        let updated: Vec<User> = decode(response).await?;
        Ok(updated.into_iter().next())
    }

    async fn delete(&self, id: UserId) -> Result<u64, ProviderError> {
        let response = self
            .returning(Method::DELETE)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        let deleted: Vec<Value> = decode(response).await?;
        Ok(deleted.len() as u64)
    }

    async fn subscribe(&self, channel: &str) -> Result<ChangeFeed, ProviderError> {
        realtime::connect(&self.base_url, &self.api_key, channel, USERS_TABLE).await
    }
}

#[cfg(test)]
#[path = "tests/postgrest_tests.rs"]
mod tests;
