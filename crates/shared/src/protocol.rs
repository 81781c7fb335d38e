use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{User, UserId};

pub const EXPORT_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change on a subscribed table, as delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
    #[serde(default)]
    pub record: Value,
    #[serde(default)]
    pub old_record: Value,
}

impl ChangeEvent {
    /// Id of the changed row: the new record for inserts/updates, the old one for deletes.
    pub fn user_id(&self) -> Option<UserId> {
        let from = |value: &Value| value.get("id").and_then(Value::as_i64).map(UserId);
        match self.kind {
            ChangeKind::Delete => from(&self.old_record).or_else(|| from(&self.record)),
            ChangeKind::Insert | ChangeKind::Update => {
                from(&self.record).or_else(|| from(&self.old_record))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub export_date: DateTime<Utc>,
    pub version: String,
    pub record_count: usize,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEnvelope {
    pub metadata: ExportMetadata,
    pub users: Vec<User>,
}

impl ExportEnvelope {
    pub fn new(users: Vec<User>, source: impl Into<String>, export_date: DateTime<Utc>) -> Self {
        Self {
            metadata: ExportMetadata {
                export_date,
                version: EXPORT_FORMAT_VERSION.to_string(),
                record_count: users.len(),
                source: source.into(),
            },
            users,
        }
    }
}
