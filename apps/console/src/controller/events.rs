//! Controller-to-view events, notifications, and error modeling.

use std::time::{Duration, Instant};

use shared::{
    domain::UserStats,
    error::{DataError, ErrorCode},
    protocol::ChangeEvent,
};

pub const NOTIFICATION_LIFETIME: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
pub enum UiEvent {
    Connection(ConnectionStatus),
    Notified(Notification),
    ListRendered { count: usize },
    ListFailed,
    StatsUpdated(UserStats),
    /// Listing and stats have both settled after a refresh.
    Refreshed,
    RemoteChange(ChangeEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting { source: String },
    Connected,
    Failed,
}

impl ConnectionStatus {
    pub fn label(&self) -> String {
        match self {
            ConnectionStatus::Connecting { source } => format!("🟡 Connecting to {source}..."),
            ConnectionStatus::Connected => "🟢 Connected to the database".to_string(),
            ConnectionStatus::Failed => "🔴 Connection error".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

impl NotificationKind {
    pub fn icon(self) -> &'static str {
        match self {
            NotificationKind::Success => "✅",
            NotificationKind::Error => "❌",
            NotificationKind::Warning => "⚠️",
            NotificationKind::Info => "💡",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: Instant,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            created_at: Instant::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message)
    }

    pub fn text(&self) -> String {
        format!("{} {}", self.kind.icon(), self.message)
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= NOTIFICATION_LIFETIME
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Connection,
    Validation,
    Conflict,
    NotFound,
    Store,
}

impl From<ErrorCode> for UiErrorCategory {
    fn from(value: ErrorCode) -> Self {
        match value {
            ErrorCode::NotInitialized | ErrorCode::Connection => UiErrorCategory::Connection,
            ErrorCode::Validation => UiErrorCategory::Validation,
            ErrorCode::Conflict => UiErrorCategory::Conflict,
            ErrorCode::NotFound => UiErrorCategory::NotFound,
            ErrorCode::Store => UiErrorCategory::Store,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    Startup,
    Submit,
    Edit,
    Delete,
    Reload,
    Export,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_data_error(context: UiErrorContext, err: &DataError) -> Self {
        let category = UiErrorCategory::from(err.code());
        let message = match (context, category) {
            (UiErrorContext::Startup, _) => "Error connecting to the database".to_string(),
            (UiErrorContext::Edit, UiErrorCategory::NotFound) => "User not found".to_string(),
            (UiErrorContext::Edit, _) => "Error loading user".to_string(),
            (UiErrorContext::Reload, _) => "Error loading users".to_string(),
            (UiErrorContext::Export, _) => "Error exporting data".to_string(),
            (UiErrorContext::Submit | UiErrorContext::Delete, _) => err.to_string(),
        };
        Self {
            category,
            context,
            message,
        }
    }

    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        Self {
            category: UiErrorCategory::Store,
            context,
            message: message.into(),
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn notification(&self) -> Notification {
        Notification::error(self.message.clone())
    }
}
