use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Column, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotInitialized,
    Connection,
    Validation,
    Conflict,
    NotFound,
    Store,
}

/// Field-level rule violations, detected before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name is required")]
    MissingNombre,
    #[error("email is required")]
    MissingEmail,
    #[error("email format is not valid")]
    InvalidEmail,
}

impl ValidationError {
    pub fn field(&self) -> Column {
        match self {
            ValidationError::MissingNombre => Column::Nombre,
            ValidationError::MissingEmail | ValidationError::InvalidEmail => Column::Email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("database not initialized")]
    NotInitialized,
    #[error("connection error: {0}")]
    Connection(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("a user with this email already exists")]
    DuplicateEmail,
    #[error("user {0} not found")]
    NotFound(UserId),
    #[error("database error: {0}")]
    Store(String),
}

impl DataError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DataError::NotInitialized => ErrorCode::NotInitialized,
            DataError::Connection(_) => ErrorCode::Connection,
            DataError::Validation(_) => ErrorCode::Validation,
            DataError::DuplicateEmail => ErrorCode::Conflict,
            DataError::NotFound(_) => ErrorCode::NotFound,
            DataError::Store(_) => ErrorCode::Store,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.code() == ErrorCode::Conflict
    }
}
