use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);

pub const USERS_TABLE: &str = "usuarios";

/// Columns of the `usuarios` table, named as the store names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Nombre,
    Email,
    Telefono,
    Edad,
    Ciudad,
    Profesion,
    FechaCreacion,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Nombre => "nombre",
            Column::Email => "email",
            Column::Telefono => "telefono",
            Column::Edad => "edad",
            Column::Ciudad => "ciudad",
            Column::Profesion => "profesion",
            Column::FechaCreacion => "fecha_creacion",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An optional attribute on the write path: either a value or explicitly nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field<T> {
    Present(T),
    #[default]
    Absent,
}

impl<T> Field<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Present(value) => Field::Present(value),
            Field::Absent => Field::Absent,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Present(value) => Some(value),
            Field::Absent => None,
        }
    }
}

impl Field<String> {
    /// Trimmed text; blank input is `Absent`.
    pub fn text(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Field::Absent
        } else {
            Field::Present(trimmed.to_string())
        }
    }

    pub fn normalized(self) -> Self {
        match self {
            Field::Present(value) => Field::text(value),
            Field::Absent => Field::Absent,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Field::Present(value),
            None => Field::Absent,
        }
    }
}

/// A stored user record as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub nombre: String,
    pub email: String,
    pub telefono: Option<String>,
    pub edad: Option<i32>,
    pub ciudad: Option<String>,
    pub profesion: Option<String>,
    pub fecha_creacion: DateTime<Utc>,
}

/// Operator-supplied values for a create or an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInput {
    pub nombre: String,
    pub email: String,
    pub telefono: Field<String>,
    pub edad: Field<i32>,
    pub ciudad: Field<String>,
    pub profesion: Field<String>,
}

impl UserInput {
    pub fn new(nombre: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            nombre: nombre.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn with_telefono(mut self, telefono: impl Into<String>) -> Self {
        self.telefono = Field::Present(telefono.into());
        self
    }

    pub fn with_edad(mut self, edad: i32) -> Self {
        self.edad = Field::Present(edad);
        self
    }

    pub fn with_ciudad(mut self, ciudad: impl Into<String>) -> Self {
        self.ciudad = Field::Present(ciudad.into());
        self
    }

    pub fn with_profesion(mut self, profesion: impl Into<String>) -> Self {
        self.profesion = Field::Present(profesion.into());
        self
    }
}

/// Normalized column values written by an insert or update.
///
/// Every optional column is serialized, absent ones as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub nombre: String,
    pub email: String,
    pub telefono: Option<String>,
    pub edad: Option<i32>,
    pub ciudad: Option<String>,
    pub profesion: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilters {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub profesion: Option<String>,
    #[serde(default)]
    pub ciudad: Option<String>,
}

impl UserFilters {
    /// Trims every filter and drops the blank ones.
    pub fn normalized(&self) -> Self {
        fn keep(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        }

        Self {
            search: keep(&self.search),
            profesion: keep(&self.profesion),
            ciudad: keep(&self.ciudad),
        }
    }

    pub fn is_empty(&self) -> bool {
        let normalized = self.normalized();
        normalized.search.is_none() && normalized.profesion.is_none() && normalized.ciudad.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: u64,
    pub total_professions: usize,
    pub total_cities: usize,
}
