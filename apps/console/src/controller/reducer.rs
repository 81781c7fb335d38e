//! View state and its synchronous transitions.

use std::{collections::HashSet, time::Instant};

use shared::{
    domain::{Column, Field, User, UserFilters, UserId, UserInput, UserStats},
    error::ValidationError,
};

use crate::controller::events::{ConnectionStatus, Notification};

/// Raw form text, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    pub nombre: String,
    pub email: String,
    pub telefono: String,
    pub edad: String,
    pub ciudad: String,
    pub profesion: String,
}

impl FormValues {
    pub fn from_user(user: &User) -> Self {
        Self {
            nombre: user.nombre.clone(),
            email: user.email.clone(),
            telefono: user.telefono.clone().unwrap_or_default(),
            edad: user.edad.map(|edad| edad.to_string()).unwrap_or_default(),
            ciudad: user.ciudad.clone().unwrap_or_default(),
            profesion: user.profesion.clone().unwrap_or_default(),
        }
    }

    /// Blank fields and an age that is not a whole number are absent.
    pub fn to_input(&self) -> UserInput {
        UserInput {
            nombre: self.nombre.clone(),
            email: self.email.clone(),
            telefono: Field::text(&self.telefono),
            edad: self.edad.trim().parse::<i32>().ok().into(),
            ciudad: Field::text(&self.ciudad),
            profesion: Field::text(&self.profesion),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormMode {
    #[default]
    Add,
    Edit(UserId),
}

impl FormMode {
    pub fn title(self) -> &'static str {
        match self {
            FormMode::Add => "Add new user",
            FormMode::Edit(_) => "Edit user",
        }
    }

    pub fn submit_label(self) -> &'static str {
        match self {
            FormMode::Add => "➕ Add user",
            FormMode::Edit(_) => "💾 Update user",
        }
    }

    pub fn cancel_visible(self) -> bool {
        matches!(self, FormMode::Edit(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub values: FormValues,
    pub mode: FormMode,
    pub errors: Vec<ValidationError>,
    pub submitting: bool,
}

impl FormState {
    pub fn error_for(&self, column: Column) -> Option<String> {
        self.errors
            .iter()
            .find(|err| err.field() == column)
            .map(ToString::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteModal {
    pub user_id: UserId,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TableStatus {
    #[default]
    Loading,
    Error(String),
    Empty,
    Rows(usize),
}

pub fn delete_message(nombre: Option<&str>) -> String {
    match nombre {
        Some(nombre) => format!(
            "Are you sure you want to delete user \"{nombre}\"? This action cannot be undone."
        ),
        None => "Are you sure you want to delete this user? This action cannot be undone.".into(),
    }
}

/// Distinct non-empty cities in first-seen order.
pub fn city_options(records: &[User]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|user| user.ciudad.as_deref())
        .filter(|city| !city.trim().is_empty())
        .filter(|city| seen.insert(*city))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub connection: Option<ConnectionStatus>,
    pub pending_delete_id: Option<UserId>,
    pub records: Vec<User>,
    pub filters: UserFilters,
    pub city_options: Vec<String>,
    pub form: FormState,
    pub modal: Option<DeleteModal>,
    pub table: TableStatus,
    pub stats: UserStats,
    pub notifications: Vec<Notification>,
}

impl ViewState {
    pub fn current_edit_id(&self) -> Option<UserId> {
        match self.form.mode {
            FormMode::Edit(id) => Some(id),
            FormMode::Add => None,
        }
    }

    /// Renders a fresh listing; the city selection survives only if still offered.
    pub fn apply_records(&mut self, records: Vec<User>) {
        self.city_options = city_options(&records);
        if let Some(selected) = self.filters.ciudad.as_deref() {
            if !self.city_options.iter().any(|city| city == selected) {
                self.filters.ciudad = None;
            }
        }
        self.table = if records.is_empty() {
            TableStatus::Empty
        } else {
            TableStatus::Rows(records.len())
        };
        self.records = records;
    }

    pub fn begin_edit(&mut self, user: &User) {
        self.form = FormState {
            values: FormValues::from_user(user),
            mode: FormMode::Edit(user.id),
            errors: Vec::new(),
            submitting: false,
        };
    }

    pub fn reset_form(&mut self) {
        self.form = FormState::default();
    }

    pub fn stage_delete(&mut self, user_id: UserId, nombre: Option<&str>) {
        self.pending_delete_id = Some(user_id);
        self.modal = Some(DeleteModal {
            user_id,
            message: delete_message(nombre),
        });
    }

    /// Closes the confirmation modal and returns the id that was staged.
    pub fn close_modal(&mut self) -> Option<UserId> {
        self.modal = None;
        self.pending_delete_id.take()
    }

    pub fn record_name(&self, user_id: UserId) -> Option<String> {
        self.records
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| user.nombre.clone())
    }

    pub fn prune_notifications(&mut self, now: Instant) {
        self.notifications
            .retain(|notification| !notification.is_expired_at(now));
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
