use chrono::{DateTime, Datelike, TimeZone, Timelike};
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color,
    ContentArrangement, Table,
};
use shared::domain::{User, UserStats};

use crate::controller::reducer::{DeleteModal, FormState, TableStatus, ViewState};

const MONTHS: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sept", "oct", "nov", "dic",
];
const NOT_SPECIFIED: &str = "Not specified";
const MISSING: &str = "-";

/// Short Spanish date such as `19 oct 2026, 14:05`.
pub fn format_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    format!(
        "{} {} {}, {:02}:{:02}",
        at.day(),
        MONTHS[at.month0() as usize],
        at.year(),
        at.hour(),
        at.minute()
    )
}

pub fn count_label(count: usize) -> String {
    if count == 1 {
        "1 user found".to_string()
    } else {
        format!("{count} users found")
    }
}

/// Display strings for one listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub id: String,
    pub nombre: String,
    pub email: String,
    pub telefono: String,
    pub edad: String,
    pub ciudad: String,
    pub badge_class: String,
    pub profesion: String,
    pub fecha: String,
}

impl TableRow {
    pub fn from_user<Tz: TimeZone>(user: &User, zone: &Tz) -> Self {
        Self {
            id: format!("#{}", user.id),
            nombre: user.nombre.clone(),
            email: user.email.clone(),
            telefono: user
                .telefono
                .clone()
                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            edad: user
                .edad
                .map(|edad| edad.to_string())
                .unwrap_or_else(|| MISSING.to_string()),
            ciudad: user.ciudad.clone().unwrap_or_else(|| MISSING.to_string()),
            badge_class: match user.profesion.as_deref() {
                Some(profesion) => format!("profession-{}", profesion.to_lowercase()),
                None => "profession-none".to_string(),
            },
            profesion: user
                .profesion
                .clone()
                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            fecha: format_date(&user.fecha_creacion.with_timezone(zone)),
        }
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn value_cell(value: &str) -> Cell {
    if value == MISSING || value == NOT_SPECIFIED {
        Cell::new(value).fg(Color::DarkGrey)
    } else {
        Cell::new(value)
    }
}

pub fn users_table(rows: &[TableRow]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            header_cell("ID"),
            header_cell("Name"),
            header_cell("Email"),
            header_cell("Phone"),
            header_cell("Age"),
            header_cell("City"),
            header_cell("Profession"),
            header_cell("Created"),
        ]);
    if let Some(column) = table.column_mut(4) {
        column.set_cell_alignment(CellAlignment::Right);
    }

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.id).add_attribute(Attribute::Bold),
            Cell::new(&row.nombre),
            Cell::new(&row.email),
            value_cell(&row.telefono),
            value_cell(&row.edad),
            value_cell(&row.ciudad),
            value_cell(&row.profesion),
            Cell::new(&row.fecha),
        ]);
    }
    table
}

/// Listing block for the current table status.
pub fn listing<Tz: TimeZone>(state: &ViewState, zone: &Tz) -> String {
    match &state.table {
        TableStatus::Loading => "Loading users...".to_string(),
        TableStatus::Error(message) => format!("❌ {message}"),
        TableStatus::Empty => format!("No users found\n{}", count_label(0)),
        TableStatus::Rows(count) => {
            let rows: Vec<_> = state
                .records
                .iter()
                .map(|user| TableRow::from_user(user, zone))
                .collect();
            format!("{}\n{}", users_table(&rows), count_label(*count))
        }
    }
}

pub fn user_detail<Tz: TimeZone>(user: &User, zone: &Tz) -> String {
    let row = TableRow::from_user(user, zone);
    [
        format!("User {}", row.id),
        format!("  Name:       {}", row.nombre),
        format!("  Email:      {}", row.email),
        format!("  Phone:      {}", row.telefono),
        format!("  Age:        {}", row.edad),
        format!("  City:       {}", row.ciudad),
        format!("  Profession: {} [{}]", row.profesion, row.badge_class),
        format!("  Created:    {}", row.fecha),
    ]
    .join("\n")
}

pub fn stats(stats: &UserStats) -> String {
    format!(
        "Users: {}  Professions: {}  Cities: {}",
        stats.total_users, stats.total_professions, stats.total_cities
    )
}

pub fn form_summary(form: &FormState) -> String {
    let mut lines = vec![form.mode.title().to_string()];
    for err in &form.errors {
        lines.push(format!("  {}: {err}", err.field()));
    }
    lines.join("\n")
}

pub fn confirmation(modal: &DeleteModal) -> String {
    format!("{} [y/N] ", modal.message)
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
