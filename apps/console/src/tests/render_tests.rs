use super::*;

use chrono::{FixedOffset, TimeZone, Utc};
use shared::domain::UserId;

use crate::controller::reducer::FormMode;

fn ana() -> User {
    User {
        id: UserId(12),
        nombre: "Ana López".into(),
        email: "ana@test.com".into(),
        telefono: None,
        edad: Some(34),
        ciudad: Some("Madrid".into()),
        profesion: Some("Diseñador".into()),
        fecha_creacion: Utc.with_ymd_and_hms(2026, 10, 19, 14, 5, 0).unwrap(),
    }
}

#[test]
fn dates_use_short_spanish_months() {
    let at = Utc.with_ymd_and_hms(2026, 10, 19, 14, 5, 0).unwrap();
    assert_eq!(format_date(&at), "19 oct 2026, 14:05");

    let september = Utc.with_ymd_and_hms(2025, 9, 3, 8, 0, 0).unwrap();
    assert_eq!(format_date(&september), "3 sept 2025, 08:00");
}

#[test]
fn dates_follow_the_given_zone() {
    let madrid = FixedOffset::east_opt(2 * 3600).unwrap();
    let row = TableRow::from_user(&ana(), &madrid);
    assert_eq!(row.fecha, "19 oct 2026, 16:05");
}

#[test]
fn count_label_is_singular_for_one() {
    assert_eq!(count_label(0), "0 users found");
    assert_eq!(count_label(1), "1 user found");
    assert_eq!(count_label(25), "25 users found");
}

#[test]
fn row_fills_placeholders_and_badge_class() {
    let row = TableRow::from_user(&ana(), &Utc);
    assert_eq!(row.id, "#12");
    assert_eq!(row.telefono, "Not specified");
    assert_eq!(row.edad, "34");
    assert_eq!(row.badge_class, "profession-diseñador");

    let bare = User {
        edad: None,
        ciudad: None,
        profesion: None,
        ..ana()
    };
    let row = TableRow::from_user(&bare, &Utc);
    assert_eq!(row.edad, "-");
    assert_eq!(row.ciudad, "-");
    assert_eq!(row.profesion, "Not specified");
    assert_eq!(row.badge_class, "profession-none");
}

#[test]
fn listing_reflects_table_status() {
    let mut state = ViewState::default();
    assert_eq!(listing(&state, &Utc), "Loading users...");

    state.table = TableStatus::Error("Error loading users".into());
    assert_eq!(listing(&state, &Utc), "❌ Error loading users");

    state.apply_records(Vec::new());
    assert_eq!(listing(&state, &Utc), "No users found\n0 users found");

    state.apply_records(vec![ana()]);
    let rendered = listing(&state, &Utc);
    assert!(rendered.contains("Ana López"));
    assert!(rendered.contains("#12"));
    assert!(rendered.ends_with("1 user found"));
}

#[test]
fn detail_lists_every_field() {
    let detail = user_detail(&ana(), &Utc);
    assert!(detail.starts_with("User #12"));
    assert!(detail.contains("Phone:      Not specified"));
    assert!(detail.contains("Profession: Diseñador [profession-diseñador]"));
    assert!(detail.contains("Created:    19 oct 2026, 14:05"));
}

#[test]
fn stats_line_and_confirmation_prompt() {
    let line = stats(&UserStats {
        total_users: 3,
        total_professions: 2,
        total_cities: 1,
    });
    assert_eq!(line, "Users: 3  Professions: 2  Cities: 1");

    let modal = DeleteModal {
        user_id: UserId(1),
        message: "Delete?".into(),
    };
    assert_eq!(confirmation(&modal), "Delete? [y/N] ");
}

#[test]
fn form_summary_lists_errors_under_title() {
    let form = FormState {
        mode: FormMode::Edit(UserId(1)),
        errors: vec![shared::error::ValidationError::MissingNombre],
        ..FormState::default()
    };
    assert_eq!(form_summary(&form), "Edit user\n  nombre: name is required");
}
