use super::*;

use chrono::{TimeZone, Utc};

use crate::controller::events::NOTIFICATION_LIFETIME;

fn user(id: i64, nombre: &str, ciudad: Option<&str>) -> User {
    User {
        id: UserId(id),
        nombre: nombre.to_string(),
        email: format!("{}@test.com", nombre.to_lowercase()),
        telefono: None,
        edad: Some(30),
        ciudad: ciudad.map(str::to_string),
        profesion: None,
        fecha_creacion: Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
    }
}

#[test]
fn form_text_becomes_trimmed_input() {
    let values = FormValues {
        nombre: " Ana ".into(),
        email: "ana@test.com".into(),
        telefono: "   ".into(),
        edad: " 42 ".into(),
        ciudad: " Madrid ".into(),
        profesion: String::new(),
    };

    let input = values.to_input();

    assert_eq!(input.nombre, " Ana ");
    assert_eq!(input.telefono, Field::Absent);
    assert_eq!(input.edad, Field::Present(42));
    assert_eq!(input.ciudad, Field::Present("Madrid".to_string()));
    assert_eq!(input.profesion, Field::Absent);
}

#[test]
fn unparseable_age_is_absent() {
    for raw in ["treinta", "4.5", ""] {
        let values = FormValues {
            edad: raw.into(),
            ..FormValues::default()
        };
        assert_eq!(values.to_input().edad, Field::Absent, "{raw:?}");
    }
}

#[test]
fn edit_mode_prefills_form_and_switches_labels() {
    let mut state = ViewState::default();
    assert_eq!(state.form.mode.title(), "Add new user");
    assert_eq!(state.form.mode.submit_label(), "➕ Add user");
    assert!(!state.form.mode.cancel_visible());

    state.begin_edit(&user(7, "Ana", None));

    assert_eq!(state.current_edit_id(), Some(UserId(7)));
    assert_eq!(state.form.values.nombre, "Ana");
    assert_eq!(state.form.values.edad, "30");
    assert_eq!(state.form.values.ciudad, "");
    assert_eq!(state.form.mode.title(), "Edit user");
    assert_eq!(state.form.mode.submit_label(), "💾 Update user");
    assert!(state.form.mode.cancel_visible());

    state.reset_form();
    assert_eq!(state.current_edit_id(), None);
    assert_eq!(state.form, FormState::default());
}

#[test]
fn field_errors_are_looked_up_by_column() {
    let form = FormState {
        errors: vec![ValidationError::InvalidEmail],
        ..FormState::default()
    };

    assert_eq!(form.error_for(Column::Nombre), None);
    assert_eq!(
        form.error_for(Column::Email).as_deref(),
        Some("email format is not valid")
    );
}

#[test]
fn city_options_are_distinct_in_first_seen_order() {
    let records = vec![
        user(1, "Ana", Some("Madrid")),
        user(2, "Luis", Some("Bilbao")),
        user(3, "Marta", Some("Madrid")),
        user(4, "Eva", None),
        user(5, "Pau", Some("  ")),
    ];

    assert_eq!(city_options(&records), vec!["Madrid", "Bilbao"]);
}

#[test]
fn applied_records_set_table_status_and_keep_offered_city() {
    let mut state = ViewState::default();
    assert_eq!(state.table, TableStatus::Loading);
    state.filters.ciudad = Some("Madrid".into());

    state.apply_records(vec![user(1, "Ana", Some("Madrid")), user(2, "Luis", None)]);
    assert_eq!(state.table, TableStatus::Rows(2));
    assert_eq!(state.filters.ciudad.as_deref(), Some("Madrid"));

    state.apply_records(vec![user(2, "Luis", Some("Bilbao"))]);
    assert_eq!(state.filters.ciudad, None);

    state.apply_records(Vec::new());
    assert_eq!(state.table, TableStatus::Empty);
    assert!(state.city_options.is_empty());
}

#[test]
fn staged_delete_names_the_user() {
    let mut state = ViewState::default();
    state.apply_records(vec![user(3, "Ana", None)]);

    let nombre = state.record_name(UserId(3));
    state.stage_delete(UserId(3), nombre.as_deref());

    let modal = state.modal.clone().expect("modal open");
    assert_eq!(modal.user_id, UserId(3));
    assert_eq!(
        modal.message,
        "Are you sure you want to delete user \"Ana\"? This action cannot be undone."
    );

    assert_eq!(state.close_modal(), Some(UserId(3)));
    assert!(state.modal.is_none());
    assert_eq!(state.close_modal(), None);
}

#[test]
fn unknown_user_gets_generic_delete_message() {
    assert_eq!(
        delete_message(None),
        "Are you sure you want to delete this user? This action cannot be undone."
    );
}

#[test]
fn expired_notifications_are_pruned() {
    let mut state = ViewState::default();
    let old = Notification::info("old");
    let fresh = Notification {
        created_at: old.created_at + NOTIFICATION_LIFETIME,
        ..Notification::success("fresh")
    };
    state.notifications = vec![old, fresh.clone()];

    state.prune_notifications(fresh.created_at);

    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].message, "fresh");
}
