use super::*;
use shared::domain::Field;

#[test]
fn email_pattern_needs_user_domain_and_dot() {
    assert!(is_valid_email("ana@test.com"));
    assert!(is_valid_email("a.b+tag@sub.example.org"));
    assert!(!is_valid_email("ana@test"));
    assert!(!is_valid_email("ana test@test.com"));
    assert!(!is_valid_email("@test.com"));
    assert!(!is_valid_email("ana@@test.com"));
}

#[test]
fn name_is_checked_before_email() {
    assert_eq!(
        check_required("   ", ""),
        Err(ValidationError::MissingNombre)
    );
    assert_eq!(
        check_required("Ana", "  "),
        Err(ValidationError::MissingEmail)
    );
    assert_eq!(
        check_required("Ana", "not-an-email"),
        Err(ValidationError::InvalidEmail)
    );
    assert_eq!(check_required("Ana", " ana@test.com "), Ok(()));
}

#[test]
fn field_errors_reports_every_field() {
    let errors = field_errors(&UserInput::new("", "bad"));
    assert_eq!(
        errors,
        vec![ValidationError::MissingNombre, ValidationError::InvalidEmail]
    );
    assert!(field_errors(&UserInput::new("Ana", "ana@test.com")).is_empty());
}

#[test]
fn validate_normalizes_the_row() {
    let input = UserInput {
        nombre: "  Ana López ".into(),
        email: " ANA@Test.com ".into(),
        telefono: Field::Present("   ".into()),
        edad: Field::Present(0),
        ciudad: Field::Present(" Madrid ".into()),
        profesion: Field::Present(" Ingeniero".into()),
    };

    let row = validate(&input).expect("valid");

    assert_eq!(row.nombre, "Ana López");
    assert_eq!(row.email, "ana@test.com");
    assert_eq!(row.telefono, None);
    assert_eq!(row.edad, Some(0));
    assert_eq!(row.ciudad.as_deref(), Some("Madrid"));
    assert_eq!(row.profesion.as_deref(), Some("Ingeniero"));
}

#[test]
fn validate_rejects_missing_name() {
    let err = validate(&UserInput::new(" ", "ana@test.com")).expect_err("invalid");
    assert_eq!(err, ValidationError::MissingNombre);
    assert_eq!(err.field(), shared::domain::Column::Nombre);
}
