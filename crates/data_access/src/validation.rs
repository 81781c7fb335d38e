use std::sync::LazyLock;

use regex::Regex;
use shared::{
    domain::{UserInput, UserRow},
    error::ValidationError,
};

#[allow(clippy::expect_used)] // literal pattern
static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email regex"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// First rule the name and email break, in form order.
pub fn check_required(nombre: &str, email: &str) -> Result<(), ValidationError> {
    if nombre.trim().is_empty() {
        return Err(ValidationError::MissingNombre);
    }
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if !is_valid_email(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

/// Every rule violation in the input, one per field.
pub fn field_errors(input: &UserInput) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if input.nombre.trim().is_empty() {
        errors.push(ValidationError::MissingNombre);
    }
    let email = input.email.trim();
    if email.is_empty() {
        errors.push(ValidationError::MissingEmail);
    } else if !is_valid_email(email) {
        errors.push(ValidationError::InvalidEmail);
    }
    errors
}

/// Checks the input and produces the row to write.
///
/// Text is trimmed, the email lower-cased and blank optionals become `null`.
pub fn validate(input: &UserInput) -> Result<UserRow, ValidationError> {
    check_required(&input.nombre, &input.email)?;

    Ok(UserRow {
        nombre: input.nombre.trim().to_string(),
        email: input.email.trim().to_lowercase(),
        telefono: input.telefono.clone().normalized().into_option(),
        edad: input.edad.clone().into_option(),
        ciudad: input.ciudad.clone().normalized().into_option(),
        profesion: input.profesion.clone().normalized().into_option(),
    })
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
