//! Field validators. Each returns the message reported under the field's
//! name in a 400 response.

pub const MAX_TEXT_LEN: usize = 255;
pub const MIN_PASSWORD_LEN: usize = 5;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const NOT_NULL: &str = "This field may not be null.";

/// Lower-cases the domain part of an email; the local part is kept as typed.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err(BLANK.to_string());
    }
    if email.chars().count() > MAX_TEXT_LEN {
        return Err(too_long(MAX_TEXT_LEN));
    }

    let valid = match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err("Enter a valid email address.".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err(BLANK.to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Ensure this field has at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    Ok(())
}

/// Required single-line text such as a title or a tag name.
pub fn validate_required_text(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(BLANK.to_string());
    }
    validate_optional_text(value)
}

/// Text that may be empty but is bounded in length.
pub fn validate_optional_text(value: &str) -> Result<(), String> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(too_long(MAX_TEXT_LEN));
    }
    Ok(())
}

fn too_long(max: usize) -> String {
    format!("Ensure this field has no more than {max} characters.")
}
