//! Field rules for the auth request types and formatting of their failures.

use std::borrow::Cow;

use validator::{ValidationError, ValidationErrors};

const PASSWORD_SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";

const PASSWORD_MESSAGE: &str = "password must be at least 8 characters long and contain at least \
     one uppercase letter, one lowercase letter, one number, and one special character";

const NAME_MESSAGE: &str =
    "name must be between 2 and 50 characters long and contain only letters, spaces, and hyphens";

fn rule_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// At least 8 characters with an uppercase letter, a lowercase letter,
/// a digit and one character from [`PASSWORD_SPECIALS`].
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let long_enough = password.chars().count() >= 8;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if long_enough && has_upper && has_lower && has_digit && has_special {
        Ok(())
    } else {
        Err(rule_error("password", PASSWORD_MESSAGE))
    }
}

/// 2 to 50 characters of ASCII letters, ASCII whitespace and hyphens, not
/// starting or ending with whitespace or a hyphen.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    let edge_ok = |c: Option<char>| c.is_some_and(|c| !c.is_whitespace() && c != '-');
    let trimmed_edges = edge_ok(name.chars().next()) && edge_ok(name.chars().next_back());
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c.is_ascii_whitespace() || c == '-');

    if (2..=50).contains(&len) && trimmed_edges && allowed {
        Ok(())
    } else {
        Err(rule_error("name", NAME_MESSAGE))
    }
}

/// Request types whose errors are reported in declaration order.
pub trait FieldOrder {
    const FIELDS: &'static [&'static str];
}

/// Flatten validation failures into one message joined with `"; "`.
///
/// Fields listed in `field_order` come first, in that order; any others
/// follow by name.
pub fn describe_errors(errors: &ValidationErrors, field_order: &[&str]) -> String {
    let rank = |field: &str| {
        field_order
            .iter()
            .position(|f| *f == field)
            .unwrap_or(field_order.len())
    };
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|(a, _), (b, _)| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));

    fields
        .into_iter()
        .flat_map(|(field, field_errors)| {
            field_errors.iter().map(move |error| match &error.message {
                Some(message) => message.to_string(),
                None => format!("{} failed validation: {}", field, error.code),
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}
