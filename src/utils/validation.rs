use crate::error::AppError;
use crate::utils::sanitize::{sanitize_email, sanitize_url};

/// Collects every problem with a request body so the client sees them all at
/// once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Character-count bounds; an empty value fails as "is required".
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: Option<usize>) -> &mut Self {
        let len = value.trim().chars().count();
        if len == 0 && min > 0 {
            self.errors.push(format!("{field} is required"));
        } else if len < min {
            self.errors.push(format!("{field} must be at least {min} characters"));
        } else if let Some(max) = max.filter(|max| len > *max) {
            self.errors.push(format!("{field} must be at most {max} characters"));
        }
        self
    }

    /// Like [`Validator::length`] but skipped when the value is absent or blank.
    pub fn optional_length(
        &mut self,
        field: &str,
        value: Option<&str>,
        min: usize,
        max: Option<usize>,
    ) -> &mut Self {
        match value.filter(|v| !v.trim().is_empty()) {
            Some(v) => self.length(field, v, min, max),
            None => self,
        }
    }

    /// Column bound on the value as it will be written. Escaping can grow
    /// input that passed [`Validator::length`].
    pub fn stored_length(&mut self, field: &str, stored: &str, max: usize) -> &mut Self {
        if stored.chars().count() > max {
            self.errors
                .push(format!("{field} is too long after escaping special characters"));
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.push(format!("{field} is required"));
        } else if sanitize_email(value).is_none() {
            self.errors.push(format!("{field} must be a valid email"));
        }
        self
    }

    pub fn optional_url(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            if sanitize_url(v).is_none() {
                self.errors.push(format!("{field} must be a valid URL"));
            }
        }
        self
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = String>) -> &mut Self {
        self.errors.extend(errors);
        self
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

const SPECIAL_CHARS: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;

/// Every rule the password breaks; empty when it is strong enough.
pub fn password_strength(password: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        errors.push("Password must contain at least one special character".to_string());
    }

    errors
}
