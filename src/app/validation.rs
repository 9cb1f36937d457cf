//! Input sanitizing and validation shared by the ads, city and auth use-cases.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::error::{ServiceError, ServiceResult};
use crate::domain::user::{Credentials, NewUser, UserUpdate};

pub const MAX_TEXT_CHARS: usize = 255;
pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_PASSWORD_CHARS: usize = 64;

fn tag_regex() -> &'static Regex {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    TAG_REGEX.get_or_init(|| Regex::new(r"<[^>]*>").expect("Failed to compile tag regex"))
}

fn text_regex() -> &'static Regex {
    static TEXT_REGEX: OnceLock<Regex> = OnceLock::new();
    TEXT_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9\s\-_\p{Cyrillic}]*$").expect("Failed to compile text regex")
    })
}

fn username_regex() -> &'static Regex {
    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    USERNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.\-]{3,50}$").expect("Failed to compile username regex")
    })
}

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    })
}

fn name_regex() -> &'static Regex {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9\p{Cyrillic}\s\-]{1,50}$").expect("Failed to compile name regex")
    })
}

/// Removes HTML tags and surrounding whitespace.
pub fn strip_tags(input: &str) -> String {
    tag_regex().replace_all(input, "").trim().to_string()
}

/// Sanitizes a free-text field. The returned value never contains markup and
/// always matches the text allow-list.
pub fn sanitize_text(input: &str) -> ServiceResult<String> {
    let cleaned = strip_tags(input);
    if cleaned.chars().count() > MAX_TEXT_CHARS {
        return Err(ServiceError::InputTooLong);
    }
    if !text_regex().is_match(&cleaned) {
        return Err(ServiceError::InvalidCharacters);
    }
    Ok(cleaned)
}

/// Same rules as [`sanitize_text`] for values taken from the request path.
pub fn sanitize_url_param(input: &str) -> ServiceResult<String> {
    let cleaned = strip_tags(input);
    if cleaned.chars().count() > MAX_TEXT_CHARS {
        return Err(ServiceError::UrlTooLong);
    }
    if !text_regex().is_match(&cleaned) {
        return Err(ServiceError::UrlInvalidCharacters);
    }
    Ok(cleaned)
}

pub fn is_valid_username(username: &str) -> bool {
    username_regex().is_match(username)
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email_regex().is_match(email)
}

pub fn is_valid_password(password: &str) -> bool {
    let len = password.chars().count();
    (MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&len)
}

pub fn is_valid_name(name: &str) -> bool {
    name_regex().is_match(name)
}

fn reject(wrong_fields: Vec<String>) -> ServiceResult<()> {
    if wrong_fields.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::IncorrectDataForms(wrong_fields))
    }
}

pub fn validate_registration(user: &NewUser) -> ServiceResult<()> {
    let mut wrong_fields = Vec::new();
    if !is_valid_username(&user.username) {
        wrong_fields.push("username".to_string());
    }
    if !is_valid_email(&user.email) {
        wrong_fields.push("email".to_string());
    }
    if !is_valid_password(&user.password) {
        wrong_fields.push("password".to_string());
    }
    if let Some(name) = &user.name {
        if !is_valid_name(name) {
            wrong_fields.push("name".to_string());
        }
    }
    reject(wrong_fields)
}

pub fn validate_credentials(credentials: &Credentials) -> ServiceResult<()> {
    let mut wrong_fields = Vec::new();
    if !is_valid_username(&credentials.username) {
        wrong_fields.push("username".to_string());
    }
    let len = credentials.password.chars().count();
    if len == 0 || len > MAX_PASSWORD_CHARS {
        wrong_fields.push("password".to_string());
    }
    reject(wrong_fields)
}

pub fn validate_user_update(changes: &UserUpdate) -> ServiceResult<()> {
    let mut wrong_fields = Vec::new();
    if let Some(username) = &changes.username {
        if !is_valid_username(username) {
            wrong_fields.push("username".to_string());
        }
    }
    if let Some(email) = &changes.email {
        if !is_valid_email(email) {
            wrong_fields.push("email".to_string());
        }
    }
    if let Some(name) = &changes.name {
        if !is_valid_name(name) {
            wrong_fields.push("name".to_string());
        }
    }
    if let Some(avatar) = &changes.avatar {
        if avatar.chars().count() > MAX_TEXT_CHARS || tag_regex().is_match(avatar) {
            wrong_fields.push("avatar".to_string());
        }
    }
    reject(wrong_fields)
}
