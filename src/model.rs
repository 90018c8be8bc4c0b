use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MAX_TODO_CHARS: usize = 200;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_PASSWORD_CHARS: usize = 128;
const MAX_EMAIL_CHARS: usize = 254;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl Todo {
    pub fn status(&self) -> TodoStatus {
        if self.completed {
            TodoStatus::Done
        } else {
            TodoStatus::Active
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TodoStatus {
    Active,
    Done,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "todo",
            Self::Done => "done",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub fn matches(&self, todo: &Todo) -> bool {
        match self {
            Self::All => true,
            Self::Active => !todo.completed,
            Self::Completed => todo.completed,
        }
    }

    pub fn empty_message(&self) -> &'static str {
        match self {
            Self::All => "No todos yet. Add one with `todolist todo add`.",
            Self::Active => "No active todos.",
            Self::Completed => "No completed todos.",
        }
    }
}

/// Identity established by sign-in; `id` is the owner key for todos.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
}

/// Strips control characters, trims whitespace and byte-order marks, and
/// enforces the 1-200 character range.
pub fn sanitize_todo_text(raw: &str) -> Result<String, AppError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(*c, '\u{0}'..='\u{1f}' | '\u{7f}'))
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_TODO_CHARS {
        return Err(AppError::InvalidInput(format!(
            "please enter 1-{MAX_TODO_CHARS} visible characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn new_todo_id() -> String {
    format!(
        "{}{:x}",
        Utc::now().timestamp_millis(),
        rand::random::<u64>()
    )
}

pub fn validate_username(name: &str) -> bool {
    let len = name.chars().count();
    (3..=32).contains(&len)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

pub fn validate_email(email: &str) -> bool {
    if email.chars().count() > MAX_EMAIL_CHARS || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub fn validate_password(password: &str) -> bool {
    (MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&password.chars().count())
}
