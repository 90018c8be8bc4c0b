use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{IdentityService, KvStore, TodoStore};
use crate::credential::PasswordRecord;
use crate::error::AppError;
use crate::model::{validate_password, validate_username, Todo, User};

pub const TODOS_KEY: &str = "todoapp.todos";
pub const USERS_KEY: &str = "todoapp.users";
pub const SESSION_KEY: &str = "todoapp.session";

#[derive(Debug, Serialize, Deserialize)]
struct SessionMarker {
    username: String,
}

/// Offline backend: todos, credentials and the session all live in the
/// key-value store.
pub struct LocalStore {
    kv: KvStore,
    iterations: u32,
}

impl LocalStore {
    pub fn new(kv: KvStore, iterations: u32) -> Self {
        Self { kv, iterations }
    }

    /// Raw account map; records are decoded one at a time so a damaged entry
    /// never hides or overwrites the others.
    fn load_users(&self) -> BTreeMap<String, Value> {
        self.kv.get(USERS_KEY).unwrap_or_default()
    }

    fn load_all_todos(&self) -> BTreeMap<String, Value> {
        self.kv.get(TODOS_KEY).unwrap_or_default()
    }

    fn todos_for(all: &BTreeMap<String, Value>, owner: &str) -> Vec<Todo> {
        match all.get(owner) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn load_todos(&self, owner: &str) -> Vec<Todo> {
        Self::todos_for(&self.load_all_todos(), owner)
    }

    fn save_todos(&self, owner: &str, todos: &[Todo]) -> Result<(), AppError> {
        let mut all = self.load_all_todos();
        all.insert(owner.to_string(), serde_json::to_value(todos)?);
        self.kv.set(TODOS_KEY, &all)
    }

    fn set_session(&self, username: &str) -> Result<(), AppError> {
        self.kv.set(
            SESSION_KEY,
            &SessionMarker {
                username: username.to_string(),
            },
        )
    }

    fn user(username: &str) -> User {
        User {
            id: username.to_string(),
            login: username.to_string(),
        }
    }
}

impl IdentityService for LocalStore {
    #[tracing::instrument(skip(self, password))]
    async fn sign_up(&self, login: &str, password: &str) -> Result<User, AppError> {
        let username = login.trim();
        if !validate_username(username) || !validate_password(password) {
            return Err(AppError::InvalidInput(
                "invalid username or password".to_string(),
            ));
        }
        let mut users = self.load_users();
        if users.contains_key(username) {
            return Err(AppError::InvalidInput("username already exists".to_string()));
        }
        users.insert(
            username.to_string(),
            serde_json::to_value(PasswordRecord::create(password, self.iterations))?,
        );
        self.kv.set(USERS_KEY, &users)?;
        self.set_session(username)?;

        let mut all = self.load_all_todos();
        if !matches!(all.get(username), Some(Value::Array(_))) {
            all.insert(username.to_string(), Value::Array(Vec::new()));
            self.kv.set(TODOS_KEY, &all)?;
        }
        tracing::info!(username, "local account created");
        Ok(Self::user(username))
    }

    #[tracing::instrument(skip(self, password))]
    async fn sign_in(&self, login: &str, password: &str) -> Result<User, AppError> {
        let username = login.trim();
        if !validate_username(username) || !validate_password(password) {
            return Err(AppError::InvalidInput(
                "invalid credentials format".to_string(),
            ));
        }
        let users = self.load_users();
        let Some(raw) = users.get(username) else {
            return Err(AppError::Auth("account not found, please sign up".to_string()));
        };
        let record: PasswordRecord = serde_json::from_value(raw.clone()).map_err(|err| {
            tracing::warn!(username, %err, "stored credential record is unreadable");
            AppError::Auth("stored credentials for this account are unreadable".to_string())
        })?;
        if !record.verify(password)? {
            return Err(AppError::Auth("incorrect password".to_string()));
        }
        self.set_session(username)?;
        Ok(Self::user(username))
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.kv.remove(SESSION_KEY)
    }

    async fn current_user(&self) -> Result<Option<User>, AppError> {
        Ok(self
            .kv
            .get::<SessionMarker>(SESSION_KEY)
            .map(|marker| Self::user(&marker.username)))
    }
}

impl TodoStore for LocalStore {
    async fn select_all(&self, owner: &str) -> Result<Vec<Todo>, AppError> {
        Ok(self.load_todos(owner))
    }

    #[tracing::instrument(skip(self, todo), fields(id = %todo.id))]
    async fn insert(&self, owner: &str, todo: &Todo) -> Result<(), AppError> {
        let mut todos = self.load_todos(owner);
        if todos.iter().any(|item| item.id == todo.id) {
            return Err(AppError::InvalidInput(format!(
                "todo id {} already exists",
                todo.id
            )));
        }
        todos.insert(0, todo.clone());
        self.save_todos(owner, &todos)
    }

    #[tracing::instrument(skip(self, todo), fields(id = %todo.id))]
    async fn update(&self, owner: &str, todo: &Todo) -> Result<(), AppError> {
        let mut todos = self.load_todos(owner);
        let Some(existing) = todos.iter_mut().find(|item| item.id == todo.id) else {
            return Err(AppError::NotFound(format!("todo id {}", todo.id)));
        };
        existing.text = todo.text.clone();
        existing.completed = todo.completed;
        self.save_todos(owner, &todos)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, owner: &str, id: &str) -> Result<(), AppError> {
        let mut todos = self.load_todos(owner);
        let before = todos.len();
        todos.retain(|item| item.id != id);
        if todos.len() == before {
            return Err(AppError::NotFound(format!("todo id {id}")));
        }
        self.save_todos(owner, &todos)
    }

    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_many(&self, owner: &str, ids: &[String]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut todos = self.load_todos(owner);
        let before = todos.len();
        todos.retain(|item| !targets.contains(item.id.as_str()));
        let removed = (before - todos.len()) as u64;
        if removed > 0 {
            self.save_todos(owner, &todos)?;
        }
        Ok(removed)
    }
}
