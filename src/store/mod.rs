#![allow(async_fn_in_trait)]

pub mod kv;
pub mod local;
pub mod sql;

use crate::config::{BackendKind, Settings};
use crate::db;
use crate::error::AppError;
use crate::model::{Todo, User};

pub use kv::KvStore;
pub use local::LocalStore;
pub use sql::SqlStore;

/// Account and session operations.
pub trait IdentityService {
    async fn sign_up(&self, login: &str, password: &str) -> Result<User, AppError>;
    async fn sign_in(&self, login: &str, password: &str) -> Result<User, AppError>;
    async fn sign_out(&self) -> Result<(), AppError>;
    async fn current_user(&self) -> Result<Option<User>, AppError>;
}

/// Per-owner todo persistence. `select_all` returns newest first.
pub trait TodoStore {
    async fn select_all(&self, owner: &str) -> Result<Vec<Todo>, AppError>;
    async fn insert(&self, owner: &str, todo: &Todo) -> Result<(), AppError>;
    async fn update(&self, owner: &str, todo: &Todo) -> Result<(), AppError>;
    async fn delete(&self, owner: &str, id: &str) -> Result<(), AppError>;
    async fn delete_many(&self, owner: &str, ids: &[String]) -> Result<u64, AppError>;
}

pub enum Backend {
    Local(LocalStore),
    Sql(SqlStore),
}

impl Backend {
    pub async fn open(settings: &Settings) -> Result<Self, AppError> {
        let kv = KvStore::open(db::resolve_storage_path(&settings.data_dir));
        match settings.backend {
            BackendKind::Local => Ok(Self::Local(LocalStore::new(
                kv,
                settings.pbkdf2_iterations,
            ))),
            BackendKind::Sql => {
                let db_path = db::resolve_db_path(&settings.data_dir);
                db::ensure_parent_dir(&db_path)?;
                let conn = db::connect(&db_path).await?;
                db::ensure_schema(&conn).await?;
                Ok(Self::Sql(SqlStore::new(
                    conn,
                    kv,
                    settings.pbkdf2_iterations,
                )))
            }
        }
    }

    pub async fn require_user(&self) -> Result<User, AppError> {
        self.current_user().await?.ok_or(AppError::NotSignedIn)
    }
}

impl IdentityService for Backend {
    async fn sign_up(&self, login: &str, password: &str) -> Result<User, AppError> {
        match self {
            Self::Local(store) => store.sign_up(login, password).await,
            Self::Sql(store) => store.sign_up(login, password).await,
        }
    }

    async fn sign_in(&self, login: &str, password: &str) -> Result<User, AppError> {
        match self {
            Self::Local(store) => store.sign_in(login, password).await,
            Self::Sql(store) => store.sign_in(login, password).await,
        }
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        match self {
            Self::Local(store) => store.sign_out().await,
            Self::Sql(store) => store.sign_out().await,
        }
    }

    async fn current_user(&self) -> Result<Option<User>, AppError> {
        match self {
            Self::Local(store) => store.current_user().await,
            Self::Sql(store) => store.current_user().await,
        }
    }
}

impl TodoStore for Backend {
    async fn select_all(&self, owner: &str) -> Result<Vec<Todo>, AppError> {
        match self {
            Self::Local(store) => store.select_all(owner).await,
            Self::Sql(store) => store.select_all(owner).await,
        }
    }

    async fn insert(&self, owner: &str, todo: &Todo) -> Result<(), AppError> {
        match self {
            Self::Local(store) => store.insert(owner, todo).await,
            Self::Sql(store) => store.insert(owner, todo).await,
        }
    }

    async fn update(&self, owner: &str, todo: &Todo) -> Result<(), AppError> {
        match self {
            Self::Local(store) => store.update(owner, todo).await,
            Self::Sql(store) => store.update(owner, todo).await,
        }
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<(), AppError> {
        match self {
            Self::Local(store) => store.delete(owner, id).await,
            Self::Sql(store) => store.delete(owner, id).await,
        }
    }

    async fn delete_many(&self, owner: &str, ids: &[String]) -> Result<u64, AppError> {
        match self {
            Self::Local(store) => store.delete_many(owner, ids).await,
            Self::Sql(store) => store.delete_many(owner, ids).await,
        }
    }
}
