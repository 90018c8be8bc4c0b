use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{account, todo};
use crate::error::AppError;

pub fn resolve_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("todolist.db")
}

pub fn resolve_storage_path(data_dir: &Path) -> PathBuf {
    data_dir.join("storage.json")
}

pub fn resolve_lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join("todolist.lock")
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn open_lock(data_dir: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = resolve_lock_path(data_dir);
    ensure_parent_dir(&lock_path)?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut account_stmt = schema.create_table_from_entity(account::Entity);
    account_stmt.if_not_exists();
    db.execute(builder.build(&account_stmt)).await?;

    let mut todo_stmt = schema.create_table_from_entity(todo::Entity);
    todo_stmt.if_not_exists();
    db.execute(builder.build(&todo_stmt)).await?;

    let mut email_index = Index::create()
        .name("idx_accounts_email")
        .table(account::Entity)
        .col(account::Column::Email)
        .unique()
        .to_owned();
    email_index.if_not_exists();
    db.execute(builder.build(&email_index)).await?;

    let mut owner_index = Index::create()
        .name("idx_todos_owner_created")
        .table(todo::Entity)
        .col(todo::Column::OwnerId)
        .col(todo::Column::CreatedAt)
        .to_owned();
    owner_index.if_not_exists();
    db.execute(builder.build(&owner_index)).await?;

    Ok(())
}
