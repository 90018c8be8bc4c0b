use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use super::{IdentityService, KvStore, TodoStore};
use crate::credential::PasswordRecord;
use crate::entities::{account, todo};
use crate::error::AppError;
use crate::model::{validate_email, validate_password, Todo, User};

pub const REMOTE_SESSION_KEY: &str = "todoapp.remote_session";

#[derive(Debug, Serialize, Deserialize)]
struct RemoteSession {
    user_id: String,
    email: String,
}

/// Database-backed variant: accounts and todos in SQLite, session marker in
/// the key-value store.
pub struct SqlStore {
    db: DatabaseConnection,
    kv: KvStore,
    iterations: u32,
}

impl SqlStore {
    pub fn new(db: DatabaseConnection, kv: KvStore, iterations: u32) -> Self {
        Self { db, kv, iterations }
    }

    fn set_session(&self, account: &account::Model) -> Result<(), AppError> {
        self.kv.set(
            REMOTE_SESSION_KEY,
            &RemoteSession {
                user_id: account.id.clone(),
                email: account.email.clone(),
            },
        )
    }

    fn user(account: &account::Model) -> User {
        User {
            id: account.id.clone(),
            login: account.email.clone(),
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn to_todo(model: todo::Model) -> Todo {
    Todo {
        id: model.id,
        text: model.text,
        completed: model.completed,
        created_at: model.created_at,
    }
}

impl IdentityService for SqlStore {
    #[tracing::instrument(skip(self, password))]
    async fn sign_up(&self, login: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(login);
        if !validate_email(&email) {
            return Err(AppError::InvalidInput(format!("invalid email address: {email}")));
        }
        if !validate_password(password) {
            return Err(AppError::InvalidInput(
                "password must be 6-128 characters".to_string(),
            ));
        }
        let record = PasswordRecord::create(password, self.iterations);

        let txn = self.db.begin().await?;
        let result: Result<account::Model, AppError> = async {
            let existing = account::Entity::find()
                .filter(account::Column::Email.eq(email.as_str()))
                .one(&txn)
                .await?;
            if existing.is_some() {
                return Err(AppError::InvalidInput(format!(
                    "email already registered: {email}"
                )));
            }
            let model = account::Model {
                id: uuid::Uuid::new_v4().to_string(),
                email: email.clone(),
                password_salt: record.salt,
                password_hash: record.hash,
                password_iterations: i64::from(record.iterations),
                created_at: Utc::now(),
            };
            let active = account::ActiveModel {
                id: Set(model.id.clone()),
                email: Set(model.email.clone()),
                password_salt: Set(model.password_salt.clone()),
                password_hash: Set(model.password_hash.clone()),
                password_iterations: Set(model.password_iterations),
                created_at: Set(model.created_at),
            };
            account::Entity::insert(active)
                .exec_without_returning(&txn)
                .await?;
            Ok(model)
        }
        .await;

        let account = finalize_transaction(txn, result).await?;
        self.set_session(&account)?;
        tracing::info!(account_id = %account.id, "account created");
        Ok(Self::user(&account))
    }

    #[tracing::instrument(skip(self, password))]
    async fn sign_in(&self, login: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(login);
        let invalid = || AppError::Auth("invalid login credentials".to_string());
        let Some(account) = account::Entity::find()
            .filter(account::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await?
        else {
            return Err(invalid());
        };
        let iterations = u32::try_from(account.password_iterations).map_err(|_| {
            AppError::InvalidInput(format!(
                "stored iteration count out of range for account {}",
                account.id
            ))
        })?;
        let record = PasswordRecord {
            salt: account.password_salt.clone(),
            hash: account.password_hash.clone(),
            iterations,
        };
        if !record.verify(password)? {
            return Err(invalid());
        }
        self.set_session(&account)?;
        Ok(Self::user(&account))
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.kv.remove(REMOTE_SESSION_KEY)
    }

    async fn current_user(&self) -> Result<Option<User>, AppError> {
        let Some(session) = self.kv.get::<RemoteSession>(REMOTE_SESSION_KEY) else {
            return Ok(None);
        };
        match account::Entity::find_by_id(session.user_id.clone())
            .one(&self.db)
            .await?
        {
            Some(account) => Ok(Some(Self::user(&account))),
            None => {
                tracing::warn!(user_id = %session.user_id, email = %session.email, "session refers to a missing account");
                self.kv.remove(REMOTE_SESSION_KEY)?;
                Ok(None)
            }
        }
    }
}

impl TodoStore for SqlStore {
    async fn select_all(&self, owner: &str) -> Result<Vec<Todo>, AppError> {
        let rows = todo::Entity::find()
            .filter(todo::Column::OwnerId.eq(owner))
            .order_by_desc(todo::Column::CreatedAt)
            .order_by_desc(todo::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_todo).collect())
    }

    #[tracing::instrument(skip(self, item), fields(id = %item.id))]
    async fn insert(&self, owner: &str, item: &Todo) -> Result<(), AppError> {
        let active = todo::ActiveModel {
            id: Set(item.id.clone()),
            owner_id: Set(owner.to_string()),
            text: Set(item.text.clone()),
            completed: Set(item.completed),
            created_at: Set(item.created_at),
        };
        todo::Entity::insert(active)
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, item), fields(id = %item.id))]
    async fn update(&self, owner: &str, item: &Todo) -> Result<(), AppError> {
        let result = todo::Entity::update_many()
            .col_expr(todo::Column::Text, Expr::value(item.text.clone()))
            .col_expr(todo::Column::Completed, Expr::value(item.completed))
            .filter(todo::Column::Id.eq(item.id.as_str()))
            .filter(todo::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("todo id {}", item.id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, owner: &str, id: &str) -> Result<(), AppError> {
        let result = todo::Entity::delete_many()
            .filter(todo::Column::Id.eq(id))
            .filter(todo::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("todo id {id}")));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_many(&self, owner: &str, ids: &[String]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = todo::Entity::delete_many()
            .filter(todo::Column::Id.is_in(ids.to_vec()))
            .filter(todo::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Duration;
    use tempfile::TempDir;

    const FAST_ITERATIONS: u32 = 1_000;

    async fn setup_store() -> (TempDir, SqlStore) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = db::resolve_db_path(dir.path());
        db::ensure_parent_dir(&db_path).expect("ensure parent");
        let conn = db::connect(&db_path).await.expect("connect db");
        db::ensure_schema(&conn).await.expect("ensure schema");
        let kv = KvStore::open(db::resolve_storage_path(dir.path()));
        (dir, SqlStore::new(conn, kv, FAST_ITERATIONS))
    }

    async fn owner(store: &SqlStore, email: &str) -> String {
        store.sign_up(email, "secret1").await.expect("sign up").id
    }

    fn todo_at(id: &str, minutes_ago: i64) -> Todo {
        Todo {
            id: id.to_string(),
            text: format!("item {id}"),
            completed: false,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_round_trip() {
        let (_dir, store) = setup_store().await;
        let user = store
            .sign_up("Alice@Example.com", "secret1")
            .await
            .expect("sign up");
        assert_eq!(user.login, "alice@example.com");
        assert_eq!(store.current_user().await.expect("current"), Some(user.clone()));

        store.sign_out().await.expect("sign out");
        assert_eq!(store.current_user().await.expect("current"), None);

        let again = store
            .sign_in("alice@example.com", "secret1")
            .await
            .expect("sign in");
        assert_eq!(again, user);
    }

    #[tokio::test]
    async fn sign_up_rejects_duplicate_email() {
        let (_dir, store) = setup_store().await;
        store
            .sign_up("alice@example.com", "secret1")
            .await
            .expect("sign up");
        let err = store
            .sign_up("ALICE@example.com", "secret2")
            .await
            .expect_err("duplicate");
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn sign_in_uses_generic_error() {
        let (_dir, store) = setup_store().await;
        store
            .sign_up("alice@example.com", "secret1")
            .await
            .expect("sign up");
        let wrong = store
            .sign_in("alice@example.com", "nope123")
            .await
            .expect_err("wrong password");
        let missing = store
            .sign_in("bob@example.com", "secret1")
            .await
            .expect_err("missing account");
        assert_eq!(wrong.to_string(), missing.to_string());
        assert!(matches!(wrong, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn session_for_deleted_account_is_dropped() {
        let (_dir, store) = setup_store().await;
        let user = store
            .sign_up("alice@example.com", "secret1")
            .await
            .expect("sign up");
        account::Entity::delete_by_id(user.id)
            .exec(&store.db)
            .await
            .expect("delete account");
        assert_eq!(store.current_user().await.expect("current"), None);
        assert!(store.kv.get::<RemoteSession>(REMOTE_SESSION_KEY).is_none());
    }

    #[tokio::test]
    async fn select_all_orders_newest_first_per_owner() {
        let (_dir, store) = setup_store().await;
        let alice = owner(&store, "alice@example.com").await;
        let bob = owner(&store, "bob@example.com").await;
        store.insert(&alice, &todo_at("old", 10)).await.expect("insert");
        store.insert(&alice, &todo_at("new", 1)).await.expect("insert");
        store.insert(&bob, &todo_at("theirs", 5)).await.expect("insert");

        let ids: Vec<String> = store
            .select_all(&alice)
            .await
            .expect("select")
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn insert_for_unknown_owner_is_rejected() {
        let (_dir, store) = setup_store().await;
        let err = store
            .insert("no-such-account", &todo_at("1", 0))
            .await
            .expect_err("foreign key");
        assert!(matches!(err, AppError::Db(_)));
    }

    #[tokio::test]
    async fn update_and_delete_are_owner_scoped() {
        let (_dir, store) = setup_store().await;
        let alice = owner(&store, "alice@example.com").await;
        let bob = owner(&store, "bob@example.com").await;
        store.insert(&alice, &todo_at("1", 1)).await.expect("insert");

        let mut changed = todo_at("1", 1);
        changed.text = "renamed".to_string();
        changed.completed = true;
        assert!(matches!(
            store.update(&bob, &changed).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&bob, "1").await,
            Err(AppError::NotFound(_))
        ));

        store.update(&alice, &changed).await.expect("update");
        let items = store.select_all(&alice).await.expect("select");
        assert_eq!(items[0].text, "renamed");
        assert!(items[0].completed);

        store.delete(&alice, "1").await.expect("delete");
        assert!(store.select_all(&alice).await.expect("select").is_empty());
    }

    #[tokio::test]
    async fn delete_many_counts_removed_rows() {
        let (_dir, store) = setup_store().await;
        let alice = owner(&store, "alice@example.com").await;
        let bob = owner(&store, "bob@example.com").await;
        for (idx, id) in ["1", "2", "3"].iter().enumerate() {
            store
                .insert(&alice, &todo_at(id, idx as i64))
                .await
                .expect("insert");
        }
        store.insert(&bob, &todo_at("4", 0)).await.expect("insert");
        let removed = store
            .delete_many(&alice, &["1".to_string(), "2".to_string(), "4".to_string()])
            .await
            .expect("delete many");
        assert_eq!(removed, 2);
        assert_eq!(store.select_all(&alice).await.expect("select").len(), 1);
        assert_eq!(store.select_all(&bob).await.expect("select").len(), 1);
    }
}
