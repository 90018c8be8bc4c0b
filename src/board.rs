use chrono::Utc;

use crate::error::AppError;
use crate::model::{new_todo_id, sanitize_todo_text, Filter, Todo};
use crate::store::TodoStore;

/// The signed-in owner's todo list, newest first.
///
/// Mutations change the in-memory list before the store call and restore the
/// previous list when the call fails.
pub struct Board<'a, S> {
    store: &'a S,
    owner: String,
    todos: Vec<Todo>,
}

impl<'a, S: TodoStore> Board<'a, S> {
    pub async fn load(store: &'a S, owner: &str) -> Result<Self, AppError> {
        let todos = store.select_all(owner).await?;
        Ok(Self {
            store,
            owner: owner.to_string(),
            todos,
        })
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn visible(&self, filter: Filter) -> Vec<&Todo> {
        self.todos.iter().filter(|todo| filter.matches(todo)).collect()
    }

    /// (active, completed)
    pub fn counts(&self) -> (usize, usize) {
        let completed = self.todos.iter().filter(|todo| todo.completed).count();
        (self.todos.len() - completed, completed)
    }

    /// Finds a todo by exact id or by a unique id prefix.
    pub fn resolve(&self, reference: &str) -> Result<&Todo, AppError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(AppError::InvalidInput("todo id cannot be empty".to_string()));
        }
        if let Some(todo) = self.todos.iter().find(|todo| todo.id == reference) {
            return Ok(todo);
        }
        let matches: Vec<&Todo> = self
            .todos
            .iter()
            .filter(|todo| todo.id.starts_with(reference))
            .collect();
        match matches.as_slice() {
            [] => Err(AppError::NotFound(format!("todo id {reference}"))),
            [todo] => Ok(todo),
            many => Err(AppError::InvalidInput(format!(
                "todo id prefix {reference} is ambiguous ({} matches)",
                many.len()
            ))),
        }
    }

    pub async fn add(&mut self, raw: &str) -> Result<Todo, AppError> {
        let text = sanitize_todo_text(raw)?;
        let id = loop {
            let candidate = new_todo_id();
            if !self.todos.iter().any(|todo| todo.id == candidate) {
                break candidate;
            }
        };
        let todo = Todo {
            id,
            text,
            completed: false,
            created_at: Utc::now(),
        };

        let snapshot = self.todos.clone();
        self.todos.insert(0, todo.clone());
        let result = self.store.insert(&self.owner, &todo).await;
        self.settle(snapshot, result)?;
        Ok(todo)
    }

    pub async fn toggle(&mut self, reference: &str) -> Result<Todo, AppError> {
        let completed = !self.resolve(reference)?.completed;
        self.set_completed(reference, completed).await
    }

    pub async fn set_completed(
        &mut self,
        reference: &str,
        completed: bool,
    ) -> Result<Todo, AppError> {
        let id = self.resolve(reference)?.id.clone();
        self.modify(&id, |todo| todo.completed = completed).await
    }

    pub async fn edit(&mut self, reference: &str, raw: &str) -> Result<Todo, AppError> {
        let text = sanitize_todo_text(raw)?;
        let id = self.resolve(reference)?.id.clone();
        self.modify(&id, move |todo| todo.text = text).await
    }

    pub async fn remove(&mut self, reference: &str) -> Result<Todo, AppError> {
        let id = self.resolve(reference)?.id.clone();
        let snapshot = self.todos.clone();
        let position = self
            .todos
            .iter()
            .position(|todo| todo.id == id)
            .ok_or_else(|| AppError::NotFound(format!("todo id {id}")))?;
        let removed = self.todos.remove(position);
        let result = self.store.delete(&self.owner, &id).await;
        self.settle(snapshot, result)?;
        Ok(removed)
    }

    /// Deletes every completed todo in one store call.
    pub async fn clear_completed(&mut self) -> Result<Vec<Todo>, AppError> {
        let (done, remaining): (Vec<Todo>, Vec<Todo>) =
            self.todos.iter().cloned().partition(|todo| todo.completed);
        if done.is_empty() {
            return Ok(done);
        }
        let ids: Vec<String> = done.iter().map(|todo| todo.id.clone()).collect();
        let snapshot = std::mem::replace(&mut self.todos, remaining);
        let result = self.store.delete_many(&self.owner, &ids).await;
        self.settle(snapshot, result)?;
        Ok(done)
    }

    async fn modify<F>(&mut self, id: &str, change: F) -> Result<Todo, AppError>
    where
        F: FnOnce(&mut Todo),
    {
        let snapshot = self.todos.clone();
        let todo = self
            .todos
            .iter_mut()
            .find(|todo| todo.id == id)
            .ok_or_else(|| AppError::NotFound(format!("todo id {id}")))?;
        change(todo);
        let updated = todo.clone();
        let result = self.store.update(&self.owner, &updated).await;
        self.settle(snapshot, result)?;
        Ok(updated)
    }

    fn settle<T>(
        &mut self,
        snapshot: Vec<Todo>,
        result: Result<T, AppError>,
    ) -> Result<T, AppError> {
        if result.is_err() {
            tracing::warn!(owner = %self.owner, "store call failed; reverting list");
            self.todos = snapshot;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        rows: RefCell<HashMap<String, Vec<Todo>>>,
        fail: Cell<bool>,
    }

    impl MemoryStore {
        fn check(&self) -> Result<(), AppError> {
            if self.fail.get() {
                return Err(AppError::Io(std::io::Error::other("store offline")));
            }
            Ok(())
        }

        fn rows(&self, owner: &str) -> Vec<Todo> {
            self.rows.borrow().get(owner).cloned().unwrap_or_default()
        }
    }

    impl TodoStore for MemoryStore {
        async fn select_all(&self, owner: &str) -> Result<Vec<Todo>, AppError> {
            self.check()?;
            Ok(self.rows(owner))
        }

        async fn insert(&self, owner: &str, todo: &Todo) -> Result<(), AppError> {
            self.check()?;
            self.rows
                .borrow_mut()
                .entry(owner.to_string())
                .or_default()
                .insert(0, todo.clone());
            Ok(())
        }

        async fn update(&self, owner: &str, todo: &Todo) -> Result<(), AppError> {
            self.check()?;
            let mut rows = self.rows.borrow_mut();
            let item = rows
                .get_mut(owner)
                .and_then(|items| items.iter_mut().find(|item| item.id == todo.id))
                .ok_or_else(|| AppError::NotFound(todo.id.clone()))?;
            *item = todo.clone();
            Ok(())
        }

        async fn delete(&self, owner: &str, id: &str) -> Result<(), AppError> {
            self.delete_many(owner, &[id.to_string()]).await.map(|_| ())
        }

        async fn delete_many(&self, owner: &str, ids: &[String]) -> Result<u64, AppError> {
            self.check()?;
            let mut rows = self.rows.borrow_mut();
            let items = rows.entry(owner.to_string()).or_default();
            let before = items.len();
            items.retain(|item| !ids.contains(&item.id));
            Ok((before - items.len()) as u64)
        }
    }

    async fn board_with<'a>(
        store: &'a MemoryStore,
        texts: &[&str],
    ) -> Board<'a, MemoryStore> {
        let mut board = Board::load(store, "alice").await.expect("load");
        for text in texts {
            board.add(text).await.expect("add");
        }
        board
    }

    #[tokio::test]
    async fn add_rejects_blank_and_overlong_text() {
        let store = MemoryStore::default();
        let mut board = board_with(&store, &[]).await;
        assert!(board.add("   \t").await.is_err());
        assert!(board.add(&"x".repeat(201)).await.is_err());
        assert!(board.todos().is_empty());
        assert!(store.rows("alice").is_empty());
    }

    #[tokio::test]
    async fn add_inserts_newest_first() {
        let store = MemoryStore::default();
        let board = board_with(&store, &["first", "second"]).await;
        let texts: Vec<&str> = board.todos().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "first"]);
        assert_eq!(store.rows("alice").len(), 2);
    }

    #[tokio::test]
    async fn toggle_flips_only_target() {
        let store = MemoryStore::default();
        let mut board = board_with(&store, &["a", "b", "c"]).await;
        let target = board.todos()[1].id.clone();

        let toggled = board.toggle(&target).await.expect("toggle");
        assert!(toggled.completed);
        let flags: Vec<bool> = board.todos().iter().map(|t| t.completed).collect();
        assert_eq!(flags, vec![false, true, false]);
        assert!(store.rows("alice")[1].completed);

        board.toggle(&target).await.expect("toggle back");
        assert!(board.todos().iter().all(|t| !t.completed));
    }

    #[tokio::test]
    async fn filter_views_do_not_mutate() {
        let store = MemoryStore::default();
        let mut board = board_with(&store, &["a", "b", "c"]).await;
        let id = board.todos()[0].id.clone();
        board.set_completed(&id, true).await.expect("complete");

        let active = board.visible(Filter::Active).len();
        let completed = board.visible(Filter::Completed).len();
        assert_eq!((active, completed), (2, 1));
        assert_eq!(board.visible(Filter::All).len(), 3);
        assert_eq!(board.todos().len(), 3);
        assert_eq!(board.counts(), (2, 1));
    }

    #[tokio::test]
    async fn remove_deletes_exactly_one() {
        let store = MemoryStore::default();
        let mut board = board_with(&store, &["a", "b", "c"]).await;
        let id = board.todos()[1].id.clone();
        let removed = board.remove(&id).await.expect("remove");
        assert_eq!(removed.text, "b");
        assert_eq!(board.todos().len(), 2);
        assert_eq!(store.rows("alice").len(), 2);
        assert!(board.resolve(&id).is_err());
    }

    #[tokio::test]
    async fn edit_sanitizes_text() {
        let store = MemoryStore::default();
        let mut board = board_with(&store, &["draft"]).await;
        let id = board.todos()[0].id.clone();
        let edited = board.edit(&id, "  final\u{1b} ").await.expect("edit");
        assert_eq!(edited.text, "final");
        assert!(board.edit(&id, "  ").await.is_err());
        assert_eq!(store.rows("alice")[0].text, "final");
    }

    #[tokio::test]
    async fn clear_completed_removes_all_done_items() {
        let store = MemoryStore::default();
        let mut board = board_with(&store, &["a", "b", "c"]).await;
        let first = board.todos()[0].id.clone();
        let last = board.todos()[2].id.clone();
        board.set_completed(&first, true).await.expect("done");
        board.set_completed(&last, true).await.expect("done");

        let cleared = board.clear_completed().await.expect("clear");
        assert_eq!(cleared.len(), 2);
        assert_eq!(board.todos().len(), 1);
        assert!(!board.todos()[0].completed);
        assert_eq!(store.rows("alice").len(), 1);

        assert!(board.clear_completed().await.expect("noop").is_empty());
    }

    #[tokio::test]
    async fn failed_store_calls_revert_the_list() {
        let store = MemoryStore::default();
        let mut board = board_with(&store, &["a", "b"]).await;
        let before = board.todos().to_vec();
        let id = before[0].id.clone();
        board.set_completed(&before[1].id, true).await.expect("done");
        let before = board.todos().to_vec();
        store.fail.set(true);

        assert!(board.add("c").await.is_err());
        assert!(board.toggle(&id).await.is_err());
        assert!(board.edit(&id, "changed").await.is_err());
        assert!(board.remove(&id).await.is_err());
        assert!(board.clear_completed().await.is_err());
        assert_eq!(board.todos(), before.as_slice());
    }

    #[tokio::test]
    async fn resolve_accepts_unique_prefix_only() {
        let store = MemoryStore::default();
        store.rows.borrow_mut().insert(
            "alice".to_string(),
            ["abc1", "abc2", "xyz"]
                .iter()
                .map(|id| Todo {
                    id: id.to_string(),
                    text: "item".to_string(),
                    completed: false,
                    created_at: Utc::now(),
                })
                .collect(),
        );
        let board = Board::load(&store, "alice").await.expect("load");
        assert_eq!(board.resolve("xy").expect("prefix").id, "xyz");
        assert_eq!(board.resolve("abc2").expect("exact").id, "abc2");
        assert!(matches!(board.resolve("abc"), Err(AppError::InvalidInput(_))));
        assert!(matches!(board.resolve("nope"), Err(AppError::NotFound(_))));
    }
}
