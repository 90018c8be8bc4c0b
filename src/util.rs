use chrono::{DateTime, Utc};

use crate::model::{Filter, Todo};

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_todo_detail(todo: &Todo) -> String {
    let mut output = String::new();
    output.push_str(&format!("Todo ID: {}\n", todo.id));
    output.push_str(&format!("Status: {}\n", todo.status().as_str()));
    output.push_str(&format!("Text: {}\n", todo.text));
    output.push_str(&format!("Created: {}", format_datetime(todo.created_at)));
    output
}

pub fn format_todo_list(todos: &[&Todo], filter: Filter, total: usize) -> String {
    if todos.is_empty() {
        let message = if total == 0 {
            Filter::All.empty_message()
        } else {
            filter.empty_message()
        };
        return message.to_string();
    }

    let id_width = todos
        .iter()
        .map(|todo| todo.id.len())
        .max()
        .unwrap_or(2)
        .max(2);
    let mut lines = Vec::with_capacity(todos.len() + 1);
    lines.push(format!(
        "{:<id_width$} {:<4} {:<16} {}",
        "ID", "STAT", "CREATED", "TEXT"
    ));
    for todo in todos {
        lines.push(format!(
            "{:<id_width$} {:<4} {:<16} {}",
            todo.id,
            todo.status().as_str(),
            format_datetime(todo.created_at),
            todo.text
        ));
    }
    lines.join("\n")
}

pub fn format_counts(active: usize, completed: usize) -> String {
    format!("{active} active, {completed} completed")
}
