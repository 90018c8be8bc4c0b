mod board;
mod cli;
mod config;
mod credential;
mod db;
mod entities;
mod error;
mod model;
mod store;
mod util;

use std::io::{self, BufRead, Write};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::board::Board;
use crate::cli::{
    AuthCommand, BackendArg, Cli, Command, Credentials, FilterArg, TodoAdd, TodoCommand, TodoEdit,
    TodoList, TodoRef, TodoRemove,
};
use crate::config::{BackendKind, Settings};
use crate::error::AppError;
use crate::model::{Filter, User};
use crate::store::{Backend, IdentityService};
use crate::util::{format_counts, format_todo_detail, format_todo_list};

const LOG_ENV: &str = "TODOLIST_LOG";

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), AppError> {
    let Cli {
        data_dir,
        backend,
        command,
    } = Cli::parse();

    let settings = Settings::load(data_dir, backend.map(backend_from_arg))?;
    tracing::debug!(
        data_dir = %settings.data_dir.display(),
        backend = settings.backend.as_str(),
        "settings loaded"
    );
    let mut lock = db::open_lock(&settings.data_dir)?;
    let _guard = lock.write()?;

    let backend = Backend::open(&settings).await?;
    match command {
        Command::Auth(command) => handle_auth(&backend, command).await,
        Command::Todo(command) => {
            let user = backend.require_user().await?;
            handle_todo(&backend, &user, command).await
        }
    }
}

async fn handle_auth(backend: &Backend, command: AuthCommand) -> Result<(), AppError> {
    match command {
        AuthCommand::Signup(args) => handle_signup(backend, args).await,
        AuthCommand::Login(args) => handle_login(backend, args).await,
        AuthCommand::Logout => handle_logout(backend).await,
        AuthCommand::Whoami => handle_whoami(backend).await,
    }
}

async fn handle_todo(backend: &Backend, user: &User, command: TodoCommand) -> Result<(), AppError> {
    let mut board = Board::load(backend, &user.id).await?;
    match command {
        TodoCommand::Add(args) => handle_todo_add(&mut board, args).await,
        TodoCommand::List(args) => handle_todo_list(&board, args),
        TodoCommand::Show(args) => handle_todo_show(&board, args),
        TodoCommand::Toggle(args) => handle_todo_toggle(&mut board, args).await,
        TodoCommand::Done(args) => handle_todo_set_completed(&mut board, args, true).await,
        TodoCommand::Reopen(args) => handle_todo_set_completed(&mut board, args, false).await,
        TodoCommand::Edit(args) => handle_todo_edit(&mut board, args).await,
        TodoCommand::Remove(args) => handle_todo_remove(&mut board, args).await,
        TodoCommand::ClearCompleted => handle_todo_clear_completed(&mut board).await,
    }
}

async fn handle_signup(backend: &Backend, args: Credentials) -> Result<(), AppError> {
    let password = resolve_password(args.password)?;
    let user = backend.sign_up(&args.login, &password).await?;
    println!("Signed up and signed in as {}.", user.login);
    Ok(())
}

async fn handle_login(backend: &Backend, args: Credentials) -> Result<(), AppError> {
    let password = resolve_password(args.password)?;
    let user = backend.sign_in(&args.login, &password).await?;
    println!("Signed in as {}.", user.login);
    Ok(())
}

async fn handle_logout(backend: &Backend) -> Result<(), AppError> {
    let was_signed_in = backend.current_user().await?.is_some();
    backend.sign_out().await?;
    if was_signed_in {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

async fn handle_whoami(backend: &Backend) -> Result<(), AppError> {
    match backend.current_user().await? {
        Some(user) => println!("Signed in as {}.", user.login),
        None => println!("Not signed in."),
    }
    Ok(())
}

async fn handle_todo_add(board: &mut Board<'_, Backend>, args: TodoAdd) -> Result<(), AppError> {
    let todo = board.add(&args.text.join(" ")).await?;
    println!("Created todo ID: {}: {}", todo.id, todo.text);
    Ok(())
}

fn handle_todo_list(board: &Board<'_, Backend>, args: TodoList) -> Result<(), AppError> {
    let filter = filter_from_arg(args.filter);
    let visible = board.visible(filter);
    if args.count {
        println!("Total: {}", visible.len());
        return Ok(());
    }
    println!(
        "{}",
        format_todo_list(&visible, filter, board.todos().len())
    );
    if !visible.is_empty() {
        let (active, completed) = board.counts();
        println!("{}", format_counts(active, completed));
    }
    Ok(())
}

fn handle_todo_show(board: &Board<'_, Backend>, args: TodoRef) -> Result<(), AppError> {
    let todo = board.resolve(&args.id)?;
    println!("{}", format_todo_detail(todo));
    Ok(())
}

async fn handle_todo_toggle(board: &mut Board<'_, Backend>, args: TodoRef) -> Result<(), AppError> {
    let todo = board.toggle(&args.id).await?;
    print_completion(&todo.id, todo.completed);
    Ok(())
}

async fn handle_todo_set_completed(
    board: &mut Board<'_, Backend>,
    args: TodoRef,
    completed: bool,
) -> Result<(), AppError> {
    let todo = board.set_completed(&args.id, completed).await?;
    print_completion(&todo.id, todo.completed);
    Ok(())
}

async fn handle_todo_edit(board: &mut Board<'_, Backend>, args: TodoEdit) -> Result<(), AppError> {
    let todo = board.edit(&args.id, &args.text.join(" ")).await?;
    println!("Updated todo ID: {}: {}", todo.id, todo.text);
    Ok(())
}

async fn handle_todo_remove(
    board: &mut Board<'_, Backend>,
    args: TodoRemove,
) -> Result<(), AppError> {
    let target = board.resolve(&args.id)?;
    if !args.yes && !confirm(&format!("Delete this todo? \"{}\"", target.text))? {
        println!("Cancelled.");
        return Ok(());
    }
    let id = target.id.clone();
    let removed = board.remove(&id).await?;
    println!("Todo ID: {} removed.", removed.id);
    Ok(())
}

async fn handle_todo_clear_completed(board: &mut Board<'_, Backend>) -> Result<(), AppError> {
    let cleared = board.clear_completed().await?;
    match cleared.len() {
        0 => println!("No completed todos."),
        1 => println!("Removed 1 completed todo."),
        count => println!("Removed {count} completed todos."),
    }
    Ok(())
}

fn print_completion(id: &str, completed: bool) {
    if completed {
        println!("Todo ID: {id} marked done.");
    } else {
        println!("Todo ID: {id} marked active.");
    }
}

fn confirm(prompt: &str) -> Result<bool, AppError> {
    eprint!("{prompt} [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn resolve_password(flag: Option<String>) -> Result<String, AppError> {
    if let Some(password) = flag {
        return Ok(password);
    }
    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(AppError::InvalidInput(
            "password required; pass --password or provide it on stdin".to_string(),
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn backend_from_arg(arg: BackendArg) -> BackendKind {
    match arg {
        BackendArg::Local => BackendKind::Local,
        BackendArg::Sql => BackendKind::Sql,
    }
}

fn filter_from_arg(arg: FilterArg) -> Filter {
    match arg {
        FilterArg::All => Filter::All,
        FilterArg::Active => Filter::Active,
        FilterArg::Completed => Filter::Completed,
    }
}
