use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "todolist",
    version,
    about = "Personal todo list with local or SQLite-backed accounts"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Directory holding storage, database and config (default: ~/.todolist)"
    )]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_enum, help = "Storage backend")]
    pub backend: Option<BackendArg>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Auth(AuthCommand),
    #[command(subcommand)]
    Todo(TodoCommand),
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    Signup(Credentials),
    Login(Credentials),
    Logout,
    Whoami,
}

#[derive(Subcommand, Debug)]
pub enum TodoCommand {
    Add(TodoAdd),
    List(TodoList),
    Show(TodoRef),
    Toggle(TodoRef),
    Done(TodoRef),
    Reopen(TodoRef),
    Edit(TodoEdit),
    Remove(TodoRemove),
    #[command(name = "clear-completed")]
    ClearCompleted,
}

#[derive(Args, Debug)]
pub struct Credentials {
    #[arg(value_name = "LOGIN", help = "Username (local) or email (sql)")]
    pub login: String,
    #[arg(
        long,
        env = "TODOLIST_PASSWORD",
        hide_env_values = true,
        help = "Password; read from stdin when omitted"
    )]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct TodoAdd {
    #[arg(value_name = "TEXT", num_args = 1.., allow_hyphen_values = true)]
    pub text: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TodoList {
    #[arg(long, value_enum, default_value = "all")]
    pub filter: FilterArg,
    #[arg(long)]
    pub count: bool,
}

#[derive(Args, Debug)]
pub struct TodoRef {
    #[arg(value_name = "ID", help = "Todo id or unique id prefix")]
    pub id: String,
}

#[derive(Args, Debug)]
pub struct TodoEdit {
    #[arg(value_name = "ID")]
    pub id: String,
    #[arg(value_name = "TEXT", num_args = 1.., allow_hyphen_values = true)]
    pub text: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TodoRemove {
    #[arg(value_name = "ID")]
    pub id: String,
    #[arg(long, short = 'y', help = "Skip the confirmation prompt")]
    pub yes: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum BackendArg {
    Local,
    Sql,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FilterArg {
    All,
    Active,
    Completed,
}
