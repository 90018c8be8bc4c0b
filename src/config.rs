use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::credential::DEFAULT_PBKDF2_ITERATIONS;
use crate::error::AppError;

pub const ENV_PREFIX: &str = "TODOLIST";
const DATA_DIR_ENV: &str = "TODOLIST_DATA_DIR";
const DEFAULT_DIR_NAME: &str = ".todolist";
const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Sql,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Sql => "sql",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
struct FileSettings {
    backend: BackendKind,
    pbkdf2_iterations: u32,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub backend: BackendKind,
    pub pbkdf2_iterations: u32,
}

impl Settings {
    /// Defaults, then `<data_dir>/config.toml`, then `TODOLIST_*` variables.
    /// A backend passed on the command line wins over all of them.
    pub fn load(
        data_dir: Option<PathBuf>,
        backend: Option<BackendKind>,
    ) -> Result<Self, AppError> {
        let data_dir = resolve_data_dir(data_dir)?;
        let settings = config::Config::builder()
            .set_default("backend", BackendKind::Local.as_str())?
            .set_default("pbkdf2_iterations", i64::from(DEFAULT_PBKDF2_ITERATIONS))?
            .add_source(config::File::from(data_dir.join(CONFIG_FILE)).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let file: FileSettings = settings.try_deserialize()?;
        if file.pbkdf2_iterations == 0 {
            return Err(AppError::InvalidInput(
                "pbkdf2_iterations must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            data_dir,
            backend: backend.unwrap_or(file.backend),
            pbkdf2_iterations: file.pbkdf2_iterations,
        })
    }
}

fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(path) = flag {
        return non_empty_dir(path, "--data-dir");
    }
    if let Ok(value) = std::env::var(DATA_DIR_ENV) {
        return non_empty_dir(PathBuf::from(value), DATA_DIR_ENV);
    }
    if let Ok(home) = std::env::var("HOME") {
        return Ok(Path::new(&home).join(DEFAULT_DIR_NAME));
    }
    Err(AppError::InvalidInput(format!(
        "unable to resolve data directory; set {DATA_DIR_ENV} or pass --data-dir"
    )))
}

fn non_empty_dir(path: PathBuf, source: &str) -> Result<PathBuf, AppError> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{source} is empty")));
    }
    Ok(path)
}
