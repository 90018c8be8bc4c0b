use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::ensure_parent_dir;
use crate::error::AppError;

/// JSON-object file holding one value per fixed key.
///
/// Reads go to disk each time so that values written by another command are
/// always visible. Unreadable content is treated as absent rather than an
/// error.
#[derive(Clone, Debug)]
pub struct KvStore {
    path: PathBuf,
}

impl KvStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.read_all().remove(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                tracing::debug!(key, %err, "discarding undecodable stored value");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let mut entries = self.read_all();
        entries.insert(key.to_string(), serde_json::to_value(value)?);
        self.write_all(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut entries = self.read_all();
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }

    fn read_all(&self) -> Map<String, Value> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Map::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "storage file unreadable");
                return Map::new();
            }
        };
        if raw.trim().is_empty() {
            return Map::new();
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(entries)) => entries,
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "storage file is not an object");
                Map::new()
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "storage file is malformed");
                Map::new()
            }
        }
    }

    fn write_all(&self, entries: &Map<String, Value>) -> Result<(), AppError> {
        ensure_parent_dir(&self.path)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
