use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AppError;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Salted PBKDF2-HMAC-SHA256 hash, stored as lowercase hex.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PasswordRecord {
    pub salt: String,
    pub hash: String,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

impl PasswordRecord {
    pub fn create(password: &str, iterations: u32) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = derive_key(password, &salt, iterations);
        Self {
            salt: hex::encode(salt),
            hash: hex::encode(key),
            iterations,
        }
    }

    pub fn verify(&self, password: &str) -> Result<bool, AppError> {
        let salt = hex::decode(&self.salt).map_err(|err| {
            AppError::InvalidInput(format!("stored credential salt is not valid hex: {err}"))
        })?;
        let expected = hex::decode(&self.hash).map_err(|err| {
            AppError::InvalidInput(format!("stored credential hash is not valid hex: {err}"))
        })?;
        let actual = derive_key(password, &salt, self.iterations);
        Ok(constant_time_eq(&actual, &expected))
    }
}

fn default_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
