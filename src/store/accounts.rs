//! Account store: e-mail to salted password hash

use std::path::PathBuf;

use rand::RngCore;
use sha2::{Digest, Sha256};

use super::{JsonFileStore, normalize_email};
use crate::{Error, Result};

const SCHEME: &str = "sha256";

/// Registered accounts, one JSON file
pub struct AccountStore {
    inner: JsonFileStore<String>,
}

impl AccountStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: JsonFileStore::new(path),
        }
    }

    /// Create an account; returns the normalized e-mail
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for a bad e-mail or empty password,
    /// `Conflict` if the account exists
    pub fn register(&self, email: &str, password: &str) -> Result<String> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(Error::invalid("password must not be empty"));
        }
        let stored = hash_password(password);

        self.inner.update(|accounts| {
            if accounts.contains_key(&email) {
                return Err(Error::Conflict(format!("account {email} already exists")));
            }
            accounts.insert(email.clone(), stored);
            Ok(())
        })?;

        tracing::info!(email = %email, "account registered");
        Ok(email)
    }

    /// Check a password
    ///
    /// # Errors
    ///
    /// Returns `Auth` for an unknown account or wrong password
    pub fn verify(&self, email: &str, password: &str) -> Result<String> {
        let email = normalize_email(email)?;
        let stored = self.inner.get(&email)?;

        match stored {
            Some(stored) if check_password(&stored, password) => Ok(email),
            _ => {
                tracing::debug!(email = %email, "login rejected");
                Err(Error::Auth("invalid e-mail or password".to_string()))
            }
        }
    }
}

/// `sha256$<salt hex>$<digest hex>`
fn hash_password(password: &str) -> String {
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    format!("{SCHEME}${}${}", hex::encode(salt), digest(&salt, password))
}

fn check_password(stored: &str, password: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(SCHEME), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(salt) = hex::decode(salt) else {
        return false;
    };
    let actual = digest(&salt, password);

    // Compare every byte regardless of where the first mismatch is
    actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, AccountStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::new(dir.path().join("accounts.json"));
        (dir, store)
    }

    #[test]
    fn register_then_verify() {
        let (_dir, store) = store();
        assert_eq!(store.register("Kim@School.kr", "pw1").unwrap(), "kim@school.kr");

        assert!(store.verify("kim@school.kr", "pw1").is_ok());
        assert!(matches!(store.verify("kim@school.kr", "nope"), Err(Error::Auth(_))));
        assert!(matches!(store.verify("lee@school.kr", "pw1"), Err(Error::Auth(_))));
    }

    #[test]
    fn duplicate_and_invalid() {
        let (_dir, store) = store();
        store.register("kim@school.kr", "pw").unwrap();

        assert!(matches!(store.register("kim@school.kr", "x"), Err(Error::Conflict(_))));
        assert!(matches!(store.register("bad", "x"), Err(Error::InputValidation(_))));
        assert!(matches!(store.register("lee@school.kr", ""), Err(Error::InputValidation(_))));
    }

    #[test]
    fn passwords_are_salted() {
        let (_dir, store) = store();
        store.register("a@b.kr", "same").unwrap();
        store.register("c@d.kr", "same").unwrap();

        let raw = std::fs::read_to_string(store.inner.path()).unwrap();
        assert!(!raw.contains("same"));
        let map: std::collections::BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_ne!(map["a@b.kr"], map["c@d.kr"]);
        assert!(map["a@b.kr"].starts_with("sha256$"));
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!check_password("plaintext", "plaintext"));
        assert!(!check_password("sha256$zz$00", "x"));
    }
}
