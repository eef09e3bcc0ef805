//! Client-held pseudo-identity.
//!
//! The user id is an opaque random string generated once per device and kept
//! in a small file.  It only addresses the channel; it is not a credential.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::{Error, Result};

/// Characters used for generated ids.
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of a generated id.
const ID_LEN: usize = 26;

/// Directory under the home directory holding client state.
const STATE_DIR: &str = ".streamchat";

/// File name of the persisted id.
const ID_FILE: &str = "user_id";

/// The local user's identity for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: String,
}

impl Identity {
    /// Wraps an existing user id.
    pub fn new(user_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        validate_user_id(&user_id)?;
        Ok(Self { user_id })
    }

    /// Generates a fresh random identity without persisting it.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let user_id = (0..ID_LEN)
            .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self { user_id }
    }

    /// Reads the identity stored at `path`, creating and storing a new one if
    /// the file is missing or empty.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) if !contents.trim().is_empty() => {
                let identity = Self::new(contents.trim())?;
                tracing::debug!(path = %path.display(), "loaded identity");
                Ok(identity)
            }
            Ok(_) => Self::create_at(path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::create_at(path),
            Err(err) => Err(Error::io(
                format!("failed to read identity from {}", path.display()),
                err,
            )),
        }
    }

    /// Default location of the identity file: `$HOME/.streamchat/user_id`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(STATE_DIR).join(ID_FILE))
    }

    /// Returns the user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn create_at(path: &Path) -> Result<Self> {
        let identity = Self::generate();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| {
                Error::io(
                    format!("failed to create identity directory {}", parent.display()),
                    err,
                )
            })?;
        }
        fs::write(path, format!("{}\n", identity.user_id)).map_err(|err| {
            Error::io(
                format!("failed to write identity to {}", path.display()),
                err,
            )
        })?;
        tracing::info!(path = %path.display(), "created new identity");
        Ok(identity)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(Error::validation(
            "user id must not be empty",
            Some("user_id".to_string()),
        ));
    }
    if user_id.chars().any(|c| c == '/' || c.is_whitespace() || c.is_control()) {
        return Err(Error::validation(
            "user id must not contain '/', whitespace, or control characters",
            Some("user_id".to_string()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_base36() {
        let identity = Identity::generate();
        assert_eq!(identity.user_id().len(), ID_LEN);
        assert!(
            identity
                .user_id()
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
        );
        assert_ne!(identity, Identity::generate());
    }

    #[test]
    fn load_or_create_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("user_id");
        let first = Identity::load_or_create(&path).unwrap();
        let second = Identity::load_or_create(&path).unwrap();
        assert_eq!(first, second);
        assert!(path.exists());
    }

    #[test]
    fn empty_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_id");
        fs::write(&path, "  \n").unwrap();
        let identity = Identity::load_or_create(&path).unwrap();
        let stored = fs::read_to_string(&path).unwrap();
        assert_eq!(stored.trim(), identity.user_id());
    }

    #[test]
    fn rejects_path_separators() {
        assert!(Identity::new("a/b").unwrap_err().is_validation());
        assert!(Identity::new("").unwrap_err().is_validation());
        assert!(Identity::new("abc123").is_ok());
    }
}
